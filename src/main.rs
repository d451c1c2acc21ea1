use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use dep_provisioner::config::{
    load_config_from_file, parse_env_pair, render_config, ConfigOverrides, DEFAULT_CONFIG_FILE,
};
use dep_provisioner::log_collector::{parse_level, LOG_LEVEL_ENV};
use dep_provisioner::{
    ConfigError, LogCollector, ProvisionConfig, ProvisionError, Provisioner, SourceBackend,
};

#[derive(Parser, Debug)]
#[command(name = "dep_provisioner")]
#[command(about = "Fetch, patch, configure and package a pinned native dependency")]
#[command(long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./provision.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace root; wiped at the start of every run
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    #[arg(long, help = "Origin repository URL")]
    origin: Option<String>,

    #[arg(long, help = "Pinned revision (commit hash, tag or branch)")]
    revision: Option<String>,

    #[arg(long, help = "Directory name of the source tree inside the workspace")]
    name: Option<String>,

    #[arg(long, help = "Source-control backend (cli, libgit2)")]
    backend: Option<SourceBackend>,

    /// Environment override for the packaging tool, e.g. CC=clang
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    #[arg(long, help = "Log the commands that would run without touching anything")]
    dry_run: bool,

    #[arg(long, value_name = "FILE", help = "Write the run report as JSON")]
    report: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Also write a run log file into this directory")]
    log_dir: Option<PathBuf>,

    #[arg(long, help = "Print the effective configuration as TOML and exit")]
    print_config: bool,

    #[arg(short, long, help = "Debug logging")]
    verbose: bool,

    #[arg(long, env = LOG_LEVEL_ENV, value_name = "LEVEL", help = "Log level (error, warn, info, debug, trace)")]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            workspace: self.workspace.clone(),
            origin: self.origin.clone(),
            revision: self.revision.clone(),
            name: self.name.clone(),
            backend: self.backend,
            env: self.env.clone(),
            dry_run: self.dry_run,
        }
    }
}

/// Explicit file, else `./provision.toml` if present, else defaults.
fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<ProvisionConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config_from_file(path);
    }
    let default_path = cwd.join(DEFAULT_CONFIG_FILE);
    if default_path.is_file() {
        return load_config_from_file(&default_path);
    }
    log::debug!("[Main] No {} found, using defaults", DEFAULT_CONFIG_FILE);
    let mut config = ProvisionConfig::default();
    config.resolve_paths(cwd);
    Ok(config)
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;

    let mut config = load_config(cli.config.as_deref(), &cwd)?;
    config.apply_overrides(cli.overrides());
    config.resolve_paths(&cwd);
    config.validate()?;

    if cli.print_config {
        print!("{}", render_config(&config)?);
        return Ok(());
    }

    let report = Provisioner::new(config).provision().await?;

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        log::info!("[Main] Report written to {}", path.display());
    }

    match &report.artifact {
        Some(artifact) => println!("{}", artifact.display()),
        None => log::info!("[Main] Dry run complete, nothing was built"),
    }
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<ProvisionError>() {
        u8::try_from(e.exit_code()).unwrap_or(1)
    } else if err.downcast_ref::<ConfigError>().is_some() {
        2
    } else {
        1
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        parse_level(cli.log_level.as_deref(), log::LevelFilter::Info)
    };

    let collector = match LogCollector::new(level, cli.log_dir.as_deref()) {
        Ok(collector) => collector,
        Err(e) => {
            eprintln!("[Main] ERROR: {}", e);
            return ExitCode::from(2);
        }
    };
    if let Err(e) = collector.install() {
        eprintln!("[Main] WARNING: Failed to register logger: {}", e);
    }
    if let Some(path) = collector.log_path() {
        log::info!("[Main] Run log: {}", path.display());
    }

    let code = match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    };

    if let Err(e) = collector.wait_for_empty() {
        eprintln!("[Main] WARNING: Failed to flush run log: {}", e);
    }
    code
}
