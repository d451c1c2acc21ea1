//! Config file loader and serialization.

use crate::config::ProvisionConfig;
use crate::error::ConfigError;
use std::fs;
use std::path::Path;

/// Load config from a TOML file.
///
/// Relative paths inside the file are resolved against the file's directory.
pub fn load_config_from_file(path: &Path) -> Result<ProvisionConfig, ConfigError> {
    validate_config_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(format!(
                "Configuration file not found at: {}",
                path.display()
            ))
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let mut config: ProvisionConfig = toml::from_str(&content)?;

    let cwd = std::env::current_dir()?;
    let base_dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => cwd.join(parent),
        None => cwd,
    };
    config.resolve_paths(&base_dir);

    log::debug!("[Config] Loaded {}", path.display());
    Ok(config)
}

/// Render the effective configuration as TOML.
pub fn render_config(config: &ProvisionConfig) -> Result<String, ConfigError> {
    toml::to_string_pretty(config).map_err(|e| {
        ConfigError::ValidationFailed(format!("Failed to serialize configuration: {}", e))
    })
}

/// Save config to a TOML file, creating parent directories.
pub fn save_config_to_file(config: &ProvisionConfig, path: &Path) -> Result<(), ConfigError> {
    validate_config_path(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(path, render_config(config)?)?;
    Ok(())
}

/// Validate config path (.toml extension required).
pub fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "Configuration path cannot be empty".to_string(),
        ));
    }

    match path.extension() {
        Some(ext) if ext == "toml" => Ok(()),
        Some(ext) => Err(ConfigError::ValidationFailed(format!(
            "Configuration file must have .toml extension, got .{}",
            ext.to_string_lossy()
        ))),
        None => Err(ConfigError::ValidationFailed(
            "Configuration file must have .toml extension".to_string(),
        )),
    }
}
