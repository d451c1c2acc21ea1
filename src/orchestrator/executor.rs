//! External process execution for the configure and package steps.
//!
//! Every command carries its own working directory and environment; the
//! provisioner never changes the process-wide working directory. Output is
//! streamed line by line into the log while the process runs, and the tail of
//! stderr is kept for the error report.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::error::StepFailure;

/// Lines of stderr retained for failure reports
pub const STDERR_TAIL_LINES: usize = 40;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    /// Shell-like rendering for logs and error messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Result of a command that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout_lines: usize,
    pub stderr_tail: String,
}

/// Read `reader` to EOF, logging each line and keeping the last `keep`.
///
/// Lines are decoded lossily. The pipe is read to the end even after a read
/// error so the child never sees a closed pipe.
async fn drain_lines<R>(reader: R, label: &'static str, keep: usize) -> (usize, VecDeque<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut count = 0usize;
    let mut tail = VecDeque::with_capacity(keep);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                log::warn!("[Exec] [{}] Failed to read output: {}", label, e);
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        count += 1;
        log::debug!("[Exec] [{}] {}", label, line);
        if keep > 0 {
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }
    }
    (count, tail)
}

/// Run `spec` to completion.
///
/// # Returns
/// * `Ok(CommandOutput)` if the process exited with status 0
/// * `Err(StepFailure)` with the command line, exit status and stderr tail
///   if it could not be spawned or exited unsuccessfully
pub async fn run_command(spec: &CommandSpec) -> Result<CommandOutput, StepFailure> {
    let rendered = spec.to_string();
    log::info!("[Exec] Running: {} (in {})", rendered, spec.cwd.display());

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        StepFailure::process(
            format!("failed to start {}: {}", spec.program, e),
            rendered.clone(),
            None,
            String::new(),
        )
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_task = async {
        match stdout {
            Some(out) => drain_lines(out, "stdout", 0).await.0,
            None => 0,
        }
    };
    let stderr_task = async {
        match stderr {
            Some(err) => drain_lines(err, "stderr", STDERR_TAIL_LINES).await.1,
            None => VecDeque::new(),
        }
    };

    let (stdout_lines, stderr_tail, status) = tokio::join!(stdout_task, stderr_task, child.wait());
    let stderr_tail = Vec::from(stderr_tail).join("\n");

    let status = status.map_err(|e| {
        StepFailure::process(
            format!("failed to wait for {}: {}", spec.program, e),
            rendered.clone(),
            None,
            stderr_tail.clone(),
        )
    })?;

    if !status.success() {
        return Err(StepFailure::process(
            format!("{} exited unsuccessfully", spec.program),
            rendered,
            status.code(),
            stderr_tail,
        ));
    }

    log::debug!("[Exec] {} finished ({} stdout lines)", spec.program, stdout_lines);
    Ok(CommandOutput {
        stdout_lines,
        stderr_tail,
    })
}
