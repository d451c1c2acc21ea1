//! Unified error type hierarchy for the dependency provisioner
//!
//! Provides structured error handling with ConfigError, GitError, PatchError,
//! LockError and the pipeline-level ProvisionError.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::models::Step;

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid TOML in config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Version-control errors raised by either source-control backend.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Clone error: {0}")]
    Clone(String),

    #[error("Reset error: {0}")]
    Reset(String),

    #[error("Reference not found: {0}")]
    RefNotFound(String),

    #[error("Submodule error: {0}")]
    Submodule(String),

    #[error("Command '{command}' failed with status {exit_code:?}: {stderr}")]
    Command {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Git2 error: {0}")]
    Git2(#[from] git2::Error),
}

/// Source patching errors.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Patch target file not found: {0}")]
    FileNotFound(String),

    #[error("Patch target could not be read: {0}")]
    ReadFailed(String),

    #[error("Patch target could not be written: {0}")]
    WriteFailed(String),

    #[error("Invalid patch declaration: {0}")]
    InvalidDeclaration(String),
}

/// Run lock errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// Lock is held by another live process
    #[error("Workspace locked by process {pid} (acquired {age_secs}s ago): {path}")]
    HeldByOther {
        pid: u32,
        age_secs: u64,
        path: String,
    },

    /// Lock file IO error
    #[error("Lock file error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Details attached to a failed pipeline step.
///
/// `command` is the rendered command line when the failure came from an
/// external process; `stderr` holds the retained tail of its error output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepFailure {
    pub message: String,
    pub command: Option<String>,
    pub exit_code: Option<i32>,
    pub stderr: Option<String>,
}

impl StepFailure {
    pub fn new(message: impl Into<String>) -> Self {
        StepFailure {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Failure of an external process that ran to completion with a bad status.
    pub fn process(
        message: impl Into<String>,
        command: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        let stderr = stderr.into();
        StepFailure {
            message: message.into(),
            command: Some(command.into()),
            exit_code,
            stderr: if stderr.trim().is_empty() {
                None
            } else {
                Some(stderr)
            },
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(command) = &self.command {
            write!(f, " (command: `{}`", command)?;
            match self.exit_code {
                Some(code) => write!(f, ", exit status {})", code)?,
                None => write!(f, ", terminated without exit status)")?,
            }
        }
        if let Some(stderr) = &self.stderr {
            write!(f, "\nstderr:\n{}", stderr.trim_end())?;
        }
        Ok(())
    }
}

impl From<GitError> for StepFailure {
    fn from(e: GitError) -> Self {
        match e {
            GitError::Command {
                command,
                exit_code,
                stderr,
            } => StepFailure::process("git command failed", command, exit_code, stderr),
            other => StepFailure::new(other.to_string()),
        }
    }
}

impl From<PatchError> for StepFailure {
    fn from(e: PatchError) -> Self {
        StepFailure::new(e.to_string())
    }
}

/// Pipeline error: either a rejected run or a failed step.
///
/// Every step variant names the step it came from, so the message shown to
/// the user always identifies where the pipeline stopped.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Invalid dependency descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    WorkspaceLocked(#[from] LockError),

    #[error("clean step failed: {0}")]
    CleanFailed(StepFailure),

    #[error("fetch step failed: {0}")]
    FetchFailed(StepFailure),

    #[error("patch step failed: {0}")]
    PatchFailed(StepFailure),

    #[error("configure step failed: {0}")]
    ConfigureFailed(StepFailure),

    #[error("package step failed: {0}")]
    PackageFailed(StepFailure),
}

impl ProvisionError {
    /// Wrap a failure in the variant belonging to `step`.
    pub fn at(step: Step, failure: StepFailure) -> Self {
        match step {
            Step::Clean => ProvisionError::CleanFailed(failure),
            Step::Fetch => ProvisionError::FetchFailed(failure),
            Step::Patch => ProvisionError::PatchFailed(failure),
            Step::Configure => ProvisionError::ConfigureFailed(failure),
            Step::Package => ProvisionError::PackageFailed(failure),
        }
    }

    /// The pipeline step that failed, if the error came from one.
    pub fn step(&self) -> Option<Step> {
        match self {
            ProvisionError::CleanFailed(_) => Some(Step::Clean),
            ProvisionError::FetchFailed(_) => Some(Step::Fetch),
            ProvisionError::PatchFailed(_) => Some(Step::Patch),
            ProvisionError::ConfigureFailed(_) => Some(Step::Configure),
            ProvisionError::PackageFailed(_) => Some(Step::Package),
            _ => None,
        }
    }

    /// Step failure details, if the error came from a step.
    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            ProvisionError::CleanFailed(f)
            | ProvisionError::FetchFailed(f)
            | ProvisionError::PatchFailed(f)
            | ProvisionError::ConfigureFailed(f)
            | ProvisionError::PackageFailed(f) => Some(f),
            _ => None,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::InvalidDescriptor(_) | ProvisionError::Config(_) => 2,
            ProvisionError::WorkspaceLocked(_) => 3,
            ProvisionError::CleanFailed(_) => 10,
            ProvisionError::FetchFailed(_) => 11,
            ProvisionError::PatchFailed(_) => 12,
            ProvisionError::ConfigureFailed(_) => 13,
            ProvisionError::PackageFailed(_) => 14,
        }
    }
}

/// Top-level result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::FileNotFound("/etc/provision.toml".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration file not found: /etc/provision.toml"
        );
    }

    #[test]
    fn test_step_failure_display_includes_command_and_stderr() {
        let failure = StepFailure::process(
            "cmake configuration rejected",
            "cmake -S src -B src/build",
            Some(1),
            "CMake Error: no CMAKE_C_COMPILER could be found\n",
        );
        let text = ProvisionError::ConfigureFailed(failure).to_string();
        assert!(text.starts_with("configure step failed: cmake configuration rejected"));
        assert!(text.contains("`cmake -S src -B src/build`"));
        assert!(text.contains("exit status 1"));
        assert!(text.contains("no CMAKE_C_COMPILER"));
    }

    #[test]
    fn test_blank_stderr_is_dropped() {
        let failure = StepFailure::process("failed", "false", Some(1), "  \n");
        assert!(failure.stderr.is_none());
    }

    #[test]
    fn test_at_and_step_agree() {
        for step in Step::ALL {
            let err = ProvisionError::at(step, StepFailure::new("boom"));
            assert_eq!(err.step(), Some(step));
            assert_eq!(err.failure().map(|f| f.message.as_str()), Some("boom"));
        }
    }

    #[test]
    fn test_exit_codes_are_distinct_per_step() {
        let codes: Vec<i32> = Step::ALL
            .iter()
            .map(|s| ProvisionError::at(*s, StepFailure::new("x")).exit_code())
            .collect();
        let mut deduped = codes.clone();
        deduped.dedup();
        assert_eq!(codes, deduped);
        assert!(codes.iter().all(|c| *c != 0));
    }

    #[test]
    fn test_git_command_error_maps_to_process_failure() {
        let failure: StepFailure = GitError::Command {
            command: "git reset --hard deadbeef".to_string(),
            exit_code: Some(128),
            stderr: "fatal: ambiguous argument".to_string(),
        }
        .into();
        assert_eq!(failure.exit_code, Some(128));
        assert_eq!(failure.command.as_deref(), Some("git reset --hard deadbeef"));
    }
}
