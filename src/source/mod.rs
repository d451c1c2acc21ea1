//! Dependency Source Management Module
//!
//! Handles interactions with the external source tree:
//! - Version-control operations (shallow clone, hard reset, submodules)
//!   behind the [`SourceControl`] trait, with a libgit2 backend and a `git`
//!   executable backend
//! - The idempotent source patch applied before configuration

pub mod cli;
pub mod git;
pub mod patcher;

use std::path::Path;
use std::sync::Arc;

use crate::config::ProvisionConfig;
use crate::error::GitError;
use crate::models::{is_commit_hash, SourceBackend};

pub use cli::GitCli;
pub use git::Libgit2Source;
pub use patcher::SourcePatcher;

/// Result type for git operations
pub type GitResult<T> = Result<T, GitError>;

/// Version-control client used by the fetch step.
///
/// All methods block; the orchestrator runs them on a blocking thread.
/// Every operation receives the directory it works in explicitly.
pub trait SourceControl: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Shallow, single-branch clone of `origin` into `dest` (which must not
    /// exist or be empty).
    fn clone_shallow(&self, origin: &str, dest: &Path) -> GitResult<()>;

    /// Hard-reset the checkout in `repo_dir` to `revision`, fetching the
    /// revision first when the shallow history does not contain it.
    ///
    /// Returns the full id of the commit now checked out.
    fn reset_hard(&self, repo_dir: &Path, revision: &str) -> GitResult<String>;

    /// Initialise and update submodules of the checkout in `repo_dir`.
    fn update_submodules(&self, repo_dir: &Path, recursive: bool) -> GitResult<()>;

    /// Full id of the commit HEAD points at.
    fn head_commit(&self, repo_dir: &Path) -> GitResult<String>;
}

/// Build the source-control backend selected in the configuration.
pub fn backend_for(config: &ProvisionConfig) -> Arc<dyn SourceControl> {
    match config.backend {
        SourceBackend::Cli => Arc::new(GitCli::new(config.git.clone())),
        SourceBackend::Libgit2 => Arc::new(Libgit2Source::new(config.git.depth)),
    }
}

/// Check that a commit-hash pin resolved to the commit it names.
///
/// Branch and tag pins are accepted as resolved.
pub fn verify_pinned_commit(revision: &str, resolved: &str) -> GitResult<()> {
    if is_commit_hash(revision) && !resolved.to_ascii_lowercase().starts_with(&revision.to_ascii_lowercase()) {
        return Err(GitError::RefNotFound(format!(
            "pinned revision {} resolved to unrelated commit {}",
            revision, resolved
        )));
    }
    Ok(())
}
