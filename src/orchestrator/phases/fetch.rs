//! Phase 2: Fetch - materialize the pinned revision inside the workspace.
//!
//! The source-control backend blocks, so the whole sequence runs on a
//! blocking thread. A failed fetch leaves the workspace empty rather than
//! half-populated.

use std::path::Path;
use std::sync::Arc;

use crate::error::StepFailure;
use crate::models::DependencyDescriptor;
use crate::source::{GitResult, SourceControl};
use crate::system::recreate_dir;

fn fetch_blocking(
    source: &dyn SourceControl,
    descriptor: &DependencyDescriptor,
    dest: &Path,
) -> GitResult<String> {
    source.clone_shallow(&descriptor.origin, dest)?;
    let head = source.reset_hard(dest, &descriptor.revision)?;
    source.update_submodules(dest, true)?;
    Ok(head)
}

/// Clone `descriptor` into `<workspace>/<name>`, pin it and pull submodules.
///
/// # Returns
/// * `Ok(String)` - the full id of the checked-out commit
/// * `Err(StepFailure)` - after the workspace has been emptied again
pub async fn fetch_source(
    source: Arc<dyn SourceControl>,
    descriptor: &DependencyDescriptor,
    workspace: &Path,
) -> Result<String, StepFailure> {
    let dest = descriptor.source_dir(workspace);
    log::info!(
        "[Provision] [FETCH] {} @ {} -> {} (backend: {})",
        descriptor.origin,
        descriptor.revision,
        dest.display(),
        source.name()
    );

    let task_descriptor = descriptor.clone();
    let task_dest = dest.clone();
    let joined = tokio::task::spawn_blocking(move || {
        fetch_blocking(source.as_ref(), &task_descriptor, &task_dest)
    })
    .await;

    let failure = match joined {
        Ok(Ok(head)) => return Ok(head),
        Ok(Err(e)) => StepFailure::from(e),
        Err(e) => StepFailure::new(format!("fetch task aborted: {}", e)),
    };

    log::warn!(
        "[Provision] [FETCH] Failed, emptying workspace {}",
        workspace.display()
    );
    if let Err(e) = recreate_dir(workspace) {
        log::error!(
            "[Provision] [FETCH] Could not empty workspace {}: {}",
            workspace.display(),
            e
        );
    }
    Err(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GitError;
    use crate::system::is_empty_dir;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records calls and optionally fails at one of them.
    struct ScriptedSource {
        calls: Mutex<Vec<String>>,
        fail_reset: bool,
    }

    impl SourceControl for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn clone_shallow(&self, origin: &str, dest: &Path) -> GitResult<()> {
            self.calls.lock().unwrap().push(format!("clone {}", origin));
            std::fs::create_dir_all(dest.join(".git"))?;
            Ok(())
        }

        fn reset_hard(&self, _repo_dir: &Path, revision: &str) -> GitResult<String> {
            self.calls.lock().unwrap().push(format!("reset {}", revision));
            if self.fail_reset {
                return Err(GitError::RefNotFound(revision.to_string()));
            }
            Ok("0123456789abcdef0123456789abcdef01234567".to_string())
        }

        fn update_submodules(&self, _repo_dir: &Path, recursive: bool) -> GitResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("submodules recursive={}", recursive));
            Ok(())
        }

        fn head_commit(&self, _repo_dir: &Path) -> GitResult<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_fetch_runs_clone_reset_submodules_in_order() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let source = Arc::new(ScriptedSource {
            calls: Mutex::new(Vec::new()),
            fail_reset: false,
        });
        let descriptor = DependencyDescriptor::new("file:///origin", "main", "dep");

        let head = fetch_source(source.clone(), &descriptor, temp.path())
            .await
            .expect("fetch");
        assert!(head.starts_with("0123456"));
        assert_eq!(
            *source.calls.lock().unwrap(),
            vec!["clone file:///origin", "reset main", "submodules recursive=true"]
        );
    }

    #[tokio::test]
    async fn test_failed_reset_leaves_workspace_empty() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let workspace = temp.path().join("libs");
        std::fs::create_dir_all(&workspace).expect("Failed to create workspace");
        let source = Arc::new(ScriptedSource {
            calls: Mutex::new(Vec::new()),
            fail_reset: true,
        });
        let descriptor = DependencyDescriptor::new("file:///origin", "nope", "dep");

        let failure = fetch_source(source.clone(), &descriptor, &workspace)
            .await
            .unwrap_err();
        assert!(failure.message.contains("nope"));
        assert!(is_empty_dir(&workspace).expect("workspace still exists"));
        assert_eq!(source.calls.lock().unwrap().len(), 2);
    }
}
