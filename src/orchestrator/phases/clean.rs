//! Phase 1: Clean - reset the workspace root to an empty directory.

use std::path::Path;

use crate::error::StepFailure;
use crate::system::{recreate_dir, validate_workspace_root};

/// Delete and recreate `workspace`.
///
/// The safety checks run before anything is removed. A missing workspace is
/// already clean and is simply created.
///
/// # Arguments
/// * `workspace` - Absolute workspace root
/// * `project_dir` - Project directory, which must not live inside the workspace
pub fn clean_workspace(workspace: &Path, project_dir: &Path) -> Result<(), StepFailure> {
    validate_workspace_root(workspace, project_dir).map_err(StepFailure::new)?;

    if workspace.exists() {
        log::info!("[Provision] [CLEAN] Removing {}", workspace.display());
    } else {
        log::info!(
            "[Provision] [CLEAN] {} does not exist, creating it",
            workspace.display()
        );
    }

    recreate_dir(workspace).map_err(|e| {
        StepFailure::new(format!(
            "failed to reset workspace {}: {}",
            workspace.display(),
            e
        ))
    })
}
