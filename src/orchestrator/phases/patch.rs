//! Phase 3: Patch - apply the declaration shim to the fetched tree.

use std::path::PathBuf;

use crate::error::StepFailure;
use crate::models::{PatchOutcome, PatchSpec};
use crate::source::SourcePatcher;

/// Apply `spec` inside `src_dir`.
///
/// The toolchain probe spawns the compiler, so this runs on a blocking thread.
pub async fn patch_source(src_dir: PathBuf, spec: PatchSpec) -> Result<PatchOutcome, StepFailure> {
    log::info!(
        "[Provision] [PATCH] Ensuring {:?} heads {}",
        spec.declaration,
        src_dir.join(&spec.target).display()
    );

    tokio::task::spawn_blocking(move || SourcePatcher::new(src_dir).apply(&spec))
        .await
        .map_err(|e| StepFailure::new(format!("patch task aborted: {}", e)))?
        .map_err(StepFailure::from)
}
