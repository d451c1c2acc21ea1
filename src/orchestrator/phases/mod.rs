//! Orchestrator phases: the provisioning pipeline stages.
//!
//! - **Phase 1: Clean** (`clean`) - Path safety checks, wipe and recreate the workspace root
//! - **Phase 2: Fetch** (`fetch`) - Shallow clone, hard reset to the pinned revision, submodules
//! - **Phase 3: Patch** (`patch`) - Idempotent declaration shim
//! - **Phase 4: Configure** (`configure`) - CMake configure in a fresh build directory
//! - **Phase 5: Package** (`package`) - Packaging tool run and artifact discovery
//!
//! Each phase reports failure as a [`crate::error::StepFailure`]; the
//! orchestrator attaches the step.

pub mod clean;
pub mod configure;
pub mod fetch;
pub mod package;
pub mod patch;

pub use clean::clean_workspace;
pub use configure::CmakeConfigure;
pub use fetch::fetch_source;
pub use package::PackageTool;
pub use patch::patch_source;
