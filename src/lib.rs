//! Dependency Provisioner
//!
//! Produces a compiled, loadable native module from a pinned revision of an
//! external source tree. A run cleans the workspace, shallow-fetches the pinned
//! revision with its submodules, applies a one-line source shim, configures the
//! native build with CMake and runs the packaging tool.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Descriptor, patch and report types
//! - **config**: TOML configuration and command-line overrides
//! - **source**: Version-control backends and the source patcher
//! - **system**: Filesystem helpers, workspace safety checks, run lock
//! - **orchestrator**: Pipeline state machine, process executor and phases
//! - **log_collector**: `log` backend writing to stderr and a run log file

// Core foundational modules
pub mod error;
pub mod models;

// Configuration file and overrides
pub mod config;

// Filesystem primitives, path safety, run locking
pub mod system;

// Fetching and patching the dependency sources
pub mod source;

// Decoupled logging
pub mod log_collector;

// Pipeline state machine and phases
pub mod orchestrator;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::LogCollector;

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    ConfigError, GitError, LockError, PatchError, ProvisionError, Result, StepFailure,
};

pub use models::{
    DependencyDescriptor, PatchOutcome, PatchSpec, ProvisionReport, SourceBackend, Step,
    StepRecord, ToolchainGate,
};

pub use config::{ConfigOverrides, ProvisionConfig};

pub use source::SourceControl;

pub use orchestrator::{OrchestrationState, ProvisionPhase, Provisioner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
