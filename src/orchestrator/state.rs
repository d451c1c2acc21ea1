//! Provisioning State Management and Phase Tracking
//!
//! This module provides the state tracking structures the orchestrator
//! reduces over while it runs the pipeline.
//!
//! **Architecture**:
//! - `ProvisionPhase`: Enum representing the discrete pipeline phases
//! - `OrchestrationState`: Struct tracking the current phase, completed steps
//!   and the failure cause
//! - Transitions are strictly linear; `Failed` is reachable from every
//!   non-terminal phase and nothing leaves `Done` or `Failed`

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::models::{DependencyDescriptor, Step, StepRecord};

/// Phase of one provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionPhase {
    /// Run created, nothing touched yet
    Idle,

    /// Workspace root being wiped and recreated
    Cleaning,

    /// Shallow clone, reset to the pinned revision, submodules
    Fetching,

    /// Declaration shim being applied
    Patching,

    /// CMake configure in a fresh build directory
    Configuring,

    /// Packaging tool compiling the native module
    Packaging,

    /// Artifact produced
    Done,

    /// A step failed; the run is over
    Failed,
}

impl ProvisionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionPhase::Idle => "idle",
            ProvisionPhase::Cleaning => "cleaning",
            ProvisionPhase::Fetching => "fetching",
            ProvisionPhase::Patching => "patching",
            ProvisionPhase::Configuring => "configuring",
            ProvisionPhase::Packaging => "packaging",
            ProvisionPhase::Done => "done",
            ProvisionPhase::Failed => "failed",
        }
    }

    /// The phase in which `step` runs.
    pub fn for_step(step: Step) -> Self {
        match step {
            Step::Clean => ProvisionPhase::Cleaning,
            Step::Fetch => ProvisionPhase::Fetching,
            Step::Patch => ProvisionPhase::Patching,
            Step::Configure => ProvisionPhase::Configuring,
            Step::Package => ProvisionPhase::Packaging,
        }
    }

    /// The step running in this phase, if any.
    pub fn step(&self) -> Option<Step> {
        match self {
            ProvisionPhase::Cleaning => Some(Step::Clean),
            ProvisionPhase::Fetching => Some(Step::Fetch),
            ProvisionPhase::Patching => Some(Step::Patch),
            ProvisionPhase::Configuring => Some(Step::Configure),
            ProvisionPhase::Packaging => Some(Step::Package),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProvisionPhase::Done | ProvisionPhase::Failed)
    }

    /// Get all valid phase transitions FROM this phase.
    pub fn valid_next_phases(&self) -> Vec<ProvisionPhase> {
        match self {
            ProvisionPhase::Idle => vec![ProvisionPhase::Cleaning, ProvisionPhase::Failed],
            ProvisionPhase::Cleaning => vec![ProvisionPhase::Fetching, ProvisionPhase::Failed],
            ProvisionPhase::Fetching => vec![ProvisionPhase::Patching, ProvisionPhase::Failed],
            ProvisionPhase::Patching => vec![ProvisionPhase::Configuring, ProvisionPhase::Failed],
            ProvisionPhase::Configuring => vec![ProvisionPhase::Packaging, ProvisionPhase::Failed],
            ProvisionPhase::Packaging => vec![ProvisionPhase::Done, ProvisionPhase::Failed],
            ProvisionPhase::Done | ProvisionPhase::Failed => vec![],
        }
    }

    /// Check if a transition to the given phase is valid.
    pub fn can_transition_to(&self, next: ProvisionPhase) -> bool {
        self.valid_next_phases().contains(&next)
    }
}

/// Where and why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureCause {
    pub step: Option<Step>,
    pub message: String,
}

/// Execution state of one provisioning run.
#[derive(Debug, Clone)]
pub struct OrchestrationState {
    /// Current phase
    pub phase: ProvisionPhase,

    /// Descriptor being provisioned; fixed for the whole run
    pub descriptor: DependencyDescriptor,

    /// Steps that completed, in order
    pub completed: Vec<StepRecord>,

    /// Set once the run fails
    pub failure: Option<FailureCause>,

    /// Run start
    pub start_time: Instant,

    /// Start of the phase currently running
    phase_started: Instant,
}

impl OrchestrationState {
    pub fn new(descriptor: DependencyDescriptor) -> Self {
        let now = Instant::now();
        OrchestrationState {
            phase: ProvisionPhase::Idle,
            descriptor,
            completed: Vec::new(),
            failure: None,
            start_time: now,
            phase_started: now,
        }
    }

    /// Attempt to transition to the next phase.
    pub fn transition_to(&mut self, next_phase: ProvisionPhase) -> Result<(), String> {
        if !self.phase.can_transition_to(next_phase) {
            return Err(format!(
                "Invalid phase transition: {} -> {}",
                self.phase.as_str(),
                next_phase.as_str()
            ));
        }
        log::debug!(
            "[Provision] [STATE] {} -> {}",
            self.phase.as_str(),
            next_phase.as_str()
        );
        self.phase = next_phase;
        self.phase_started = Instant::now();
        Ok(())
    }

    /// Record that the step of the current phase finished.
    pub fn complete_step(&mut self, detail: impl Into<String>) -> Option<&StepRecord> {
        let step = self.phase.step()?;
        let elapsed = self.phase_started.elapsed();
        self.completed.push(StepRecord {
            step,
            duration_ms: elapsed.as_millis() as u64,
            detail: detail.into(),
        });
        self.completed.last()
    }

    /// Record an error and mark the run failed.
    ///
    /// Terminal states are left as they are.
    pub fn record_error(&mut self, message: impl Into<String>) {
        if self.phase.is_terminal() {
            return;
        }
        self.failure = Some(FailureCause {
            step: self.phase.step(),
            message: message.into(),
        });
        self.phase = ProvisionPhase::Failed;
    }

    /// Get time elapsed since the run started.
    pub fn elapsed_since_start(&self) -> Duration {
        self.start_time.elapsed()
    }
}
