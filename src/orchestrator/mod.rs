//! Provisioning Orchestration: 5-step dependency pipeline (Clean -> Fetch -> Patch -> Configure -> Package).

pub mod executor;
pub mod phases;
pub mod state;

use chrono::Utc;
use std::sync::Arc;

pub use executor::{run_command, CommandOutput, CommandSpec};
pub use phases::{CmakeConfigure, PackageTool};
pub use state::{OrchestrationState, ProvisionPhase};

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result, StepFailure};
use crate::models::{ProvisionReport, Step};
use crate::source::{backend_for, SourceControl};
use crate::system::{validate_workspace_root, RunLock};

/// Runs the provisioning pipeline for one configured dependency.
///
/// Steps run strictly in order; the first failure ends the run and no step
/// is retried.
pub struct Provisioner {
    config: ProvisionConfig,
    source: Arc<dyn SourceControl>,
}

impl Provisioner {
    /// Create a provisioner using the configured source-control backend.
    pub fn new(config: ProvisionConfig) -> Self {
        let source = backend_for(&config);
        Provisioner { config, source }
    }

    /// Create a provisioner with an explicit source-control backend.
    pub fn with_source(config: ProvisionConfig, source: Arc<dyn SourceControl>) -> Self {
        Provisioner { config, source }
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Run the pipeline.
    ///
    /// The descriptor and workspace root are validated and the run lock is
    /// taken before any step touches the filesystem. In dry-run mode every
    /// step only logs what it would do.
    pub async fn provision(&self) -> Result<ProvisionReport> {
        let descriptor = self.config.dependency.clone();
        descriptor
            .validate()
            .map_err(ProvisionError::InvalidDescriptor)?;

        let workspace = self.config.workspace.as_path();
        validate_workspace_root(workspace, &self.config.project_dir)
            .map_err(|msg| ProvisionError::at(Step::Clean, StepFailure::new(msg)))?;

        log::info!(
            "[Provision] Provisioning {} @ {} from {}{}",
            descriptor.name,
            descriptor.revision,
            descriptor.origin,
            if self.config.dry_run { " (dry run)" } else { "" }
        );

        let started_at = Utc::now();
        let mut state = OrchestrationState::new(descriptor.clone());
        let mut report = ProvisionReport {
            descriptor: descriptor.clone(),
            workspace_root: workspace.to_path_buf(),
            source_dir: descriptor.source_dir(workspace),
            head_commit: None,
            patch: None,
            artifact: None,
            steps: Vec::new(),
            dry_run: self.config.dry_run,
            started_at,
            finished_at: started_at,
        };

        if self.config.dry_run {
            self.plan(&mut state, &report)?;
        } else {
            let _lock = RunLock::acquire(
                workspace,
                &descriptor.name,
                self.config.lock_stale_after(),
            )?;
            self.execute(&mut state, &mut report).await?;
        }

        state
            .transition_to(ProvisionPhase::Done)
            .map_err(|msg| ProvisionError::at(Step::Package, StepFailure::new(msg)))?;

        report.steps = state.completed.clone();
        report.finished_at = Utc::now();
        log::info!(
            "[Provision] Done in {:.1}s",
            state.elapsed_since_start().as_secs_f64()
        );
        Ok(report)
    }

    async fn execute(&self, state: &mut OrchestrationState, report: &mut ProvisionReport) -> Result<()> {
        let workspace = self.config.workspace.as_path();
        let project_dir = self.config.project_dir.as_path();
        let source_dir = report.source_dir.clone();

        begin(state, Step::Clean)?;
        let result = phases::clean_workspace(workspace, project_dir);
        finish(state, Step::Clean, result, |_| format!("reset {}", workspace.display()))?;

        begin(state, Step::Fetch)?;
        let result = phases::fetch_source(self.source.clone(), &state.descriptor, workspace).await;
        let head = finish(state, Step::Fetch, result, |head| format!("HEAD {}", head))?;
        report.head_commit = Some(head);

        begin(state, Step::Patch)?;
        let result = phases::patch_source(source_dir.clone(), self.config.patch.clone()).await;
        let outcome = finish(state, Step::Patch, result, |outcome| format!("{:?}", outcome))?;
        report.patch = Some(outcome);

        begin(state, Step::Configure)?;
        let cmake = CmakeConfigure::new(self.config.configure.clone());
        let result = cmake.run(&source_dir).await;
        finish(state, Step::Configure, result, |build| {
            format!("configured {}", build.display())
        })?;

        begin(state, Step::Package)?;
        let packager = PackageTool::new(self.config.package.clone());
        let result = packager.run(project_dir).await;
        let artifact = finish(state, Step::Package, result, |artifact| {
            format!("artifact {}", artifact.display())
        })?;
        report.artifact = Some(artifact);

        Ok(())
    }

    /// Walk the pipeline logging each step instead of running it.
    fn plan(&self, state: &mut OrchestrationState, report: &ProvisionReport) -> Result<()> {
        let workspace = self.config.workspace.as_path();
        let source_dir = report.source_dir.as_path();
        let descriptor = &report.descriptor;

        let cmake = CmakeConfigure::new(self.config.configure.clone());
        let configure = cmake.command(source_dir, &CmakeConfigure::build_dir(source_dir));
        let package = PackageTool::new(self.config.package.clone()).command(&self.config.project_dir);

        let plan = [
            (Step::Clean, format!("remove and recreate {}", workspace.display())),
            (
                Step::Fetch,
                format!(
                    "{}: shallow clone {} into {}, reset to {}, update submodules",
                    self.source.name(),
                    descriptor.origin,
                    source_dir.display(),
                    descriptor.revision
                ),
            ),
            (
                Step::Patch,
                format!(
                    "ensure {:?} heads {}",
                    self.config.patch.declaration,
                    source_dir.join(&self.config.patch.target).display()
                ),
            ),
            (Step::Configure, describe(&configure)),
            (Step::Package, describe(&package)),
        ];

        for (step, detail) in plan {
            begin(state, step)?;
            log::info!("[Provision] [{}] [DRY-RUN] Would {}", tag(step), detail);
            finish(state, step, Ok(()), |_| format!("dry run: {}", detail))?;
        }
        Ok(())
    }
}

fn tag(step: Step) -> String {
    step.as_str().to_uppercase()
}

fn describe(spec: &CommandSpec) -> String {
    format!("run `{}` in {}", spec, spec.cwd.display())
}

fn begin(state: &mut OrchestrationState, step: Step) -> Result<()> {
    state
        .transition_to(ProvisionPhase::for_step(step))
        .map_err(|msg| ProvisionError::at(step, StepFailure::new(msg)))?;
    log::info!("[Provision] [{}] Starting", tag(step));
    Ok(())
}

fn finish<T>(
    state: &mut OrchestrationState,
    step: Step,
    result: std::result::Result<T, StepFailure>,
    detail: impl FnOnce(&T) -> String,
) -> Result<T> {
    match result {
        Ok(value) => {
            if let Some(record) = state.complete_step(detail(&value)) {
                log::info!(
                    "[Provision] [{}] Finished in {} ms: {}",
                    tag(step),
                    record.duration_ms,
                    record.detail
                );
            }
            Ok(value)
        }
        Err(failure) => {
            log::error!("[Provision] [{}] Failed: {}", tag(step), failure);
            state.record_error(failure.message.clone());
            Err(ProvisionError::at(step, failure))
        }
    }
}
