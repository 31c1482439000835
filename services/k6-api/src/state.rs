//! Application state for the k6 API.

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{info, Instrument};
use uuid::Uuid;

use k6_script::{ScriptGenerator, TestParameters};

use crate::config::Args;
use crate::error::ApiError;
use crate::runner::{ReportArtifact, RunError, RunnerConfig, TestRunner};
use crate::tracker::{RunOutcome, RunTracker};

/// Shared application state.
pub struct AppState {
    /// Renders scripts from the configured template.
    pub generator: ScriptGenerator,

    /// Launches k6 on generated scripts.
    pub runner: TestRunner,

    /// Active and recently completed runs.
    pub tracker: RunTracker,

    /// Limits how many k6 processes run at once.
    run_slots: Semaphore,
}

impl AppState {
    pub fn new(generator: ScriptGenerator, runner: TestRunner, max_concurrent_runs: usize) -> Self {
        Self {
            generator,
            runner,
            tracker: RunTracker::default(),
            run_slots: Semaphore::new(max_concurrent_runs.max(1)),
        }
    }

    /// Create a new AppState from command-line configuration.
    pub fn from_args(args: &Args) -> Result<Self> {
        let runner_config: RunnerConfig = args
            .runner_config()
            .prepare()
            .context("Failed to prepare script and report directories")?;

        info!(
            k6_binary = %runner_config.k6_binary.display(),
            script_dir = %runner_config.script_dir.display(),
            reports_dir = %runner_config.reports_dir.display(),
            template = %args.template_name,
            max_concurrent_runs = args.max_concurrent_runs,
            "Runner configured"
        );

        let generator = ScriptGenerator::new(args.template_source(), args.template_name.clone());

        Ok(Self::new(
            generator,
            TestRunner::new(runner_config),
            args.max_concurrent_runs,
        ))
    }

    /// Stops handing out run slots. Runs already holding one finish normally;
    /// requests still waiting for a slot fail with [`ApiError::ShuttingDown`].
    pub fn begin_shutdown(&self) {
        self.run_slots.close();
    }

    /// Validates `params`, runs k6 and returns what it produced.
    ///
    /// Invalid parameters are rejected before a run slot is taken or anything
    /// is written to disk.
    pub async fn execute(&self, params: &TestParameters) -> Result<ReportArtifact, ApiError> {
        let run_id = Uuid::new_v4();
        let report_path = self.runner.report_path_for(run_id);
        let script = self.generator.generate(params, &report_path)?;

        let span = tracing::info_span!("k6_run", run_id = %run_id);
        async {
            let _permit = self
                .run_slots
                .acquire()
                .await
                .map_err(|_| ApiError::ShuttingDown)?;

            info!(
                target_url = %params.display_target(),
                method = %params.method,
                vus = params.vus,
                duration = %params.duration,
                "Starting k6 run"
            );

            let guard = self.tracker.start(run_id, params);
            let result = self.runner.run(&script).await;

            match &result {
                Ok(ReportArtifact::Html(_)) => guard.finish(RunOutcome::Succeeded, None),
                Ok(ReportArtifact::Missing) => guard.finish(RunOutcome::ReportMissing, None),
                Err(e) => guard.finish(RunOutcome::Failed, Some(summarize(e))),
            }

            result.map_err(ApiError::from)
        }
        .instrument(span)
        .await
    }
}

/// One-line description kept in the tracker; stderr stays in the logs.
fn summarize(error: &RunError) -> String {
    match error {
        RunError::Execution { exit_code, .. } => match exit_code {
            Some(code) => format!("k6 exited with code {}", code),
            None => "k6 was terminated by a signal".to_string(),
        },
        other => other.to_string(),
    }
}
