//! Runs generated scripts through the k6 executable.
//!
//! One call to [`TestRunner::run`] walks a fixed sequence: write the script to
//! a uniquely named temporary file, launch k6 on it and wait, delete the
//! script, then read the report k6 was told to write. The script file is
//! removed on every path out of `run`, including when the returned future is
//! dropped part-way (the child is killed in that case too).

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempPath;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use k6_script::GeneratedScript;

/// Body returned when k6 succeeded but left no report behind.
pub const MISSING_REPORT_MESSAGE: &str =
    "K6 test ran successfully, but no HTML report was generated.";

const SCRIPT_PREFIX: &str = "k6-script-";

/// Errors from a single run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Filesystem error at {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// k6 ran and exited unsuccessfully. `exit_code` is `None` when it was
    /// killed by a signal.
    #[error("k6 exited unsuccessfully (exit code {exit_code:?})")]
    Execution {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("k6 did not finish within {0:?}")]
    TimedOut(Duration),
}

impl RunError {
    /// True when the failure came from launching or running k6 rather than
    /// from the local filesystem.
    pub fn is_execution_failure(&self) -> bool {
        !matches!(self, RunError::Filesystem { .. })
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportArtifact {
    /// The HTML report written by k6.
    Html(Bytes),
    /// k6 exited cleanly but wrote no report.
    Missing,
}

impl ReportArtifact {
    pub fn is_missing(&self) -> bool {
        matches!(self, ReportArtifact::Missing)
    }

    /// Report bytes, or the fallback message when there is no report.
    pub fn into_bytes(self) -> Bytes {
        match self {
            ReportArtifact::Html(bytes) => bytes,
            ReportArtifact::Missing => Bytes::from_static(MISSING_REPORT_MESSAGE.as_bytes()),
        }
    }
}

/// Settings for launching k6.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// k6 executable.
    pub k6_binary: PathBuf,

    /// Arguments placed before the script path.
    pub run_args: Vec<String>,

    /// Directory for temporary scripts.
    pub script_dir: PathBuf,

    /// Directory k6 writes reports into.
    pub reports_dir: PathBuf,

    /// How long past the requested test duration to wait before killing k6.
    /// `None` waits indefinitely.
    pub timeout_grace: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            k6_binary: PathBuf::from("k6"),
            run_args: vec!["run".to_string()],
            script_dir: std::env::temp_dir(),
            reports_dir: PathBuf::from("reports"),
            timeout_grace: Some(Duration::from_secs(120)),
        }
    }
}

impl RunnerConfig {
    /// Creates both directories and makes their paths absolute.
    ///
    /// Report paths are embedded in scripts and resolved by k6, so they must
    /// not depend on the working directory of either process.
    pub fn prepare(mut self) -> std::io::Result<Self> {
        std::fs::create_dir_all(&self.script_dir)?;
        std::fs::create_dir_all(&self.reports_dir)?;
        self.script_dir = std::fs::canonicalize(&self.script_dir)?;
        self.reports_dir = std::fs::canonicalize(&self.reports_dir)?;
        Ok(self)
    }

    /// Wait limit for a test of the given length.
    pub fn timeout_for(&self, test_duration: Duration) -> Option<Duration> {
        self.timeout_grace
            .map(|grace| test_duration.saturating_add(grace))
    }
}

/// Launches k6 for generated scripts.
#[derive(Debug, Clone)]
pub struct TestRunner {
    config: RunnerConfig,
}

impl TestRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Fresh report location for one run.
    pub fn report_path_for(&self, run_id: Uuid) -> PathBuf {
        self.config
            .reports_dir
            .join(format!("k6-report-{}.html", run_id))
    }

    /// Runs `script` and returns the report it produced.
    pub async fn run(&self, script: &GeneratedScript) -> Result<ReportArtifact, RunError> {
        if let Some(reports_dir) = script.report_path().parent() {
            tokio::fs::create_dir_all(reports_dir)
                .await
                .map_err(|source| RunError::Filesystem {
                    path: reports_dir.to_path_buf(),
                    source,
                })?;
        }

        let script_file = self.write_script(script)?;
        info!(script = %script_file.display(), "Temporary k6 script written");

        let outcome = self.execute(&script_file, script.test_duration()).await;

        remove_script(script_file);

        match outcome {
            Ok(output) => {
                info!("k6 test executed successfully");
                debug!(stdout = %String::from_utf8_lossy(&output.stdout), "k6 stdout");
                debug!(stderr = %String::from_utf8_lossy(&output.stderr), "k6 stderr");
            }
            Err(e) => {
                match &e {
                    RunError::Execution { exit_code, stderr } => error!(
                        exit_code = ?exit_code,
                        stderr = %stderr,
                        "k6 execution failed"
                    ),
                    other => error!(error = %other, "k6 execution failed"),
                }
                error!(script = %script.text(), "Generated script content was");
                return Err(e);
            }
        }

        read_report(script.report_path()).await
    }

    fn write_script(&self, script: &GeneratedScript) -> Result<TempPath, RunError> {
        let dir = &self.config.script_dir;
        let mut file = tempfile::Builder::new()
            .prefix(SCRIPT_PREFIX)
            .suffix(".js")
            .tempfile_in(dir)
            .map_err(|source| RunError::Filesystem {
                path: dir.clone(),
                source,
            })?;

        // A failed write drops `file`, which removes it again.
        let written = file
            .write_all(script.text().as_bytes())
            .and_then(|()| file.flush());
        if let Err(source) = written {
            return Err(RunError::Filesystem {
                path: file.path().to_path_buf(),
                source,
            });
        }

        Ok(file.into_temp_path())
    }

    async fn execute(&self, script_path: &Path, test_duration: Duration) -> Result<Output, RunError> {
        let program = &self.config.k6_binary;

        let mut command = Command::new(program);
        command
            .args(&self.config.run_args)
            .arg(script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(program = %program.display(), script = %script_path.display(), "Executing k6 test");

        let child = command.spawn().map_err(|source| RunError::Launch {
            program: program.display().to_string(),
            source,
        })?;

        // Dropping the wait future drops the child, which kills it.
        let wait = child.wait_with_output();
        let output = match self.config.timeout_for(test_duration) {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| RunError::TimedOut(limit))?,
            None => wait.await,
        }
        .map_err(|e| RunError::Execution {
            exit_code: None,
            stderr: format!("failed to collect k6 output: {}", e),
        })?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(RunError::Execution {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

fn remove_script(script_file: TempPath) {
    let path = script_file.to_path_buf();
    match script_file.close() {
        Ok(()) => info!(script = %path.display(), "Temporary k6 script deleted"),
        Err(e) => warn!(
            script = %path.display(),
            error = %e,
            "Failed to delete temporary k6 script"
        ),
    }
}

async fn read_report(path: &Path) -> Result<ReportArtifact, RunError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            info!(report = %path.display(), bytes = bytes.len(), "HTML report found");
            Ok(ReportArtifact::Html(Bytes::from(bytes)))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(report = %path.display(), "HTML report not found");
            Ok(ReportArtifact::Missing)
        }
        Err(source) => Err(RunError::Filesystem {
            path: path.to_path_buf(),
            source,
        }),
    }
}
