//! Command-line and environment configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use k6_script::{StaticTemplates, TemplateDir, TemplateSource, DEFAULT_TEMPLATE_NAME};

use crate::runner::RunnerConfig;

/// k6 load-test API server
#[derive(Parser, Debug, Clone)]
#[command(name = "k6-api")]
#[command(about = "Runs parameterized k6 load tests and returns the HTML report")]
pub struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:3000", env = "K6_API_LISTEN_ADDR")]
    pub listen: String,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Number of worker threads
    #[arg(long, env = "K6_API_WORKER_THREADS")]
    pub worker_threads: Option<usize>,

    /// k6 executable
    #[arg(long, default_value = "k6", env = "K6_BINARY")]
    pub k6_binary: PathBuf,

    /// Arguments passed to k6 before the script path
    #[arg(long, default_value = "run", value_delimiter = ' ', env = "K6_RUN_ARGS")]
    pub run_args: Vec<String>,

    /// Directory to load script templates from (bundled template if unset)
    #[arg(long, env = "K6_TEMPLATE_DIR")]
    pub template_dir: Option<PathBuf>,

    /// Template file name
    #[arg(long, default_value = DEFAULT_TEMPLATE_NAME, env = "K6_TEMPLATE_NAME")]
    pub template_name: String,

    /// Directory for temporary scripts (system temp dir if unset)
    #[arg(long, env = "K6_SCRIPT_DIR")]
    pub script_dir: Option<PathBuf>,

    /// Directory k6 writes HTML reports into
    #[arg(long, default_value = "reports", env = "K6_REPORTS_DIR")]
    pub reports_dir: PathBuf,

    /// Seconds to wait past the test duration before killing k6 (0 = no limit)
    #[arg(long, default_value_t = 120, env = "K6_RUN_TIMEOUT_GRACE_SECS")]
    pub run_timeout_grace_secs: u64,

    /// Maximum number of k6 runs executing at once
    #[arg(long, default_value_t = 4, env = "K6_MAX_CONCURRENT_RUNS")]
    pub max_concurrent_runs: usize,
}

impl Args {
    /// Runner settings before directories are prepared.
    pub fn runner_config(&self) -> RunnerConfig {
        let timeout_grace = match self.run_timeout_grace_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        RunnerConfig {
            k6_binary: self.k6_binary.clone(),
            run_args: self.run_args.clone(),
            script_dir: self
                .script_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            reports_dir: self.reports_dir.clone(),
            timeout_grace,
        }
    }

    pub fn template_source(&self) -> Arc<dyn TemplateSource> {
        match &self.template_dir {
            Some(dir) => Arc::new(TemplateDir::new(dir)),
            None => Arc::new(StaticTemplates::builtin()),
        }
    }
}
