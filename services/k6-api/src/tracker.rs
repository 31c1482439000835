//! Tracking for in-flight and recently completed runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
use serde::Serialize;
use uuid::Uuid;

use k6_script::{HttpMethod, TestParameters};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    ReportMissing,
    Failed,
    Cancelled,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::ReportMissing => "report_missing",
            RunOutcome::Failed => "failed",
            RunOutcome::Cancelled => "cancelled",
        }
    }
}

/// A run that has started and not yet finished.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRun {
    pub id: Uuid,
    pub target: String,
    pub method: HttpMethod,
    pub vus: u32,
    pub duration: String,
    pub started_at: DateTime<Utc>,
}

/// A finished run.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedRun {
    pub id: Uuid,
    pub target: String,
    pub method: HttpMethod,
    pub vus: u32,
    pub duration: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: RunOutcome,
    pub error_message: Option<String>,
}

/// Response for /status endpoint.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub active: Vec<ActiveRun>,
    pub recent: Vec<CompletedRun>,
    pub total_completed: u64,
}

/// Tracking for load-test runs.
///
/// Uses blocking locks: they are held only for map updates, never across an
/// await, and [`RunGuard`] must be able to record a cancellation from `Drop`.
///
/// Run metrics go to a Prometheus recorder owned by the tracker rather than
/// the global one, so each server (and each test) has its own registry.
pub struct RunTracker {
    active: Mutex<HashMap<Uuid, ActiveRun>>,
    completed: Mutex<VecDeque<CompletedRun>>,
    max_completed: usize,
    total_completed: AtomicU64,
    recorder: PrometheusRecorder,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RunTracker {
    pub fn new(max_completed: usize) -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        metrics::with_local_recorder(&recorder, || {
            describe_counter!("k6_runs_started_total", "Load-test runs started");
            describe_counter!(
                "k6_runs_completed_total",
                "Load-test runs completed, by outcome"
            );
            describe_gauge!("k6_runs_in_flight", "Load-test runs currently executing");

            counter!("k6_runs_started_total").absolute(0);
            gauge!("k6_runs_in_flight").set(0.0);
        });

        Self {
            active: Mutex::new(HashMap::new()),
            completed: Mutex::new(VecDeque::new()),
            max_completed,
            total_completed: AtomicU64::new(0),
            recorder,
        }
    }

    /// Records the start of a run. The run is completed through the guard;
    /// dropping the guard unfinished records it as cancelled.
    pub fn start(&self, id: Uuid, params: &TestParameters) -> RunGuard<'_> {
        let run = ActiveRun {
            id,
            target: params.display_target(),
            method: params.method,
            vus: params.vus,
            duration: params.duration.clone(),
            started_at: Utc::now(),
        };
        let in_flight = {
            let mut active = lock(&self.active);
            active.insert(id, run);
            active.len()
        };
        metrics::with_local_recorder(&self.recorder, || {
            counter!("k6_runs_started_total").increment(1);
            gauge!("k6_runs_in_flight").set(in_flight as f64);
        });

        RunGuard {
            tracker: self,
            id,
            finished: false,
        }
    }

    fn complete(&self, id: Uuid, outcome: RunOutcome, error_message: Option<String>) {
        let (run, in_flight) = {
            let mut active = lock(&self.active);
            match active.remove(&id) {
                Some(run) => (run, active.len()),
                None => return,
            }
        };

        self.total_completed.fetch_add(1, Ordering::Relaxed);
        metrics::with_local_recorder(&self.recorder, || {
            counter!("k6_runs_completed_total", "outcome" => outcome.as_str()).increment(1);
            gauge!("k6_runs_in_flight").set(in_flight as f64);
        });

        let completed_at = Utc::now();
        let duration_ms = (completed_at - run.started_at).num_milliseconds().max(0) as u64;

        let completed = CompletedRun {
            id: run.id,
            target: run.target,
            method: run.method,
            vus: run.vus,
            duration: run.duration,
            started_at: run.started_at,
            completed_at,
            duration_ms,
            outcome,
            error_message,
        };

        let mut completed_list = lock(&self.completed);
        completed_list.push_front(completed);

        // Keep only recent entries
        while completed_list.len() > self.max_completed {
            completed_list.pop_back();
        }
    }

    pub fn get_status(&self) -> StatusResponse {
        let active = lock(&self.active);
        let completed = lock(&self.completed);

        let mut active: Vec<ActiveRun> = active.values().cloned().collect();
        active.sort_by_key(|run| run.started_at);

        StatusResponse {
            active,
            recent: completed.iter().take(20).cloned().collect(),
            total_completed: self.total_completed.load(Ordering::Relaxed),
        }
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.active).len()
    }

    /// Run metrics in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        self.recorder.handle().render()
    }
}

/// Completes a tracked run exactly once.
pub struct RunGuard<'a> {
    tracker: &'a RunTracker,
    id: Uuid,
    finished: bool,
}

impl RunGuard<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn finish(mut self, outcome: RunOutcome, error_message: Option<String>) {
        self.finished = true;
        self.tracker.complete(self.id, outcome, error_message);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.complete(self.id, RunOutcome::Cancelled, None);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A panic while holding the lock leaves plain data behind; keep serving it.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TestParameters {
        TestParameters::new("https://example.com/a?token=secret", HttpMethod::Get).with_vus(3)
    }

    #[test]
    fn test_start_creates_active_entry() {
        let tracker = RunTracker::default();
        let guard = tracker.start(Uuid::new_v4(), &params());

        let status = tracker.get_status();
        assert_eq!(status.active.len(), 1);
        assert_eq!(status.active[0].id, guard.id());
        assert_eq!(status.active[0].target, "https://example.com/a");
        assert_eq!(status.active[0].vus, 3);

        guard.finish(RunOutcome::Succeeded, None);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_finish_moves_to_completed() {
        let tracker = RunTracker::default();
        tracker
            .start(Uuid::new_v4(), &params())
            .finish(RunOutcome::Failed, Some("k6 exited unsuccessfully".into()));

        let status = tracker.get_status();
        assert!(status.active.is_empty());
        assert_eq!(status.recent.len(), 1);
        assert_eq!(status.recent[0].outcome, RunOutcome::Failed);
        assert_eq!(status.total_completed, 1);
    }

    #[test]
    fn test_dropped_guard_is_cancelled() {
        let tracker = RunTracker::default();
        {
            let _guard = tracker.start(Uuid::new_v4(), &params());
        }

        let status = tracker.get_status();
        assert!(status.active.is_empty());
        assert_eq!(status.recent[0].outcome, RunOutcome::Cancelled);
    }

    #[test]
    fn test_max_completed_enforced() {
        let tracker = RunTracker::new(3);
        for _ in 0..5 {
            tracker
                .start(Uuid::new_v4(), &params())
                .finish(RunOutcome::Succeeded, None);
        }

        let status = tracker.get_status();
        assert_eq!(status.recent.len(), 3);
        assert_eq!(status.total_completed, 5);
    }

    #[test]
    fn test_prometheus_output() {
        let tracker = RunTracker::default();
        tracker
            .start(Uuid::new_v4(), &params())
            .finish(RunOutcome::ReportMissing, None);
        let _active = tracker.start(Uuid::new_v4(), &params());

        let text = tracker.render_prometheus();
        assert!(text.contains("# TYPE k6_runs_started_total counter"));
        assert!(text.contains("k6_runs_started_total 2\n"));
        assert!(text.contains("k6_runs_completed_total{outcome=\"report_missing\"} 1\n"));
        assert_eq!(sample(&text, "k6_runs_in_flight"), 1.0);
    }

    #[test]
    fn test_trackers_have_separate_registries() {
        let first = RunTracker::default();
        let second = RunTracker::default();
        first
            .start(Uuid::new_v4(), &params())
            .finish(RunOutcome::Failed, None);

        assert!(first.render_prometheus().contains("k6_runs_started_total 1\n"));
        assert!(second.render_prometheus().contains("k6_runs_started_total 0\n"));
        assert!(!second.render_prometheus().contains("outcome=\"failed\""));
        assert_eq!(sample(&first.render_prometheus(), "k6_runs_in_flight"), 0.0);
    }

    fn sample(text: &str, name: &str) -> f64 {
        text.lines()
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(' '))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or_else(|| panic!("no sample for {} in:\n{}", name, text))
    }
}
