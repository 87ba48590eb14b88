//! Shared health state for the /health endpoint.
//! Updated by the pipeline runner, read by the API.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;

use crate::forecast::TrainingReport;

#[derive(Default)]
pub struct HealthState {
    /// True while a pipeline run is in progress.
    pub running: AtomicBool,
    /// True if the last finished run reached completion.
    pub last_run_ok: AtomicBool,
    /// Millisecond timestamp of the last finished run (0 = none).
    pub last_run_finished_at_ms: AtomicI64,
    pub groups_forecast: AtomicU64,
    pub groups_skipped: AtomicU64,
    pub groups_failed: AtomicU64,
    last_run_id: RwLock<Option<String>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_started(&self, run_id: &str) {
        self.running.store(true, Ordering::Relaxed);
        if let Ok(mut id) = self.last_run_id.write() {
            *id = Some(run_id.to_string());
        }
    }

    pub fn run_finished(&self, report: &TrainingReport) {
        self.groups_forecast.store(report.forecast as u64, Ordering::Relaxed);
        self.groups_skipped.store(report.skipped as u64, Ordering::Relaxed);
        self.groups_failed.store(report.failed as u64, Ordering::Relaxed);
        self.finish(true);
    }

    pub fn run_failed(&self) {
        self.finish(false);
    }

    fn finish(&self, ok: bool) {
        self.last_run_ok.store(ok, Ordering::Relaxed);
        self.last_run_finished_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn last_run_id(&self) -> Option<String> {
        self.last_run_id.read().ok().and_then(|id| id.clone())
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn last_run_ok(&self) -> bool {
        self.last_run_ok.load(Ordering::Relaxed)
    }

    pub fn last_run_finished_at_ms(&self) -> i64 {
        self.last_run_finished_at_ms.load(Ordering::Relaxed)
    }
}
