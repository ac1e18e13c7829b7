//! Metric name constants and RAII guards for job lifecycle counters:
//! construct the guard on spawn, drop decrements.

use tracing::{Level, instrument};

static METRIC_ACTIVE_JOBS: &str = "active_snap_jobs";
static METRIC_TOTAL_JOBS: &str = "snap_jobs_total";
static METRIC_EVALUATIONS_FAILED: &str = "snap_evaluations_failed_total";
pub(crate) static METRIC_UNRESPONSIVE: &str = "snap_unresponsive_total";

/// Construct on successful job spawn, drop on job termination.
pub struct JobMetricsGuard(());

impl JobMetricsGuard {
    #[instrument(skip_all, level = Level::DEBUG)]
    pub fn new() -> Self {
        metrics::gauge!(METRIC_ACTIVE_JOBS).increment(1);
        metrics::counter!(METRIC_TOTAL_JOBS).increment(1);
        Self(())
    }
}

impl Default for JobMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for JobMetricsGuard {
    #[instrument(skip_all, level = Level::DEBUG)]
    fn drop(&mut self) {
        metrics::gauge!(METRIC_ACTIVE_JOBS).decrement(1);
    }
}

/// Record an `executeSnap` call that came back as a JSON-RPC error.
pub fn record_evaluation_failed() {
    metrics::counter!(METRIC_EVALUATIONS_FAILED).increment(1);
}

/// Record a liveness poll giving up on an isolate.
pub fn record_unresponsive() {
    metrics::counter!(METRIC_UNRESPONSIVE).increment(1);
}
