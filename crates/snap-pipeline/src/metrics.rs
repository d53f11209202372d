//! Pipeline metrics.

use metrics::{counter, histogram};
use std::time::Duration;

pub mod names {
    pub const RUNS_TOTAL: &str = "snap_runs_total";
    pub const RUN_DURATION_SECONDS: &str = "snap_run_duration_seconds";
    pub const STAGE_DURATION_SECONDS: &str = "snap_stage_duration_seconds";
    pub const CLEANUP_FAILURES_TOTAL: &str = "snap_cleanup_failures_total";
    pub const PUBLISH_ROLLBACKS_TOTAL: &str = "snap_publish_rollbacks_total";
}

/// Record a finished run. `outcome` is `"success"` or an error kind label.
pub fn record_run(outcome: &str, duration: Duration) {
    counter!(names::RUNS_TOTAL, "outcome" => outcome.to_string()).increment(1);
    histogram!(names::RUN_DURATION_SECONDS, "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_stage(stage: &'static str, duration: Duration) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(duration.as_secs_f64());
}

pub fn record_cleanup_failure(step: &'static str) {
    counter!(names::CLEANUP_FAILURES_TOTAL, "step" => step).increment(1);
}

pub fn record_publish_rollback(object: &'static str) {
    counter!(names::PUBLISH_ROLLBACKS_TOTAL, "object" => object).increment(1);
}
