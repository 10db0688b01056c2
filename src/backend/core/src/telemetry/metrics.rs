//! Decision metrics.
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the host
//! installs a recorder (Prometheus, StatsD, ...); without one every call here
//! is a no-op.
//!
//! | Name | Kind | Labels |
//! |------|------|--------|
//! | `canopy_decisions_total` | counter | `path` = single, batch, admin |
//! | `canopy_subject_errors_total` | counter | `kind` |
//! | `canopy_batch_subjects` | histogram | |
//! | `canopy_decision_duration_seconds` | histogram | `path` |
//! | `canopy_errors_total` | counter | `category`, `code` |

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::{Duration, Instant};

use crate::rbac::engine::SubjectError;

pub const DECISIONS_TOTAL: &str = "canopy_decisions_total";
pub const SUBJECT_ERRORS_TOTAL: &str = "canopy_subject_errors_total";
pub const BATCH_SUBJECTS: &str = "canopy_batch_subjects";
pub const DECISION_DURATION_SECONDS: &str = "canopy_decision_duration_seconds";
pub const ERRORS_TOTAL: &str = "canopy_errors_total";

/// Register descriptions for every metric above with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(DECISIONS_TOTAL, "Subjects decided, by call path");
    describe_counter!(
        SUBJECT_ERRORS_TOTAL,
        "Subjects rejected as structurally malformed"
    );
    describe_histogram!(BATCH_SUBJECTS, "Number of subjects per batch call");
    describe_histogram!(
        DECISION_DURATION_SECONDS,
        "Wall time of one decision call in seconds"
    );
    describe_counter!(ERRORS_TOTAL, "Errors surfaced to hosts, by category and code");
}

/// Count `count` decided subjects on `path`.
pub fn record_decisions(path: &'static str, count: u64) {
    counter!(DECISIONS_TOTAL, "path" => path).increment(count);
}

pub fn record_subject_error(error: &SubjectError) {
    let kind = match error {
        SubjectError::UnknownEntityType(_) => "unknown_entity_type",
        SubjectError::NotPermissionable(_) => "not_permissionable",
        SubjectError::MissingContextId { .. } => "missing_context_id",
        SubjectError::DuplicateKey { .. } => "duplicate_key",
    };
    counter!(SUBJECT_ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_batch_size(subjects: usize) {
    histogram!(BATCH_SUBJECTS).record(subjects as f64);
}

pub fn record_error(category: &'static str, code: &'static str) {
    counter!(ERRORS_TOTAL, "category" => category, "code" => code).increment(1);
}

/// Times one decision call and records it on [`finish`](Self::finish).
#[derive(Debug)]
pub struct DecisionTimer {
    start: Instant,
    path: &'static str,
}

impl DecisionTimer {
    pub fn start(path: &'static str) -> Self {
        Self {
            start: Instant::now(),
            path,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        histogram!(DECISION_DURATION_SECONDS, "path" => self.path).record(duration.as_secs_f64());
        duration
    }
}
