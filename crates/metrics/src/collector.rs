use std::time::Duration;

use prometheus::{Encoder, TextEncoder};
use sqlgate_types::{AuditLevel, ExecStatus, RoleKind, TaskAction};

use crate::metrics::*;

/// Metrics collector for the task lifecycle.
///
/// Every metric lives in the process-wide default registry, so collectors are
/// interchangeable handles onto the same counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TASK METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_task_created(&self) {
        TASKS_CREATED.inc();
    }

    pub fn record_tasks_deleted(&self, count: usize) {
        TASKS_DELETED.inc_by(count as u64);
    }

    pub fn record_tasks_purged(&self, count: usize) {
        TASKS_PURGED.inc_by(count as u64);
    }

    /// Record a finished retention sweep; its purges are counted by `record_tasks_purged`
    pub fn record_retention_sweep(&self) {
        RETENTION_SWEEPS.inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACTION METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record an action entering the coordinator
    pub fn record_action_started(&self) {
        ACTIONS_IN_FLIGHT.inc();
    }

    /// Record an action leaving the coordinator with its outcome and duration
    pub fn record_action(&self, action: TaskAction, outcome: ActionOutcome, duration: Duration) {
        ACTIONS_IN_FLIGHT.dec();
        ACTIONS
            .with_label_values(&[action.as_str(), outcome.as_str()])
            .inc();
        ACTION_DURATION
            .with_label_values(&[action.as_str()])
            .observe(duration.as_millis() as f64);
    }

    pub fn record_gate_rejection(&self, action: TaskAction, reason: &str) {
        GATE_REJECTIONS
            .with_label_values(&[action.as_str(), reason])
            .inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_statement(&self, role: RoleKind, status: ExecStatus) {
        STATEMENTS_EXECUTED
            .with_label_values(&[role.as_str(), status.as_str()])
            .inc();
    }

    /// Record an inspected statement; `None` means the inspector failed on it
    pub fn record_inspection(&self, level: Option<AuditLevel>) {
        let level = level.map(|l| l.as_str()).unwrap_or("failed");
        STATEMENTS_INSPECTED.with_label_values(&[level]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPORT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Export metrics in Prometheus text format
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

/// How a requested action ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Every statement in the batch succeeded
    Succeeded,
    /// Rejected before any mutation
    Rejected,
    /// Ran, but at least one statement failed
    PartiallyFailed,
    /// Aborted by a storage or validation error
    Errored,
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Succeeded => "succeeded",
            ActionOutcome::Rejected => "rejected",
            ActionOutcome::PartiallyFailed => "partially_failed",
            ActionOutcome::Errored => "errored",
        }
    }
}

/// Metrics error types
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("encoding error: {0}")]
    EncodingError(String),
}
