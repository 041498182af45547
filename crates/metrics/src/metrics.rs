use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // ═══════════════════════════════════════════════════════════════════════════
    // TASK METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Total number of tasks created
    pub static ref TASKS_CREATED: IntCounter = register_int_counter!(
        "sqlgate_tasks_created_total",
        "Total number of change tasks created"
    )
    .unwrap();

    /// Total number of tasks soft-deleted
    pub static ref TASKS_DELETED: IntCounter = register_int_counter!(
        "sqlgate_tasks_deleted_total",
        "Total number of change tasks soft-deleted"
    )
    .unwrap();

    /// Total number of tasks permanently removed
    pub static ref TASKS_PURGED: IntCounter = register_int_counter!(
        "sqlgate_tasks_purged_total",
        "Total number of change tasks permanently removed"
    )
    .unwrap();

    /// Completed retention sweeps
    pub static ref RETENTION_SWEEPS: IntCounter = register_int_counter!(
        "sqlgate_retention_sweeps_total",
        "Total number of retention sweeps run"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // ACTION METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Actions requested, by action and outcome
    pub static ref ACTIONS: IntCounterVec = register_int_counter_vec!(
        "sqlgate_actions_total",
        "Total task actions by action and outcome",
        &["action", "outcome"]
    )
    .unwrap();

    /// Gate rejections, by action and reason
    pub static ref GATE_REJECTIONS: IntCounterVec = register_int_counter_vec!(
        "sqlgate_gate_rejections_total",
        "Total task actions rejected by the action gate",
        &["action", "reason"]
    )
    .unwrap();

    /// Actions currently running
    pub static ref ACTIONS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "sqlgate_actions_in_flight",
        "Number of task actions currently running"
    )
    .unwrap();

    /// Action duration by action (in milliseconds)
    pub static ref ACTION_DURATION: HistogramVec = register_histogram_vec!(
        "sqlgate_action_duration_ms",
        "Task action duration in milliseconds",
        &["action"],
        vec![10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0, 120000.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Statements sent to the executor, by role and final status
    pub static ref STATEMENTS_EXECUTED: IntCounterVec = register_int_counter_vec!(
        "sqlgate_statements_executed_total",
        "Total statements executed by role and status",
        &["role", "status"]
    )
    .unwrap();

    /// Statements inspected, by audit level
    pub static ref STATEMENTS_INSPECTED: IntCounterVec = register_int_counter_vec!(
        "sqlgate_statements_inspected_total",
        "Total statements inspected by audit level",
        &["level"]
    )
    .unwrap();
}
