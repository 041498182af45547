use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ExecStatus, InstanceRef, SqlType, StatementRecord, TaskAction};

/// Store-assigned task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        TaskId(id)
    }
}

/// Caller request to create a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub instance_name: String,
    pub schema: String,
    pub sql: String,
}

/// A validated, split task ready to be persisted in one atomic operation
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub name: String,
    pub desc: String,
    pub schema: String,
    pub instance: InstanceRef,
    pub sql: String,
    pub commit_statements: Vec<StatementRecord>,
}

/// A change task with all of its statement records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub desc: String,
    pub schema: String,
    pub instance: InstanceRef,
    /// Original unsplit submission
    pub sql: String,
    pub normal_rate: f64,
    pub sql_type: Option<SqlType>,
    /// Last action requested on this task
    pub action: Option<TaskAction>,
    #[serde(rename = "commit_sql_list")]
    pub commit_statements: Vec<StatementRecord>,
    #[serde(rename = "rollback_sql_list")]
    pub rollback_statements: Vec<StatementRecord>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<u64>,
}

impl Task {
    /// Any commit statement has been inspected
    pub fn has_doing_advise(&self) -> bool {
        self.commit_statements
            .iter()
            .filter_map(|s| s.audit())
            .any(|audit| audit.status.is_started())
    }

    /// Any commit statement has left the initial execution state
    pub fn has_doing_commit(&self) -> bool {
        self.commit_statements
            .iter()
            .any(|s| s.exec.status.is_started())
    }

    pub fn has_doing_rollback(&self) -> bool {
        self.rollback_statements
            .iter()
            .any(|s| s.exec.status.is_started())
    }

    pub fn is_commit_failed(&self) -> bool {
        self.commit_statements
            .iter()
            .any(|s| s.exec.status == ExecStatus::Failed)
    }

    /// A commit statement was handed to the executor but its outcome was never recorded
    pub fn is_commit_in_progress(&self) -> bool {
        self.commit_statements
            .iter()
            .any(|s| s.exec.status == ExecStatus::Doing)
    }

    pub fn is_rollback_in_progress(&self) -> bool {
        self.rollback_statements
            .iter()
            .any(|s| s.exec.status == ExecStatus::Doing)
    }

    /// A rollback was accepted, even if it had no statements left to run
    pub fn is_rollback_requested(&self) -> bool {
        self.action == Some(TaskAction::Rollback)
    }

    /// Snapshot of every derived predicate, evaluated against the current records
    pub fn aggregate(&self) -> AggregateStatus {
        AggregateStatus {
            has_doing_advise: self.has_doing_advise(),
            has_doing_commit: self.has_doing_commit(),
            has_doing_rollback: self.has_doing_rollback(),
            is_commit_failed: self.is_commit_failed(),
            commit_in_progress: self.is_commit_in_progress(),
            rollback_in_progress: self.is_rollback_in_progress(),
            rollback_requested: self.is_rollback_requested(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn commit_statement(&self, number: u32) -> Option<&StatementRecord> {
        self.commit_statements.iter().find(|s| s.number == number)
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id,
            name: self.name.clone(),
            desc: self.desc.clone(),
            schema: self.schema.clone(),
            instance_name: self.instance.name.clone(),
            normal_rate: self.normal_rate,
            sql_type: self.sql_type,
            action: self.action,
            created_at: self.created_at,
        }
    }
}

/// Derived task state; never stored, always recomputed from statement records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregateStatus {
    pub has_doing_advise: bool,
    pub has_doing_commit: bool,
    pub has_doing_rollback: bool,
    pub is_commit_failed: bool,
    pub commit_in_progress: bool,
    pub rollback_in_progress: bool,
    pub rollback_requested: bool,
}

impl AggregateStatus {
    pub fn is_busy(&self) -> bool {
        self.commit_in_progress || self.rollback_in_progress
    }
}

/// Listing projection of a task, without statement records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub name: String,
    pub desc: String,
    pub schema: String,
    pub instance_name: String,
    pub normal_rate: f64,
    pub sql_type: Option<SqlType>,
    pub action: Option<TaskAction>,
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dialect, StatementRecord};

    fn make_task(statements: Vec<StatementRecord>) -> Task {
        Task {
            id: TaskId(1),
            name: "REQ201812578".to_string(),
            desc: "add index".to_string(),
            schema: "db1".to_string(),
            instance: InstanceRef::new(1, "inst_1", Dialect::Mysql),
            sql: "SELECT 1;".to_string(),
            normal_rate: 0.0,
            sql_type: None,
            action: None,
            commit_statements: statements,
            rollback_statements: Vec::new(),
            created_at: 100,
            updated_at: 100,
            deleted_at: None,
        }
    }

    #[test]
    fn test_fresh_task_aggregate() {
        let task = make_task(vec![
            StatementRecord::commit(1, "A"),
            StatementRecord::commit(2, "B"),
        ]);
        assert_eq!(task.aggregate(), AggregateStatus::default());
    }

    #[test]
    fn test_empty_task_aggregate_is_all_false() {
        let task = make_task(Vec::new());
        let status = task.aggregate();
        assert!(!status.has_doing_commit);
        assert!(!status.is_commit_failed);
        assert!(!status.is_busy());
    }

    #[test]
    fn test_partial_failure_aggregate() {
        let mut statements = vec![
            StatementRecord::commit(1, "A"),
            StatementRecord::commit(2, "B"),
            StatementRecord::commit(3, "C"),
        ];
        statements[0].exec.status = ExecStatus::Finished;
        statements[1].exec.status = ExecStatus::Failed;
        let task = make_task(statements);

        let status = task.aggregate();
        assert!(status.has_doing_commit);
        assert!(status.is_commit_failed);
        assert!(!status.commit_in_progress);
        assert!(!status.has_doing_rollback);
    }

    #[test]
    fn test_in_progress_rollback() {
        let mut task = make_task(vec![StatementRecord::commit(1, "A")]);
        task.commit_statements[0].exec.status = ExecStatus::Finished;
        let mut rollback = StatementRecord::rollback(1, "UNDO A", 1);
        rollback.exec.status = ExecStatus::Doing;
        task.rollback_statements.push(rollback);

        let status = task.aggregate();
        assert!(status.has_doing_rollback);
        assert!(status.rollback_in_progress);
        assert!(status.is_busy());
    }

    #[test]
    fn test_rollback_action_marks_request() {
        let mut task = make_task(vec![StatementRecord::commit(1, "A")]);
        task.commit_statements[0].exec.status = ExecStatus::Finished;
        assert!(!task.aggregate().rollback_requested);

        task.action = Some(TaskAction::Rollback);
        let status = task.aggregate();
        assert!(status.rollback_requested);
        assert!(!status.has_doing_rollback);
    }

    #[test]
    fn test_advise_tracks_audit_status() {
        let mut task = make_task(vec![StatementRecord::commit(1, "A")]);
        assert!(!task.has_doing_advise());
        if let Some(audit) = task.commit_statements[0].audit_mut() {
            audit.status = crate::AuditStatus::Failed;
        }
        assert!(task.has_doing_advise());
    }
}
