use serde::{Deserialize, Serialize};

use crate::{AuditLevel, AuditStatus, ExecStatus};

/// Position in the target instance's binary log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinlogPosition {
    pub file: String,
    pub pos: i64,
}

impl BinlogPosition {
    pub fn new(file: impl Into<String>, pos: i64) -> Self {
        Self {
            file: file.into(),
            pos,
        }
    }
}

/// Outcome of sending a statement to the executor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub status: ExecStatus,

    /// Diagnostic text from the executor, empty until executed
    pub result: String,

    pub rows_affected: i64,

    pub start_binlog: Option<BinlogPosition>,

    pub end_binlog: Option<BinlogPosition>,
}

/// Outcome of inspecting a commit statement
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuditRecord {
    pub status: AuditStatus,
    pub result: String,
    pub level: Option<AuditLevel>,
}

impl AuditRecord {
    pub fn is_normal(&self) -> bool {
        self.level == Some(AuditLevel::Normal)
    }
}

/// Role of a statement within its task, with the fields that only make sense for that role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum StatementRole {
    /// Applied to the live instance when the task is committed
    Commit { audit: AuditRecord },

    /// Compensates the commit statement numbered `commit_number`
    Rollback { commit_number: u32 },
}

/// Discriminant of [`StatementRole`], used for storage keys and filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Commit,
    Rollback,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Commit => "commit",
            RoleKind::Rollback => "rollback",
        }
    }
}

/// One logical SQL statement of a task and its progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRecord {
    /// 1-based, unique per task and role, assigned once at creation
    pub number: u32,
    pub content: String,
    pub exec: ExecutionRecord,
    #[serde(flatten)]
    pub role: StatementRole,
}

impl StatementRecord {
    pub fn commit(number: u32, content: impl Into<String>) -> Self {
        Self {
            number,
            content: content.into(),
            exec: ExecutionRecord::default(),
            role: StatementRole::Commit {
                audit: AuditRecord::default(),
            },
        }
    }

    pub fn rollback(number: u32, content: impl Into<String>, commit_number: u32) -> Self {
        Self {
            number,
            content: content.into(),
            exec: ExecutionRecord::default(),
            role: StatementRole::Rollback { commit_number },
        }
    }

    pub fn kind(&self) -> RoleKind {
        match self.role {
            StatementRole::Commit { .. } => RoleKind::Commit,
            StatementRole::Rollback { .. } => RoleKind::Rollback,
        }
    }

    pub fn audit(&self) -> Option<&AuditRecord> {
        match &self.role {
            StatementRole::Commit { audit } => Some(audit),
            StatementRole::Rollback { .. } => None,
        }
    }

    pub fn audit_mut(&mut self) -> Option<&mut AuditRecord> {
        match &mut self.role {
            StatementRole::Commit { audit } => Some(audit),
            StatementRole::Rollback { .. } => None,
        }
    }

    pub fn commit_number(&self) -> Option<u32> {
        match self.role {
            StatementRole::Rollback { commit_number } => Some(commit_number),
            StatementRole::Commit { .. } => None,
        }
    }
}

/// Fraction of statements whose audit level is `normal`; 0 for an empty set
pub fn normal_rate(statements: &[StatementRecord]) -> f64 {
    let audited: Vec<&AuditRecord> = statements.iter().filter_map(|s| s.audit()).collect();
    if audited.is_empty() {
        return 0.0;
    }
    let normal = audited.iter().filter(|a| a.is_normal()).count();
    normal as f64 / audited.len() as f64
}
