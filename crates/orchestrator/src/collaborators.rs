use async_trait::async_trait;
use sqlgate_types::{AuditLevel, BinlogPosition, Dialect, InstanceRef, StatementKind, StatementRecord};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Failure reported by (or while calling) an external capability
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("instance registry error: {0}")]
    Registry(String),

    #[error("inspector error: {0}")]
    Inspector(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("rollback generator error: {0}")]
    RollbackGenerator(String),
}

/// Raised by a splitter when the submission cannot be tokenised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to split sql: {reason}")]
pub struct SplitError {
    pub reason: String,
}

impl SplitError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CAPABILITY OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════

/// Verdict of the inspector for one statement
#[derive(Debug, Clone, PartialEq)]
pub struct InspectOutcome {
    pub level: AuditLevel,
    /// False when the statement violates a blocking rule
    pub passed: bool,
    pub result: String,
    /// Statement category, used to classify the whole task
    pub kind: Option<StatementKind>,
}

/// Result of running one statement against an instance
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecOutcome {
    pub success: bool,
    pub rows_affected: i64,
    pub result: String,
    pub start_binlog: Option<BinlogPosition>,
    pub end_binlog: Option<BinlogPosition>,
}

impl ExecOutcome {
    pub fn succeeded(rows_affected: i64) -> Self {
        Self {
            success: true,
            rows_affected,
            result: "ok".to_string(),
            ..Default::default()
        }
    }

    pub fn failed(result: impl Into<String>) -> Self {
        Self {
            success: false,
            result: result.into(),
            ..Default::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CAPABILITY TRAITS
// ═══════════════════════════════════════════════════════════════════════════

/// Resolves target instances by name
#[async_trait]
pub trait InstanceRegistry: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<Option<InstanceRef>, CollaboratorError>;

    async fn schema_exists(
        &self,
        instance: &InstanceRef,
        schema: &str,
    ) -> Result<bool, CollaboratorError>;
}

/// Splits a raw submission into individual statements, in order
pub trait SqlSplitter: Send + Sync {
    fn split(&self, dialect: Dialect, sql: &str) -> Result<Vec<String>, SplitError>;
}

/// Static risk evaluation of a single statement
#[async_trait]
pub trait Inspector: Send + Sync {
    async fn inspect(
        &self,
        dialect: Dialect,
        schema: &str,
        statement: &str,
    ) -> Result<InspectOutcome, CollaboratorError>;
}

/// Runs a single statement against the live instance.
///
/// Implementations enforce their own timeouts; an `Err` is recorded as a
/// failed statement, the same as an unsuccessful [`ExecOutcome`].
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        instance: &InstanceRef,
        schema: &str,
        statement: &str,
    ) -> Result<ExecOutcome, CollaboratorError>;
}

/// Derives the compensating statement for a commit statement.
///
/// During commit it is called before the statement is marked doing and run,
/// so implementations may read the pre-image of the rows it touches. A task
/// reaching rollback with no stored compensations calls it again for each
/// finished statement, after the fact. `None` means nothing to compensate.
#[async_trait]
pub trait RollbackGenerator: Send + Sync {
    async fn generate(
        &self,
        instance: &InstanceRef,
        schema: &str,
        statement: &StatementRecord,
    ) -> Result<Option<String>, CollaboratorError>;
}
