use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypeError;

/// Execution progress of a single statement against the target instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    /// Never sent to the executor
    #[default]
    Initialized,

    /// Handed to the executor, outcome not yet recorded
    Doing,

    /// Executed successfully
    Finished,

    /// Executor reported failure
    Failed,
}

impl ExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::Initialized => "initialized",
            ExecStatus::Doing => "doing",
            ExecStatus::Finished => "finished",
            ExecStatus::Failed => "failed",
        }
    }

    /// True once the statement has left the initial state
    pub fn is_started(&self) -> bool {
        !matches!(self, ExecStatus::Initialized)
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" | "" => Ok(ExecStatus::Initialized),
            "doing" => Ok(ExecStatus::Doing),
            "finished" => Ok(ExecStatus::Finished),
            "failed" => Ok(ExecStatus::Failed),
            other => Err(TypeError::unknown("exec status", other)),
        }
    }
}

/// Audit (inspection) progress of a commit statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    #[default]
    Initialized,
    Finished,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Initialized => "initialized",
            AuditStatus::Finished => "finished",
            AuditStatus::Failed => "failed",
        }
    }

    pub fn is_started(&self) -> bool {
        !matches!(self, AuditStatus::Initialized)
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" | "" => Ok(AuditStatus::Initialized),
            "finished" => Ok(AuditStatus::Finished),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(TypeError::unknown("audit status", other)),
        }
    }
}

/// Severity assigned by the inspector, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Error,
    Warning,
    Notice,
    Normal,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Error => "error",
            AuditLevel::Warning => "warning",
            AuditLevel::Notice => "notice",
            AuditLevel::Normal => "normal",
        }
    }
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditLevel {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(AuditLevel::Error),
            "warning" | "warn" => Ok(AuditLevel::Warning),
            "notice" => Ok(AuditLevel::Notice),
            "normal" => Ok(AuditLevel::Normal),
            other => Err(TypeError::unknown("audit level", other)),
        }
    }
}

/// Action a caller can request on a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Inspect,
    Commit,
    Rollback,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::Inspect => "inspect",
            TaskAction::Commit => "commit",
            TaskAction::Rollback => "rollback",
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskAction {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inspect" => Ok(TaskAction::Inspect),
            "commit" => Ok(TaskAction::Commit),
            "rollback" => Ok(TaskAction::Rollback),
            other => Err(TypeError::unknown("task action", other)),
        }
    }
}

/// Statement category reported by the inspector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Dml,
    Ddl,
    ProcedureFunction,
}

/// Task-level classification derived from the kinds of its statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    #[serde(rename = "dml")]
    Dml,
    #[serde(rename = "ddl")]
    Ddl,
    #[serde(rename = "dml&ddl")]
    Multi,
    #[serde(rename = "procedure&function")]
    ProcedureFunction,
    #[serde(rename = "procedure&function&dml&ddl")]
    ProcedureFunctionMulti,
}

impl SqlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlType::Dml => "dml",
            SqlType::Ddl => "ddl",
            SqlType::Multi => "dml&ddl",
            SqlType::ProcedureFunction => "procedure&function",
            SqlType::ProcedureFunctionMulti => "procedure&function&dml&ddl",
        }
    }

    /// Classify a set of statement kinds. Returns `None` when nothing was classified.
    pub fn classify<I>(kinds: I) -> Option<SqlType>
    where
        I: IntoIterator<Item = StatementKind>,
    {
        let (mut dml, mut ddl, mut procedure) = (false, false, false);
        for kind in kinds {
            match kind {
                StatementKind::Dml => dml = true,
                StatementKind::Ddl => ddl = true,
                StatementKind::ProcedureFunction => procedure = true,
            }
        }

        match (procedure, dml, ddl) {
            (false, false, false) => None,
            (false, true, false) => Some(SqlType::Dml),
            (false, false, true) => Some(SqlType::Ddl),
            (false, true, true) => Some(SqlType::Multi),
            (true, false, false) => Some(SqlType::ProcedureFunction),
            (true, _, _) => Some(SqlType::ProcedureFunctionMulti),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SqlType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dml" => Ok(SqlType::Dml),
            "ddl" => Ok(SqlType::Ddl),
            "dml&ddl" => Ok(SqlType::Multi),
            "procedure&function" => Ok(SqlType::ProcedureFunction),
            "procedure&function&dml&ddl" => Ok(SqlType::ProcedureFunctionMulti),
            other => Err(TypeError::unknown("sql type", other)),
        }
    }
}
