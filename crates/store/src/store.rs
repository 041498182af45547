use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlgate_types::{
    Page, Paginated, RoleKind, SqlType, StatementFilter, StatementRecord, Task, TaskAction,
    TaskDraft, TaskFilter, TaskId, TaskSummary,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════
// CORE TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Derived audit figures recomputed after every inspection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub normal_rate: f64,
    pub sql_type: Option<SqlType>,
}

/// Partial update of task-level fields; `None` leaves a field untouched
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskPatch {
    pub action: Option<TaskAction>,
    pub audit: Option<AuditSummary>,
}

impl TaskPatch {
    pub fn action(action: TaskAction) -> Self {
        Self {
            action: Some(action),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditSummary) -> Self {
        self.audit = Some(audit);
        self
    }
}

pub(crate) fn now_secs() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TYPES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    DuplicateId(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    fn task_not_found(id: TaskId) -> Self {
        StoreError::NotFound(format!("task {id}"))
    }

    fn statement_not_found(id: TaskId, role: RoleKind, number: u32) -> Self {
        StoreError::NotFound(format!("task {id} {} statement {number}", role.as_str()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Task storage trait - can be implemented for different backends.
///
/// Scoped reads (`get`, `list`, `related_ddl_tasks`) never return
/// soft-deleted tasks. Statement-level reads and `get_unscoped` do, so the audit
/// trail stays reachable until a hard delete.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task and all of its commit statements atomically
    async fn create(&self, draft: &TaskDraft) -> Result<Task, StoreError>;

    /// Get a live task with its statement records
    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Get a task even if it was soft-deleted
    async fn get_unscoped(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// List live tasks, ordered by id
    async fn list(
        &self,
        filter: &TaskFilter,
        page: Page,
    ) -> Result<Paginated<TaskSummary>, StoreError>;

    /// Update task-level fields
    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<(), StoreError>;

    /// Persist execution and audit fields of one statement, keyed by role and number
    async fn update_statement(
        &self,
        id: TaskId,
        statement: &StatementRecord,
    ) -> Result<(), StoreError>;

    /// Attach a compensating statement to a task
    async fn add_rollback_statement(
        &self,
        id: TaskId,
        statement: &StatementRecord,
    ) -> Result<(), StoreError>;

    /// Commit statements matching the filter, ordered by number
    async fn list_commit_statements(
        &self,
        id: TaskId,
        filter: &StatementFilter,
        page: Page,
    ) -> Result<Paginated<StatementRecord>, StoreError>;

    /// Commit statements whose execution failed
    async fn failed_commit_statements(
        &self,
        id: TaskId,
    ) -> Result<Vec<StatementRecord>, StoreError>;

    /// Rollback statements, restricted to the given commit numbers when non-empty
    async fn rollback_statements(
        &self,
        id: TaskId,
        commit_numbers: &[u32],
    ) -> Result<Vec<StatementRecord>, StoreError>;

    /// Live, fully-normal, inspected DDL tasks on the same instance and schema
    async fn related_ddl_tasks(
        &self,
        instance_id: u64,
        schema: &str,
    ) -> Result<Vec<TaskSummary>, StoreError>;

    /// Mark tasks deleted; returns how many live tasks were affected
    async fn soft_delete(&self, ids: &[TaskId]) -> Result<usize, StoreError>;

    /// Permanently remove tasks and their statements; returns how many tasks were removed
    async fn hard_delete(&self, ids: &[TaskId]) -> Result<usize, StoreError>;

    /// Soft-deleted tasks whose deletion time is older than `threshold`
    async fn list_deleted_before(
        &self,
        threshold: u64,
        limit: usize,
    ) -> Result<Vec<TaskId>, StoreError>;
}

pub(crate) fn matches_filter(task: &Task, filter: &TaskFilter) -> bool {
    filter
        .instance_name
        .as_ref()
        .map_or(true, |name| &task.instance.name == name)
        && filter.schema.as_ref().map_or(true, |schema| &task.schema == schema)
        && filter.action.map_or(true, |action| task.action == Some(action))
}

pub(crate) fn matches_statement_filter(
    statement: &StatementRecord,
    filter: &StatementFilter,
) -> bool {
    filter
        .exec_status
        .map_or(true, |status| statement.exec.status == status)
        && filter
            .audit_status
            .map_or(true, |status| statement.audit().map(|a| a.status) == Some(status))
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE (for testing)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct InMemoryStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    next_id: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of tasks including soft-deleted ones (for testing)
    pub fn len(&self) -> usize {
        self.tasks.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<TaskId, Task>>, StoreError> {
        self.tasks.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<TaskId, Task>>, StoreError> {
        self.tasks.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn sorted_live<'a>(
        tasks: &'a HashMap<TaskId, Task>,
        predicate: impl Fn(&Task) -> bool,
    ) -> Vec<&'a Task> {
        let mut results: Vec<&Task> = tasks
            .values()
            .filter(|t| !t.is_deleted() && predicate(t))
            .collect();
        results.sort_by_key(|t| t.id);
        results
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn create(&self, draft: &TaskDraft) -> Result<Task, StoreError> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = now_secs();
        let task = Task {
            id,
            name: draft.name.clone(),
            desc: draft.desc.clone(),
            schema: draft.schema.clone(),
            instance: draft.instance.clone(),
            sql: draft.sql.clone(),
            normal_rate: 0.0,
            sql_type: None,
            action: None,
            commit_statements: draft.commit_statements.clone(),
            rollback_statements: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let mut tasks = self.write()?;
        if tasks.contains_key(&id) {
            return Err(StoreError::DuplicateId(id.to_string()));
        }
        tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.read()?.get(&id).filter(|t| !t.is_deleted()).cloned())
    }

    async fn get_unscoped(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.read()?.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &TaskFilter,
        page: Page,
    ) -> Result<Paginated<TaskSummary>, StoreError> {
        let tasks = self.read()?;
        let matched: Vec<TaskSummary> = Self::sorted_live(&tasks, |t| matches_filter(t, filter))
            .into_iter()
            .map(Task::summary)
            .collect();
        let total = matched.len();
        Ok(Paginated {
            items: page.slice(matched),
            total,
        })
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
        let mut tasks = self.write()?;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::task_not_found(id))?;

        if let Some(action) = patch.action {
            task.action = Some(action);
        }
        if let Some(audit) = patch.audit {
            task.normal_rate = audit.normal_rate;
            task.sql_type = audit.sql_type;
        }
        task.updated_at = now_secs();
        Ok(())
    }

    async fn update_statement(
        &self,
        id: TaskId,
        statement: &StatementRecord,
    ) -> Result<(), StoreError> {
        let mut tasks = self.write()?;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::task_not_found(id))?;

        let role = statement.kind();
        let statements = match role {
            RoleKind::Commit => &mut task.commit_statements,
            RoleKind::Rollback => &mut task.rollback_statements,
        };
        let existing = statements
            .iter_mut()
            .find(|s| s.number == statement.number)
            .ok_or_else(|| StoreError::statement_not_found(id, role, statement.number))?;

        // Content, number and role are immutable after creation
        existing.exec = statement.exec.clone();
        if let (Some(audit), Some(updated)) = (existing.audit_mut(), statement.audit()) {
            *audit = updated.clone();
        }
        task.updated_at = now_secs();
        Ok(())
    }

    async fn add_rollback_statement(
        &self,
        id: TaskId,
        statement: &StatementRecord,
    ) -> Result<(), StoreError> {
        if statement.kind() != RoleKind::Rollback {
            return Err(StoreError::SerializationError(format!(
                "statement {} is not a rollback statement",
                statement.number
            )));
        }

        let mut tasks = self.write()?;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::task_not_found(id))?;

        if task
            .rollback_statements
            .iter()
            .any(|s| s.number == statement.number)
        {
            return Err(StoreError::DuplicateId(format!(
                "task {id} rollback statement {}",
                statement.number
            )));
        }
        task.rollback_statements.push(statement.clone());
        task.rollback_statements.sort_by_key(|s| s.number);
        Ok(())
    }

    async fn list_commit_statements(
        &self,
        id: TaskId,
        filter: &StatementFilter,
        page: Page,
    ) -> Result<Paginated<StatementRecord>, StoreError> {
        let tasks = self.read()?;
        let task = tasks.get(&id).ok_or_else(|| StoreError::task_not_found(id))?;

        let mut matched: Vec<StatementRecord> = task
            .commit_statements
            .iter()
            .filter(|s| matches_statement_filter(s, filter))
            .cloned()
            .collect();
        matched.sort_by_key(|s| s.number);
        let total = matched.len();
        Ok(Paginated {
            items: page.slice(matched),
            total,
        })
    }

    async fn failed_commit_statements(
        &self,
        id: TaskId,
    ) -> Result<Vec<StatementRecord>, StoreError> {
        let filter = StatementFilter {
            exec_status: Some(sqlgate_types::ExecStatus::Failed),
            audit_status: None,
        };
        Ok(self
            .list_commit_statements(id, &filter, Page::all())
            .await?
            .items)
    }

    async fn rollback_statements(
        &self,
        id: TaskId,
        commit_numbers: &[u32],
    ) -> Result<Vec<StatementRecord>, StoreError> {
        let tasks = self.read()?;
        let task = tasks.get(&id).ok_or_else(|| StoreError::task_not_found(id))?;

        let mut results: Vec<StatementRecord> = task
            .rollback_statements
            .iter()
            .filter(|s| {
                commit_numbers.is_empty()
                    || s.commit_number().is_some_and(|n| commit_numbers.contains(&n))
            })
            .cloned()
            .collect();
        results.sort_by_key(|s| s.number);
        Ok(results)
    }

    async fn related_ddl_tasks(
        &self,
        instance_id: u64,
        schema: &str,
    ) -> Result<Vec<TaskSummary>, StoreError> {
        let tasks = self.read()?;
        Ok(Self::sorted_live(&tasks, |t| {
            t.instance.id == instance_id
                && t.schema == schema
                && t.normal_rate == 1.0
                && t.sql_type == Some(SqlType::Ddl)
                && t.action == Some(TaskAction::Inspect)
        })
        .into_iter()
        .map(Task::summary)
        .collect())
    }

    async fn soft_delete(&self, ids: &[TaskId]) -> Result<usize, StoreError> {
        let mut tasks = self.write()?;
        let now = now_secs();
        let mut affected = 0;
        for id in ids {
            if let Some(task) = tasks.get_mut(id).filter(|t| !t.is_deleted()) {
                task.deleted_at = Some(now);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn hard_delete(&self, ids: &[TaskId]) -> Result<usize, StoreError> {
        let mut tasks = self.write()?;
        Ok(ids.iter().filter_map(|id| tasks.remove(id)).count())
    }

    async fn list_deleted_before(
        &self,
        threshold: u64,
        limit: usize,
    ) -> Result<Vec<TaskId>, StoreError> {
        let tasks = self.read()?;
        let mut expired: Vec<(u64, TaskId)> = tasks
            .values()
            .filter_map(|t| t.deleted_at.filter(|at| *at < threshold).map(|at| (at, t.id)))
            .collect();
        expired.sort();
        Ok(expired.into_iter().take(limit).map(|(_, id)| id).collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
