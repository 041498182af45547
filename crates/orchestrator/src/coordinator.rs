use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sqlgate_metrics::{ActionOutcome, ErrorContext, MetricsCollector, TaskSpan};
use sqlgate_store::{AuditSummary, StoreError, TaskPatch, TaskStore};
use sqlgate_types::{
    normal_rate, AuditLevel, AuditRecord, AuditStatus, Dialect, ExecStatus, NewTask, Page,
    Paginated, RoleKind, SqlType, StatementFilter, StatementKind, StatementRecord, Task,
    TaskAction, TaskDraft, TaskFilter, TaskId, TaskSummary,
};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};

use crate::collaborators::{
    ExecOutcome, Executor, Inspector, InstanceRegistry, RollbackGenerator, SqlSplitter,
};
use crate::error::{CoordinatorError, ValidationError};
use crate::gate::{ActionGate, GateRejection};
use crate::locks::TaskLocks;
use crate::splitter::TerminatorSplitter;

/// Configuration for the lifecycle coordinator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Upper bound on statements inspected concurrently within one inspect pass
    pub inspect_concurrency: usize,
}

impl CoordinatorConfig {
    pub fn with_inspect_concurrency(mut self, inspect_concurrency: usize) -> Self {
        self.inspect_concurrency = inspect_concurrency;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            inspect_concurrency: 8,
        }
    }
}

/// Builder error
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

fn missing(field: &str) -> BuilderError {
    BuilderError::MissingField {
        field: field.to_string(),
    }
}

/// Builder for LifecycleCoordinator
#[derive(Default)]
pub struct LifecycleCoordinatorBuilder {
    store: Option<Arc<dyn TaskStore>>,
    registry: Option<Arc<dyn InstanceRegistry>>,
    splitter: Option<Arc<dyn SqlSplitter>>,
    inspector: Option<Arc<dyn Inspector>>,
    executor: Option<Arc<dyn Executor>>,
    rollback_generator: Option<Arc<dyn RollbackGenerator>>,
    metrics: Option<Arc<MetricsCollector>>,
    config: CoordinatorConfig,
}

impl LifecycleCoordinatorBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task store
    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the instance registry
    pub fn with_registry(mut self, registry: Arc<dyn InstanceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the SQL splitter (defaults to [`TerminatorSplitter`])
    pub fn with_splitter(mut self, splitter: Arc<dyn SqlSplitter>) -> Self {
        self.splitter = Some(splitter);
        self
    }

    /// Set the inspector
    pub fn with_inspector(mut self, inspector: Arc<dyn Inspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    /// Set the executor
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the rollback generator
    pub fn with_rollback_generator(mut self, generator: Arc<dyn RollbackGenerator>) -> Self {
        self.rollback_generator = Some(generator);
        self
    }

    /// Set the metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the coordinator configuration
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the LifecycleCoordinator, validating that all required fields are set
    pub fn build(self) -> Result<LifecycleCoordinator, BuilderError> {
        let store = self.store.ok_or_else(|| missing("store"))?;
        let registry = self.registry.ok_or_else(|| missing("registry"))?;
        let inspector = self.inspector.ok_or_else(|| missing("inspector"))?;
        let executor = self.executor.ok_or_else(|| missing("executor"))?;
        let rollback_generator = self
            .rollback_generator
            .ok_or_else(|| missing("rollback_generator"))?;

        if self.config.inspect_concurrency == 0 {
            return Err(BuilderError::InvalidField {
                field: "inspect_concurrency".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(LifecycleCoordinator {
            gate: ActionGate::new(store.clone()),
            locks: TaskLocks::new(),
            store,
            registry,
            splitter: self
                .splitter
                .unwrap_or_else(|| Arc::new(TerminatorSplitter::new())),
            inspector,
            executor,
            rollback_generator,
            metrics: self.metrics.unwrap_or_default(),
            config: self.config,
        })
    }
}

/// Drives inspect, commit and rollback on change tasks.
///
/// Every mutating operation runs under the task's lock, from the gate check
/// until the last status write.
pub struct LifecycleCoordinator {
    store: Arc<dyn TaskStore>,
    gate: ActionGate,
    locks: TaskLocks,
    registry: Arc<dyn InstanceRegistry>,
    splitter: Arc<dyn SqlSplitter>,
    inspector: Arc<dyn Inspector>,
    executor: Arc<dyn Executor>,
    rollback_generator: Arc<dyn RollbackGenerator>,
    metrics: Arc<MetricsCollector>,
    config: CoordinatorConfig,
}

impl LifecycleCoordinator {
    /// Create a new builder for constructing a LifecycleCoordinator
    pub fn builder() -> LifecycleCoordinatorBuilder {
        LifecycleCoordinatorBuilder::new()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TASK ADMINISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Validate, split and persist a new task
    pub async fn create_task(&self, request: NewTask) -> Result<Task, CoordinatorError> {
        for (field, value) in [
            ("name", &request.name),
            ("instance_name", &request.instance_name),
            ("schema", &request.schema),
            ("sql", &request.sql),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField { field }.into());
            }
        }

        let instance = self
            .registry
            .lookup(&request.instance_name)
            .await?
            .ok_or_else(|| ValidationError::UnknownInstance {
                name: request.instance_name.clone(),
            })?;

        if !self.registry.schema_exists(&instance, &request.schema).await? {
            return Err(ValidationError::UnknownSchema {
                instance: instance.name.clone(),
                schema: request.schema.clone(),
            }
            .into());
        }

        let commit_statements: Vec<StatementRecord> = self
            .splitter
            .split(instance.dialect, &request.sql)
            .map_err(|e| ValidationError::MalformedSql { reason: e.reason })?
            .into_iter()
            .map(|fragment| fragment.trim().to_string())
            .filter(|fragment| !fragment.is_empty())
            .zip(1u32..)
            .map(|(content, number)| StatementRecord::commit(number, content))
            .collect();

        if commit_statements.is_empty() {
            return Err(ValidationError::EmptySql.into());
        }

        let draft = TaskDraft {
            name: request.name,
            desc: request.desc,
            schema: request.schema,
            instance,
            sql: request.sql,
            commit_statements,
        };

        let task = self.store.create(&draft).await?;
        self.metrics.record_task_created();
        info!(
            task_id = %task.id,
            instance = %task.instance.name,
            schema = %task.schema,
            statements = task.commit_statements.len(),
            "Task created"
        );

        Ok(task)
    }

    /// Task detail with all statement records
    pub async fn get_task(&self, id: TaskId) -> Result<Task, CoordinatorError> {
        self.store
            .get(id)
            .await?
            .ok_or(CoordinatorError::TaskNotFound(id))
    }

    /// Task detail including soft-deleted tasks, for audit lookups
    pub async fn get_task_unscoped(&self, id: TaskId) -> Result<Task, CoordinatorError> {
        self.store
            .get_unscoped(id)
            .await?
            .ok_or(CoordinatorError::TaskNotFound(id))
    }

    pub async fn list_tasks(
        &self,
        filter: &TaskFilter,
        page: Page,
    ) -> Result<Paginated<TaskSummary>, CoordinatorError> {
        Ok(self.store.list(filter, page).await?)
    }

    /// Soft-delete one task; refused while a commit or rollback is in progress
    pub async fn delete_task(&self, id: TaskId) -> Result<(), CoordinatorError> {
        let span = TaskSpan::named(id, "delete");
        self.delete_tasks(&[id])
            .instrument(span.span())
            .await
            .map(|_| ())
    }

    /// Soft-delete several tasks.
    ///
    /// Every task is checked before any is deleted; one missing or busy task
    /// rejects the whole batch.
    pub async fn delete_tasks(&self, ids: &[TaskId]) -> Result<usize, CoordinatorError> {
        let _guards = self.locks.acquire_many(ids).await;

        for id in ids {
            if let Err(e) = self.gate.admit_delete(*id).await {
                if let Some(reason) = e.rejection() {
                    warn!(task_id = %id, reason = reason.reason(), "Delete rejected");
                }
                return Err(e);
            }
        }

        let deleted = self.store.soft_delete(ids).await?;
        self.metrics.record_tasks_deleted(deleted);
        info!(count = deleted, "Tasks deleted");

        Ok(deleted)
    }

    /// Permanently remove tasks and their statement records
    pub async fn purge_tasks(&self, ids: &[TaskId]) -> Result<usize, CoordinatorError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let _guards = self.locks.acquire_many(ids).await;
        let purged = self.store.hard_delete(ids).await?;
        self.metrics.record_tasks_purged(purged);
        info!(requested = ids.len(), purged, "Tasks purged");

        Ok(purged)
    }

    /// Soft-deleted tasks whose deletion is older than `threshold` (unix seconds)
    pub async fn deleted_before(
        &self,
        threshold: u64,
        limit: usize,
    ) -> Result<Vec<TaskId>, CoordinatorError> {
        Ok(self.store.list_deleted_before(threshold, limit).await?)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENT QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn list_commit_statements(
        &self,
        id: TaskId,
        filter: &StatementFilter,
        page: Page,
    ) -> Result<Paginated<StatementRecord>, CoordinatorError> {
        self.get_task_unscoped(id).await?;
        Ok(self.store.list_commit_statements(id, filter, page).await?)
    }

    pub async fn failed_commit_statements(
        &self,
        id: TaskId,
    ) -> Result<Vec<StatementRecord>, CoordinatorError> {
        self.get_task_unscoped(id).await?;
        Ok(self.store.failed_commit_statements(id).await?)
    }

    /// Rollback statements, restricted to `commit_numbers` when non-empty
    pub async fn rollback_statements(
        &self,
        id: TaskId,
        commit_numbers: &[u32],
    ) -> Result<Vec<StatementRecord>, CoordinatorError> {
        self.get_task_unscoped(id).await?;
        Ok(self.store.rollback_statements(id, commit_numbers).await?)
    }

    /// Other fully-normal DDL tasks inspected against the same instance and schema
    pub async fn related_ddl_tasks(&self, id: TaskId) -> Result<Vec<TaskSummary>, CoordinatorError> {
        let task = self.get_task(id).await?;
        let related = self
            .store
            .related_ddl_tasks(task.instance.id, &task.schema)
            .await?;

        Ok(related.into_iter().filter(|t| t.id != id).collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACTIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Inspect every commit statement and refresh the task's audit summary
    pub async fn request_inspect(&self, id: TaskId) -> Result<Task, CoordinatorError> {
        let span = TaskSpan::new(id, TaskAction::Inspect);
        self.run_action(id, TaskAction::Inspect, self.inspect(id))
            .instrument(span.span())
            .await
    }

    /// Execute commit statements in order, stopping at the first failure
    pub async fn request_commit(&self, id: TaskId) -> Result<Task, CoordinatorError> {
        let span = TaskSpan::new(id, TaskAction::Commit);
        self.run_action(id, TaskAction::Commit, self.commit(id))
            .instrument(span.span())
            .await
    }

    /// Execute compensations newest-first, stopping at the first failure
    pub async fn request_rollback(&self, id: TaskId) -> Result<Task, CoordinatorError> {
        let span = TaskSpan::new(id, TaskAction::Rollback);
        self.run_action(id, TaskAction::Rollback, self.rollback(id))
            .instrument(span.span())
            .await
    }

    /// Lock, run, record metrics, return the refreshed task
    async fn run_action<F>(
        &self,
        id: TaskId,
        action: TaskAction,
        body: F,
    ) -> Result<Task, CoordinatorError>
    where
        F: std::future::Future<Output = Result<(), CoordinatorError>>,
    {
        let started = Instant::now();
        self.metrics.record_action_started();
        info!(task_id = %id, action = %action, "Action requested");

        let result = {
            let _guard = self.locks.acquire(id).await;
            match body.await {
                Ok(()) => self.get_task(id).await,
                Err(e) => Err(e),
            }
        };

        let outcome = match &result {
            Ok(task) if action_failed(task, action) => ActionOutcome::PartiallyFailed,
            Ok(_) => ActionOutcome::Succeeded,
            Err(CoordinatorError::ActionNotAllowed { reason, .. }) => {
                self.metrics.record_gate_rejection(action, reason.reason());
                warn!(task_id = %id, action = %action, reason = %reason, "Action rejected");
                ActionOutcome::Rejected
            }
            Err(_) => ActionOutcome::Errored,
        };
        self.metrics.record_action(action, outcome, started.elapsed());
        info!(task_id = %id, action = %action, outcome = outcome.as_str(), "Action finished");

        match outcome {
            ActionOutcome::Errored => result.with_task_id(id),
            _ => result,
        }
    }

    async fn inspect(&self, id: TaskId) -> Result<(), CoordinatorError> {
        let task = self.gate.admit(id, TaskAction::Inspect).await?;
        self.store
            .update_task(id, &TaskPatch::action(TaskAction::Inspect))
            .await?;

        let dialect = task.instance.dialect;
        let schema = task.schema.as_str();
        let concurrency = self.config.inspect_concurrency;

        let inspections: Vec<_> = task
            .commit_statements
            .iter()
            .map(|statement| self.inspect_statement(id, dialect, schema, statement))
            .collect();
        let kinds: Vec<Option<StatementKind>> = stream::iter(inspections)
            .buffer_unordered(concurrency)
            .try_collect()
            .await?;

        let refreshed = self.get_task(id).await?;
        let summary = AuditSummary {
            normal_rate: normal_rate(&refreshed.commit_statements),
            sql_type: SqlType::classify(kinds.into_iter().flatten()),
        };
        self.store
            .update_task(id, &TaskPatch::default().with_audit(summary))
            .await?;

        info!(
            task_id = %id,
            normal_rate = summary.normal_rate,
            sql_type = summary.sql_type.map(|t| t.as_str()).unwrap_or("none"),
            "Inspection finished"
        );
        Ok(())
    }

    /// Inspect one statement and persist the verdict; inspector failures only fail this statement
    async fn inspect_statement(
        &self,
        id: TaskId,
        dialect: Dialect,
        schema: &str,
        statement: &StatementRecord,
    ) -> Result<Option<StatementKind>, StoreError> {
        let outcome = self
            .inspector
            .inspect(dialect, schema, &statement.content)
            .await;

        let (audit, kind) = match outcome {
            Ok(verdict) => {
                let status = if verdict.passed {
                    AuditStatus::Finished
                } else {
                    AuditStatus::Failed
                };
                let audit = AuditRecord {
                    status,
                    result: verdict.result,
                    level: Some(verdict.level),
                };
                (audit, verdict.kind)
            }
            Err(e) => {
                warn!(task_id = %id, number = statement.number, error = %e, "Inspection failed");
                let audit = AuditRecord {
                    status: AuditStatus::Failed,
                    result: e.to_string(),
                    level: None,
                };
                (audit, None)
            }
        };
        self.metrics.record_inspection(audit.level);

        let mut updated = statement.clone();
        if let Some(slot) = updated.audit_mut() {
            *slot = audit;
        }
        self.store.update_statement(id, &updated).await?;

        Ok(kind)
    }

    async fn commit(&self, id: TaskId) -> Result<(), CoordinatorError> {
        let task = self.gate.admit(id, TaskAction::Commit).await?;
        self.store
            .update_task(id, &TaskPatch::action(TaskAction::Commit))
            .await?;

        let mut statements = task.commit_statements.clone();
        statements.sort_by_key(|s| s.number);
        let mut next_rollback_number = task
            .rollback_statements
            .iter()
            .map(|s| s.number)
            .max()
            .unwrap_or(0)
            + 1;

        for mut statement in statements {
            // A statement without a compensation is failed before it is marked doing
            let compensation = self
                .rollback_generator
                .generate(&task.instance, &task.schema, &statement)
                .await;
            let outcome = match compensation {
                Ok(_) => {
                    self.mark_doing(id, &mut statement).await?;
                    self.run_statement(&task, &statement).await
                }
                Err(ref e) => ExecOutcome::failed(format!("rollback sql unavailable: {e}")),
            };
            let succeeded = self.finish_statement(id, &mut statement, outcome).await?;

            if !succeeded {
                warn!(task_id = %id, number = statement.number, "Commit stopped at failed statement");
                break;
            }

            if let Ok(Some(content)) = compensation {
                let rollback =
                    StatementRecord::rollback(next_rollback_number, content, statement.number);
                self.store.add_rollback_statement(id, &rollback).await?;
                next_rollback_number += 1;
            }
        }

        Ok(())
    }

    async fn rollback(&self, id: TaskId) -> Result<(), CoordinatorError> {
        let task = self.gate.admit(id, TaskAction::Rollback).await?;

        let mut statements = if task.rollback_statements.is_empty() {
            self.derive_rollback_statements(&task).await?
        } else {
            task.rollback_statements.clone()
        };
        if statements.is_empty() {
            return Err(CoordinatorError::ActionNotAllowed {
                task_id: id,
                action: TaskAction::Rollback.as_str(),
                reason: GateRejection::NothingToRollBack,
            });
        }

        self.store
            .update_task(id, &TaskPatch::action(TaskAction::Rollback))
            .await?;

        // Newest change first
        statements.sort_by(|a, b| {
            b.commit_number()
                .cmp(&a.commit_number())
                .then(b.number.cmp(&a.number))
        });

        for mut statement in statements {
            self.mark_doing(id, &mut statement).await?;
            let outcome = self.run_statement(&task, &statement).await;
            if !self.finish_statement(id, &mut statement, outcome).await? {
                warn!(task_id = %id, number = statement.number, "Rollback stopped at failed statement");
                break;
            }
        }

        Ok(())
    }

    /// Build compensations for every finished commit statement of a task that has none stored
    async fn derive_rollback_statements(
        &self,
        task: &Task,
    ) -> Result<Vec<StatementRecord>, CoordinatorError> {
        let mut finished: Vec<&StatementRecord> = task
            .commit_statements
            .iter()
            .filter(|s| s.exec.status == ExecStatus::Finished)
            .collect();
        finished.sort_by_key(|s| s.number);

        let mut derived = Vec::new();
        for statement in finished {
            if let Some(content) = self
                .rollback_generator
                .generate(&task.instance, &task.schema, statement)
                .await?
            {
                derived.push(StatementRecord::rollback(
                    derived.len() as u32 + 1,
                    content,
                    statement.number,
                ));
            }
        }

        for rollback in &derived {
            self.store.add_rollback_statement(task.id, rollback).await?;
        }
        debug!(task_id = %task.id, count = derived.len(), "Derived rollback statements");

        Ok(derived)
    }

    async fn mark_doing(
        &self,
        id: TaskId,
        statement: &mut StatementRecord,
    ) -> Result<(), CoordinatorError> {
        statement.exec.status = ExecStatus::Doing;
        self.store.update_statement(id, statement).await?;
        Ok(())
    }

    async fn run_statement(&self, task: &Task, statement: &StatementRecord) -> ExecOutcome {
        match self
            .executor
            .execute(&task.instance, &task.schema, &statement.content)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => ExecOutcome::failed(e.to_string()),
        }
    }

    /// Record the executor's outcome; returns whether the statement succeeded
    async fn finish_statement(
        &self,
        id: TaskId,
        statement: &mut StatementRecord,
        outcome: ExecOutcome,
    ) -> Result<bool, CoordinatorError> {
        let status = if outcome.success {
            ExecStatus::Finished
        } else {
            ExecStatus::Failed
        };

        statement.exec.status = status;
        statement.exec.result = outcome.result;
        statement.exec.rows_affected = outcome.rows_affected;
        statement.exec.start_binlog = outcome.start_binlog;
        statement.exec.end_binlog = outcome.end_binlog;
        self.store.update_statement(id, statement).await?;

        let role: RoleKind = statement.kind();
        self.metrics.record_statement(role, status);
        debug!(
            task_id = %id,
            role = role.as_str(),
            number = statement.number,
            status = %status,
            rows_affected = statement.exec.rows_affected,
            "Statement executed"
        );

        Ok(outcome.success)
    }
}

/// Whether a completed action left failed statements behind
fn action_failed(task: &Task, action: TaskAction) -> bool {
    match action {
        TaskAction::Inspect => task
            .commit_statements
            .iter()
            .filter_map(|s| s.audit())
            .any(|a| a.status == AuditStatus::Failed || a.level == Some(AuditLevel::Error)),
        TaskAction::Commit => task.is_commit_failed(),
        TaskAction::Rollback => task
            .rollback_statements
            .iter()
            .any(|s| s.exec.status == ExecStatus::Failed),
    }
}
