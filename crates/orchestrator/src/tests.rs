//! Coordinator tests against the in-memory store with scripted collaborators

#[cfg(test)]
mod unit_tests {
    use crate::{
        BuilderError, CollaboratorError, CoordinatorConfig, CoordinatorError, ExecOutcome,
        Executor, GateRejection, InspectOutcome, Inspector, InstanceRegistry,
        LifecycleCoordinator, RetentionPolicy, RetentionSweeper, RollbackGenerator,
        ValidationError,
    };
    use async_trait::async_trait;
    use sqlgate_metrics::metrics::TASKS_PURGED;
    use sqlgate_metrics::MetricsCollector;
    use sqlgate_store::{InMemoryStore, TaskPatch, TaskStore};
    use sqlgate_types::{
        AuditLevel, AuditStatus, Dialect, ExecStatus, InstanceRef, NewTask, Page, SqlType,
        StatementKind, StatementRecord, TaskAction, TaskFilter, TaskId,
    };
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    // ==================== Scripted Collaborators ====================

    struct StaticRegistry;

    #[async_trait]
    impl InstanceRegistry for StaticRegistry {
        async fn lookup(&self, name: &str) -> Result<Option<InstanceRef>, CollaboratorError> {
            Ok(match name {
                "inst_1" => Some(InstanceRef::new(1, "inst_1", Dialect::Mysql)),
                "mssql_1" => Some(InstanceRef::new(2, "mssql_1", Dialect::Sqlserver)),
                _ => None,
            })
        }

        async fn schema_exists(
            &self,
            _instance: &InstanceRef,
            schema: &str,
        ) -> Result<bool, CollaboratorError> {
            Ok(schema == "db1")
        }
    }

    /// Rates statements by keyword: `ALTER` is DDL, `BROKEN` makes the inspector
    /// fail, `DELETE` gets an error level, everything else is normal DML.
    #[derive(Default)]
    struct KeywordInspector {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Inspector for KeywordInspector {
        async fn inspect(
            &self,
            _dialect: Dialect,
            _schema: &str,
            statement: &str,
        ) -> Result<InspectOutcome, CollaboratorError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if statement.contains("BROKEN") {
                return Err(CollaboratorError::Inspector("rule engine unavailable".into()));
            }
            let (level, kind) = if statement.starts_with("ALTER") {
                (AuditLevel::Normal, StatementKind::Ddl)
            } else if statement.starts_with("DELETE") {
                (AuditLevel::Error, StatementKind::Dml)
            } else {
                (AuditLevel::Normal, StatementKind::Dml)
            };
            Ok(InspectOutcome {
                level,
                passed: level != AuditLevel::Error,
                result: format!("{level}"),
                kind: Some(kind),
            })
        }
    }

    /// Fails any statement listed in `failing`; records everything it runs
    #[derive(Default)]
    struct RecordingExecutor {
        failing: HashSet<String>,
        executed: Mutex<Vec<String>>,
    }

    impl RecordingExecutor {
        fn failing(statements: &[&str]) -> Self {
            Self {
                failing: statements.iter().map(|s| s.to_string()).collect(),
                executed: Mutex::new(Vec::new()),
            }
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        async fn execute(
            &self,
            _instance: &InstanceRef,
            _schema: &str,
            statement: &str,
        ) -> Result<ExecOutcome, CollaboratorError> {
            self.executed.lock().unwrap().push(statement.to_string());
            if self.failing.contains(statement) {
                return Err(CollaboratorError::Executor(format!("{statement} failed")));
            }
            Ok(ExecOutcome::succeeded(1))
        }
    }

    /// `UNDO <statement>`. Statements in `unavailable` error; with `skip_all`
    /// nothing needs compensating. Records the status of each statement it sees.
    #[derive(Default)]
    struct UndoGenerator {
        unavailable: HashSet<String>,
        skip_all: bool,
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, ExecStatus)>>,
    }

    impl UndoGenerator {
        fn seen(&self) -> Vec<(String, ExecStatus)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RollbackGenerator for UndoGenerator {
        async fn generate(
            &self,
            _instance: &InstanceRef,
            _schema: &str,
            statement: &StatementRecord,
        ) -> Result<Option<String>, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((statement.content.clone(), statement.exec.status));
            if self.unavailable.contains(&statement.content) {
                return Err(CollaboratorError::RollbackGenerator("no primary key".into()));
            }
            if self.skip_all {
                return Ok(None);
            }
            Ok(Some(format!("UNDO {}", statement.content)))
        }
    }

    struct Harness {
        store: Arc<InMemoryStore>,
        executor: Arc<RecordingExecutor>,
        inspector: Arc<KeywordInspector>,
        generator: Arc<UndoGenerator>,
        coordinator: Arc<LifecycleCoordinator>,
    }

    fn harness_with(
        executor: RecordingExecutor,
        inspector: KeywordInspector,
        generator: UndoGenerator,
        config: CoordinatorConfig,
    ) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let executor = Arc::new(executor);
        let inspector = Arc::new(inspector);
        let generator = Arc::new(generator);
        let coordinator = LifecycleCoordinator::builder()
            .with_store(store.clone())
            .with_registry(Arc::new(StaticRegistry))
            .with_inspector(inspector.clone())
            .with_executor(executor.clone())
            .with_rollback_generator(generator.clone())
            .with_config(config)
            .build()
            .unwrap();

        Harness {
            store,
            executor,
            inspector,
            generator,
            coordinator: Arc::new(coordinator),
        }
    }

    fn harness() -> Harness {
        harness_with(
            RecordingExecutor::default(),
            KeywordInspector::default(),
            UndoGenerator::default(),
            CoordinatorConfig::default(),
        )
    }

    fn new_task(sql: &str) -> NewTask {
        NewTask {
            name: "REQ201812578".to_string(),
            desc: "release".to_string(),
            instance_name: "inst_1".to_string(),
            schema: "db1".to_string(),
            sql: sql.to_string(),
        }
    }

    fn exec_statuses(statements: &[StatementRecord]) -> Vec<ExecStatus> {
        statements.iter().map(|s| s.exec.status).collect()
    }

    // ==================== Builder Tests ====================

    #[test]
    fn test_builder_requires_collaborators() {
        let result = LifecycleCoordinator::builder()
            .with_store(Arc::new(InMemoryStore::new()))
            .build();
        assert!(matches!(
            result,
            Err(BuilderError::MissingField { ref field }) if field == "registry"
        ));
    }

    #[test]
    fn test_builder_rejects_zero_inspect_concurrency() {
        let result = LifecycleCoordinator::builder()
            .with_store(Arc::new(InMemoryStore::new()))
            .with_registry(Arc::new(StaticRegistry))
            .with_inspector(Arc::new(KeywordInspector::default()))
            .with_executor(Arc::new(RecordingExecutor::default()))
            .with_rollback_generator(Arc::new(UndoGenerator::default()))
            .with_config(CoordinatorConfig::default().with_inspect_concurrency(0))
            .build();
        assert!(matches!(
            result,
            Err(BuilderError::InvalidField { ref field, .. }) if field == "inspect_concurrency"
        ));
    }

    #[test]
    fn test_coordinator_config_default() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.inspect_concurrency, 8);
        assert_eq!(config.with_inspect_concurrency(2).inspect_concurrency, 2);
    }

    // ==================== Creation Tests ====================

    #[tokio::test]
    async fn test_create_task_splits_and_numbers() {
        let h = harness();
        let task = h.coordinator.create_task(new_task("A; B;; C")).await.unwrap();

        let contents: Vec<&str> = task
            .commit_statements
            .iter()
            .map(|s| s.content.as_str())
            .collect();
        assert_eq!(contents, vec!["A", "B", "C"]);
        assert_eq!(
            task.commit_statements.iter().map(|s| s.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(task.rollback_statements.is_empty());
        assert_eq!(task.action, None);
    }

    #[tokio::test]
    async fn test_create_task_validation() {
        let h = harness();

        let err = h.coordinator.create_task(new_task(" ;; ")).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation(ValidationError::EmptySql)));

        let err = h.coordinator.create_task(new_task("")).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Validation(ValidationError::MissingField { field: "sql" })
        ));

        let err = h
            .coordinator
            .create_task(NewTask {
                instance_name: "nope".to_string(),
                ..new_task("A")
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Validation(ValidationError::UnknownInstance { .. })
        ));

        let err = h
            .coordinator
            .create_task(NewTask {
                schema: "db2".to_string(),
                ..new_task("A")
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Validation(ValidationError::UnknownSchema { .. })
        ));

        let err = h
            .coordinator
            .create_task(new_task("SELECT 'unterminated"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Validation(ValidationError::MalformedSql { .. })
        ));

        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_create_task_uses_instance_dialect() {
        let h = harness();
        let task = h
            .coordinator
            .create_task(NewTask {
                instance_name: "mssql_1".to_string(),
                ..new_task("CREATE TABLE t (id INT)\nGO\nINSERT INTO t VALUES (1)")
            })
            .await
            .unwrap();
        assert_eq!(task.instance.dialect, Dialect::Sqlserver);
        assert_eq!(task.commit_statements.len(), 2);
    }

    // ==================== Inspect Tests ====================

    #[tokio::test]
    async fn test_inspect_records_audit_summary() {
        let h = harness();
        let task = h
            .coordinator
            .create_task(new_task("UPDATE t SET a = 1; ALTER TABLE t ADD c INT; DELETE FROM t; UPDATE t SET b = 2"))
            .await
            .unwrap();

        let inspected = h.coordinator.request_inspect(task.id).await.unwrap();
        assert_eq!(inspected.action, Some(TaskAction::Inspect));
        assert_eq!(inspected.normal_rate, 0.75);
        assert_eq!(inspected.sql_type, Some(SqlType::Multi));

        let delete = inspected.commit_statement(3).unwrap().audit().unwrap();
        assert_eq!(delete.level, Some(AuditLevel::Error));
        assert_eq!(delete.status, AuditStatus::Failed);
        assert!(inspected.has_doing_advise());
    }

    #[tokio::test]
    async fn test_inspector_failure_does_not_abort_pass() {
        let h = harness();
        let task = h
            .coordinator
            .create_task(new_task("UPDATE t SET a = 1; BROKEN; UPDATE t SET b = 2"))
            .await
            .unwrap();

        let inspected = h.coordinator.request_inspect(task.id).await.unwrap();
        let audits: Vec<_> = inspected
            .commit_statements
            .iter()
            .map(|s| s.audit().unwrap().clone())
            .collect();

        assert_eq!(audits[0].status, AuditStatus::Finished);
        assert_eq!(audits[1].status, AuditStatus::Failed);
        assert!(audits[1].result.contains("rule engine unavailable"));
        assert_eq!(audits[1].level, None);
        assert_eq!(audits[2].status, AuditStatus::Finished);
        assert!((inspected.normal_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_inspect_is_repeatable_after_commit() {
        let h = harness();
        let task = h.coordinator.create_task(new_task("A; B")).await.unwrap();

        h.coordinator.request_inspect(task.id).await.unwrap();
        h.coordinator.request_commit(task.id).await.unwrap();
        let again = h.coordinator.request_inspect(task.id).await.unwrap();

        assert_eq!(again.action, Some(TaskAction::Inspect));
        assert_eq!(again.normal_rate, 1.0);
        assert_eq!(
            exec_statuses(&again.commit_statements),
            vec![ExecStatus::Finished, ExecStatus::Finished]
        );
    }

    #[tokio::test]
    async fn test_inspect_concurrency_is_bounded() {
        let h = harness_with(
            RecordingExecutor::default(),
            KeywordInspector {
                delay: Some(Duration::from_millis(10)),
                ..Default::default()
            },
            UndoGenerator::default(),
            CoordinatorConfig::default().with_inspect_concurrency(2),
        );
        let task = h
            .coordinator
            .create_task(new_task("A; B; C; D; E; F"))
            .await
            .unwrap();

        h.coordinator.request_inspect(task.id).await.unwrap();

        let max = h.inspector.max_in_flight.load(Ordering::SeqCst);
        assert!(max >= 1 && max <= 2, "max in flight was {max}");
    }

    // ==================== Commit Tests ====================

    #[tokio::test]
    async fn test_commit_stops_at_first_failure() {
        let h = harness_with(
            RecordingExecutor::failing(&["B"]),
            KeywordInspector::default(),
            UndoGenerator::default(),
            CoordinatorConfig::default(),
        );
        let task = h.coordinator.create_task(new_task("A; B; C")).await.unwrap();

        let committed = h.coordinator.request_commit(task.id).await.unwrap();
        assert_eq!(
            exec_statuses(&committed.commit_statements),
            vec![ExecStatus::Finished, ExecStatus::Failed, ExecStatus::Initialized]
        );
        assert!(committed.commit_statements[1].exec.result.contains("B failed"));
        assert!(committed.is_commit_failed());
        assert_eq!(h.executor.executed(), vec!["A", "B"]);

        // Only the statement that succeeded keeps its compensation
        assert_eq!(committed.rollback_statements.len(), 1);
        assert_eq!(committed.rollback_statements[0].content, "UNDO A");
        assert_eq!(committed.rollback_statements[0].commit_number(), Some(1));

        let err = h.coordinator.request_rollback(task.id).await.unwrap_err();
        assert_eq!(err.rejection(), Some(GateRejection::CommitFailed));
    }

    #[tokio::test]
    async fn test_commit_accepted_once() {
        let h = harness();
        let task = h.coordinator.create_task(new_task("A; B")).await.unwrap();

        h.coordinator.request_commit(task.id).await.unwrap();
        let err = h.coordinator.request_commit(task.id).await.unwrap_err();

        assert_eq!(err.rejection(), Some(GateRejection::AlreadyCommitted));
        assert_eq!(err.to_string(), "commit not allowed on task 1: task has committed");
        assert_eq!(h.executor.executed(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_commit_without_compensation_fails_statement() {
        let h = harness_with(
            RecordingExecutor::default(),
            KeywordInspector::default(),
            UndoGenerator {
                unavailable: ["B".to_string()].into_iter().collect(),
                ..Default::default()
            },
            CoordinatorConfig::default(),
        );
        let task = h.coordinator.create_task(new_task("A; B; C")).await.unwrap();

        let committed = h.coordinator.request_commit(task.id).await.unwrap();
        assert_eq!(
            exec_statuses(&committed.commit_statements),
            vec![ExecStatus::Finished, ExecStatus::Failed, ExecStatus::Initialized]
        );
        assert!(committed.commit_statements[1]
            .exec
            .result
            .contains("rollback sql unavailable"));
        assert_eq!(h.executor.executed(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_compensation_generated_before_statement_is_doing() {
        let h = harness_with(
            RecordingExecutor::default(),
            KeywordInspector::default(),
            UndoGenerator {
                unavailable: ["B".to_string()].into_iter().collect(),
                ..Default::default()
            },
            CoordinatorConfig::default(),
        );
        let task = h.coordinator.create_task(new_task("A; B")).await.unwrap();

        let committed = h.coordinator.request_commit(task.id).await.unwrap();
        assert_eq!(
            h.generator.seen(),
            vec![
                ("A".to_string(), ExecStatus::Initialized),
                ("B".to_string(), ExecStatus::Initialized),
            ]
        );

        // The statement without a compensation never blocks rollback as in progress
        assert!(!committed.is_commit_in_progress());
        let err = h.coordinator.request_rollback(task.id).await.unwrap_err();
        assert_eq!(err.rejection(), Some(GateRejection::CommitFailed));
    }

    // ==================== Rollback Tests ====================

    #[tokio::test]
    async fn test_rollback_runs_newest_first() {
        let h = harness();
        let task = h.coordinator.create_task(new_task("A; B; C")).await.unwrap();

        let err = h.coordinator.request_rollback(task.id).await.unwrap_err();
        assert_eq!(err.rejection(), Some(GateRejection::CommitNotAttempted));

        h.coordinator.request_commit(task.id).await.unwrap();
        let rolled_back = h.coordinator.request_rollback(task.id).await.unwrap();

        assert_eq!(
            h.executor.executed(),
            vec!["A", "B", "C", "UNDO C", "UNDO B", "UNDO A"]
        );
        assert_eq!(rolled_back.action, Some(TaskAction::Rollback));
        assert!(rolled_back
            .rollback_statements
            .iter()
            .all(|s| s.exec.status == ExecStatus::Finished));

        let err = h.coordinator.request_rollback(task.id).await.unwrap_err();
        assert_eq!(err.rejection(), Some(GateRejection::AlreadyRolledBack));
    }

    #[tokio::test]
    async fn test_rollback_derived_when_missing() {
        let h = harness();
        let task = h.coordinator.create_task(new_task("A; B")).await.unwrap();

        // Committed by an earlier process that stored no compensations
        for statement in &task.commit_statements {
            let mut done = statement.clone();
            done.exec.status = ExecStatus::Finished;
            h.store.update_statement(task.id, &done).await.unwrap();
        }

        let rolled_back = h.coordinator.request_rollback(task.id).await.unwrap();
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.executor.executed(), vec!["UNDO B", "UNDO A"]);
        assert_eq!(
            rolled_back
                .rollback_statements
                .iter()
                .map(|s| (s.number, s.commit_number()))
                .collect::<Vec<_>>(),
            vec![(1, Some(1)), (2, Some(2))]
        );
    }

    #[tokio::test]
    async fn test_rollback_without_compensations_is_rejected() {
        let h = harness_with(
            RecordingExecutor::default(),
            KeywordInspector::default(),
            UndoGenerator {
                skip_all: true,
                ..Default::default()
            },
            CoordinatorConfig::default(),
        );
        let task = h.coordinator.create_task(new_task("A; B")).await.unwrap();

        let committed = h.coordinator.request_commit(task.id).await.unwrap();
        assert!(committed.rollback_statements.is_empty());

        for _ in 0..2 {
            let err = h.coordinator.request_rollback(task.id).await.unwrap_err();
            assert_eq!(err.rejection(), Some(GateRejection::NothingToRollBack));
            assert_eq!(
                err.to_string(),
                "rollback not allowed on task 1: task has no rollback sql"
            );
        }

        let stored = h.store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.action, Some(TaskAction::Commit));
        assert!(stored.rollback_statements.is_empty());
        assert_eq!(h.executor.executed(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_rollback_rejected_once_requested() {
        let h = harness();
        let task = h.coordinator.create_task(new_task("A")).await.unwrap();

        // A finished commit whose rollback was accepted by an earlier process
        let mut done = task.commit_statements[0].clone();
        done.exec.status = ExecStatus::Finished;
        h.store.update_statement(task.id, &done).await.unwrap();
        h.store
            .update_task(task.id, &TaskPatch::action(TaskAction::Rollback))
            .await
            .unwrap();

        let err = h.coordinator.request_rollback(task.id).await.unwrap_err();
        assert_eq!(err.rejection(), Some(GateRejection::AlreadyRolledBack));
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
        assert!(h.executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_blocked_by_unfinished_commit() {
        let h = harness();
        let task = h.coordinator.create_task(new_task("A; B")).await.unwrap();

        let mut first = task.commit_statements[0].clone();
        first.exec.status = ExecStatus::Finished;
        h.store.update_statement(task.id, &first).await.unwrap();
        let mut second = task.commit_statements[1].clone();
        second.exec.status = ExecStatus::Doing;
        h.store.update_statement(task.id, &second).await.unwrap();

        let err = h.coordinator.request_rollback(task.id).await.unwrap_err();
        assert_eq!(err.rejection(), Some(GateRejection::CommitInProgress));

        let err = h.coordinator.delete_task(task.id).await.unwrap_err();
        assert_eq!(err.rejection(), Some(GateRejection::ActionInProgress));
    }

    // ==================== Query Tests ====================

    #[tokio::test]
    async fn test_statement_queries() {
        let h = harness_with(
            RecordingExecutor::failing(&["C"]),
            KeywordInspector::default(),
            UndoGenerator::default(),
            CoordinatorConfig::default(),
        );
        let task = h.coordinator.create_task(new_task("A; B; C")).await.unwrap();
        h.coordinator.request_commit(task.id).await.unwrap();

        let failed = h.coordinator.failed_commit_statements(task.id).await.unwrap();
        assert_eq!(failed.iter().map(|s| s.number).collect::<Vec<_>>(), vec![3]);

        let rollback_b = h.coordinator.rollback_statements(task.id, &[2]).await.unwrap();
        assert_eq!(rollback_b.len(), 1);
        assert_eq!(rollback_b[0].content, "UNDO B");

        let missing = h.coordinator.failed_commit_statements(TaskId(99)).await;
        assert!(matches!(missing, Err(CoordinatorError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_related_ddl_tasks() {
        let h = harness();
        let first = h.coordinator.create_task(new_task("ALTER TABLE t ADD a INT")).await.unwrap();
        let second = h.coordinator.create_task(new_task("ALTER TABLE t ADD b INT")).await.unwrap();
        let dml = h.coordinator.create_task(new_task("UPDATE t SET a = 1")).await.unwrap();

        for id in [first.id, second.id, dml.id] {
            h.coordinator.request_inspect(id).await.unwrap();
        }

        let related = h.coordinator.related_ddl_tasks(first.id).await.unwrap();
        assert_eq!(related.iter().map(|t| t.id).collect::<Vec<_>>(), vec![second.id]);
    }

    // ==================== Delete & Retention Tests ====================

    #[tokio::test]
    async fn test_delete_keeps_audit_trail() {
        let h = harness();
        let task = h.coordinator.create_task(new_task("A; B")).await.unwrap();
        h.coordinator.request_commit(task.id).await.unwrap();

        h.coordinator.delete_task(task.id).await.unwrap();

        let listed = h
            .coordinator
            .list_tasks(&TaskFilter::default(), Page::all())
            .await
            .unwrap();
        assert_eq!(listed.total, 0);
        assert!(matches!(
            h.coordinator.get_task(task.id).await,
            Err(CoordinatorError::TaskNotFound(_))
        ));

        let archived = h.coordinator.get_task_unscoped(task.id).await.unwrap();
        assert_eq!(archived.commit_statements.len(), 2);
        assert_eq!(archived.rollback_statements.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_delete_is_all_or_nothing() {
        let h = harness();
        let task = h.coordinator.create_task(new_task("A")).await.unwrap();

        let err = h
            .coordinator
            .delete_tasks(&[task.id, TaskId(404)])
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::TaskNotFound(TaskId(404))));
        assert!(h.coordinator.get_task(task.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_retention_sweep_purges_expired() {
        let h = harness();
        let old = h.coordinator.create_task(new_task("A")).await.unwrap();
        let live = h.coordinator.create_task(new_task("B")).await.unwrap();
        h.coordinator.delete_task(old.id).await.unwrap();

        let sweeper = RetentionSweeper::new(
            h.coordinator.clone(),
            Arc::new(MetricsCollector::new()),
            RetentionPolicy {
                purge_after: Duration::from_secs(60),
                batch_size: 10,
            },
        );

        // Deleted just now, not yet expired
        let now = chrono::Utc::now().timestamp() as u64;
        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.purged, 0);

        let purged_before = TASKS_PURGED.get();
        let report = sweeper.sweep(now + 3600).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.purged, 1);
        assert_eq!(TASKS_PURGED.get(), purged_before + 1);

        assert!(h.store.get_unscoped(old.id).await.unwrap().is_none());
        assert!(h.store.get(live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_commits_execute_once() {
        let h = harness_with(
            RecordingExecutor::default(),
            KeywordInspector::default(),
            UndoGenerator::default(),
            CoordinatorConfig::default(),
        );
        let task = h.coordinator.create_task(new_task("A; B; C")).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = h.coordinator.clone();
                tokio::spawn(async move { coordinator.request_commit(task.id).await })
            })
            .collect();

        let mut accepted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => {
                    assert_eq!(e.rejection(), Some(GateRejection::AlreadyCommitted));
                    rejected += 1;
                }
            }
        }

        assert_eq!((accepted, rejected), (1, 3));
        assert_eq!(h.executor.executed(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_store_snapshot_matches_response() {
        let h = harness();
        let task = h.coordinator.create_task(new_task("A")).await.unwrap();
        let response = h.coordinator.request_commit(task.id).await.unwrap();
        let stored: HashMap<u32, ExecStatus> = h
            .store
            .get(task.id)
            .await
            .unwrap()
            .unwrap()
            .commit_statements
            .iter()
            .map(|s| (s.number, s.exec.status))
            .collect();
        assert_eq!(stored.get(&1), Some(&response.commit_statements[0].exec.status));
    }
}
