use async_trait::async_trait;
use sqlgate_types::{
    AuditRecord, BinlogPosition, ExecutionRecord, InstanceRef, Page, Paginated, RoleKind,
    SqlType, StatementFilter, StatementRecord, StatementRole, Task, TaskAction, TaskDraft,
    TaskFilter, TaskId, TaskSummary, TypeError,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::store::{now_secs, StoreError, TaskPatch, TaskStore};

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        // Every connection to `sqlite::memory:` is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), StoreError> {
        let migrations = [
            include_str!("../migrations/001_create_tasks.sql"),
            include_str!("../migrations/002_create_statements.sql"),
            include_str!("../migrations/003_create_task_indexes.sql"),
            include_str!("../migrations/004_create_deleted_index.sql"),
        ];

        for migration in migrations {
            sqlx::query(migration)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }

        Ok(())
    }

    fn row_to_summary(row: &SqliteRow) -> Result<TaskSummary, StoreError> {
        Ok(TaskSummary {
            id: TaskId(row.get::<i64, _>("id") as u64),
            name: row.get("name"),
            desc: row.get("description"),
            schema: row.get("schema_name"),
            instance_name: row.get("instance_name"),
            normal_rate: row.get("normal_rate"),
            sql_type: parse_optional(row.get("sql_type"))?,
            action: parse_optional(row.get("action"))?,
            created_at: row.get::<i64, _>("created_at") as u64,
        })
    }

    fn row_to_task(
        row: &SqliteRow,
        commit_statements: Vec<StatementRecord>,
        rollback_statements: Vec<StatementRecord>,
    ) -> Result<Task, StoreError> {
        let instance = InstanceRef {
            id: row.get::<i64, _>("instance_id") as u64,
            name: row.get("instance_name"),
            dialect: parse(row.get::<String, _>("dialect").as_str())?,
        };

        Ok(Task {
            id: TaskId(row.get::<i64, _>("id") as u64),
            name: row.get("name"),
            desc: row.get("description"),
            schema: row.get("schema_name"),
            instance,
            sql: row.get("sql_text"),
            normal_rate: row.get("normal_rate"),
            sql_type: parse_optional(row.get("sql_type"))?,
            action: parse_optional(row.get("action"))?,
            commit_statements,
            rollback_statements,
            created_at: row.get::<i64, _>("created_at") as u64,
            updated_at: row.get::<i64, _>("updated_at") as u64,
            deleted_at: row.get::<Option<i64>, _>("deleted_at").map(|v| v as u64),
        })
    }

    fn row_to_statement(row: &SqliteRow) -> Result<StatementRecord, StoreError> {
        let exec = ExecutionRecord {
            status: parse(row.get::<String, _>("exec_status").as_str())?,
            result: row.get("exec_result"),
            rows_affected: row.get("rows_affected"),
            start_binlog: binlog(row, "start_binlog_file", "start_binlog_pos"),
            end_binlog: binlog(row, "end_binlog_file", "end_binlog_pos"),
        };

        let role: RoleKind = match row.get::<String, _>("role").as_str() {
            "commit" => RoleKind::Commit,
            "rollback" => RoleKind::Rollback,
            other => {
                return Err(StoreError::SerializationError(format!(
                    "unknown statement role: {other}"
                )))
            }
        };

        let role = match role {
            RoleKind::Commit => StatementRole::Commit {
                audit: AuditRecord {
                    status: parse(
                        row.get::<Option<String>, _>("audit_status")
                            .unwrap_or_default()
                            .as_str(),
                    )?,
                    result: row
                        .get::<Option<String>, _>("audit_result")
                        .unwrap_or_default(),
                    level: parse_optional(row.get("audit_level"))?,
                },
            },
            RoleKind::Rollback => StatementRole::Rollback {
                commit_number: row
                    .get::<Option<i64>, _>("commit_number")
                    .unwrap_or_default() as u32,
            },
        };

        Ok(StatementRecord {
            number: row.get::<i64, _>("number") as u32,
            content: row.get("content"),
            exec,
            role,
        })
    }

    async fn task_exists(&self, id: TaskId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM tasks WHERE id = ?")
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.is_some())
    }

    async fn ensure_task(&self, id: TaskId) -> Result<(), StoreError> {
        if self.task_exists(id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("task {id}")))
        }
    }

    async fn load_task(&self, id: TaskId, include_deleted: bool) -> Result<Option<Task>, StoreError> {
        let sql = if include_deleted {
            "SELECT * FROM tasks WHERE id = ?"
        } else {
            "SELECT * FROM tasks WHERE id = ? AND deleted_at IS NULL"
        };
        let row = sqlx::query(sql)
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let statement_rows =
            sqlx::query("SELECT * FROM statements WHERE task_id = ? ORDER BY role, number")
                .bind(id.0 as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;

        let mut commit_statements = Vec::new();
        let mut rollback_statements = Vec::new();
        for statement_row in &statement_rows {
            let statement = Self::row_to_statement(statement_row)?;
            match statement.kind() {
                RoleKind::Commit => commit_statements.push(statement),
                RoleKind::Rollback => rollback_statements.push(statement),
            }
        }

        Self::row_to_task(&row, commit_statements, rollback_statements).map(Some)
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn create(&self, draft: &TaskDraft) -> Result<Task, StoreError> {
        let now = now_secs() as i64;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (
                name, description, schema_name, instance_id, instance_name, dialect,
                sql_text, normal_rate, sql_type, action, created_at, updated_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, NULL, NULL, ?, ?, NULL)
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.desc)
        .bind(&draft.schema)
        .bind(draft.instance.id as i64)
        .bind(&draft.instance.name)
        .bind(draft.instance.dialect.as_str())
        .bind(&draft.sql)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let task_id = result.last_insert_rowid();
        for statement in &draft.commit_statements {
            insert_statement(&mut *tx, task_id, statement)
                .await
                .map_err(|e| unique_or_db(e, task_id, statement))?;
        }

        tx.commit().await.map_err(db_error)?;
        debug!(task_id, statements = draft.commit_statements.len(), "task persisted");

        self.load_task(TaskId(task_id as u64), false)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("task {task_id}")))
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.load_task(id, false).await
    }

    async fn get_unscoped(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.load_task(id, true).await
    }

    async fn list(
        &self,
        filter: &TaskFilter,
        page: Page,
    ) -> Result<Paginated<TaskSummary>, StoreError> {
        let mut count: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM tasks WHERE deleted_at IS NULL");
        push_task_filter(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?
            .get("total");

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM tasks WHERE deleted_at IS NULL");
        push_task_filter(&mut query, filter);
        query.push(" ORDER BY id");
        push_page(&mut query, page);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(Paginated {
            items: rows
                .iter()
                .map(Self::row_to_summary)
                .collect::<Result<_, _>>()?,
            total: total as usize,
        })
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tasks SET updated_at = ");
        query.push_bind(now_secs() as i64);

        if let Some(action) = patch.action {
            query.push(", action = ").push_bind(action.as_str());
        }
        if let Some(audit) = patch.audit {
            query
                .push(", normal_rate = ")
                .push_bind(audit.normal_rate)
                .push(", sql_type = ")
                .push_bind(audit.sql_type.map(|t| t.as_str()));
        }
        query.push(" WHERE id = ").push_bind(id.0 as i64);

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    async fn update_statement(
        &self,
        id: TaskId,
        statement: &StatementRecord,
    ) -> Result<(), StoreError> {
        let audit = statement.audit();
        let result = sqlx::query(
            r#"
            UPDATE statements
            SET exec_status = ?, exec_result = ?, rows_affected = ?,
                start_binlog_file = ?, start_binlog_pos = ?,
                end_binlog_file = ?, end_binlog_pos = ?,
                audit_status = ?, audit_result = ?, audit_level = ?
            WHERE task_id = ? AND role = ? AND number = ?
            "#,
        )
        .bind(statement.exec.status.as_str())
        .bind(&statement.exec.result)
        .bind(statement.exec.rows_affected)
        .bind(statement.exec.start_binlog.as_ref().map(|b| b.file.clone()))
        .bind(statement.exec.start_binlog.as_ref().map(|b| b.pos))
        .bind(statement.exec.end_binlog.as_ref().map(|b| b.file.clone()))
        .bind(statement.exec.end_binlog.as_ref().map(|b| b.pos))
        .bind(audit.map(|a| a.status.as_str()))
        .bind(audit.map(|a| a.result.clone()))
        .bind(audit.and_then(|a| a.level).map(|l| l.as_str()))
        .bind(id.0 as i64)
        .bind(statement.kind().as_str())
        .bind(statement.number as i64)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "task {id} {} statement {}",
                statement.kind().as_str(),
                statement.number
            )));
        }

        sqlx::query("UPDATE tasks SET updated_at = ? WHERE id = ?")
            .bind(now_secs() as i64)
            .bind(id.0 as i64)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

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
        self.ensure_task(id).await?;

        insert_statement(&self.pool, id.0 as i64, statement)
            .await
            .map_err(|e| unique_or_db(e, id.0 as i64, statement))
    }

    async fn list_commit_statements(
        &self,
        id: TaskId,
        filter: &StatementFilter,
        page: Page,
    ) -> Result<Paginated<StatementRecord>, StoreError> {
        self.ensure_task(id).await?;

        let mut count: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM statements WHERE role = 'commit'");
        push_statement_filter(&mut count, id, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?
            .get("total");

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM statements WHERE role = 'commit'");
        push_statement_filter(&mut query, id, filter);
        query.push(" ORDER BY number");
        push_page(&mut query, page);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(Paginated {
            items: rows
                .iter()
                .map(Self::row_to_statement)
                .collect::<Result<_, _>>()?,
            total: total as usize,
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
        self.ensure_task(id).await?;

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM statements WHERE role = 'rollback' AND task_id = ");
        query.push_bind(id.0 as i64);
        if !commit_numbers.is_empty() {
            push_id_list(
                &mut query,
                "commit_number",
                commit_numbers.iter().map(|n| *n as i64),
            );
        }
        query.push(" ORDER BY number");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(Self::row_to_statement).collect()
    }

    async fn related_ddl_tasks(
        &self,
        instance_id: u64,
        schema: &str,
    ) -> Result<Vec<TaskSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tasks
            WHERE instance_id = ? AND schema_name = ?
            AND normal_rate = 1 AND sql_type = ? AND action = ?
            AND deleted_at IS NULL
            ORDER BY id
            "#,
        )
        .bind(instance_id as i64)
        .bind(schema)
        .bind(SqlType::Ddl.as_str())
        .bind(TaskAction::Inspect.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    async fn soft_delete(&self, ids: &[TaskId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = now_secs() as i64;
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tasks SET deleted_at = ");
        query
            .push_bind(now)
            .push(", updated_at = ")
            .push_bind(now)
            .push(" WHERE deleted_at IS NULL");
        push_id_list(&mut query, "id", ids.iter().map(|id| id.0 as i64));

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() as usize)
    }

    async fn hard_delete(&self, ids: &[TaskId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut statements: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM statements WHERE 1 = 1");
        push_id_list(&mut statements, "task_id", ids.iter().map(|id| id.0 as i64));
        statements
            .build()
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let mut tasks: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM tasks WHERE 1 = 1");
        push_id_list(&mut tasks, "id", ids.iter().map(|id| id.0 as i64));
        let result = tasks.build().execute(&mut *tx).await.map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        Ok(result.rows_affected() as usize)
    }

    async fn list_deleted_before(
        &self,
        threshold: u64,
        limit: usize,
    ) -> Result<Vec<TaskId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM tasks
            WHERE deleted_at IS NOT NULL AND deleted_at < ?
            ORDER BY deleted_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(threshold.min(i64::MAX as u64) as i64)
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows
            .iter()
            .map(|row| TaskId(row.get::<i64, _>("id") as u64))
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

fn unique_or_db(e: sqlx::Error, task_id: i64, statement: &StatementRecord) -> StoreError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::DuplicateId(format!(
                "task {task_id} {} statement {}",
                statement.kind().as_str(),
                statement.number
            ))
        }
        other => db_error(other),
    }
}

fn parse<T>(value: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = TypeError>,
{
    value
        .parse()
        .map_err(|e: TypeError| StoreError::SerializationError(e.to_string()))
}

fn parse_optional<T>(value: Option<String>) -> Result<Option<T>, StoreError>
where
    T: FromStr<Err = TypeError>,
{
    value
        .filter(|v| !v.is_empty())
        .map(|v| parse(&v))
        .transpose()
}

fn binlog(row: &SqliteRow, file_column: &str, pos_column: &str) -> Option<BinlogPosition> {
    let file: Option<String> = row.get(file_column);
    let pos: Option<i64> = row.get(pos_column);
    file.zip(pos).map(|(file, pos)| BinlogPosition { file, pos })
}

async fn insert_statement<'c, E>(
    executor: E,
    task_id: i64,
    statement: &StatementRecord,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let audit = statement.audit();
    sqlx::query(
        r#"
        INSERT INTO statements (
            task_id, role, number, content,
            exec_status, exec_result, rows_affected,
            start_binlog_file, start_binlog_pos, end_binlog_file, end_binlog_pos,
            audit_status, audit_result, audit_level, commit_number
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(task_id)
    .bind(statement.kind().as_str())
    .bind(statement.number as i64)
    .bind(&statement.content)
    .bind(statement.exec.status.as_str())
    .bind(&statement.exec.result)
    .bind(statement.exec.rows_affected)
    .bind(statement.exec.start_binlog.as_ref().map(|b| b.file.clone()))
    .bind(statement.exec.start_binlog.as_ref().map(|b| b.pos))
    .bind(statement.exec.end_binlog.as_ref().map(|b| b.file.clone()))
    .bind(statement.exec.end_binlog.as_ref().map(|b| b.pos))
    .bind(audit.map(|a| a.status.as_str()))
    .bind(audit.map(|a| a.result.clone()))
    .bind(audit.and_then(|a| a.level).map(|l| l.as_str()))
    .bind(statement.commit_number().map(|n| n as i64))
    .execute(executor)
    .await?;

    Ok(())
}

fn push_task_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &TaskFilter) {
    if let Some(instance_name) = &filter.instance_name {
        query
            .push(" AND instance_name = ")
            .push_bind(instance_name.clone());
    }
    if let Some(schema) = &filter.schema {
        query.push(" AND schema_name = ").push_bind(schema.clone());
    }
    if let Some(action) = filter.action {
        query.push(" AND action = ").push_bind(action.as_str());
    }
}

fn push_statement_filter(query: &mut QueryBuilder<'_, Sqlite>, id: TaskId, filter: &StatementFilter) {
    query.push(" AND task_id = ").push_bind(id.0 as i64);
    if let Some(status) = filter.exec_status {
        query.push(" AND exec_status = ").push_bind(status.as_str());
    }
    if let Some(status) = filter.audit_status {
        query.push(" AND audit_status = ").push_bind(status.as_str());
    }
}

fn push_page(query: &mut QueryBuilder<'_, Sqlite>, page: Page) {
    if page.size > 0 {
        query
            .push(" LIMIT ")
            .push_bind(i64::try_from(page.size).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
    }
}

fn push_id_list(
    query: &mut QueryBuilder<'_, Sqlite>,
    column: &str,
    ids: impl Iterator<Item = i64>,
) {
    query.push(format!(" AND {column} IN ("));
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
