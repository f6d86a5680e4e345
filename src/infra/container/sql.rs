//! SQLite-backed durable container.
//!
//! Every task is a row keyed by `task_id`. A claim is a single conditional
//! `UPDATE ... RETURNING` from `PENDING` to `RUNNING`, so schedulers in
//! different processes sharing one database file never both receive the same
//! pending row. Status write-back only applies when the row still holds the
//! predecessor status, which keeps transitions monotonic and makes repeated
//! updates no-ops.

use std::marker::PhantomData;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::config::SqlContainerConfig;
use crate::core::{Container, Persistencer, SchedulerError, StatusUpdate, Task, TaskPayload};
use crate::util::clock::now;

const COLUMNS: &str = "seq, task_id, task_item, task_status, failed_reason, task_output, \
                       enqueue_time, task_start_time, task_end_time";

/// SQL text for one table, built once at connect time.
struct Statements {
    create_table: String,
    create_index: String,
    delete_finished: String,
    insert: String,
    claim: String,
    update_status: String,
    load_unfinished: String,
    persist: String,
    claim_count: String,
    get: String,
}

impl Statements {
    fn new(table: &str) -> Self {
        Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    task_id TEXT NOT NULL UNIQUE,
                    task_item TEXT NOT NULL,
                    task_status TEXT NOT NULL,
                    failed_reason TEXT,
                    task_output TEXT,
                    claimed_by TEXT,
                    claim_count INTEGER NOT NULL DEFAULT 0,
                    enqueue_time TEXT,
                    task_start_time TEXT,
                    task_end_time TEXT
                )"
            ),
            create_index: format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_status_seq ON {table} (task_status, seq)"
            ),
            delete_finished: format!(
                "DELETE FROM {table}
                 WHERE task_id = ? AND task_status IN ('SUCCESS', 'FAILED', 'TIMEOUT')"
            ),
            insert: format!(
                "INSERT INTO {table} (task_id, task_item, task_status, enqueue_time)
                 VALUES (?, ?, 'PENDING', ?)
                 ON CONFLICT (task_id) DO NOTHING"
            ),
            claim: format!(
                "UPDATE {table}
                 SET task_status = 'RUNNING', claimed_by = ?, claim_count = claim_count + 1,
                     task_start_time = ?
                 WHERE seq IN (
                     SELECT seq FROM {table} WHERE task_status = 'PENDING' ORDER BY seq LIMIT ?
                 ) AND task_status = 'PENDING'
                 RETURNING {COLUMNS}"
            ),
            update_status: format!(
                "UPDATE {table}
                 SET task_status = ?, failed_reason = ?, task_output = ?,
                     task_start_time = COALESCE(?, task_start_time), task_end_time = ?
                 WHERE task_id = ? AND task_status = ?"
            ),
            load_unfinished: format!(
                "SELECT {COLUMNS} FROM {table}
                 WHERE task_status IN ('PENDING', 'RUNNING') ORDER BY seq"
            ),
            persist: format!(
                "INSERT INTO {table} (task_id, task_item, task_status, failed_reason, task_output,
                                      enqueue_time, task_start_time, task_end_time)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (task_id) DO UPDATE SET
                     task_status = excluded.task_status,
                     failed_reason = excluded.failed_reason,
                     task_output = excluded.task_output,
                     task_start_time = excluded.task_start_time,
                     task_end_time = excluded.task_end_time
                 WHERE {table}.task_status IN ('PENDING', 'RUNNING')"
            ),
            claim_count: format!("SELECT claim_count FROM {table} WHERE task_id = ?"),
            get: format!("SELECT {COLUMNS} FROM {table} WHERE task_id = ?"),
        }
    }
}

/// Durable container and persistencer over a SQLite database.
///
/// Implements both [`Container`] and [`Persistencer`]; pass the same `Arc`
/// as both to a scheduler and status is written once.
pub struct SqlContainer<P> {
    pool: SqlitePool,
    table: String,
    owner: String,
    sql: Statements,
    _payload: PhantomData<fn() -> P>,
}

impl<P> SqlContainer<P>
where
    P: TaskPayload,
{
    /// Open (creating if needed) the database and ensure the table exists.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad configuration, `Backend` when the database
    /// cannot be opened or the schema cannot be created.
    pub async fn connect(config: &SqlContainerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| SchedulerError::InvalidConfig(format!("url `{}`: {e}", config.url)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(SchedulerError::backend)?;

        let sql = Statements::new(&config.table);
        sqlx::query(&sql.create_table)
            .execute(&pool)
            .await
            .map_err(SchedulerError::backend)?;
        sqlx::query(&sql.create_index)
            .execute(&pool)
            .await
            .map_err(SchedulerError::backend)?;

        let owner = uuid::Uuid::new_v4().to_string();
        info!(table = %config.table, owner = %owner, "sql container connected");

        Ok(Self {
            pool,
            table: config.table.clone(),
            owner,
            sql,
            _payload: PhantomData,
        })
    }

    /// Identifier recorded in `claimed_by` for rows this instance claims.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Table backing this container.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Underlying connection pool.
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// How many times the row has been claimed since it was last submitted.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    pub async fn claim_count(&self, task_id: &str) -> Result<Option<i64>, SchedulerError> {
        let row = sqlx::query(&self.sql.claim_count)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SchedulerError::backend)?;
        row.map(|r| r.try_get::<i64, _>("claim_count"))
            .transpose()
            .map_err(SchedulerError::backend)
    }

    /// Current record of a task, if one exists.
    ///
    /// # Errors
    ///
    /// Backend failures, or a row that does not decode.
    pub async fn get(&self, task_id: &str) -> Result<Option<Task<P>>, SchedulerError> {
        let row = sqlx::query(&self.sql.get)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SchedulerError::backend)?;
        row.as_ref()
            .map(decode_row::<P>)
            .transpose()
            .map(|r| r.map(|(_, task)| task))
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, SchedulerError> {
    serde_json::to_string(value).map_err(|e| SchedulerError::Backend(format!("encode: {e}")))
}

fn decode_row<P: TaskPayload>(row: &SqliteRow) -> Result<(i64, Task<P>), SchedulerError> {
    let field = |e: sqlx::Error| SchedulerError::Backend(format!("decode row: {e}"));

    let seq: i64 = row.try_get("seq").map_err(field)?;
    let task_id: String = row.try_get("task_id").map_err(field)?;
    let item: String = row.try_get("task_item").map_err(field)?;
    let status: String = row.try_get("task_status").map_err(field)?;
    let output: Option<String> = row.try_get("task_output").map_err(field)?;

    let task_item = serde_json::from_str(&item)
        .map_err(|e| SchedulerError::Backend(format!("task `{task_id}` payload: {e}")))?;
    let task_output = output
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| SchedulerError::Backend(format!("task `{task_id}` output: {e}")))?;

    let task = Task {
        task_status: status.parse()?,
        failed_reason: row.try_get("failed_reason").map_err(field)?,
        enqueue_time: row.try_get::<Option<DateTime<Utc>>, _>("enqueue_time").map_err(field)?,
        task_start_time: row
            .try_get::<Option<DateTime<Utc>>, _>("task_start_time")
            .map_err(field)?,
        task_end_time: row
            .try_get::<Option<DateTime<Utc>>, _>("task_end_time")
            .map_err(field)?,
        task_output,
        task_item,
        task_id,
    };
    Ok((seq, task))
}

#[async_trait]
impl<P> Container<P> for SqlContainer<P>
where
    P: TaskPayload,
{
    async fn push(&self, task: Task<P>) -> Result<(), SchedulerError> {
        let item = encode_json(&task.task_item)?;
        let enqueued = task.enqueue_time.unwrap_or_else(now);

        let mut tx = self.pool.begin().await.map_err(SchedulerError::backend)?;
        // A finished row may be resubmitted; it re-enters at the back of the queue.
        sqlx::query(&self.sql.delete_finished)
            .bind(&task.task_id)
            .execute(&mut *tx)
            .await
            .map_err(SchedulerError::backend)?;
        let inserted = sqlx::query(&self.sql.insert)
            .bind(&task.task_id)
            .bind(&item)
            .bind(enqueued)
            .execute(&mut *tx)
            .await
            .map_err(SchedulerError::backend)?
            .rows_affected();
        tx.commit().await.map_err(SchedulerError::backend)?;

        if inserted == 0 {
            return Err(SchedulerError::DuplicateTaskId(task.task_id));
        }
        debug!(task_id = %task.task_id, table = %self.table, "task stored");
        Ok(())
    }

    async fn poll(&self, max_count: usize) -> Result<Vec<Task<P>>, SchedulerError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(max_count).unwrap_or(i64::MAX);
        let rows = sqlx::query(&self.sql.claim)
            .bind(&self.owner)
            .bind(now())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::backend)?;

        let mut claimed = rows
            .iter()
            .map(decode_row::<P>)
            .collect::<Result<Vec<_>, _>>()?;
        // RETURNING order is unspecified.
        claimed.sort_by_key(|(seq, _)| *seq);

        if !claimed.is_empty() {
            debug!(count = claimed.len(), owner = %self.owner, "claimed tasks");
        }
        Ok(claimed.into_iter().map(|(_, task)| task).collect())
    }

    async fn update_status(&self, update: &StatusUpdate) -> Result<(), SchedulerError> {
        let Some(expected) = update.status.predecessor() else {
            return Ok(());
        };
        let output = update.output.as_ref().map(encode_json).transpose()?;

        let affected = sqlx::query(&self.sql.update_status)
            .bind(update.status.as_str())
            .bind(update.failed_reason.as_deref())
            .bind(output)
            .bind(update.start_time)
            .bind(update.end_time)
            .bind(&update.task_id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::backend)?
            .rows_affected();

        if affected == 0 {
            debug!(task_id = %update.task_id, status = %update.status, "status update skipped; row already moved on");
        }
        Ok(())
    }
}

#[async_trait]
impl<P> Persistencer<P> for SqlContainer<P>
where
    P: TaskPayload,
{
    async fn load_unfinished(&self) -> Result<Vec<Task<P>>, SchedulerError> {
        let rows = sqlx::query(&self.sql.load_unfinished)
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::backend)?;
        rows.iter()
            .map(|row| decode_row::<P>(row).map(|(_, task)| task))
            .collect()
    }

    async fn persist(&self, task: &Task<P>) -> Result<(), SchedulerError> {
        let item = encode_json(&task.task_item)?;
        let output = task.task_output.as_ref().map(encode_json).transpose()?;

        sqlx::query(&self.sql.persist)
            .bind(&task.task_id)
            .bind(&item)
            .bind(task.task_status.as_str())
            .bind(task.failed_reason.as_deref())
            .bind(output)
            .bind(task.enqueue_time)
            .bind(task.task_start_time)
            .bind(task.task_end_time)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::backend)?;
        Ok(())
    }
}
