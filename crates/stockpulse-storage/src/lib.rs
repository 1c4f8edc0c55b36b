//! stockpulse-storage: SQLite-backed execution log.
//!
//! Every task outcome the dispatcher produces lands as one row in the
//! `background_sync` table. The table is append-only from the dispatcher's
//! point of view; the query helpers exist for history and stats views.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use tokio::sync::Mutex;

use stockpulse_types::{AppState, ExecutionDetails, ExecutionRecord, TaskStats, TriggerOrigin};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StorageError>;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS background_sync (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_name TEXT NOT NULL,
        execution_time INTEGER NOT NULL,
        trigger_source TEXT NOT NULL DEFAULT 'javascript',
        app_state TEXT NOT NULL DEFAULT 'active',
        user_count INTEGER NOT NULL DEFAULT 0,
        memory_usage TEXT,
        notes TEXT,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_background_sync_execution_time
        ON background_sync (execution_time);";

const RECORD_COLUMNS: &str = "id, task_name, execution_time, trigger_source, app_state, user_count, memory_usage, notes, created_at";

/// Default number of rows returned by [`ExecutionLogStore::recent_history`].
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Default look-back window for [`ExecutionLogStore::recent_executions`].
pub const DEFAULT_RECENT_MINUTES: u32 = 60;

/// Persistent log of task executions.
pub struct ExecutionLogStore {
    conn: Arc<Mutex<Connection>>,
}

impl ExecutionLogStore {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Execution log opened: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Append one execution record stamped with the current time.
    pub async fn log_task_execution(
        &self,
        task_name: &str,
        trigger_source: TriggerOrigin,
        app_state: AppState,
        details: ExecutionDetails,
    ) -> Result<ExecutionRecord> {
        let conn = self.conn.clone();
        let task_name = task_name.to_string();
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO background_sync
                    (task_name, execution_time, trigger_source, app_state, user_count, memory_usage, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    task_name,
                    now_ms,
                    trigger_source.as_str(),
                    app_state.as_str(),
                    details.user_count,
                    details.memory_usage,
                    details.notes,
                    now_ms,
                ],
            )?;
            Ok(ExecutionRecord {
                id: conn.last_insert_rowid(),
                task_name,
                execution_time: now,
                trigger_source,
                app_state,
                user_count: details.user_count,
                memory_usage: details.memory_usage,
                notes: details.notes,
                created_at: now,
            })
        })
        .await?
    }

    /// Most recent executions, newest first.
    pub async fn recent_history(&self, limit: u32) -> Result<Vec<ExecutionRecord>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM background_sync
                 ORDER BY execution_time DESC, id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![limit], record_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }

    /// Executions within the last `minutes_back` minutes, newest first.
    pub async fn recent_executions(&self, minutes_back: u32) -> Result<Vec<ExecutionRecord>> {
        let conn = self.conn.clone();
        let cutoff = Utc::now().timestamp_millis() - i64::from(minutes_back) * 60_000;
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM background_sync
                 WHERE execution_time >= ?1
                 ORDER BY execution_time DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![cutoff], record_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }

    /// Execution counts grouped by task name, trigger source and app state.
    pub async fn stats_by_task(&self) -> Result<Vec<TaskStats>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT task_name, COUNT(*) AS execution_count, MAX(execution_time) AS last_execution,
                        trigger_source, app_state
                 FROM background_sync
                 GROUP BY task_name, trigger_source, app_state
                 ORDER BY last_execution DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(TaskStats {
                        task_name: row.get(0)?,
                        execution_count: row.get(1)?,
                        last_execution: datetime_column(row, 2)?,
                        trigger_source: label_column(row, 3)?,
                        app_state: label_column(row, 4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }

    /// Total number of logged executions.
    pub async fn count(&self) -> Result<i64> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.query_row("SELECT COUNT(*) FROM background_sync", [], |row| {
                row.get(0)
            })?;
            Ok(count)
        })
        .await?
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        id: row.get(0)?,
        task_name: row.get(1)?,
        execution_time: datetime_column(row, 2)?,
        trigger_source: label_column(row, 3)?,
        app_state: label_column(row, 4)?,
        user_count: row.get(5)?,
        memory_usage: row.get(6)?,
        notes: row.get(7)?,
        created_at: datetime_column(row, 8)?,
    })
}

fn datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn label_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
