//! Relational executor over SQLite.
//!
//! A session opens its `BEGIN IMMEDIATE` transaction at its first write so
//! concurrent writers queue on the busy timeout instead of failing on lock
//! upgrade. Reads issued outside that transaction run in autocommit and, in
//! WAL mode, never wait for writers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rusqlite::Connection;

use super::{missing_payload, Executor, ExecutorFactory};
use crate::error::{ExecResult, ExecutorError};
use crate::operation::{Category, OperationInstance};
use crate::report::{record_latency, ReportSink};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

static MEMORY_DATABASES: AtomicU64 = AtomicU64::new(0);

pub struct SqliteExecutor {
    conn: Option<Connection>,
    sink: Option<Arc<dyn ReportSink>>,
}

impl SqliteExecutor {
    pub fn open(path: &str, sink: Option<Arc<dyn ReportSink>>) -> ExecResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ExecutorError::Connection(format!("sqlite open {}: {}", path, e)))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(SqliteExecutor {
            conn: Some(conn),
            sink,
        })
    }

    fn conn(&mut self) -> ExecResult<&mut Connection> {
        self.conn.as_mut().ok_or(ExecutorError::Closed)
    }
}

fn statement(op: &OperationInstance) -> ExecResult<&str> {
    op.sql.as_deref().ok_or_else(|| missing_payload(op, "sql"))
}

impl Executor for SqliteExecutor {
    fn execute(&mut self, op: &OperationInstance) -> ExecResult<Duration> {
        let sql = statement(op)?;
        let conn = self.conn()?;
        let start = Instant::now();
        if op.category == Category::Schema {
            conn.execute_batch(sql)?;
        } else {
            if op.category.writes() && conn.is_autocommit() {
                conn.execute_batch("BEGIN IMMEDIATE")?;
            }
            if op.expects_result {
                let mut stmt = conn.prepare_cached(sql)?;
                let mut rows = stmt.query([])?;
                while rows.next()?.is_some() {}
            } else {
                conn.execute(sql, [])?;
            }
        }
        let latency = start.elapsed();
        record_latency(&self.sink, op, latency);
        Ok(latency)
    }

    fn execute_scalar(&mut self, op: &OperationInstance) -> ExecResult<i64> {
        let sql = statement(op)?;
        let value = self.conn()?.query_row(sql, [], |row| row.get::<_, i64>(0))?;
        Ok(value)
    }

    fn commit(&mut self) -> ExecResult<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> ExecResult<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn close(&mut self) -> ExecResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if !conn.is_autocommit() {
            // whatever a failed commit left open is discarded
            let _ = conn.execute_batch("ROLLBACK");
        }
        conn.close().map_err(|(_, e)| ExecutorError::Sqlite(e))
    }
}

/// Opens SQLite sessions on one database file or on a shared in-memory database.
pub struct SqliteFactory {
    path: String,
    // keeps a shared in-memory database alive between sessions
    keeper: Option<Mutex<Connection>>,
}

impl SqliteFactory {
    /// `:memory:` selects a shared in-process database that lives as long as the factory.
    pub fn new(path: &str) -> ExecResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Ok(SqliteFactory {
                path: path.to_string(),
                keeper: None,
            })
        }
    }

    pub fn in_memory() -> ExecResult<Self> {
        let n = MEMORY_DATABASES.fetch_add(1, Ordering::Relaxed);
        let path = format!("file:bidbench-{}?mode=memory&cache=shared", n);
        let keeper = Connection::open(&path)
            .map_err(|e| ExecutorError::Connection(format!("sqlite open {}: {}", path, e)))?;
        Ok(SqliteFactory {
            path,
            keeper: Some(Mutex::new(keeper)),
        })
    }
}

impl ExecutorFactory for SqliteFactory {
    fn create_executor(&self, sink: Option<Arc<dyn ReportSink>>) -> ExecResult<Box<dyn Executor>> {
        Ok(Box::new(SqliteExecutor::open(&self.path, sink)?))
    }

    fn max_concurrent_executors(&self) -> usize {
        // shared-cache table locks do not wait on the busy timeout
        if self.keeper.is_some() {
            1
        } else {
            0
        }
    }
}
