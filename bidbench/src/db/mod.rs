//! Protocol executors: one live session per worker, routed by language tag.

mod memory;
mod multiplex;
mod sqlite;

pub use memory::{MemoryExecutor, MemoryFactory, MemoryStore};
pub use multiplex::{MultiplexExecutor, MultiplexFactory};
pub use sqlite::{SqliteExecutor, SqliteFactory};

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::{ExecResult, ExecutorError};
use crate::operation::OperationInstance;
use crate::report::ReportSink;

/// A session bound to one backend.
///
/// Owned by exactly one worker for its whole lifetime. `close` is idempotent
/// and never fails because an earlier `commit` or `rollback` failed.
pub trait Executor: Send {
    /// Runs one operation and returns its measured round-trip latency.
    fn execute(&mut self, op: &OperationInstance) -> ExecResult<Duration>;

    /// Runs an operation whose single result is an integer, such as a row count.
    fn execute_scalar(&mut self, op: &OperationInstance) -> ExecResult<i64>;

    fn commit(&mut self) -> ExecResult<()>;

    fn rollback(&mut self) -> ExecResult<()>;

    fn close(&mut self) -> ExecResult<()>;
}

pub trait ExecutorFactory: Send + Sync {
    /// Opens a new session. Latencies of executed operations go to `sink`.
    fn create_executor(&self, sink: Option<Arc<dyn ReportSink>>) -> ExecResult<Box<dyn Executor>>;

    /// Upper bound on simultaneously open sessions; 0 means unlimited.
    fn max_concurrent_executors(&self) -> usize {
        0
    }
}

/// Caps a requested degree of parallelism to what `factory` allows.
pub fn capped_threads(requested: usize, factory: &dyn ExecutorFactory) -> usize {
    let requested = requested.max(1);
    match factory.max_concurrent_executors() {
        0 => requested,
        max => requested.min(max),
    }
}

/// An executor that is closed when dropped, on every exit path.
pub struct ExecutorGuard {
    inner: Box<dyn Executor>,
}

impl ExecutorGuard {
    pub fn acquire(
        factory: &dyn ExecutorFactory,
        sink: Option<Arc<dyn ReportSink>>,
    ) -> ExecResult<Self> {
        Ok(ExecutorGuard {
            inner: factory.create_executor(sink)?,
        })
    }

    pub fn new(inner: Box<dyn Executor>) -> Self {
        ExecutorGuard { inner }
    }

    /// Closes now, reporting the failure instead of logging it.
    pub fn close(mut self) -> ExecResult<()> {
        self.inner.close()
    }
}

impl Deref for ExecutorGuard {
    type Target = dyn Executor;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for ExecutorGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ExecutorGuard {
    fn drop(&mut self) {
        if let Err(error) = self.inner.close() {
            warn!(%error, "failed to close executor");
        }
    }
}

pub(crate) fn missing_payload(op: &OperationInstance, expected: &str) -> ExecutorError {
    ExecutorError::MalformedPayload(format!(
        "{} ({}) carries no {} payload",
        op.label, op.language, expected
    ))
}
