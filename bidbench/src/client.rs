use std::sync::Arc;
use std::thread;

use tracing::{error, warn};

use crate::db::ExecutorGuard;
use crate::engine::{CommitGranularity, WorkQueue};
use crate::error::{Error, Result};
use crate::latency::LatencyAggregate;
use crate::monitor::ThreadMonitor;
use crate::profile::WorkloadItem;
use crate::progress::ProgressCounter;

/// Shared state every worker of one run holds a handle to.
#[derive(Clone)]
pub struct RunContext {
    pub queue: Arc<WorkQueue>,
    pub latencies: Arc<LatencyAggregate>,
    pub monitor: Arc<ThreadMonitor>,
    pub progress: Arc<ProgressCounter>,
    pub commit: CommitGranularity,
    pub apply_delays: bool,
}

/// One worker thread of a workload run, bound to its own executor session.
pub struct Client {
    thread_index: usize,
    executor: ExecutorGuard,
    ctx: RunContext,
    executed: u64,
}

impl Client {
    pub fn new(thread_index: usize, executor: ExecutorGuard, ctx: RunContext) -> Self {
        Client {
            thread_index,
            executor,
            ctx,
            executed: 0,
        }
    }

    /// Drains the shared queue until it is empty or the run is aborted.
    ///
    /// Returns the number of items this worker executed, or `None` if it
    /// failed. A failure is rolled back and handed to the monitor, which
    /// stops every sibling; the session is closed when the client drops.
    pub fn run(mut self) -> Option<u64> {
        let outcome = self.drain().and_then(|()| {
            if !self.ctx.monitor.is_aborted() {
                self.executor.commit()?;
            }
            Ok(())
        });
        match outcome {
            Ok(()) => Some(self.executed),
            Err(e) => {
                error!(thread = self.thread_index, error = %e, "worker failed");
                if let Err(rollback) = self.executor.rollback() {
                    warn!(thread = self.thread_index, error = %rollback, "rollback failed");
                }
                self.ctx.monitor.notify_about_error(e);
                None
            }
        }
    }

    fn drain(&mut self) -> Result<()> {
        while !self.ctx.monitor.is_aborted() {
            let Some(item) = self.ctx.queue.pop() else {
                break;
            };
            self.execute(&item)?;
        }
        Ok(())
    }

    fn execute(&mut self, item: &WorkloadItem) -> Result<()> {
        let op = &item.operation;
        let latency = self
            .executor
            .execute(op)
            .map_err(|source| Error::Operation {
                template: format!("{}:{}", op.language, op.label),
                template_id: item.template_id,
                source,
            })?;
        self.executed += 1;
        self.ctx.latencies.record(item.template_id, latency);
        self.ctx.progress.advance(1);
        if self.ctx.apply_delays && !item.delay.is_zero() {
            thread::sleep(item.delay);
        }
        if self.ctx.commit == CommitGranularity::PerItem {
            self.executor.commit()?;
        }
        Ok(())
    }
}
