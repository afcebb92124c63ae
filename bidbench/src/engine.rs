//! Concurrent execution of an expanded workload.

use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::client::{Client, RunContext};
use crate::db::{capped_threads, ExecutorFactory, ExecutorGuard};
use crate::error::{Error, Result};
use crate::latency::LatencyAggregate;
use crate::monitor::ThreadMonitor;
use crate::operation::TemplateId;
use crate::profile::{WorkloadItem, WorkloadPlan};
use crate::progress::{NoProgress, ProgressCounter, ProgressReporter};
use crate::report::ReportSink;

/// When workers commit their session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitGranularity {
    PerItem,
    EndOfRun,
}

impl FromStr for CommitGranularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "item" => Ok(CommitGranularity::PerItem),
            "run" => Ok(CommitGranularity::EndOfRun),
            _ => Err(Error::config(format!("unknown commit granularity {:?}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Building,
    Running,
    Completed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub threads: usize,
    pub commit: CommitGranularity,
    /// Sleep each item's configured delay after running it.
    pub apply_delays: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            threads: 1,
            commit: CommitGranularity::EndOfRun,
            apply_delays: true,
        }
    }
}

/// Items of one run. Popping is the only way an item is consumed.
pub struct WorkQueue {
    items: Mutex<VecDeque<WorkloadItem>>,
    total: usize,
}

impl WorkQueue {
    pub fn new(items: Vec<WorkloadItem>) -> Self {
        let total = items.len();
        WorkQueue {
            items: Mutex::new(items.into()),
            total,
        }
    }

    pub fn pop(&self) -> Option<WorkloadItem> {
        self.items.lock().pop_front()
    }

    /// Items not yet taken by any worker.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub elapsed: Duration,
    pub executed: u64,
    pub latencies: Arc<LatencyAggregate>,
    pub templates: BTreeMap<TemplateId, String>,
}

/// Drains a `WorkloadPlan` across worker threads, each with its own session.
pub struct WorkloadEngine {
    config: RunConfig,
    factory: Arc<dyn ExecutorFactory>,
    progress: Arc<dyn ProgressReporter>,
    sink: Option<Arc<dyn ReportSink>>,
    state: Mutex<RunState>,
}

impl WorkloadEngine {
    pub fn new(config: RunConfig, factory: Arc<dyn ExecutorFactory>) -> Self {
        WorkloadEngine {
            config,
            factory,
            progress: Arc::new(NoProgress),
            sink: None,
            state: Mutex::new(RunState::Building),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Worker count after applying the factory's concurrency cap.
    pub fn thread_count(&self) -> usize {
        capped_threads(self.config.threads, self.factory.as_ref())
    }

    fn transition(&self, next: RunState) {
        let mut state = self.state.lock();
        info!(from = ?*state, to = ?next, "workload run");
        *state = next;
    }

    /// Runs every item of `plan` exactly once.
    ///
    /// The first failing worker aborts the run. All workers are joined
    /// before returning and the report sink is flushed either way; an
    /// aborted run fails with `Error::Aborted` wrapping that first failure.
    pub fn run(&self, plan: WorkloadPlan) -> Result<RunReport> {
        *self.state.lock() = RunState::Building;
        let WorkloadPlan { items, templates } = plan;
        let latencies = Arc::new(LatencyAggregate::new(templates.keys().copied()));
        let queue = Arc::new(WorkQueue::new(items));
        let monitor = Arc::new(ThreadMonitor::new());
        let ctx = RunContext {
            queue: queue.clone(),
            latencies: latencies.clone(),
            monitor: monitor.clone(),
            progress: Arc::new(ProgressCounter::new(queue.total() as u64, self.progress.clone())),
            commit: self.config.commit,
            apply_delays: self.config.apply_delays,
        };
        let threads = self.thread_count();

        self.transition(RunState::Running);
        info!(threads, items = queue.total(), "starting workload");
        let start = Instant::now();
        let handles: Vec<_> = (0..threads)
            .map(|idx| {
                let ctx = ctx.clone();
                let factory = self.factory.clone();
                let sink = self.sink.clone();
                thread::Builder::new()
                    .name(format!("bidbench-worker-{}", idx))
                    .spawn(move || {
                        match ExecutorGuard::acquire(factory.as_ref(), sink) {
                            Ok(executor) => Client::new(idx, executor, ctx).run(),
                            Err(e) => {
                                ctx.monitor.notify_about_error(e.into());
                                None
                            }
                        }
                    })
            })
            .collect();

        let mut executed = 0;
        for handle in handles {
            match handle {
                Ok(handle) => match handle.join() {
                    Ok(count) => executed += count.unwrap_or(0),
                    Err(_) => {
                        monitor.notify_about_error(Error::WorkerPanicked);
                    }
                },
                Err(e) => {
                    monitor.notify_about_error(e.into());
                }
            }
        }
        let elapsed = start.elapsed();

        let flushed = self.sink.as_ref().map_or(Ok(()), |sink| sink.flush());
        if monitor.is_aborted() {
            self.transition(RunState::Aborted);
            if let Err(e) = flushed {
                warn!(error = %e, "failed to flush report sink");
            }
            let first = monitor.take_error().unwrap_or(Error::WorkerPanicked);
            return Err(Error::Aborted(Box::new(first)));
        }
        flushed?;
        self.transition(RunState::Completed);
        info!(executed, elapsed = ?elapsed, "workload finished");
        Ok(RunReport {
            elapsed,
            executed,
            latencies,
            templates,
        })
    }
}
