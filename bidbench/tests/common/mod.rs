#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use bidbench::db::{Executor, ExecutorFactory};
use bidbench::operation::{Category, Entity, OperationInstance, TemplateId};
use bidbench::profile::{WorkloadItem, WorkloadPlan};
use bidbench::report::ReportSink;
use bidbench::{ExecResult, ExecutorError};

/// One attempted operation: session id, global attempt number, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub session: usize,
    pub number: usize,
    pub payload: String,
}

#[derive(Default)]
pub struct FakeState {
    pub attempts: AtomicUsize,
    pub sessions: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub closes: AtomicUsize,
    pub log: Mutex<Vec<Attempt>>,
}

impl FakeState {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<Attempt> {
        self.log.lock().clone()
    }
}

/// Records every call; fails the `fail_on`-th operation across all sessions.
pub struct FakeExecutor {
    state: Arc<FakeState>,
    session: usize,
    fail_on: Option<usize>,
    latency: Duration,
    closed: bool,
}

impl Executor for FakeExecutor {
    fn execute(&mut self, op: &OperationInstance) -> ExecResult<Duration> {
        if self.closed {
            return Err(ExecutorError::Closed);
        }
        let start = Instant::now();
        let number = self.state.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.log.lock().push(Attempt {
            session: self.session,
            number,
            payload: op.render(),
        });
        if self.fail_on == Some(number) {
            return Err(ExecutorError::Protocol(format!(
                "injected failure on operation {}",
                number
            )));
        }
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        Ok(start.elapsed())
    }

    fn execute_scalar(&mut self, _: &OperationInstance) -> ExecResult<i64> {
        Ok(0)
    }

    fn commit(&mut self) -> ExecResult<()> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> ExecResult<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> ExecResult<()> {
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub state: Arc<FakeState>,
    pub fail_on: Option<usize>,
    pub latency: Duration,
    pub max_sessions: usize,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(n: usize) -> Self {
        FakeFactory {
            fail_on: Some(n),
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl ExecutorFactory for FakeFactory {
    fn create_executor(&self, _: Option<Arc<dyn ReportSink>>) -> ExecResult<Box<dyn Executor>> {
        let session = self.state.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeExecutor {
            state: self.state.clone(),
            session,
            fail_on: self.fail_on,
            latency: self.latency,
            closed: false,
        }))
    }

    fn max_concurrent_executors(&self) -> usize {
        self.max_sessions
    }
}

/// A sink that counts flushes.
#[derive(Default)]
pub struct CountingSink {
    pub records: AtomicUsize,
    pub flushes: AtomicUsize,
}

impl ReportSink for CountingSink {
    fn record(&self, _: &str, _: u64) {
        self.records.fetch_add(1, Ordering::SeqCst);
    }

    fn flush(&self) -> bidbench::Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// `n` distinct select items, all bucketed under one template.
pub fn numbered_plan(n: usize, delay: Duration) -> WorkloadPlan {
    let mut plan = WorkloadPlan::default();
    plan.templates.insert(TemplateId(0), "sql:Numbered".to_string());
    for i in 0..n {
        plan.items.push(WorkloadItem {
            operation: OperationInstance::sql(
                "Numbered",
                Category::SimpleSelect,
                Entity::Bid,
                format!("SELECT {}", i),
            ),
            template_id: TemplateId(0),
            delay,
        });
    }
    plan
}
