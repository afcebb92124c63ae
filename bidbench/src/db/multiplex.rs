use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::{Executor, ExecutorFactory};
use crate::error::{ExecResult, ExecutorError};
use crate::operation::{Language, OperationInstance};
use crate::report::ReportSink;

/// Routes each operation to the adapter bound to its language tag.
///
/// `commit`, `rollback` and `close` reach every adapter even when an earlier
/// one fails; the first failure is returned.
#[derive(Default)]
pub struct MultiplexExecutor {
    adapters: Vec<(Language, Box<dyn Executor>)>,
}

impl MultiplexExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `executor` to `language`, replacing any earlier binding.
    pub fn with(mut self, language: Language, executor: Box<dyn Executor>) -> Self {
        self.adapters.retain(|(l, _)| *l != language);
        self.adapters.push((language, executor));
        self
    }

    pub fn languages(&self) -> Vec<Language> {
        self.adapters.iter().map(|(l, _)| *l).collect()
    }

    fn route(&mut self, language: Language) -> ExecResult<&mut Box<dyn Executor>> {
        self.adapters
            .iter_mut()
            .find(|(l, _)| *l == language)
            .map(|(_, executor)| executor)
            .ok_or_else(|| {
                ExecutorError::MalformedPayload(format!("no executor bound for {}", language))
            })
    }

    fn for_each(
        &mut self,
        action: &str,
        mut f: impl FnMut(&mut dyn Executor) -> ExecResult<()>,
    ) -> ExecResult<()> {
        let mut first = None;
        for (language, executor) in &mut self.adapters {
            if let Err(error) = f(executor.as_mut()) {
                warn!(%language, %error, "{} failed", action);
                first.get_or_insert(error);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl Executor for MultiplexExecutor {
    fn execute(&mut self, op: &OperationInstance) -> ExecResult<Duration> {
        self.route(op.language)?.execute(op)
    }

    fn execute_scalar(&mut self, op: &OperationInstance) -> ExecResult<i64> {
        self.route(op.language)?.execute_scalar(op)
    }

    fn commit(&mut self) -> ExecResult<()> {
        self.for_each("commit", |e| e.commit())
    }

    fn rollback(&mut self) -> ExecResult<()> {
        self.for_each("rollback", |e| e.rollback())
    }

    fn close(&mut self) -> ExecResult<()> {
        self.for_each("close", |e| e.close())
    }
}

/// Opens one session per bound language and wraps them in a `MultiplexExecutor`.
#[derive(Default)]
pub struct MultiplexFactory {
    factories: Vec<(Language, Arc<dyn ExecutorFactory>)>,
}

impl MultiplexFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, language: Language, factory: Arc<dyn ExecutorFactory>) -> Self {
        self.factories.retain(|(l, _)| *l != language);
        self.factories.push((language, factory));
        self
    }
}

impl ExecutorFactory for MultiplexFactory {
    fn create_executor(&self, sink: Option<Arc<dyn ReportSink>>) -> ExecResult<Box<dyn Executor>> {
        let mut multiplex = MultiplexExecutor::new();
        for (language, factory) in &self.factories {
            match factory.create_executor(sink.clone()) {
                Ok(executor) => multiplex = multiplex.with(*language, executor),
                Err(error) => {
                    if let Err(close_error) = multiplex.close() {
                        warn!(%language, error = %close_error, "closing adapters after failed open failed");
                    }
                    return Err(error);
                }
            }
        }
        Ok(Box::new(multiplex))
    }

    fn max_concurrent_executors(&self) -> usize {
        self.factories
            .iter()
            .map(|(_, f)| f.max_concurrent_executors())
            .filter(|max| *max > 0)
            .min()
            .unwrap_or(0)
    }
}
