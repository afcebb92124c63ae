use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{missing_payload, Executor, ExecutorFactory};
use crate::error::{ExecResult, ExecutorError};
use crate::operation::{Category, Entity, Language, OperationInstance};
use crate::report::{record_latency, ReportSink};
use crate::workloads::MAX_ID;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Effect {
    Add(u64),
    Remove(u64),
    Reset,
}

fn effect(op: &OperationInstance) -> Option<Effect> {
    match op.category {
        Category::Insert => Some(Effect::Add(op.rows)),
        Category::Delete => Some(Effect::Remove(1)),
        Category::Truncate | Category::Schema => Some(Effect::Reset),
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Table {
    rows: u64,
    // ids are never reused, so deletes leave this untouched
    last_id: u64,
}

/// In-process store that tracks committed row counts per entity.
///
/// Shared by every session a `MemoryFactory` opens. Payloads are checked
/// for the session's language but not interpreted.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<Entity, Table>>,
    executed: AtomicU64,
    commits: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, entity: Entity) -> u64 {
        self.tables.lock().get(&entity).map_or(0, |t| t.rows)
    }

    /// Highest id ever committed for `entity` since the last reset.
    pub fn last_id(&self, entity: Entity) -> u64 {
        self.tables.lock().get(&entity).map_or(0, |t| t.last_id)
    }

    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    fn apply(&self, pending: &[(Entity, Effect)]) {
        let mut tables = self.tables.lock();
        for (entity, effect) in pending {
            let table = tables.entry(*entity).or_default();
            match effect {
                Effect::Add(k) => {
                    table.rows += k;
                    table.last_id += k;
                }
                Effect::Remove(k) => table.rows = table.rows.saturating_sub(*k),
                Effect::Reset => *table = Table::default(),
            }
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct MemoryExecutor {
    store: Arc<MemoryStore>,
    language: Option<Language>,
    pending: Vec<(Entity, Effect)>,
    closed: bool,
    sink: Option<Arc<dyn ReportSink>>,
}

impl MemoryExecutor {
    /// A session that accepts operations of `language` only, or of any
    /// language when `None`.
    pub fn new(
        store: Arc<MemoryStore>,
        language: Option<Language>,
        sink: Option<Arc<dyn ReportSink>>,
    ) -> Self {
        MemoryExecutor {
            store,
            language,
            pending: Vec::new(),
            closed: false,
            sink,
        }
    }

    fn check(&self, op: &OperationInstance) -> ExecResult<()> {
        if self.closed {
            return Err(ExecutorError::Closed);
        }
        if let Some(language) = self.language {
            if op.language != language {
                return Err(ExecutorError::MalformedPayload(format!(
                    "{} executor cannot run {} operation {}",
                    language, op.language, op.label
                )));
            }
        }
        let present = match op.language {
            Language::Sql => op.sql.is_some(),
            Language::Mql => op.mql.is_some(),
        };
        if present {
            Ok(())
        } else {
            Err(missing_payload(op, op.language.tag()))
        }
    }
}

impl Executor for MemoryExecutor {
    fn execute(&mut self, op: &OperationInstance) -> ExecResult<Duration> {
        let start = Instant::now();
        self.check(op)?;
        if let Some(effect) = effect(op) {
            self.pending.push((op.entity, effect));
        }
        self.store.executed.fetch_add(1, Ordering::Relaxed);
        let latency = start.elapsed();
        record_latency(&self.sink, op, latency);
        Ok(latency)
    }

    fn execute_scalar(&mut self, op: &OperationInstance) -> ExecResult<i64> {
        self.check(op)?;
        self.store.executed.fetch_add(1, Ordering::Relaxed);
        let value = if op.label == MAX_ID {
            self.store.last_id(op.entity)
        } else {
            self.store.rows(op.entity)
        };
        Ok(value as i64)
    }

    fn commit(&mut self) -> ExecResult<()> {
        if self.closed {
            return Err(ExecutorError::Closed);
        }
        self.store.apply(&self.pending);
        self.pending.clear();
        Ok(())
    }

    fn rollback(&mut self) -> ExecResult<()> {
        if self.closed {
            return Err(ExecutorError::Closed);
        }
        self.pending.clear();
        Ok(())
    }

    fn close(&mut self) -> ExecResult<()> {
        self.pending.clear();
        self.closed = true;
        Ok(())
    }
}

pub struct MemoryFactory {
    store: Arc<MemoryStore>,
    language: Option<Language>,
}

impl MemoryFactory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        MemoryFactory {
            store,
            language: None,
        }
    }

    pub fn for_language(store: Arc<MemoryStore>, language: Language) -> Self {
        MemoryFactory {
            store,
            language: Some(language),
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

impl ExecutorFactory for MemoryFactory {
    fn create_executor(&self, sink: Option<Arc<dyn ReportSink>>) -> ExecResult<Box<dyn Executor>> {
        Ok(Box::new(MemoryExecutor::new(
            self.store.clone(),
            self.language,
            sink,
        )))
    }
}
