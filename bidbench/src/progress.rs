//! Progress reporting shared by generation and execution workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Called from every worker thread concurrently.
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, done: u64, total: u64);
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn on_progress(&self, _: u64, _: u64) {}
}

/// Prints `  NN% (done/total)` each time a new whole percentage is reached.
pub struct ConsoleProgress {
    prev_percentage: AtomicU64,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        ConsoleProgress {
            prev_percentage: AtomicU64::new(0),
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn on_progress(&self, done: u64, total: u64) {
        let percentage = if total == 0 { 100 } else { done * 100 / total };
        let prev = self.prev_percentage.fetch_max(percentage, Ordering::Relaxed);
        if percentage > prev {
            println!("  {}% ({}/{})", percentage, done, total);
        }
    }
}

/// Aggregates the units completed by all workers of one phase.
pub struct ProgressCounter {
    done: AtomicU64,
    total: u64,
    reporter: Arc<dyn ProgressReporter>,
}

impl ProgressCounter {
    pub fn new(total: u64, reporter: Arc<dyn ProgressReporter>) -> Self {
        ProgressCounter {
            done: AtomicU64::new(0),
            total,
            reporter,
        }
    }

    pub fn advance(&self, units: u64) {
        if units == 0 {
            return;
        }
        let done = self.done.fetch_add(units, Ordering::Relaxed) + units;
        self.reporter.on_progress(done, self.total);
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }
}
