use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::Error;

/// Abort flag and first-error slot shared by the workers of one run.
///
/// Workers check `is_aborted` before each unit of work. An operation already
/// in flight finishes before its worker notices, so stopping is prompt but
/// not immediate.
#[derive(Default)]
pub struct ThreadMonitor {
    aborted: AtomicBool,
    first_error: Mutex<Option<Error>>,
}

impl ThreadMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error` if no worker has failed yet and raises the abort flag.
    /// Returns whether this call's error was the one kept.
    pub fn notify_about_error(&self, error: Error) -> bool {
        let mut slot = self.first_error.lock();
        self.aborted.store(true, Ordering::Release);
        if slot.is_some() {
            return false;
        }
        *slot = Some(error);
        true
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn take_error(&self) -> Option<Error> {
        self.first_error.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn first_writer_wins() {
        let monitor = Arc::new(ThreadMonitor::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let monitor = monitor.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    monitor.notify_about_error(Error::config(format!("worker {}", i)))
                })
            })
            .collect();
        let kept = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|kept| *kept)
            .count();
        assert_eq!(kept, 1);
        assert!(monitor.is_aborted());
        assert!(matches!(monitor.take_error(), Some(Error::Configuration(_))));
        assert!(monitor.take_error().is_none());
    }

    #[test]
    fn fresh_monitor_is_not_aborted() {
        let monitor = ThreadMonitor::new();
        assert!(!monitor.is_aborted());
        assert!(monitor.take_error().is_none());
    }
}
