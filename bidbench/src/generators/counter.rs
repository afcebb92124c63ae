use rand::RngCore;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Generator, NumberGenerator};

/// Id sequence shared by every worker of one run.
pub struct Counter {
    counter: AtomicU64,
}

impl Counter {
    pub fn new(start: u64) -> Self {
        Counter {
            counter: AtomicU64::new(start),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to `next_id` will hand out.
    pub fn peek(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl NumberGenerator for Counter {}
impl Generator<u64> for Counter {
    fn next(&self, _: &mut dyn RngCore) -> u64 {
        self.next_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_ids_are_unique() {
        let counter = Arc::new(Counter::new(1));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || (0..250).map(|_| counter.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 1000);
        assert_eq!(ids[0], 1);
        assert_eq!(counter.peek(), 1001);
    }
}
