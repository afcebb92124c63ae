//! Per-template latency aggregation.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;

use crate::operation::TemplateId;

/// Latencies bucketed by template.
///
/// Every slot is registered up front, so concurrent workers only ever lock
/// the one template they are appending to.
#[derive(Debug)]
pub struct LatencyAggregate {
    slots: BTreeMap<TemplateId, Mutex<Vec<Duration>>>,
}

impl LatencyAggregate {
    pub fn new(ids: impl IntoIterator<Item = TemplateId>) -> Self {
        LatencyAggregate {
            slots: ids
                .into_iter()
                .map(|id| (id, Mutex::new(Vec::new())))
                .collect(),
        }
    }

    /// Appends a sample. Returns false for a template that was never registered.
    pub fn record(&self, id: TemplateId, latency: Duration) -> bool {
        match self.slots.get(&id) {
            Some(slot) => {
                slot.lock().push(latency);
                true
            }
            None => false,
        }
    }

    pub fn samples(&self, id: TemplateId) -> Option<Vec<Duration>> {
        self.slots.get(&id).map(|slot| slot.lock().clone())
    }

    pub fn template_ids(&self) -> Vec<TemplateId> {
        self.slots.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn total_samples(&self) -> usize {
        self.slots.values().map(|slot| slot.lock().len()).sum()
    }

    pub fn summary(&self, id: TemplateId) -> Option<LatencySummary> {
        self.slots
            .get(&id)
            .and_then(|slot| LatencySummary::from_samples(&slot.lock()))
    }

    /// Summaries of every template that received at least one sample.
    pub fn summaries(&self) -> Vec<(TemplateId, LatencySummary)> {
        self.slots
            .keys()
            .filter_map(|id| self.summary(*id).map(|s| (*id, s)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

impl LatencySummary {
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();
        let total: Duration = sorted.iter().sum();
        let percentile = |p: f64| {
            let idx = ((p / 100.0) * (n - 1) as f64).round() as usize;
            sorted[idx.min(n - 1)]
        };
        Some(LatencySummary {
            count: n,
            min: sorted[0],
            max: sorted[n - 1],
            mean: total / n as u32,
            p50: percentile(50.0),
            p95: percentile(95.0),
            p99: percentile(99.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unregistered_template_is_refused() {
        let agg = LatencyAggregate::new([TemplateId(0)]);
        assert!(agg.record(TemplateId(0), Duration::from_micros(5)));
        assert!(!agg.record(TemplateId(9), Duration::from_micros(5)));
        assert_eq!(agg.total_samples(), 1);
        assert!(agg.samples(TemplateId(9)).is_none());
    }

    #[test]
    fn concurrent_appends() {
        let agg = Arc::new(LatencyAggregate::new((0..4).map(TemplateId)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let agg = agg.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        agg.record(TemplateId((t + i) % 4), Duration::from_nanos(i as u64));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(agg.total_samples(), 2000);
        assert_eq!(agg.len(), 4);
        for id in agg.template_ids() {
            assert_eq!(agg.samples(id).unwrap().len(), 500);
        }
    }

    #[test]
    fn summary_percentiles() {
        let samples: Vec<Duration> = (1..=100).rev().map(Duration::from_millis).collect();
        let s = LatencySummary::from_samples(&samples).unwrap();
        assert_eq!(s.count, 100);
        assert_eq!(s.min, Duration::from_millis(1));
        assert_eq!(s.max, Duration::from_millis(100));
        assert_eq!(s.p50, Duration::from_millis(51));
        assert_eq!(s.p95, Duration::from_millis(95));
        assert_eq!(s.p99, Duration::from_millis(99));
        assert_eq!(s.mean, Duration::from_micros(50_500));
        assert!(LatencySummary::from_samples(&[]).is_none());
    }

    #[test]
    fn summaries_skip_empty_slots() {
        let agg = LatencyAggregate::new([TemplateId(0), TemplateId(1)]);
        agg.record(TemplateId(1), Duration::from_micros(3));
        let summaries = agg.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].0, TemplateId(1));
    }
}
