//! Latency sinks and the end-of-run summary.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use crate::engine::RunReport;
use crate::error::Result;
use crate::operation::OperationInstance;

/// Receives one record per executed operation. Shared by every worker.
pub trait ReportSink: Send + Sync {
    fn record(&self, operation: &str, latency_nanos: u64);

    fn flush(&self) -> Result<()>;
}

/// Records `op` as `<language>:<template>` when a sink is attached.
pub(crate) fn record_latency(
    sink: &Option<Arc<dyn ReportSink>>,
    op: &OperationInstance,
    latency: Duration,
) {
    if let Some(sink) = sink {
        let description = format!("{}:{}", op.language, op.label);
        sink.record(&description, latency.as_nanos() as u64);
    }
}

/// Writes `operation,latency_ns` rows to a CSV file.
pub struct CsvSink {
    writer: Mutex<csv::Writer<BufWriter<File>>>,
}

impl CsvSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(BufWriter::new(file));
        writer.write_record(["operation", "latency_ns"])?;
        Ok(CsvSink {
            writer: Mutex::new(writer),
        })
    }
}

impl ReportSink for CsvSink {
    fn record(&self, operation: &str, latency_nanos: u64) {
        let latency = latency_nanos.to_string();
        let mut writer = self.writer.lock();
        if let Err(error) = writer.write_record([operation, latency.as_str()]) {
            warn!(%error, "dropping latency record");
        }
    }

    fn flush(&self) -> Result<()> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<(String, u64)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(String, u64)> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for MemorySink {
    fn record(&self, operation: &str, latency_nanos: u64) {
        self.records.lock().push((operation.to_string(), latency_nanos));
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

fn micros(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000_000.0
}

pub fn print_summary(report: &RunReport) {
    let secs = report.elapsed.as_secs_f64();
    println!(
        "{:.2} s ({:.2} ops)",
        secs,
        if secs > 0.0 {
            report.executed as f64 / secs
        } else {
            0.0
        }
    );
    println!(
        "{:<32} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "template", "count", "mean(us)", "p50(us)", "p95(us)", "p99(us)", "max(us)"
    );
    for (id, summary) in report.latencies.summaries() {
        let name = report
            .templates
            .get(&id)
            .map(String::as_str)
            .unwrap_or("?");
        println!(
            "{:<32} {:>8} {:>10.1} {:>10.1} {:>10.1} {:>10.1} {:>10.1}",
            name,
            summary.count,
            micros(summary.mean),
            micros(summary.p50),
            micros(summary.p95),
            micros(summary.p99),
            micros(summary.max)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_sink_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latencies.csv");
        let sink = CsvSink::create(&path).unwrap();
        sink.record("sql:InsertUser", 1500);
        sink.record("sql:SelectAuctionById", 42);
        sink.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "operation,latency_ns\nsql:InsertUser,1500\nsql:SelectAuctionById,42\n"
        );
    }

    #[test]
    fn memory_sink_collects_from_threads() {
        let sink = Arc::new(MemorySink::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for n in 0..100 {
                        sink.record(&format!("t{}", i), n);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sink.len(), 400);
    }
}
