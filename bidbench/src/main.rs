use std::path::PathBuf;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use tracing::Level;

use bidbench::bench::Benchmark;
use bidbench::config::{self, Properties};
use bidbench::progress::ConsoleProgress;
use bidbench::report::print_summary;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Phase {
    /// Drop and recreate tables and collections.
    Schema,
    /// Populate categories, users, auctions and bids.
    Data,
    /// Run the configured operation mix and report latencies.
    Workload,
    /// Run the operation mix without recording latencies.
    Warmup,
}

#[derive(Parser, Debug)]
#[command(name = "bidbench", about = "Auction workload benchmark client")]
struct Cli {
    #[arg(value_enum)]
    phase: Phase,

    /// Scales entity counts (data) or operation counts (workload, warmup).
    multiplier: Option<u64>,

    /// Property file; later files extend earlier ones.
    #[arg(short = 'P', value_name = "FILE")]
    property_files: Vec<PathBuf>,

    /// Property override.
    #[arg(short = 'p', value_name = "KEY=VALUE")]
    properties: Vec<String>,

    /// SQLite database path, or :memory:.
    #[arg(long)]
    host: Option<String>,

    /// sql, mql or multi.
    #[arg(long)]
    protocol: Option<String>,

    /// Write per-operation latencies to this CSV file.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write the expanded workload to this file before running it.
    #[arg(long = "dump-queries", value_name = "FILE")]
    dump_queries: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let mut table = config::load(&cli.property_files, &cli.properties)?;
    if let Some(host) = cli.host {
        table.insert("host".to_string(), toml::Value::from(host));
    }
    if let Some(protocol) = cli.protocol {
        table.insert("protocol".to_string(), toml::Value::from(protocol));
    }
    let props = Properties::parse(table)?;
    let multiplier = cli.multiplier.unwrap_or(props.multiplier);
    let bench = Benchmark::new(props)?.with_progress(Arc::new(ConsoleProgress::new()));

    match cli.phase {
        Phase::Schema => {
            println!("creating schema...");
            bench.schema()?;
        }
        Phase::Data => {
            println!("setup initial data...");
            let summary = bench.data(multiplier)?;
            let secs = summary.elapsed.as_secs_f64();
            let rows = summary.categories + summary.users + summary.auctions + summary.bids;
            println!(
                "{:.2} s ({:.2} rows/s)",
                secs,
                if secs > 0.0 { rows as f64 / secs } else { 0.0 }
            );
        }
        Phase::Workload => {
            println!("START");
            let report = bench.workload(multiplier, cli.csv.as_deref(), cli.dump_queries.as_deref())?;
            print_summary(&report);
        }
        Phase::Warmup => {
            println!("warming up...");
            bench.warmup(multiplier)?;
        }
    }
    Ok(())
}
