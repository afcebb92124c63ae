//! Auction/bid benchmark client: synthetic data generation and concurrent
//! replay of weighted operation mixes against pluggable executors.

pub mod bench;
pub mod client;
pub mod config;
pub mod datagen;
pub mod db;
pub mod engine;
pub mod error;
pub mod generators;
pub mod latency;
pub mod monitor;
pub mod operation;
pub mod profile;
pub mod progress;
pub mod report;
pub mod workloads;

pub use error::{Error, ExecResult, ExecutorError, Result};
