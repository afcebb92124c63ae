//! Synthetic data generation.
//!
//! Categories are written by a single worker. Users, and auctions together
//! with their bids, are split into disjoint id ranges written by parallel
//! workers. Every worker owns one executor session and one pair of batch
//! buffers, and all workers of a phase share one `ThreadMonitor`. Parent-only
//! phases commit whenever the batch threshold is reached; each auction
//! commits with its bids. Batches that were committed before an abort stay
//! committed.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::db::{capped_threads, ExecutorFactory, ExecutorGuard};
use crate::error::{Error, Result};
use crate::generators::{Counter, NumberGenerator};
use crate::monitor::ThreadMonitor;
use crate::operation::{Entity, Language};
use crate::progress::{NoProgress, ProgressCounter, ProgressReporter};
use crate::workloads::{auction_row, bid_row, category_row, insert_rows, user_row, OperationCatalog, Row};

#[derive(Clone)]
pub struct GenerationConfig {
    pub threads: usize,
    pub categories: u64,
    pub users: u64,
    pub auctions: u64,
    pub min_batch: usize,
    pub max_batch: usize,
    /// Bids written per auction.
    pub bids: Arc<dyn NumberGenerator>,
    pub language: Language,
    pub seed: Option<u64>,
    /// Share of its range a worker completes between progress reports.
    pub progress_fraction: f64,
}

impl GenerationConfig {
    /// Multiplies every entity count by `multiplier`.
    pub fn scaled(mut self, multiplier: u64) -> Self {
        self.categories *= multiplier;
        self.users *= multiplier;
        self.auctions *= multiplier;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSummary {
    pub categories: u64,
    pub users: u64,
    pub auctions: u64,
    pub bids: u64,
    pub elapsed: Duration,
}

/// Splits ids `start..start + count` into `workers` contiguous inclusive
/// ranges whose sizes differ by at most one. Empty ranges are left out.
pub fn partition(start: u64, count: u64, workers: usize) -> Vec<(u64, u64)> {
    let workers = workers.max(1) as u64;
    let mut ranges = Vec::new();
    let mut next = start;
    for idx in 0..workers {
        let len = count / workers + if idx < count % workers { 1 } else { 0 };
        if len > 0 {
            ranges.push((next, next + len - 1));
            next += len;
        }
    }
    ranges
}

/// The bidder actually stored for a bid: a bidder equal to the auction's
/// owner is moved to the next user id, or the previous one when the owner
/// has the highest id.
pub fn resolve_bidder(bidder: u64, owner: u64, users: u64) -> u64 {
    if bidder != owner {
        bidder
    } else if owner < users {
        owner + 1
    } else {
        owner - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Categories,
    Users,
    Auctions,
}

impl Phase {
    fn entity(self) -> Entity {
        match self {
            Phase::Categories => Entity::ItemCategory,
            Phase::Users => Entity::User,
            Phase::Auctions => Entity::Auction,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Phase::Categories => "GenerateCategories",
            Phase::Users => "GenerateUsers",
            Phase::Auctions => "GenerateAuctions",
        }
    }
}

#[derive(Clone)]
struct Shared {
    config: GenerationConfig,
    monitor: Arc<ThreadMonitor>,
    progress: Arc<ProgressCounter>,
    bid_ids: Arc<Counter>,
}

struct GenerationWorker {
    executor: ExecutorGuard,
    shared: Shared,
    rng: StdRng,
    threshold: usize,
    parents: Vec<Row>,
    children: Vec<Row>,
    children_written: u64,
}

impl GenerationWorker {
    fn new(executor: ExecutorGuard, shared: Shared, mut rng: StdRng) -> Self {
        let min = shared.config.min_batch.max(1);
        let max = shared.config.max_batch.max(min);
        let threshold = rng.gen_range(min..=max);
        GenerationWorker {
            executor,
            shared,
            rng,
            threshold,
            parents: Vec::new(),
            children: Vec::new(),
            children_written: 0,
        }
    }

    /// Writes ids `start..=end` of `phase`. Returns the number of child rows written.
    fn fill(&mut self, phase: Phase, start: u64, end: u64) -> Result<u64> {
        let fraction = self.shared.config.progress_fraction;
        let step = (((end - start + 1) as f64) * fraction).ceil().max(1.0) as u64;
        let mut unreported = 0;
        for id in start..=end {
            if self.shared.monitor.is_aborted() {
                break;
            }
            match phase {
                Phase::Categories => self.parents.push(category_row(id, &mut self.rng)),
                Phase::Users => self.parents.push(user_row(id, &mut self.rng)),
                Phase::Auctions => {
                    // an auction commits together with its own bids
                    self.push_auction(id)?;
                    self.flush(phase)?;
                }
            }
            if self.parents.len() >= self.threshold {
                self.flush(phase)?;
            }
            unreported += 1;
            if unreported >= step {
                self.shared.progress.advance(unreported);
                unreported = 0;
            }
        }
        self.flush(phase)?;
        self.shared.progress.advance(unreported);
        Ok(self.children_written)
    }

    fn push_auction(&mut self, id: u64) -> Result<()> {
        let config = &self.shared.config;
        let owner = self.rng.gen_range(1..=config.users);
        let category = self.rng.gen_range(1..=config.categories.max(1));
        self.parents
            .push(auction_row(id, owner, category, &mut self.rng));

        let bids = config.bids.next(&mut self.rng);
        if bids > 0 && config.users < 2 {
            return Err(Error::GenerationInvariant(format!(
                "auction {} needs a bidder other than its owner but only {} user exists",
                id, config.users
            )));
        }
        for _ in 0..bids {
            let bidder = self.rng.gen_range(1..=config.users);
            let bidder = resolve_bidder(bidder, owner, config.users);
            let bid_id = self.shared.bid_ids.next_id();
            self.children
                .push(bid_row(bid_id, id, bidder, &mut self.rng));
        }
        Ok(())
    }

    /// Parents first, then children, then one commit.
    fn flush(&mut self, phase: Phase) -> Result<()> {
        if self.parents.is_empty() && self.children.is_empty() {
            return Ok(());
        }
        let language = self.shared.config.language;
        if !self.parents.is_empty() {
            let op = insert_rows(phase.label(), phase.entity(), &self.parents, language);
            self.executor.execute(&op)?;
        }
        if !self.children.is_empty() {
            let op = insert_rows("GenerateBids", Entity::Bid, &self.children, language);
            self.executor.execute(&op)?;
        }
        self.executor.commit()?;
        debug!(
            parents = self.parents.len(),
            children = self.children.len(),
            "flushed batch"
        );
        self.children_written += self.children.len() as u64;
        self.parents.clear();
        self.children.clear();
        Ok(())
    }

    /// Best-effort rollback of whatever the failed batch left uncommitted.
    fn discard(&mut self) {
        self.parents.clear();
        self.children.clear();
        if let Err(error) = self.executor.rollback() {
            warn!(%error, "rollback after generation failure failed");
        }
    }
}

/// Populates the base entities of the auction schema.
pub struct DataGenerator {
    config: GenerationConfig,
    factory: Arc<dyn ExecutorFactory>,
    progress: Arc<dyn ProgressReporter>,
}

impl DataGenerator {
    pub fn new(config: GenerationConfig, factory: Arc<dyn ExecutorFactory>) -> Self {
        DataGenerator {
            config,
            factory,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Drops and recreates every table or collection in each of `languages`.
    pub fn create_schema(&self, catalog: &OperationCatalog, languages: &[Language]) -> Result<()> {
        let mut executor = ExecutorGuard::acquire(self.factory.as_ref(), None)?;
        for language in languages {
            info!(%language, "creating schema");
            for ddl in catalog.schema(*language) {
                executor.execute(&ddl)?;
            }
        }
        executor.commit()?;
        executor.close()?;
        Ok(())
    }

    pub fn generate(&self) -> Result<GenerationSummary> {
        let start = Instant::now();
        self.generate_seed()?;
        self.generate_users()?;
        let bids = self.generate_auctions()?;
        let summary = GenerationSummary {
            categories: self.config.categories,
            users: self.config.users,
            auctions: self.config.auctions,
            bids,
            elapsed: start.elapsed(),
        };
        info!(?summary, "data generation finished");
        Ok(summary)
    }

    /// Writes the item categories on the calling thread.
    pub fn generate_seed(&self) -> Result<()> {
        info!(categories = self.config.categories, "generating categories");
        let shared = self.shared(self.config.categories, Arc::new(Counter::new(1)));
        let executor = ExecutorGuard::acquire(self.factory.as_ref(), None)?;
        let mut worker = GenerationWorker::new(executor, shared, self.rng(Phase::Categories, 0));
        if self.config.categories > 0 {
            if let Err(e) = worker.fill(Phase::Categories, 1, self.config.categories) {
                worker.discard();
                return Err(e);
            }
        }
        worker.executor.close()?;
        Ok(())
    }

    pub fn generate_users(&self) -> Result<()> {
        info!(users = self.config.users, "generating users");
        self.run_partitioned(Phase::Users, self.config.users)
            .map(|_| ())
    }

    /// Writes auctions and their bids. Returns the number of bids written.
    pub fn generate_auctions(&self) -> Result<u64> {
        info!(auctions = self.config.auctions, "generating auctions and bids");
        if self.config.auctions > 0 && self.config.users == 0 {
            return Err(Error::GenerationInvariant(
                "auctions need at least one user as owner".to_string(),
            ));
        }
        self.run_partitioned(Phase::Auctions, self.config.auctions)
    }

    fn shared(&self, total: u64, bid_ids: Arc<Counter>) -> Shared {
        Shared {
            config: self.config.clone(),
            monitor: Arc::new(ThreadMonitor::new()),
            progress: Arc::new(ProgressCounter::new(total, self.progress.clone())),
            bid_ids,
        }
    }

    fn rng(&self, phase: Phase, worker: usize) -> StdRng {
        match self.config.seed {
            Some(seed) => {
                StdRng::seed_from_u64(seed.wrapping_add(((phase as u64) << 32) | worker as u64))
            }
            None => StdRng::from_entropy(),
        }
    }

    fn run_partitioned(&self, phase: Phase, count: u64) -> Result<u64> {
        let threads = capped_threads(self.config.threads, self.factory.as_ref());
        let shared = self.shared(count, Arc::new(Counter::new(1)));
        let handles: Vec<_> = partition(1, count, threads)
            .into_iter()
            .enumerate()
            .map(|(idx, (start, end))| {
                let shared = shared.clone();
                let factory = self.factory.clone();
                let rng = self.rng(phase, idx);
                thread::spawn(move || {
                    let monitor = shared.monitor.clone();
                    let executor = match ExecutorGuard::acquire(factory.as_ref(), None) {
                        Ok(executor) => executor,
                        Err(e) => {
                            monitor.notify_about_error(e.into());
                            return None;
                        }
                    };
                    let mut worker = GenerationWorker::new(executor, shared, rng);
                    match worker.fill(phase, start, end) {
                        Ok(children) => Some(children),
                        Err(e) => {
                            warn!(worker = idx, error = %e, "generation worker failed");
                            worker.discard();
                            monitor.notify_about_error(e);
                            None
                        }
                    }
                })
            })
            .collect();

        let mut children = 0;
        for handle in handles {
            match handle.join() {
                Ok(written) => children += written.unwrap_or(0),
                Err(_) => {
                    shared.monitor.notify_about_error(Error::WorkerPanicked);
                }
            }
        }
        if shared.monitor.is_aborted() {
            let first = shared.monitor.take_error().unwrap_or(Error::WorkerPanicked);
            return Err(Error::Aborted(Box::new(first)));
        }
        Ok(children)
    }
}
