//! The schema, data, workload and warmup phases of a benchmark.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::config::{Properties, Protocol};
use crate::datagen::{DataGenerator, GenerationSummary};
use crate::db::{
    ExecutorFactory, ExecutorGuard, MemoryFactory, MemoryStore, MultiplexFactory, SqliteFactory,
};
use crate::engine::{RunReport, WorkloadEngine};
use crate::error::Result;
use crate::operation::Language;
use crate::profile::{expand, WorkloadPlan};
use crate::progress::{NoProgress, ProgressReporter};
use crate::report::{CsvSink, ReportSink};
use crate::workloads::{OperationCatalog, SchemaCounts};

/// Builds the executor factory the properties describe.
///
/// Relational sessions go to SQLite at `host`, or to an in-process store
/// when `db = "memory"`. Document sessions always use an in-process store.
pub fn build_factory(props: &Properties) -> Result<Arc<dyn ExecutorFactory>> {
    let sql = || -> Result<Arc<dyn ExecutorFactory>> {
        if props.db == "memory" {
            Ok(Arc::new(MemoryFactory::for_language(
                Arc::new(MemoryStore::new()),
                Language::Sql,
            )))
        } else {
            Ok(Arc::new(SqliteFactory::new(&props.host)?))
        }
    };
    let mql = || -> Arc<dyn ExecutorFactory> {
        Arc::new(MemoryFactory::for_language(
            Arc::new(MemoryStore::new()),
            Language::Mql,
        ))
    };
    Ok(match props.protocol()? {
        Protocol::Sql => sql()?,
        Protocol::Mql => mql(),
        Protocol::Multi => Arc::new(
            MultiplexFactory::new()
                .with(Language::Sql, sql()?)
                .with(Language::Mql, mql()),
        ),
    })
}

pub struct Benchmark {
    props: Properties,
    catalog: &'static OperationCatalog,
    factory: Arc<dyn ExecutorFactory>,
    progress: Arc<dyn ProgressReporter>,
}

impl Benchmark {
    pub fn new(props: Properties) -> Result<Self> {
        let factory = build_factory(&props)?;
        Self::with_factory(props, factory)
    }

    pub fn with_factory(props: Properties, factory: Arc<dyn ExecutorFactory>) -> Result<Self> {
        let catalog = OperationCatalog::shared(props.variant()?);
        Ok(Benchmark {
            props,
            catalog,
            factory,
            progress: Arc::new(NoProgress),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn catalog(&self) -> &'static OperationCatalog {
        self.catalog
    }

    pub fn factory(&self) -> &Arc<dyn ExecutorFactory> {
        &self.factory
    }

    fn generator(&self, multiplier: u64) -> Result<DataGenerator> {
        let config = self.props.generation_config()?.scaled(multiplier);
        Ok(DataGenerator::new(config, self.factory.clone()).with_progress(self.progress.clone()))
    }

    pub fn schema(&self) -> Result<()> {
        let languages = self.props.protocol()?.languages();
        self.generator(1)?.create_schema(self.catalog, languages)
    }

    pub fn data(&self, multiplier: u64) -> Result<GenerationSummary> {
        self.generator(multiplier)?.generate()
    }

    /// Captures row counts and expands the profile scaled by `multiplier`.
    pub fn plan(&self, multiplier: u64) -> Result<WorkloadPlan> {
        let language = self.props.language()?;
        let mut executor = ExecutorGuard::acquire(self.factory.as_ref(), None)?;
        let counts = SchemaCounts::capture(&mut *executor, self.catalog, language)?
            .with_request_distribution(&self.props.request_distribution)?;
        executor.close()?;

        let profile = self.props.profile()?.scaled(multiplier);
        let mut rng = match self.props.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        expand(&profile, self.catalog, &counts, self.props.mode()?, &mut rng)
    }

    /// Runs the profile, recording latencies to `csv` when given and
    /// writing the expanded item list to `dump` before starting.
    pub fn workload(
        &self,
        multiplier: u64,
        csv: Option<&Path>,
        dump: Option<&Path>,
    ) -> Result<RunReport> {
        let plan = self.plan(multiplier)?;
        if let Some(path) = dump {
            plan.dump(BufWriter::new(File::create(path)?))?;
            info!(path = %path.display(), items = plan.len(), "dumped workload");
        }
        let mut engine = WorkloadEngine::new(self.props.run_config()?, self.factory.clone())
            .with_progress(self.progress.clone());
        if let Some(path) = csv {
            let sink: Arc<dyn ReportSink> = Arc::new(CsvSink::create(path)?);
            engine = engine.with_sink(sink);
        }
        engine.run(plan)
    }

    /// Runs the profile without recording latencies.
    pub fn warmup(&self, multiplier: u64) -> Result<RunReport> {
        let plan = self.plan(multiplier)?;
        WorkloadEngine::new(self.props.run_config()?, self.factory.clone())
            .with_progress(self.progress.clone())
            .run(plan)
    }
}
