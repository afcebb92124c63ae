use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use toml::Table;

use crate::datagen::GenerationConfig;
use crate::engine::{CommitGranularity, RunConfig};
use crate::error::{Error, Result};
use crate::generators;
use crate::operation::{Category, Language};
use crate::profile::{ExpansionMode, WorkloadProfile};
use crate::workloads::Variant;

/// Reads `-P` property files in order, later files extending earlier ones,
/// then applies `-p key=value` overrides.
pub fn load(files: &[PathBuf], overrides: &[String]) -> Result<Table> {
    let mut props = Table::new();
    for path in files {
        let text = std::fs::read_to_string(path)?;
        props.extend(text.parse::<Table>()?);
    }
    for kv in overrides {
        let (k, v) = kv
            .split_once('=')
            .ok_or_else(|| Error::config(format!("expected key=value, got {:?}", kv)))?;
        props.insert(k.trim().to_string(), typed_value(v.trim()));
    }
    Ok(props)
}

fn typed_value(v: &str) -> toml::Value {
    if let Ok(i) = v.parse::<i64>() {
        toml::Value::from(i)
    } else if let Ok(f) = v.parse::<f64>() {
        toml::Value::from(f)
    } else if let Ok(b) = v.to_ascii_lowercase().parse::<bool>() {
        toml::Value::from(b)
    } else {
        toml::Value::from(v)
    }
}

/// Which query languages a run speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Sql,
    Mql,
    Multi,
}

impl Protocol {
    pub fn languages(&self) -> &'static [Language] {
        match self {
            Protocol::Sql => &[Language::Sql],
            Protocol::Mql => &[Language::Mql],
            Protocol::Multi => &Language::ALL,
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sql" => Ok(Protocol::Sql),
            "mql" => Ok(Protocol::Mql),
            "multi" => Ok(Protocol::Multi),
            _ => Err(Error::config(format!("unknown protocol {:?}", s))),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Properties {
    #[serde(default = "default_db")]
    pub db: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_variant")]
    pub variant: String,

    #[serde(rename = "threadcount", default = "default_thread_count")]
    pub thread_count: usize,

    #[serde(rename = "generatorthreads", default = "default_thread_count")]
    pub generator_threads: usize,

    #[serde(rename = "categorycount", default = "default_category_count")]
    pub category_count: u64,

    #[serde(rename = "usercount", default = "default_user_count")]
    pub user_count: u64,

    #[serde(rename = "auctioncount", default = "default_auction_count")]
    pub auction_count: u64,

    #[serde(rename = "minbids", default = "default_min_bids")]
    pub min_bids: u64,

    #[serde(rename = "maxbids", default = "default_max_bids")]
    pub max_bids: u64,

    #[serde(rename = "bidsdistribution", default = "default_bids_distribution")]
    pub bids_distribution: String,

    #[serde(rename = "requestdistribution", default = "default_request_distribution")]
    pub request_distribution: String,

    #[serde(rename = "minbatchsize", default = "default_min_batch_size")]
    pub min_batch_size: usize,

    #[serde(rename = "maxbatchsize", default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(rename = "progressfraction", default = "default_progress_fraction")]
    pub progress_fraction: f64,

    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_commit")]
    pub commit: String,

    #[serde(default = "default_delays")]
    pub delays: bool,

    #[serde(default)]
    pub timeline: Vec<String>,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(rename = "operationdelay", default)]
    pub operation_delay: u64,

    #[serde(rename = "insertcount", default)]
    pub insert_count: u64,

    #[serde(rename = "simpleselectcount", default)]
    pub simple_select_count: u64,

    #[serde(rename = "complexselectcount", default)]
    pub complex_select_count: u64,

    #[serde(rename = "updatecount", default)]
    pub update_count: u64,

    #[serde(rename = "deletecount", default)]
    pub delete_count: u64,

    #[serde(rename = "truncatecount", default)]
    pub truncate_count: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: u64,

    #[serde(default)]
    pub seed: Option<u64>,

    /// Category name -> the only template that category issues.
    #[serde(rename = "pinnedtemplates", default)]
    pub pinned_templates: BTreeMap<String, String>,
}

impl Properties {
    /// Deserializes and validates a merged property table.
    pub fn parse(props: Table) -> Result<Self> {
        let props: Properties = props.try_into()?;
        props.validate()?;
        Ok(props)
    }

    fn validate(&self) -> Result<()> {
        if !matches!(&*self.db, "sqlite" | "memory") {
            return Err(Error::config(format!("unknown db {:?}", self.db)));
        }
        if self.thread_count == 0 || self.generator_threads == 0 {
            return Err(Error::config("threadcount and generatorthreads must be positive"));
        }
        if self.min_batch_size == 0 || self.min_batch_size > self.max_batch_size {
            return Err(Error::config(format!(
                "invalid batch size range [{}, {}]",
                self.min_batch_size, self.max_batch_size
            )));
        }
        if !(self.progress_fraction > 0.0 && self.progress_fraction <= 1.0) {
            return Err(Error::config(format!(
                "progressfraction must be in (0, 1], got {}",
                self.progress_fraction
            )));
        }
        if self.multiplier == 0 {
            return Err(Error::config("multiplier must be positive"));
        }
        if !matches!(&*self.request_distribution, "uniform" | "zipfian") {
            return Err(Error::config(format!(
                "invalid requestdistribution {:?}",
                self.request_distribution
            )));
        }
        generators::from_distribution(&self.bids_distribution, self.min_bids, self.max_bids)?;

        let protocol = self.protocol()?;
        let variant = self.variant()?;
        if protocol.languages().iter().any(|l| !variant.languages().contains(l)) {
            return Err(Error::config(format!(
                "protocol {} needs variant multi",
                self.protocol
            )));
        }
        let language = self.language()?;
        if !protocol.languages().contains(&language) {
            return Err(Error::config(format!(
                "language {} is not spoken by protocol {}",
                language, self.protocol
            )));
        }
        self.mode()?;
        self.commit()?;
        self.profile()?;
        Ok(())
    }

    pub fn protocol(&self) -> Result<Protocol> {
        self.protocol.parse()
    }

    pub fn variant(&self) -> Result<Variant> {
        self.variant.parse()
    }

    pub fn language(&self) -> Result<Language> {
        self.language.parse()
    }

    pub fn mode(&self) -> Result<ExpansionMode> {
        self.mode.parse()
    }

    pub fn commit(&self) -> Result<CommitGranularity> {
        self.commit.parse()
    }

    pub fn run_config(&self) -> Result<RunConfig> {
        Ok(RunConfig {
            threads: self.thread_count,
            commit: self.commit()?,
            apply_delays: self.delays,
        })
    }

    pub fn generation_config(&self) -> Result<GenerationConfig> {
        let bids = generators::from_distribution(&self.bids_distribution, self.min_bids, self.max_bids)?;
        Ok(GenerationConfig {
            threads: self.generator_threads,
            categories: self.category_count,
            users: self.user_count,
            auctions: self.auction_count,
            min_batch: self.min_batch_size,
            max_batch: self.max_batch_size,
            bids: Arc::from(bids),
            language: self.language()?,
            seed: self.seed,
            progress_fraction: self.progress_fraction,
        })
    }

    /// The `timeline` segments when present, otherwise one segment per
    /// nonzero `*count` property. Pins are applied, the multiplier is not.
    pub fn profile(&self) -> Result<WorkloadProfile> {
        let mut profile = if self.timeline.is_empty() {
            WorkloadProfile::from_counts(
                self.language()?,
                &[
                    (Category::Insert, self.insert_count),
                    (Category::SimpleSelect, self.simple_select_count),
                    (Category::ComplexSelect, self.complex_select_count),
                    (Category::Update, self.update_count),
                    (Category::Delete, self.delete_count),
                    (Category::Truncate, self.truncate_count),
                ],
                Duration::from_millis(self.operation_delay),
            )
        } else {
            WorkloadProfile::parse_timeline(&self.timeline)?
        };
        for (name, template) in &self.pinned_templates {
            let category = Category::from_name(name)
                .ok_or_else(|| Error::config(format!("unknown category {:?} in pinnedtemplates", name)))?;
            profile = profile.pin(category, template);
        }
        Ok(profile)
    }
}

fn default_db() -> String {
    "sqlite".to_string()
}
fn default_host() -> String {
    ":memory:".to_string()
}
fn default_protocol() -> String {
    "sql".to_string()
}
fn default_variant() -> String {
    "basic".to_string()
}
fn default_thread_count() -> usize {
    1
}
fn default_category_count() -> u64 {
    10
}
fn default_user_count() -> u64 {
    1000
}
fn default_auction_count() -> u64 {
    1000
}
fn default_min_bids() -> u64 {
    0
}
fn default_max_bids() -> u64 {
    10
}
fn default_bids_distribution() -> String {
    "uniform".to_string()
}
fn default_request_distribution() -> String {
    "uniform".to_string()
}
fn default_min_batch_size() -> usize {
    100
}
fn default_max_batch_size() -> usize {
    100
}
fn default_progress_fraction() -> f64 {
    0.1
}
fn default_mode() -> String {
    "shuffled".to_string()
}
fn default_commit() -> String {
    "run".to_string()
}
fn default_delays() -> bool {
    true
}
fn default_language() -> String {
    "sql".to_string()
}
fn default_multiplier() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(text: &str) -> Result<Properties> {
        Properties::parse(text.parse::<Table>().unwrap())
    }

    #[test]
    fn defaults() {
        let props = parse("").unwrap();
        assert_eq!(props.db, "sqlite");
        assert_eq!(props.host, ":memory:");
        assert_eq!(props.thread_count, 1);
        assert_eq!(props.protocol().unwrap(), Protocol::Sql);
        assert_eq!(props.variant().unwrap(), Variant::Basic);
        assert_eq!(props.mode().unwrap(), ExpansionMode::Shuffled);
        assert!(props.profile().unwrap().segments().is_empty());
    }

    #[test]
    fn files_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.toml");
        let extra = dir.path().join("extra.toml");
        std::fs::write(&base, "threadcount = 2\nvariant = \"extended\"\n").unwrap();
        let mut f = std::fs::File::create(&extra).unwrap();
        writeln!(f, "threadcount = 3\ntimeline = [\"sql-i5d100\", \"sql-c2d0\"]").unwrap();

        let table = load(
            &[base, extra],
            &[
                "delays=False".to_string(),
                "progressfraction=0.5".to_string(),
                "mode=timeline".to_string(),
            ],
        )
        .unwrap();
        let props = Properties::parse(table).unwrap();
        assert_eq!(props.thread_count, 3);
        assert!(!props.delays);
        assert_eq!(props.progress_fraction, 0.5);
        assert_eq!(props.mode().unwrap(), ExpansionMode::Timeline);
        assert_eq!(props.variant().unwrap(), Variant::Extended);
        assert_eq!(props.profile().unwrap().total_operations(), 7);
    }

    #[test]
    fn override_without_value_is_rejected() {
        assert!(matches!(
            load(&[], &["threadcount".to_string()]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn invalid_properties() {
        for text in [
            "minbatchsize = 10\nmaxbatchsize = 5",
            "threadcount = 0",
            "requestdistribution = \"constant\"",
            "bidsdistribution = \"gaussian\"",
            "protocol = \"mql\"",
            "protocol = \"multi\"\nvariant = \"multi\"\nlanguage = \"cypher\"",
            "timeline = [\"sql-i12d0\"]",
            "commit = \"sometimes\"",
            "pinnedtemplates = { lookup = \"SelectAuctionById\" }",
            "db = \"postgres\"",
            "progressfraction = 0",
        ] {
            assert!(matches!(parse(text), Err(Error::Configuration(_))), "{}", text);
        }
    }

    #[test]
    fn count_profile_with_pins() {
        let props = parse(
            "insertcount = 3\nsimpleselectcount = 2\noperationdelay = 5\n\
             [pinnedtemplates]\ninsert = \"InsertRandomBid\"\n",
        )
        .unwrap();
        let profile = props.profile().unwrap();
        let segments = profile.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].category, Category::Insert);
        assert_eq!(segments[0].count, 3);
        assert_eq!(segments[0].delay, Duration::from_millis(5));
        assert_eq!(segments[0].template.as_deref(), Some("InsertRandomBid"));
        assert_eq!(segments[1].template, None);
    }

    #[test]
    fn generation_config_from_properties() {
        let props = parse("usercount = 7\nminbids = 2\nmaxbids = 2\nbidsdistribution = \"constant\"\nseed = 9").unwrap();
        let config = props.generation_config().unwrap();
        assert_eq!(config.users, 7);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.language, Language::Sql);
    }
}
