//! Operation catalogs: which templates a benchmark variant issues and how
//! they render rows, DDL and row counts in each language.

mod auction;

pub use auction::{auction_row, bid_row, category_row, user_row, MAX_ID};

use std::str::FromStr;

use once_cell::sync::Lazy;
use rand::{Rng, RngCore};
use serde_json::{Map, Value};
use tracing::info;

use crate::db::Executor;
use crate::error::{Error, Result};
use crate::generators::{self, Counter, NumberGenerator, Uniform};
use crate::operation::{
    Category, Entity, Language, MqlAction, MqlCommand, OperationInstance, OperationTemplate,
    TemplateId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Field {
    fn sql_literal(&self) -> String {
        match self {
            Field::Int(v) => v.to_string(),
            Field::Float(v) => format!("{:.2}", v),
            Field::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    fn json(&self) -> Value {
        match self {
            Field::Int(v) => Value::from(*v),
            Field::Float(v) => Value::from(*v),
            Field::Text(s) => Value::from(s.as_str()),
        }
    }
}

/// Column name / value pairs of one synthesized entity.
pub type Row = Vec<(&'static str, Field)>;

/// Renders `rows` as one multi-row insert (SQL) or `insertMany` (MQL).
pub fn insert_rows(
    label: &'static str,
    entity: Entity,
    rows: &[Row],
    language: Language,
) -> OperationInstance {
    let op = match language {
        Language::Sql => {
            let columns = rows
                .first()
                .map(|row| row.iter().map(|(c, _)| *c).collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            let values = rows
                .iter()
                .map(|row| {
                    let fields: Vec<String> = row.iter().map(|(_, f)| f.sql_literal()).collect();
                    format!("({})", fields.join(", "))
                })
                .collect::<Vec<_>>()
                .join(", ");
            OperationInstance::sql(
                label,
                Category::Insert,
                entity,
                format!("INSERT INTO {} ({}) VALUES {}", entity.table(), columns, values),
            )
        }
        Language::Mql => {
            let docs = rows
                .iter()
                .map(|row| {
                    let mut doc = Map::new();
                    for (column, field) in row {
                        let key = if *column == "id" { "_id" } else { column };
                        doc.insert(key.to_string(), field.json());
                    }
                    Value::Object(doc)
                })
                .collect();
            OperationInstance::mql(
                label,
                Category::Insert,
                entity,
                MqlCommand::new(entity.table(), MqlAction::InsertMany(docs)),
            )
        }
    };
    op.with_rows(rows.len() as u64)
}

/// Row counts captured once before a profile is expanded, plus the id
/// sequences insert templates draw from.
///
/// Counts are never refreshed while a run inserts rows, so every id an
/// operation references lies within the pre-run population.
pub struct SchemaCounts {
    counts: [u64; 4],
    next_ids: [Counter; 4],
    auction_chooser: Box<dyn NumberGenerator>,
}

fn slot(entity: Entity) -> usize {
    match entity {
        Entity::ItemCategory => 0,
        Entity::User => 1,
        Entity::Auction => 2,
        Entity::Bid => 3,
    }
}

impl SchemaCounts {
    pub fn new(categories: u64, users: u64, auctions: u64, bids: u64) -> Self {
        let counts = [categories, users, auctions, bids];
        Self::with_last_ids(counts, counts)
    }

    fn with_last_ids(counts: [u64; 4], last_ids: [u64; 4]) -> Self {
        SchemaCounts {
            counts,
            next_ids: last_ids.map(|id| Counter::new(id + 1)),
            auction_chooser: Box::new(Uniform::new(1, counts[slot(Entity::Auction)].max(1))),
        }
    }

    /// Chooses referenced auctions with the named distribution instead of uniformly.
    pub fn with_request_distribution(mut self, name: &str) -> Result<Self> {
        let auctions = self.count(Entity::Auction).max(1);
        self.auction_chooser = generators::from_distribution(name, 1, auctions)?;
        Ok(self)
    }

    /// Reads the current row count and highest id of every entity through
    /// `executor`. New ids continue after the highest id, so rows deleted by
    /// an earlier run never cause a key collision.
    pub fn capture(
        executor: &mut dyn Executor,
        catalog: &OperationCatalog,
        language: Language,
    ) -> Result<Self> {
        let mut counts = [0u64; 4];
        let mut last_ids = [0u64; 4];
        for entity in Entity::ALL {
            let rows = executor.execute_scalar(&catalog.count_query(entity, language))?;
            let last = executor.execute_scalar(&catalog.max_id_query(entity, language))?;
            counts[slot(entity)] = u64::try_from(rows).unwrap_or(0);
            last_ids[slot(entity)] = u64::try_from(last).unwrap_or(0);
        }
        let [categories, users, auctions, bids] = counts;
        info!(categories, users, auctions, bids, last_ids = ?last_ids, "captured row counts");
        Ok(Self::with_last_ids(counts, last_ids))
    }

    pub fn count(&self, entity: Entity) -> u64 {
        self.counts[slot(entity)]
    }

    pub fn next_id(&self, entity: Entity) -> u64 {
        self.next_ids[slot(entity)].next_id()
    }

    /// An id of an existing row. Empty tables yield id 1.
    pub fn random_id(&self, rng: &mut dyn RngCore, entity: Entity) -> u64 {
        match entity {
            Entity::Auction => self.auction_chooser.next(rng),
            _ => rng.gen_range(1..=self.count(entity).max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// SQL only, without complex selects.
    Basic,
    /// Every SQL template.
    Extended,
    /// SQL and MQL templates against the same logical schema.
    MultiProtocol,
}

impl Variant {
    pub fn languages(&self) -> &'static [Language] {
        match self {
            Variant::Basic | Variant::Extended => &[Language::Sql],
            Variant::MultiProtocol => &Language::ALL,
        }
    }

    fn includes(&self, language: Language, extended: bool) -> bool {
        match self {
            Variant::Basic => language == Language::Sql && !extended,
            Variant::Extended => language == Language::Sql,
            Variant::MultiProtocol => true,
        }
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Variant::Basic),
            "extended" => Ok(Variant::Extended),
            "multi" => Ok(Variant::MultiProtocol),
            _ => Err(Error::config(format!("unknown variant {:?}", s))),
        }
    }
}

static BASIC: Lazy<OperationCatalog> = Lazy::new(|| OperationCatalog::new(Variant::Basic));
static EXTENDED: Lazy<OperationCatalog> = Lazy::new(|| OperationCatalog::new(Variant::Extended));
static MULTI: Lazy<OperationCatalog> =
    Lazy::new(|| OperationCatalog::new(Variant::MultiProtocol));

/// The immutable set of templates one benchmark variant issues.
#[derive(Debug)]
pub struct OperationCatalog {
    variant: Variant,
    templates: Vec<OperationTemplate>,
}

impl OperationCatalog {
    pub fn new(variant: Variant) -> Self {
        let templates = auction::TEMPLATES
            .iter()
            .filter(|def| variant.includes(def.language, def.extended))
            .enumerate()
            .map(|(idx, def)| {
                OperationTemplate::new(
                    TemplateId(idx),
                    def.name,
                    def.language,
                    def.category,
                    def.instantiate,
                )
            })
            .collect();
        OperationCatalog { variant, templates }
    }

    /// Process-wide catalog for `variant`, built on first use.
    pub fn shared(variant: Variant) -> &'static OperationCatalog {
        match variant {
            Variant::Basic => Lazy::force(&BASIC),
            Variant::Extended => Lazy::force(&EXTENDED),
            Variant::MultiProtocol => Lazy::force(&MULTI),
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn templates(&self) -> &[OperationTemplate] {
        &self.templates
    }

    pub fn template(&self, id: TemplateId) -> Option<&OperationTemplate> {
        self.templates.get(id.0)
    }

    /// Every template of `category` written in `language`. May be empty.
    pub fn resolve(&self, category: Category, language: Language) -> Vec<&OperationTemplate> {
        self.templates
            .iter()
            .filter(|t| t.category == category && t.language == language)
            .collect()
    }

    pub fn by_name(&self, name: &str, language: Language) -> Option<&OperationTemplate> {
        self.templates
            .iter()
            .find(|t| t.name == name && t.language == language)
    }

    /// Drops and recreates every table or collection.
    pub fn schema(&self, language: Language) -> Vec<OperationInstance> {
        auction::schema(language)
    }

    pub fn count_query(&self, entity: Entity, language: Language) -> OperationInstance {
        auction::count_query(entity, language)
    }

    /// Scalar query returning the highest id of `entity`, or 0 when empty.
    pub fn max_id_query(&self, entity: Entity, language: Language) -> OperationInstance {
        auction::max_id_query(entity, language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn variants_filter_templates() {
        let basic = OperationCatalog::new(Variant::Basic);
        assert!(basic.resolve(Category::ComplexSelect, Language::Sql).is_empty());
        assert!(basic.resolve(Category::Insert, Language::Mql).is_empty());
        assert_eq!(basic.resolve(Category::Insert, Language::Sql).len(), 3);

        let extended = OperationCatalog::new(Variant::Extended);
        assert_eq!(extended.resolve(Category::ComplexSelect, Language::Sql).len(), 3);

        let multi = OperationCatalog::shared(Variant::MultiProtocol);
        assert!(!multi.resolve(Category::Truncate, Language::Mql).is_empty());
        for (idx, t) in multi.templates().iter().enumerate() {
            assert_eq!(t.id, TemplateId(idx));
            assert_eq!(multi.template(t.id).unwrap().name, t.name);
        }
    }

    #[test]
    fn template_languages_match_payloads() {
        let catalog = OperationCatalog::shared(Variant::MultiProtocol);
        let counts = SchemaCounts::new(5, 100, 100, 500);
        let mut rng = StdRng::seed_from_u64(3);
        for t in catalog.templates() {
            let op = t.instantiate(&mut rng, &counts);
            assert_eq!(op.language, t.language, "{}", t.name);
            assert_eq!(op.category, t.category, "{}", t.name);
            assert_eq!(op.label, t.name);
            match op.language {
                Language::Sql => assert!(op.sql.is_some() && op.mql.is_none()),
                Language::Mql => assert!(op.mql.is_some() && op.sql.is_none()),
            }
        }
    }

    #[test]
    fn insert_ids_follow_captured_counts() {
        let counts = SchemaCounts::new(5, 100, 40, 0);
        assert_eq!(counts.next_id(Entity::User), 101);
        assert_eq!(counts.next_id(Entity::User), 102);
        assert_eq!(counts.next_id(Entity::Auction), 41);
        assert_eq!(counts.next_id(Entity::Bid), 1);
        assert_eq!(counts.count(Entity::User), 100);
    }

    #[test]
    fn random_ids_stay_in_population() {
        let counts = SchemaCounts::new(3, 10, 20, 0)
            .with_request_distribution("zipfian")
            .unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            assert!((1..=20).contains(&counts.random_id(&mut rng, Entity::Auction)));
            assert!((1..=10).contains(&counts.random_id(&mut rng, Entity::User)));
            assert_eq!(counts.random_id(&mut rng, Entity::Bid), 1);
        }
    }

    #[test]
    fn multi_row_insert_rendering() {
        let rows = vec![
            vec![("id", Field::Int(1)), ("name", Field::Text("o'neil".to_string()))],
            vec![("id", Field::Int(2)), ("name", Field::Text("ann".to_string()))],
        ];
        let sql = insert_rows("Seed", Entity::User, &rows, Language::Sql);
        assert_eq!(sql.rows, 2);
        assert_eq!(
            sql.sql.as_deref(),
            Some("INSERT INTO users (id, name) VALUES (1, 'o''neil'), (2, 'ann')")
        );

        let mql = insert_rows("Seed", Entity::User, &rows, Language::Mql);
        assert_eq!(
            mql.render(),
            r#"db.users.insertMany([{"_id":1,"name":"o'neil"},{"_id":2,"name":"ann"}])"#
        );
    }
}
