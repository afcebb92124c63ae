//! Operation templates and the concrete instances they produce.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde_json::Value;

use crate::error::Error;
use crate::workloads::SchemaCounts;

/// Query language an operation is written in. Executors are routed by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    Sql,
    Mql,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Sql, Language::Mql];

    pub fn tag(&self) -> &'static str {
        match self {
            Language::Sql => "sql",
            Language::Mql => "mql",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql" => Ok(Language::Sql),
            "mql" => Ok(Language::Mql),
            _ => Err(Error::config(format!("unknown language {:?}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Insert,
    SimpleSelect,
    ComplexSelect,
    Update,
    Delete,
    Truncate,
    /// DDL issued by the schema phase. Never part of a workload profile.
    Schema,
}

impl Category {
    pub const WORKLOAD: [Category; 6] = [
        Category::Insert,
        Category::SimpleSelect,
        Category::ComplexSelect,
        Category::Update,
        Category::Delete,
        Category::Truncate,
    ];

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'i' => Some(Category::Insert),
            's' => Some(Category::SimpleSelect),
            'c' => Some(Category::ComplexSelect),
            'u' => Some(Category::Update),
            'd' => Some(Category::Delete),
            't' => Some(Category::Truncate),
            _ => None,
        }
    }

    pub fn letter(&self) -> Option<char> {
        match self {
            Category::Insert => Some('i'),
            Category::SimpleSelect => Some('s'),
            Category::ComplexSelect => Some('c'),
            Category::Update => Some('u'),
            Category::Delete => Some('d'),
            Category::Truncate => Some('t'),
            Category::Schema => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Category::Insert => "insert",
            Category::SimpleSelect => "simpleselect",
            Category::ComplexSelect => "complexselect",
            Category::Update => "update",
            Category::Delete => "delete",
            Category::Truncate => "truncate",
            Category::Schema => "schema",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Category::WORKLOAD.into_iter().find(|c| c.name() == name)
    }

    fn reads(&self) -> bool {
        matches!(self, Category::SimpleSelect | Category::ComplexSelect)
    }

    /// Workload categories that modify rows. Schema DDL is not one of them.
    pub fn writes(&self) -> bool {
        matches!(
            self,
            Category::Insert | Category::Update | Category::Delete | Category::Truncate
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Table (or collection) an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entity {
    ItemCategory,
    User,
    Auction,
    Bid,
}

impl Entity {
    pub const ALL: [Entity; 4] = [Entity::ItemCategory, Entity::User, Entity::Auction, Entity::Bid];

    pub fn table(&self) -> &'static str {
        match self {
            Entity::ItemCategory => "categories",
            Entity::User => "users",
            Entity::Auction => "auctions",
            Entity::Bid => "bids",
        }
    }
}

/// A structured document-store command.
#[derive(Debug, Clone, PartialEq)]
pub struct MqlCommand {
    pub collection: &'static str,
    pub action: MqlAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MqlAction {
    InsertMany(Vec<Value>),
    Find {
        filter: Value,
        sort: Option<Value>,
        limit: Option<u64>,
    },
    Aggregate(Vec<Value>),
    Count(Value),
    UpdateOne { filter: Value, update: Value },
    DeleteOne(Value),
    DeleteMany(Value),
    Drop,
    CreateIndex(Value),
}

impl MqlCommand {
    pub fn new(collection: &'static str, action: MqlAction) -> Self {
        MqlCommand { collection, action }
    }

    /// Shell-style rendering, used for dumps and report labels.
    pub fn render(&self) -> String {
        let c = self.collection;
        match &self.action {
            MqlAction::InsertMany(docs) => {
                format!("db.{}.insertMany({})", c, Value::Array(docs.clone()))
            }
            MqlAction::Find {
                filter,
                sort,
                limit,
            } => {
                let mut s = format!("db.{}.find({})", c, filter);
                if let Some(sort) = sort {
                    s.push_str(&format!(".sort({})", sort));
                }
                if let Some(limit) = limit {
                    s.push_str(&format!(".limit({})", limit));
                }
                s
            }
            MqlAction::Aggregate(stages) => {
                format!("db.{}.aggregate({})", c, Value::Array(stages.clone()))
            }
            MqlAction::Count(filter) => format!("db.{}.countDocuments({})", c, filter),
            MqlAction::UpdateOne { filter, update } => {
                format!("db.{}.updateOne({}, {})", c, filter, update)
            }
            MqlAction::DeleteOne(filter) => format!("db.{}.deleteOne({})", c, filter),
            MqlAction::DeleteMany(filter) => format!("db.{}.deleteMany({})", c, filter),
            MqlAction::Drop => format!("db.{}.drop()", c),
            MqlAction::CreateIndex(keys) => format!("db.{}.createIndex({})", c, keys),
        }
    }
}

/// One concrete operation, ready to hand to an executor.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationInstance {
    /// Name of the template that produced this instance.
    pub label: &'static str,
    pub language: Language,
    pub category: Category,
    pub entity: Entity,
    /// Rows written by an insert; zero for every other category.
    pub rows: u64,
    pub expects_result: bool,
    pub sql: Option<String>,
    pub mql: Option<MqlCommand>,
}

impl OperationInstance {
    pub fn sql(label: &'static str, category: Category, entity: Entity, statement: String) -> Self {
        OperationInstance {
            label,
            language: Language::Sql,
            category,
            entity,
            rows: 0,
            expects_result: category.reads(),
            sql: Some(statement),
            mql: None,
        }
    }

    pub fn mql(label: &'static str, category: Category, entity: Entity, command: MqlCommand) -> Self {
        OperationInstance {
            label,
            language: Language::Mql,
            category,
            entity,
            rows: 0,
            expects_result: category.reads(),
            sql: None,
            mql: Some(command),
        }
    }

    pub fn with_rows(mut self, rows: u64) -> Self {
        self.rows = rows;
        self
    }

    /// Text of the payload in the instance's own language.
    pub fn render(&self) -> String {
        match self.language {
            Language::Sql => self.sql.clone().unwrap_or_default(),
            Language::Mql => self.mql.as_ref().map(MqlCommand::render).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(pub usize);

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type Instantiate = fn(&mut dyn RngCore, &SchemaCounts) -> OperationInstance;

/// A named family of operations sharing a generator function and a latency bucket.
#[derive(Clone)]
pub struct OperationTemplate {
    pub id: TemplateId,
    pub name: &'static str,
    pub language: Language,
    pub category: Category,
    instantiate: Instantiate,
}

impl OperationTemplate {
    pub fn new(
        id: TemplateId,
        name: &'static str,
        language: Language,
        category: Category,
        instantiate: Instantiate,
    ) -> Self {
        OperationTemplate {
            id,
            name,
            language,
            category,
            instantiate,
        }
    }

    pub fn instantiate(&self, rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
        (self.instantiate)(rng, counts)
    }

    /// `<language>:<name>`, unique within a catalog.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.language, self.name)
    }
}

impl fmt::Debug for OperationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationTemplate")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("language", &self.language)
            .field("category", &self.category)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_letters() {
        for c in Category::WORKLOAD {
            let letter = c.letter().unwrap();
            assert_eq!(Category::from_letter(letter), Some(c));
            assert_eq!(Category::from_name(c.name()), Some(c));
        }
        assert_eq!(Category::from_letter('x'), None);
        assert_eq!(Category::Schema.letter(), None);
    }

    #[test]
    fn language_parse() {
        assert_eq!("sql".parse::<Language>().unwrap(), Language::Sql);
        assert_eq!("mql".parse::<Language>().unwrap(), Language::Mql);
        assert!("cypher".parse::<Language>().is_err());
    }

    #[test]
    fn mql_render() {
        let find = MqlCommand::new(
            "bids",
            MqlAction::Find {
                filter: json!({"auction_id": 4}),
                sort: Some(json!({"amount": -1})),
                limit: Some(10),
            },
        );
        assert_eq!(
            find.render(),
            r#"db.bids.find({"auction_id":4}).sort({"amount":-1}).limit(10)"#
        );
        assert_eq!(MqlCommand::new("users", MqlAction::Drop).render(), "db.users.drop()");
    }

    #[test]
    fn reads_expect_results() {
        let select = OperationInstance::sql(
            "SelectAuctionById",
            Category::SimpleSelect,
            Entity::Auction,
            "SELECT * FROM auctions WHERE id = 1".to_string(),
        );
        assert!(select.expects_result);
        let delete = OperationInstance::mql(
            "DeleteRandomBid",
            Category::Delete,
            Entity::Bid,
            MqlCommand::new("bids", MqlAction::DeleteOne(json!({"_id": 1}))),
        );
        assert!(!delete.expects_result);
        assert_eq!(delete.render(), r#"db.bids.deleteOne({"_id":1})"#);
    }
}
