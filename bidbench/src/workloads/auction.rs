use rand::{Rng, RngCore};
use serde_json::json;

use super::{insert_rows, Field, Row, SchemaCounts};
use crate::operation::{
    Category, Entity, Instantiate, Language, MqlAction, MqlCommand, OperationInstance,
};

/// Label of the scalar query that reads an entity's highest id.
pub const MAX_ID: &str = "MaxId";

pub(super) struct TemplateDef {
    pub name: &'static str,
    pub language: Language,
    pub category: Category,
    /// Only registered by the extended and multi-protocol variants.
    pub extended: bool,
    pub instantiate: Instantiate,
}

const fn def(
    name: &'static str,
    language: Language,
    category: Category,
    extended: bool,
    instantiate: Instantiate,
) -> TemplateDef {
    TemplateDef {
        name,
        language,
        category,
        extended,
        instantiate,
    }
}

use Category::*;
use Language::{Mql, Sql};

pub(super) const TEMPLATES: &[TemplateDef] = &[
    def("InsertUser", Sql, Insert, false, sql_insert_user),
    def("InsertAuction", Sql, Insert, false, sql_insert_auction),
    def("InsertRandomBid", Sql, Insert, false, sql_insert_bid),
    def("SelectAuctionById", Sql, SimpleSelect, false, sql_select_auction),
    def("SelectBidsForAuction", Sql, SimpleSelect, false, sql_select_bids),
    def("MaxBidPerCategory", Sql, ComplexSelect, true, sql_max_bid_per_category),
    def("TopBiddersInRange", Sql, ComplexSelect, true, sql_top_bidders),
    def("AuctionsWithoutBids", Sql, ComplexSelect, true, sql_auctions_without_bids),
    def("UpdateAuctionReserve", Sql, Update, false, sql_update_reserve),
    def("UpdateUserRating", Sql, Update, false, sql_update_rating),
    def("DeleteRandomBid", Sql, Delete, false, sql_delete_bid),
    def("TruncateBids", Sql, Truncate, false, sql_truncate_bids),
    def("InsertUser", Mql, Insert, true, mql_insert_user),
    def("InsertAuction", Mql, Insert, true, mql_insert_auction),
    def("InsertRandomBid", Mql, Insert, true, mql_insert_bid),
    def("SelectAuctionById", Mql, SimpleSelect, true, mql_select_auction),
    def("SelectBidsForAuction", Mql, SimpleSelect, true, mql_select_bids),
    def("MaxBidPerCategory", Mql, ComplexSelect, true, mql_max_bid_per_category),
    def("TopBiddersInRange", Mql, ComplexSelect, true, mql_top_bidders),
    def("UpdateAuctionReserve", Mql, Update, true, mql_update_reserve),
    def("UpdateUserRating", Mql, Update, true, mql_update_rating),
    def("DeleteRandomBid", Mql, Delete, true, mql_delete_bid),
    def("TruncateBids", Mql, Truncate, true, mql_truncate_bids),
];

const EPOCH: i64 = 1_600_000_000;
const YEAR_SECS: i64 = 31_536_000;
const TOP_BIDDER_SPAN: u64 = 100;

const ADJECTIVES: &[&str] = &[
    "vintage", "rare", "signed", "mint", "boxed", "antique", "limited", "restored",
];
const NOUNS: &[&str] = &[
    "camera", "guitar", "watch", "poster", "lamp", "bicycle", "vase", "typewriter",
];
const CATEGORY_NAMES: &[&str] = &[
    "collectibles", "electronics", "music", "fashion", "home", "sports", "books", "art",
];
const FIRST_NAMES: &[&str] = &["ada", "bo", "cy", "dee", "eli", "fay", "gus", "hal"];

fn pick<'a>(rng: &mut dyn RngCore, words: &[&'a str]) -> &'a str {
    words[rng.gen_range(0..words.len())]
}

fn timestamp(rng: &mut dyn RngCore) -> Field {
    Field::Int(EPOCH + rng.gen_range(0..YEAR_SECS))
}

fn amount(rng: &mut dyn RngCore) -> f64 {
    (rng.gen_range(100..1_000_000) as f64) / 100.0
}

pub fn category_row(id: u64, _rng: &mut dyn RngCore) -> Row {
    let base = CATEGORY_NAMES[(id as usize - 1) % CATEGORY_NAMES.len()];
    vec![
        ("id", Field::Int(id as i64)),
        ("name", Field::Text(format!("{}-{}", base, id))),
    ]
}

pub fn user_row(id: u64, rng: &mut dyn RngCore) -> Row {
    vec![
        ("id", Field::Int(id as i64)),
        ("name", Field::Text(format!("{}{}", pick(rng, FIRST_NAMES), id))),
        ("rating", Field::Int(rng.gen_range(0..100))),
        ("created_at", timestamp(rng)),
    ]
}

pub fn auction_row(id: u64, owner: u64, category: u64, rng: &mut dyn RngCore) -> Row {
    let title = format!("{} {}", pick(rng, ADJECTIVES), pick(rng, NOUNS));
    vec![
        ("id", Field::Int(id as i64)),
        ("owner_id", Field::Int(owner as i64)),
        ("category_id", Field::Int(category as i64)),
        ("title", Field::Text(title)),
        ("reserve_price", Field::Float(amount(rng))),
        ("created_at", timestamp(rng)),
    ]
}

pub fn bid_row(id: u64, auction: u64, bidder: u64, rng: &mut dyn RngCore) -> Row {
    vec![
        ("id", Field::Int(id as i64)),
        ("auction_id", Field::Int(auction as i64)),
        ("bidder_id", Field::Int(bidder as i64)),
        ("amount", Field::Float(amount(rng))),
        ("created_at", timestamp(rng)),
    ]
}

const SQL_SCHEMA: &[(Entity, &str)] = &[
    (Entity::Bid, "DROP TABLE IF EXISTS bids"),
    (Entity::Auction, "DROP TABLE IF EXISTS auctions"),
    (Entity::User, "DROP TABLE IF EXISTS users"),
    (Entity::ItemCategory, "DROP TABLE IF EXISTS categories"),
    (
        Entity::ItemCategory,
        "CREATE TABLE categories (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    ),
    (
        Entity::User,
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, \
         rating INTEGER NOT NULL, created_at INTEGER NOT NULL)",
    ),
    (
        Entity::Auction,
        "CREATE TABLE auctions (id INTEGER PRIMARY KEY, owner_id INTEGER NOT NULL, \
         category_id INTEGER NOT NULL, title TEXT NOT NULL, \
         reserve_price REAL NOT NULL, created_at INTEGER NOT NULL)",
    ),
    (
        Entity::Bid,
        "CREATE TABLE bids (id INTEGER PRIMARY KEY, auction_id INTEGER NOT NULL, \
         bidder_id INTEGER NOT NULL, amount REAL NOT NULL, created_at INTEGER NOT NULL)",
    ),
    (
        Entity::Auction,
        "CREATE INDEX auctions_category ON auctions (category_id)",
    ),
    (Entity::Bid, "CREATE INDEX bids_auction ON bids (auction_id)"),
    (Entity::Bid, "CREATE INDEX bids_bidder ON bids (bidder_id)"),
];

pub(super) fn schema(language: Language) -> Vec<OperationInstance> {
    match language {
        Sql => SQL_SCHEMA
            .iter()
            .map(|(entity, ddl)| OperationInstance::sql("Schema", Schema, *entity, ddl.to_string()))
            .collect(),
        Mql => {
            let mut ops: Vec<OperationInstance> = Entity::ALL
                .iter()
                .rev()
                .map(|e| {
                    let cmd = MqlCommand::new(e.table(), MqlAction::Drop);
                    OperationInstance::mql("Schema", Schema, *e, cmd)
                })
                .collect();
            let indexes = [
                (Entity::Auction, json!({"category_id": 1})),
                (Entity::Bid, json!({"auction_id": 1})),
                (Entity::Bid, json!({"bidder_id": 1})),
            ];
            for (entity, keys) in indexes {
                let cmd = MqlCommand::new(entity.table(), MqlAction::CreateIndex(keys));
                ops.push(OperationInstance::mql("Schema", Schema, entity, cmd));
            }
            ops
        }
    }
}

pub(super) fn max_id_query(entity: Entity, language: Language) -> OperationInstance {
    match language {
        Sql => OperationInstance::sql(
            MAX_ID,
            SimpleSelect,
            entity,
            format!("SELECT COALESCE(MAX(id), 0) FROM {}", entity.table()),
        ),
        Mql => OperationInstance::mql(
            MAX_ID,
            SimpleSelect,
            entity,
            MqlCommand::new(
                entity.table(),
                MqlAction::Aggregate(vec![json!({
                    "$group": { "_id": null, "max": { "$max": "$_id" } }
                })]),
            ),
        ),
    }
}

pub(super) fn count_query(entity: Entity, language: Language) -> OperationInstance {
    match language {
        Sql => OperationInstance::sql(
            "CountRows",
            SimpleSelect,
            entity,
            format!("SELECT COUNT(*) FROM {}", entity.table()),
        ),
        Mql => OperationInstance::mql(
            "CountRows",
            SimpleSelect,
            entity,
            MqlCommand::new(entity.table(), MqlAction::Count(json!({}))),
        ),
    }
}

fn new_user(rng: &mut dyn RngCore, counts: &SchemaCounts) -> Row {
    user_row(counts.next_id(Entity::User), rng)
}

fn new_auction(rng: &mut dyn RngCore, counts: &SchemaCounts) -> Row {
    let id = counts.next_id(Entity::Auction);
    let owner = counts.random_id(rng, Entity::User);
    let category = counts.random_id(rng, Entity::ItemCategory);
    auction_row(id, owner, category, rng)
}

fn new_bid(rng: &mut dyn RngCore, counts: &SchemaCounts) -> Row {
    let id = counts.next_id(Entity::Bid);
    let auction = counts.random_id(rng, Entity::Auction);
    let bidder = counts.random_id(rng, Entity::User);
    bid_row(id, auction, bidder, rng)
}

fn sql_insert_user(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    insert_rows("InsertUser", Entity::User, &[new_user(rng, counts)], Sql)
}

fn sql_insert_auction(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    insert_rows("InsertAuction", Entity::Auction, &[new_auction(rng, counts)], Sql)
}

fn sql_insert_bid(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    insert_rows("InsertRandomBid", Entity::Bid, &[new_bid(rng, counts)], Sql)
}

fn sql_select_auction(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let id = counts.random_id(rng, Entity::Auction);
    OperationInstance::sql(
        "SelectAuctionById",
        SimpleSelect,
        Entity::Auction,
        format!(
            "SELECT id, owner_id, category_id, title, reserve_price, created_at \
             FROM auctions WHERE id = {}",
            id
        ),
    )
}

fn sql_select_bids(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let auction = counts.random_id(rng, Entity::Auction);
    OperationInstance::sql(
        "SelectBidsForAuction",
        SimpleSelect,
        Entity::Bid,
        format!(
            "SELECT id, bidder_id, amount FROM bids WHERE auction_id = {} \
             ORDER BY amount DESC LIMIT 10",
            auction
        ),
    )
}

fn sql_max_bid_per_category(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let category = counts.random_id(rng, Entity::ItemCategory);
    OperationInstance::sql(
        "MaxBidPerCategory",
        ComplexSelect,
        Entity::Bid,
        format!(
            "SELECT a.category_id, MAX(b.amount), COUNT(*) FROM auctions a \
             JOIN bids b ON b.auction_id = a.id WHERE a.category_id = {} \
             GROUP BY a.category_id",
            category
        ),
    )
}

fn sql_top_bidders(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let low = counts.random_id(rng, Entity::User);
    OperationInstance::sql(
        "TopBiddersInRange",
        ComplexSelect,
        Entity::Bid,
        format!(
            "SELECT bidder_id, COUNT(*) AS placed, SUM(amount) FROM bids \
             WHERE bidder_id BETWEEN {} AND {} GROUP BY bidder_id \
             ORDER BY placed DESC LIMIT 10",
            low,
            low + TOP_BIDDER_SPAN
        ),
    )
}

fn sql_auctions_without_bids(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let category = counts.random_id(rng, Entity::ItemCategory);
    OperationInstance::sql(
        "AuctionsWithoutBids",
        ComplexSelect,
        Entity::Auction,
        format!(
            "SELECT a.id, a.title FROM auctions a LEFT JOIN bids b ON b.auction_id = a.id \
             WHERE a.category_id = {} AND b.id IS NULL LIMIT 20",
            category
        ),
    )
}

fn sql_update_reserve(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let id = counts.random_id(rng, Entity::Auction);
    OperationInstance::sql(
        "UpdateAuctionReserve",
        Update,
        Entity::Auction,
        format!(
            "UPDATE auctions SET reserve_price = {:.2} WHERE id = {}",
            amount(rng),
            id
        ),
    )
}

fn sql_update_rating(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let id = counts.random_id(rng, Entity::User);
    let delta: i64 = rng.gen_range(-2..=2);
    OperationInstance::sql(
        "UpdateUserRating",
        Update,
        Entity::User,
        format!("UPDATE users SET rating = rating + {} WHERE id = {}", delta, id),
    )
}

fn sql_delete_bid(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let id = counts.random_id(rng, Entity::Bid);
    OperationInstance::sql(
        "DeleteRandomBid",
        Delete,
        Entity::Bid,
        format!("DELETE FROM bids WHERE id = {}", id),
    )
}

fn sql_truncate_bids(_: &mut dyn RngCore, _: &SchemaCounts) -> OperationInstance {
    OperationInstance::sql("TruncateBids", Truncate, Entity::Bid, "DELETE FROM bids".to_string())
}

fn mql_insert_user(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    insert_rows("InsertUser", Entity::User, &[new_user(rng, counts)], Mql)
}

fn mql_insert_auction(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    insert_rows("InsertAuction", Entity::Auction, &[new_auction(rng, counts)], Mql)
}

fn mql_insert_bid(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    insert_rows("InsertRandomBid", Entity::Bid, &[new_bid(rng, counts)], Mql)
}

fn mql_select_auction(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let id = counts.random_id(rng, Entity::Auction);
    let find = MqlAction::Find {
        filter: json!({ "_id": id }),
        sort: None,
        limit: Some(1),
    };
    OperationInstance::mql(
        "SelectAuctionById",
        SimpleSelect,
        Entity::Auction,
        MqlCommand::new("auctions", find),
    )
}

fn mql_select_bids(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let auction = counts.random_id(rng, Entity::Auction);
    let find = MqlAction::Find {
        filter: json!({ "auction_id": auction }),
        sort: Some(json!({ "amount": -1 })),
        limit: Some(10),
    };
    OperationInstance::mql(
        "SelectBidsForAuction",
        SimpleSelect,
        Entity::Bid,
        MqlCommand::new("bids", find),
    )
}

fn mql_max_bid_per_category(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let category = counts.random_id(rng, Entity::ItemCategory);
    let pipeline = vec![
        json!({ "$match": { "category_id": category } }),
        json!({ "$lookup": {
            "from": "bids", "localField": "_id", "foreignField": "auction_id", "as": "bids"
        } }),
        json!({ "$unwind": "$bids" }),
        json!({ "$group": {
            "_id": "$category_id", "max": { "$max": "$bids.amount" }, "count": { "$sum": 1 }
        } }),
    ];
    OperationInstance::mql(
        "MaxBidPerCategory",
        ComplexSelect,
        Entity::Bid,
        MqlCommand::new("auctions", MqlAction::Aggregate(pipeline)),
    )
}

fn mql_top_bidders(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let low = counts.random_id(rng, Entity::User);
    let pipeline = vec![
        json!({ "$match": { "bidder_id": { "$gte": low, "$lte": low + TOP_BIDDER_SPAN } } }),
        json!({ "$group": {
            "_id": "$bidder_id", "placed": { "$sum": 1 }, "total": { "$sum": "$amount" }
        } }),
        json!({ "$sort": { "placed": -1 } }),
        json!({ "$limit": 10 }),
    ];
    OperationInstance::mql(
        "TopBiddersInRange",
        ComplexSelect,
        Entity::Bid,
        MqlCommand::new("bids", MqlAction::Aggregate(pipeline)),
    )
}

fn mql_update_reserve(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let id = counts.random_id(rng, Entity::Auction);
    let update = MqlAction::UpdateOne {
        filter: json!({ "_id": id }),
        update: json!({ "$set": { "reserve_price": amount(rng) } }),
    };
    OperationInstance::mql(
        "UpdateAuctionReserve",
        Update,
        Entity::Auction,
        MqlCommand::new("auctions", update),
    )
}

fn mql_update_rating(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let id = counts.random_id(rng, Entity::User);
    let delta: i64 = rng.gen_range(-2..=2);
    let update = MqlAction::UpdateOne {
        filter: json!({ "_id": id }),
        update: json!({ "$inc": { "rating": delta } }),
    };
    OperationInstance::mql(
        "UpdateUserRating",
        Update,
        Entity::User,
        MqlCommand::new("users", update),
    )
}

fn mql_delete_bid(rng: &mut dyn RngCore, counts: &SchemaCounts) -> OperationInstance {
    let id = counts.random_id(rng, Entity::Bid);
    OperationInstance::mql(
        "DeleteRandomBid",
        Delete,
        Entity::Bid,
        MqlCommand::new("bids", MqlAction::DeleteOne(json!({ "_id": id }))),
    )
}

fn mql_truncate_bids(_: &mut dyn RngCore, _: &SchemaCounts) -> OperationInstance {
    OperationInstance::mql(
        "TruncateBids",
        Truncate,
        Entity::Bid,
        MqlCommand::new("bids", MqlAction::DeleteMany(json!({}))),
    )
}
