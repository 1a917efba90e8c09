//! Persistence seams.
//!
//! `ProfileStore` is the read side taggers query for profile and raw trade
//! data; `LabelStore` is the write side the engine persists results into.
//! Two implementations ship:
//! - `sqlite::SqliteStore`: sqlx-backed, the production store
//! - `memory::InMemoryStore`: in-process, for tests and embedding

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{EntityProfile, LabelResult, MarketCategory, MonthlyPnl, StoredLabel, TradeRecord};

/// A market row, as far as taggers care about it.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketRecord {
    pub id: i64,
    pub title: String,
    pub category: Option<MarketCategory>,
    pub created_at: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Read access to entity profiles and their trade history.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `None` when no entity has this id.
    async fn entity(&self, id: i64) -> Result<Option<EntityProfile>>;

    /// All entity ids in ascending order, optionally capped.
    async fn entity_ids(&self, limit: Option<usize>) -> Result<Vec<i64>>;

    /// Entities with at least one trade at or after `since`.
    async fn recently_active(&self, since: DateTime<Utc>) -> Result<Vec<i64>>;

    /// Every trade of an entity, oldest first.
    async fn trades(&self, entity_id: i64) -> Result<Vec<TradeRecord>>;

    async fn category_trade_count(&self, entity_id: i64, category: MarketCategory) -> Result<u64>;

    /// Trades in markets whose title contains any keyword (case-insensitive),
    /// optionally restricted to one market category.
    async fn keyword_trade_count(
        &self,
        entity_id: i64,
        keywords: &[String],
        parent: Option<MarketCategory>,
    ) -> Result<u64>;

    async fn recent_trade_count(&self, entity_id: i64, since: DateTime<Utc>) -> Result<u64>;

    /// Realised PnL per calendar month, oldest month first.
    async fn monthly_pnl(&self, entity_id: i64) -> Result<Vec<MonthlyPnl>>;

    /// Execution price of every trade.
    async fn price_distribution(&self, entity_id: i64) -> Result<Vec<f64>>;

    /// Trades placed at most `days` whole days before their market's end.
    async fn late_entry_count(&self, entity_id: i64, days: u32) -> Result<u64>;

    /// Trades placed at most `hours` whole hours after their market opened.
    async fn early_entry_count(&self, entity_id: i64, hours: u32) -> Result<u64>;
}

/// Write access to computed labels.
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Insert new labels and refresh confidence and `updated_at` of existing
    /// ones, in one transaction. Labels not in `labels` are left alone.
    async fn upsert_labels(&self, entity_id: i64, labels: &[LabelResult]) -> Result<()>;

    /// Drop the entity's automatic labels and write `labels` in their place,
    /// in one transaction. Manual labels survive.
    async fn replace_labels(&self, entity_id: i64, labels: &[LabelResult]) -> Result<()>;

    async fn labels_for(&self, entity_id: i64) -> Result<Vec<StoredLabel>>;

    async fn statistics(&self) -> Result<LabelStatistics>;

    /// Every stored label ordered by entity, category and name.
    async fn export_labels(&self) -> Result<Vec<StoredLabel>>;
}

/// How often one label is assigned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelCount {
    pub category: String,
    pub label_name: String,
    pub count: u64,
}

/// Aggregate view over every stored label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelStatistics {
    pub total_entities: u64,
    pub labelled_entities: u64,
    pub total_labels: u64,
    /// Share of entities carrying at least one label.
    pub coverage: f64,
    pub avg_labels_per_entity: f64,
    /// Most frequent first.
    pub distribution: Vec<LabelCount>,
}

impl LabelStatistics {
    pub fn from_counts(
        total_entities: u64,
        labelled_entities: u64,
        total_labels: u64,
        mut distribution: Vec<LabelCount>,
    ) -> Self {
        distribution.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.label_name.cmp(&b.label_name))
        });
        let coverage = if total_entities > 0 {
            labelled_entities as f64 / total_entities as f64
        } else {
            0.0
        };
        let avg_labels_per_entity = if labelled_entities > 0 {
            total_labels as f64 / labelled_entities as f64
        } else {
            0.0
        };
        Self {
            total_entities,
            labelled_entities,
            total_labels,
            coverage,
            avg_labels_per_entity,
            distribution,
        }
    }

    /// Counts of one label category, most frequent first.
    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a LabelCount> + 'a {
        self.distribution.iter().filter(move |c| c.category == category)
    }
}
