//! Shared builders and a store wrapper with injectable failures.
//!
//! `FlakyStore` delegates to an `InMemoryStore` but can be told to fail
//! profile lookups or trade history reads for chosen entities, which is
//! how the tests provoke evaluator and entity failures.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use address_tagger::config::AppConfig;
use address_tagger::store::memory::InMemoryStore;
use address_tagger::store::ProfileStore;
use address_tagger::types::{EntityProfile, MarketCategory, MonthlyPnl, Outcome, TradeRecord, TradeSide};

const CATEGORIES: [&str; 6] = ["trading_style", "expertise", "risk", "strategy", "special", "social"];

pub const HIGH_WIN_RATE: &str = "
[tags.trading_style.high_win_rate]
win_rate_threshold = 0.55
min_trades = 10
";

pub const INSTITUTION: &str = "
[tags.special.institution]
min_total_volume = 1000000.0
min_win_rate = 0.6
min_trades = 100
";

pub const BOT: &str = "
[tags.special.bot]
max_time_variance = 60.0
max_unique_amounts = 3
max_response_time = 5.0
";

/// A validated config holding only `rules`; the remaining category
/// sections are added empty.
pub fn config(rules: &str) -> AppConfig {
    let mut toml = format!(
        "[database]\nurl = \"sqlite::memory:\"\nmax_connections = 1\n\n\
         [engine]\nconcurrency = 2\nprogress_every = 1\n\n{rules}\n"
    );
    for section in CATEGORIES {
        if !rules.contains(&format!("[tags.{section}")) {
            toml.push_str(&format!("\n[tags.{section}]\n"));
        }
    }
    AppConfig::from_toml_str(&toml).expect("test config must be valid")
}

pub fn profile(id: i64, total_trades: u64, win_rate: f64) -> EntityProfile {
    EntityProfile {
        id,
        address: format!("0x{id:040x}"),
        total_trades,
        win_rate,
        avg_trade_size: 100.0,
        total_volume: 100.0 * total_trades as f64,
    }
}

pub fn trade(id: i64, market_id: i64, timestamp: DateTime<Utc>) -> TradeRecord {
    TradeRecord {
        trade_id: id,
        market_id,
        timestamp,
        price: 0.5,
        amount: 100.0,
        side: TradeSide::Buy,
        outcome: Outcome::Yes,
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ---------------------------------------------------------------------------
// FlakyStore
// ---------------------------------------------------------------------------

pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    broken_profiles: HashSet<i64>,
    broken_trades: HashSet<i64>,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            broken_profiles: HashSet::new(),
            broken_trades: HashSet::new(),
        }
    }

    /// Fail every profile lookup of `entity_id`.
    pub fn break_profile(mut self, entity_id: i64) -> Self {
        self.broken_profiles.insert(entity_id);
        self
    }

    /// Fail every trade history read of `entity_id`.
    pub fn break_trades(mut self, entity_id: i64) -> Self {
        self.broken_trades.insert(entity_id);
        self
    }
}

#[async_trait]
impl ProfileStore for FlakyStore {
    async fn entity(&self, id: i64) -> Result<Option<EntityProfile>> {
        if self.broken_profiles.contains(&id) {
            bail!("connection reset while loading entity {id}");
        }
        self.inner.entity(id).await
    }

    async fn entity_ids(&self, limit: Option<usize>) -> Result<Vec<i64>> {
        self.inner.entity_ids(limit).await
    }

    async fn recently_active(&self, since: DateTime<Utc>) -> Result<Vec<i64>> {
        self.inner.recently_active(since).await
    }

    async fn trades(&self, entity_id: i64) -> Result<Vec<TradeRecord>> {
        if self.broken_trades.contains(&entity_id) {
            bail!("query timed out reading trades of {entity_id}");
        }
        self.inner.trades(entity_id).await
    }

    async fn category_trade_count(&self, entity_id: i64, category: MarketCategory) -> Result<u64> {
        self.inner.category_trade_count(entity_id, category).await
    }

    async fn keyword_trade_count(
        &self,
        entity_id: i64,
        keywords: &[String],
        parent: Option<MarketCategory>,
    ) -> Result<u64> {
        self.inner.keyword_trade_count(entity_id, keywords, parent).await
    }

    async fn recent_trade_count(&self, entity_id: i64, since: DateTime<Utc>) -> Result<u64> {
        self.inner.recent_trade_count(entity_id, since).await
    }

    async fn monthly_pnl(&self, entity_id: i64) -> Result<Vec<MonthlyPnl>> {
        self.inner.monthly_pnl(entity_id).await
    }

    async fn price_distribution(&self, entity_id: i64) -> Result<Vec<f64>> {
        self.inner.price_distribution(entity_id).await
    }

    async fn late_entry_count(&self, entity_id: i64, days: u32) -> Result<u64> {
        self.inner.late_entry_count(entity_id, days).await
    }

    async fn early_entry_count(&self, entity_id: i64, hours: u32) -> Result<u64> {
        self.inner.early_entry_count(entity_id, hours).await
    }
}
