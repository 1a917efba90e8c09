//! SQLite-backed store.
//!
//! Holds profiles, markets, trades and labels in one database through an sqlx
//! pool. Trade and market timestamps are stored as unix seconds so window
//! arithmetic stays in plain integer SQL; label audit timestamps use sqlx's
//! chrono encoding.
//!
//! The store also serves the capabilities it can derive from its own tables
//! (holding periods, trade timings, position changes).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use super::{LabelCount, LabelStatistics, LabelStore, MarketRecord, ProfileStore};
use crate::capability::{Capability, CapabilityProvider};
use crate::types::{
    EntityProfile, LabelResult, MarketCategory, MonthlyPnl, PositionChange, StoredLabel,
    TradeRecord, TradeTiming,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS addresses (
        id INTEGER PRIMARY KEY,
        address TEXT NOT NULL UNIQUE,
        total_trades INTEGER NOT NULL DEFAULT 0,
        win_rate REAL NOT NULL DEFAULT 0,
        avg_trade_size REAL NOT NULL DEFAULT 0,
        total_volume REAL NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS markets (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        category TEXT,
        created_at INTEGER,
        end_date INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS address_trades (
        id INTEGER PRIMARY KEY,
        address_id INTEGER NOT NULL REFERENCES addresses(id),
        market_id INTEGER NOT NULL REFERENCES markets(id),
        timestamp INTEGER NOT NULL,
        price REAL NOT NULL,
        amount REAL NOT NULL,
        side TEXT NOT NULL,
        outcome TEXT NOT NULL,
        pnl REAL NOT NULL DEFAULT 0,
        exit_time INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_address_trades_address_time ON address_trades(address_id, timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_address_trades_time ON address_trades(timestamp)",
    r#"
    CREATE TABLE IF NOT EXISTS address_tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        address_id INTEGER NOT NULL,
        category TEXT NOT NULL,
        tag_name TEXT NOT NULL,
        confidence_score REAL NOT NULL,
        is_manual INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(address_id, tag_name)
    )
    "#,
];

// Manual labels are never overwritten by computed ones.
const UPSERT_LABEL: &str = r#"
    INSERT INTO address_tags
        (address_id, category, tag_name, confidence_score, is_manual, created_at, updated_at)
    VALUES (?, ?, ?, ?, 0, ?, ?)
    ON CONFLICT(address_id, tag_name) DO UPDATE SET
        category = excluded.category,
        confidence_score = excluded.confidence_score,
        updated_at = excluded.updated_at
    WHERE address_tags.is_manual = 0
"#;

const SELECT_LABELS: &str = r#"
    SELECT address_id, category, tag_name, confidence_score, is_manual, created_at, updated_at
    FROM address_tags
"#;

/// sqlx-backed profile, label and capability store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url`.
    ///
    /// `sqlite::memory:` databases live per connection, so callers using one
    /// should pass `max_connections = 1`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url: {url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {url}"))?;
        debug!(url, max_connections, "Database pool opened");
        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        info!("Database schema ready");
        Ok(())
    }

    pub async fn insert_entity(&self, profile: &EntityProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO addresses (id, address, total_trades, win_rate, avg_trade_size, total_volume)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(profile.id)
        .bind(&profile.address)
        .bind(profile.total_trades as i64)
        .bind(profile.win_rate)
        .bind(profile.avg_trade_size)
        .bind(profile.total_volume)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert entity {}", profile.id))?;
        Ok(())
    }

    pub async fn insert_market(&self, market: &MarketRecord) -> Result<()> {
        sqlx::query("INSERT INTO markets (id, title, category, created_at, end_date) VALUES (?, ?, ?, ?, ?)")
            .bind(market.id)
            .bind(&market.title)
            .bind(market.category.map(|c| c.as_str()))
            .bind(market.created_at.map(|t| t.timestamp()))
            .bind(market.end_date.map(|t| t.timestamp()))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert market {}", market.id))?;
        Ok(())
    }

    /// Record a trade with its realised PnL and, for closed positions, its exit.
    pub async fn insert_trade(
        &self,
        entity_id: i64,
        trade: &TradeRecord,
        pnl: f64,
        exit_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO address_trades
                (id, address_id, market_id, timestamp, price, amount, side, outcome, pnl, exit_time)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(trade.trade_id)
        .bind(entity_id)
        .bind(trade.market_id)
        .bind(trade.timestamp.timestamp())
        .bind(trade.price)
        .bind(trade.amount)
        .bind(trade.side.as_str())
        .bind(trade.outcome.as_str())
        .bind(pnl)
        .bind(exit_time.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert trade {}", trade.trade_id))?;
        Ok(())
    }

    /// Attach a hand-assigned label. Computed labels never overwrite it.
    pub async fn insert_manual_label(&self, entity_id: i64, label: &LabelResult) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO address_tags
                (address_id, category, tag_name, confidence_score, is_manual, created_at, updated_at)
             VALUES (?, ?, ?, ?, 1, ?, ?)
             ON CONFLICT(address_id, tag_name) DO UPDATE SET
                confidence_score = excluded.confidence_score,
                is_manual = 1,
                updated_at = excluded.updated_at",
        )
        .bind(entity_id)
        .bind(label.category.as_str())
        .bind(label.name.as_str())
        .bind(label.confidence)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert manual label for entity {entity_id}"))?;
        Ok(())
    }

    async fn count(&self, sql: &str, entity_id: i64, param: i64) -> Result<u64> {
        let row = sqlx::query(sql)
            .bind(entity_id)
            .bind(param)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Count query failed for entity {entity_id}"))?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }

    async fn write_labels(&self, entity_id: i64, labels: &[LabelResult], replace: bool) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.context("Failed to begin label transaction")?;

        if replace {
            sqlx::query("DELETE FROM address_tags WHERE address_id = ? AND is_manual = 0")
                .bind(entity_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to clear labels of entity {entity_id}"))?;
        }

        for label in labels {
            sqlx::query(UPSERT_LABEL)
                .bind(entity_id)
                .bind(label.category.as_str())
                .bind(label.name.as_str())
                .bind(label.confidence)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to write label '{}' for entity {entity_id}", label.name))?;
        }

        tx.commit().await.context("Failed to commit label transaction")?;
        debug!(entity_id, labels = labels.len(), replace, "Labels persisted");
        Ok(())
    }
}

fn from_epoch(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("timestamp out of range: {secs}"))
}

fn opt_epoch(secs: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    secs.map(from_epoch).transpose()
}

fn stored_label(row: &SqliteRow) -> Result<StoredLabel> {
    Ok(StoredLabel {
        entity_id: row.try_get("address_id")?,
        category: row.try_get("category")?,
        label_name: row.try_get("tag_name")?,
        confidence_score: row.try_get("confidence_score")?,
        is_manual: row.try_get("is_manual")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn timing(row: &SqliteRow) -> Result<TradeTiming> {
    Ok(TradeTiming {
        trade_id: row.try_get("id")?,
        entry_time: from_epoch(row.try_get("timestamp")?)?,
        exit_time: opt_epoch(row.try_get("exit_time")?)?,
        market_created_at: opt_epoch(row.try_get("created_at")?)?,
        market_end: opt_epoch(row.try_get("end_date")?)?,
    })
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn entity(&self, id: i64) -> Result<Option<EntityProfile>> {
        let row = sqlx::query(
            "SELECT id, address, total_trades, win_rate, avg_trade_size, total_volume
             FROM addresses WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load entity {id}"))?;

        row.map(|r| -> Result<EntityProfile> {
            let total_trades: i64 = r.try_get("total_trades")?;
            Ok(EntityProfile {
                id: r.try_get("id")?,
                address: r.try_get("address")?,
                total_trades: total_trades.max(0) as u64,
                win_rate: r.try_get("win_rate")?,
                avg_trade_size: r.try_get("avg_trade_size")?,
                total_volume: r.try_get("total_volume")?,
            })
        })
        .transpose()
    }

    async fn entity_ids(&self, limit: Option<usize>) -> Result<Vec<i64>> {
        // LIMIT -1 means no limit in SQLite
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query("SELECT id FROM addresses ORDER BY id LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list entities")?;
        rows.iter().map(|r| Ok(r.try_get::<i64, _>(0)?)).collect()
    }

    async fn recently_active(&self, since: DateTime<Utc>) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT DISTINCT address_id FROM address_trades WHERE timestamp >= ? ORDER BY address_id",
        )
        .bind(since.timestamp())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recently active entities")?;
        rows.iter().map(|r| Ok(r.try_get::<i64, _>(0)?)).collect()
    }

    async fn trades(&self, entity_id: i64) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            "SELECT id, market_id, timestamp, price, amount, side, outcome
             FROM address_trades WHERE address_id = ? ORDER BY timestamp, id",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load trades of entity {entity_id}"))?;

        rows.iter()
            .map(|r| {
                let side: String = r.try_get("side")?;
                let outcome: String = r.try_get("outcome")?;
                Ok(TradeRecord {
                    trade_id: r.try_get("id")?,
                    market_id: r.try_get("market_id")?,
                    timestamp: from_epoch(r.try_get("timestamp")?)?,
                    price: r.try_get("price")?,
                    amount: r.try_get("amount")?,
                    side: side.parse()?,
                    outcome: outcome.parse()?,
                })
            })
            .collect()
    }

    async fn category_trade_count(&self, entity_id: i64, category: MarketCategory) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM address_trades t
             JOIN markets m ON t.market_id = m.id
             WHERE t.address_id = ? AND m.category = ?",
        )
        .bind(entity_id)
        .bind(category.as_str())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to count {category} trades of entity {entity_id}"))?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }

    async fn keyword_trade_count(
        &self,
        entity_id: i64,
        keywords: &[String],
        parent: Option<MarketCategory>,
    ) -> Result<u64> {
        if keywords.is_empty() {
            return Ok(0);
        }

        // LIKE is case-insensitive for ASCII in SQLite
        let matches = vec!["m.title LIKE ?"; keywords.len()].join(" OR ");
        let mut sql = format!(
            "SELECT COUNT(*) FROM address_trades t
             JOIN markets m ON t.market_id = m.id
             WHERE t.address_id = ? AND ({matches})"
        );
        if parent.is_some() {
            sql.push_str(" AND m.category = ?");
        }

        let mut query = sqlx::query(&sql).bind(entity_id);
        for keyword in keywords {
            query = query.bind(format!("%{keyword}%"));
        }
        if let Some(category) = parent {
            query = query.bind(category.as_str());
        }

        let row = query
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count keyword trades of entity {entity_id}"))?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }

    async fn recent_trade_count(&self, entity_id: i64, since: DateTime<Utc>) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM address_trades WHERE address_id = ? AND timestamp >= ?",
            entity_id,
            since.timestamp(),
        )
        .await
    }

    async fn monthly_pnl(&self, entity_id: i64) -> Result<Vec<MonthlyPnl>> {
        let rows = sqlx::query(
            "SELECT strftime('%Y-%m', timestamp, 'unixepoch') AS month, SUM(pnl) AS pnl
             FROM address_trades WHERE address_id = ?
             GROUP BY month ORDER BY month",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to aggregate monthly PnL of entity {entity_id}"))?;

        rows.iter()
            .map(|r| {
                Ok(MonthlyPnl {
                    month: r.try_get("month")?,
                    pnl: r.try_get("pnl")?,
                })
            })
            .collect()
    }

    async fn price_distribution(&self, entity_id: i64) -> Result<Vec<f64>> {
        let rows = sqlx::query("SELECT price FROM address_trades WHERE address_id = ? ORDER BY timestamp, id")
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to load prices of entity {entity_id}"))?;
        rows.iter().map(|r| Ok(r.try_get::<f64, _>(0)?)).collect()
    }

    async fn late_entry_count(&self, entity_id: i64, days: u32) -> Result<u64> {
        // integer division truncates toward zero, i.e. whole days
        self.count(
            "SELECT COUNT(*) FROM address_trades t
             JOIN markets m ON t.market_id = m.id
             WHERE t.address_id = ? AND m.end_date IS NOT NULL
               AND (m.end_date - t.timestamp) / 86400 <= ?",
            entity_id,
            i64::from(days),
        )
        .await
    }

    async fn early_entry_count(&self, entity_id: i64, hours: u32) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM address_trades t
             JOIN markets m ON t.market_id = m.id
             WHERE t.address_id = ? AND m.created_at IS NOT NULL
               AND (t.timestamp - m.created_at) / 3600 <= ?",
            entity_id,
            i64::from(hours),
        )
        .await
    }
}

#[async_trait]
impl LabelStore for SqliteStore {
    async fn upsert_labels(&self, entity_id: i64, labels: &[LabelResult]) -> Result<()> {
        self.write_labels(entity_id, labels, false).await
    }

    async fn replace_labels(&self, entity_id: i64, labels: &[LabelResult]) -> Result<()> {
        self.write_labels(entity_id, labels, true).await
    }

    async fn labels_for(&self, entity_id: i64) -> Result<Vec<StoredLabel>> {
        let sql = format!("{SELECT_LABELS} WHERE address_id = ? ORDER BY category, tag_name");
        let rows = sqlx::query(&sql)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to load labels of entity {entity_id}"))?;
        rows.iter().map(stored_label).collect()
    }

    async fn statistics(&self) -> Result<LabelStatistics> {
        let totals = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM addresses) AS entities,
                (SELECT COUNT(DISTINCT address_id) FROM address_tags) AS labelled,
                (SELECT COUNT(*) FROM address_tags) AS labels",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count labels")?;

        let rows = sqlx::query(
            "SELECT category, tag_name, COUNT(*) AS count
             FROM address_tags GROUP BY category, tag_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate label distribution")?;

        let distribution = rows
            .iter()
            .map(|r| {
                let count: i64 = r.try_get("count")?;
                Ok(LabelCount {
                    category: r.try_get("category")?,
                    label_name: r.try_get("tag_name")?,
                    count: count.max(0) as u64,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let entities: i64 = totals.try_get("entities")?;
        let labelled: i64 = totals.try_get("labelled")?;
        let labels: i64 = totals.try_get("labels")?;

        Ok(LabelStatistics::from_counts(
            entities.max(0) as u64,
            labelled.max(0) as u64,
            labels.max(0) as u64,
            distribution,
        ))
    }

    async fn export_labels(&self) -> Result<Vec<StoredLabel>> {
        let sql = format!("{SELECT_LABELS} ORDER BY address_id, category, tag_name");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to export labels")?;
        rows.iter().map(stored_label).collect()
    }
}

#[async_trait]
impl CapabilityProvider for SqliteStore {
    async fn holding_period(&self, trade_id: i64) -> Result<Capability<Option<i64>>> {
        let row = sqlx::query(
            "SELECT t.id, t.timestamp, t.exit_time, m.created_at, m.end_date
             FROM address_trades t LEFT JOIN markets m ON t.market_id = m.id
             WHERE t.id = ?",
        )
        .bind(trade_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load trade {trade_id}"))?;

        match row {
            Some(r) => {
                let secs = timing(&r)?.holding_duration().map(|d| d.num_seconds());
                Ok(Capability::Available(secs))
            }
            None => Ok(Capability::Unavailable),
        }
    }

    async fn trade_timestamps(&self, entity_id: i64) -> Result<Capability<Vec<TradeTiming>>> {
        let rows = sqlx::query(
            "SELECT t.id, t.timestamp, t.exit_time, m.created_at, m.end_date
             FROM address_trades t LEFT JOIN markets m ON t.market_id = m.id
             WHERE t.address_id = ? ORDER BY t.timestamp, t.id",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load trade timings of entity {entity_id}"))?;

        let timings = rows.iter().map(timing).collect::<Result<Vec<_>>>()?;
        Ok(Capability::Available(timings))
    }

    async fn position_changes(&self, entity_id: i64) -> Result<Capability<Vec<PositionChange>>> {
        let changes = self
            .trades(entity_id)
            .await?
            .into_iter()
            .map(|t| PositionChange {
                market_id: t.market_id,
                timestamp: t.timestamp,
                side: t.side,
                amount: t.amount,
                outcome: t.outcome,
            })
            .collect();
        Ok(Capability::Available(changes))
    }
}
