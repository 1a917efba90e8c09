//! In-process store.
//!
//! Mirrors the SQLite store's semantics over plain collections: same window
//! arithmetic, same upsert rules, manual labels protected the same way.
//! Seeded through builder methods, then shared behind an `Arc`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{LabelCount, LabelStatistics, LabelStore, MarketRecord, ProfileStore};
use crate::types::{
    EntityProfile, LabelResult, MarketCategory, MonthlyPnl, StoredLabel, TradeRecord,
};

#[derive(Debug, Clone)]
struct StoredTrade {
    record: TradeRecord,
    pnl: f64,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    profiles: BTreeMap<i64, EntityProfile>,
    markets: HashMap<i64, MarketRecord>,
    trades: HashMap<i64, Vec<StoredTrade>>,
    /// Keyed by (entity id, label name).
    labels: RwLock<BTreeMap<(i64, String), StoredLabel>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, profile: EntityProfile) -> Self {
        self.profiles.insert(profile.id, profile);
        self
    }

    pub fn with_market(mut self, market: MarketRecord) -> Self {
        self.markets.insert(market.id, market);
        self
    }

    pub fn with_trade(mut self, entity_id: i64, trade: TradeRecord, pnl: f64) -> Self {
        let trades = self.trades.entry(entity_id).or_default();
        trades.push(StoredTrade { record: trade, pnl });
        trades.sort_by_key(|t| (t.record.timestamp, t.record.trade_id));
        self
    }

    pub fn with_manual_label(mut self, entity_id: i64, label: LabelResult) -> Self {
        let now = Utc::now();
        self.labels.get_mut().insert(
            (entity_id, label.name.as_str().to_string()),
            StoredLabel {
                entity_id,
                category: label.category.as_str().to_string(),
                label_name: label.name.as_str().to_string(),
                confidence_score: label.confidence,
                is_manual: true,
                created_at: now,
                updated_at: now,
            },
        );
        self
    }

    fn trades_of(&self, entity_id: i64) -> &[StoredTrade] {
        self.trades.get(&entity_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn count_where(&self, entity_id: i64, pred: impl Fn(&StoredTrade, Option<&MarketRecord>) -> bool) -> u64 {
        self.trades_of(entity_id)
            .iter()
            .filter(|t| pred(t, self.markets.get(&t.record.market_id)))
            .count() as u64
    }

    async fn write_labels(&self, entity_id: i64, labels: &[LabelResult], replace: bool) {
        let now = Utc::now();
        let mut stored = self.labels.write().await;

        if replace {
            stored.retain(|(id, _), label| *id != entity_id || label.is_manual);
        }

        for label in labels {
            let key = (entity_id, label.name.as_str().to_string());
            match stored.get_mut(&key) {
                Some(existing) if existing.is_manual => {}
                Some(existing) => {
                    existing.confidence_score = label.confidence;
                    existing.category = label.category.as_str().to_string();
                    existing.updated_at = now;
                }
                None => {
                    stored.insert(
                        key,
                        StoredLabel {
                            entity_id,
                            category: label.category.as_str().to_string(),
                            label_name: label.name.as_str().to_string(),
                            confidence_score: label.confidence,
                            is_manual: false,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                }
            }
        }
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn entity(&self, id: i64) -> Result<Option<EntityProfile>> {
        Ok(self.profiles.get(&id).cloned())
    }

    async fn entity_ids(&self, limit: Option<usize>) -> Result<Vec<i64>> {
        Ok(self
            .profiles
            .keys()
            .copied()
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn recently_active(&self, since: DateTime<Utc>) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .trades
            .iter()
            .filter(|(_, trades)| trades.iter().any(|t| t.record.timestamp >= since))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn trades(&self, entity_id: i64) -> Result<Vec<TradeRecord>> {
        Ok(self.trades_of(entity_id).iter().map(|t| t.record.clone()).collect())
    }

    async fn category_trade_count(&self, entity_id: i64, category: MarketCategory) -> Result<u64> {
        Ok(self.count_where(entity_id, |_, m| {
            m.is_some_and(|m| m.category == Some(category))
        }))
    }

    async fn keyword_trade_count(
        &self,
        entity_id: i64,
        keywords: &[String],
        parent: Option<MarketCategory>,
    ) -> Result<u64> {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        Ok(self.count_where(entity_id, |_, m| {
            m.is_some_and(|m| {
                let title = m.title.to_lowercase();
                keywords.iter().any(|k| title.contains(k.as_str()))
                    && parent.map_or(true, |p| m.category == Some(p))
            })
        }))
    }

    async fn recent_trade_count(&self, entity_id: i64, since: DateTime<Utc>) -> Result<u64> {
        Ok(self.count_where(entity_id, |t, _| t.record.timestamp >= since))
    }

    async fn monthly_pnl(&self, entity_id: i64) -> Result<Vec<MonthlyPnl>> {
        let mut months: BTreeMap<String, f64> = BTreeMap::new();
        for t in self.trades_of(entity_id) {
            *months.entry(t.record.timestamp.format("%Y-%m").to_string()).or_default() += t.pnl;
        }
        Ok(months
            .into_iter()
            .map(|(month, pnl)| MonthlyPnl { month, pnl })
            .collect())
    }

    async fn price_distribution(&self, entity_id: i64) -> Result<Vec<f64>> {
        Ok(self.trades_of(entity_id).iter().map(|t| t.record.price).collect())
    }

    async fn late_entry_count(&self, entity_id: i64, days: u32) -> Result<u64> {
        Ok(self.count_where(entity_id, |t, m| {
            m.and_then(|m| m.end_date)
                .is_some_and(|end| (end - t.record.timestamp).num_days() <= i64::from(days))
        }))
    }

    async fn early_entry_count(&self, entity_id: i64, hours: u32) -> Result<u64> {
        Ok(self.count_where(entity_id, |t, m| {
            m.and_then(|m| m.created_at)
                .is_some_and(|created| (t.record.timestamp - created).num_hours() <= i64::from(hours))
        }))
    }
}

#[async_trait]
impl LabelStore for InMemoryStore {
    async fn upsert_labels(&self, entity_id: i64, labels: &[LabelResult]) -> Result<()> {
        self.write_labels(entity_id, labels, false).await;
        Ok(())
    }

    async fn replace_labels(&self, entity_id: i64, labels: &[LabelResult]) -> Result<()> {
        self.write_labels(entity_id, labels, true).await;
        Ok(())
    }

    async fn labels_for(&self, entity_id: i64) -> Result<Vec<StoredLabel>> {
        let mut labels: Vec<StoredLabel> = self
            .labels
            .read()
            .await
            .values()
            .filter(|l| l.entity_id == entity_id)
            .cloned()
            .collect();
        labels.sort_by(|a, b| (&a.category, &a.label_name).cmp(&(&b.category, &b.label_name)));
        Ok(labels)
    }

    async fn statistics(&self) -> Result<LabelStatistics> {
        let labels = self.labels.read().await;

        let mut labelled: Vec<i64> = labels.keys().map(|(id, _)| *id).collect();
        labelled.dedup();

        let mut counts: BTreeMap<(String, String), u64> = BTreeMap::new();
        for label in labels.values() {
            *counts
                .entry((label.category.clone(), label.label_name.clone()))
                .or_default() += 1;
        }
        let distribution = counts
            .into_iter()
            .map(|((category, label_name), count)| LabelCount {
                category,
                label_name,
                count,
            })
            .collect();

        Ok(LabelStatistics::from_counts(
            self.profiles.len() as u64,
            labelled.len() as u64,
            labels.len() as u64,
            distribution,
        ))
    }

    async fn export_labels(&self) -> Result<Vec<StoredLabel>> {
        let mut labels: Vec<StoredLabel> = self.labels.read().await.values().cloned().collect();
        labels.sort_by(|a, b| {
            (a.entity_id, &a.category, &a.label_name).cmp(&(b.entity_id, &b.category, &b.label_name))
        });
        Ok(labels)
    }
}
