//! Seeded synthetic capability provider.
//!
//! Serves every capability with plausible random data, seeded by the id being
//! looked up so the same entity always gets the same answer within a run.
//! Used by `--use-mock` to exercise the enriched rule paths without any
//! external source.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Capability, CapabilityProvider};
use crate::types::{
    NewsItem, Outcome, PatternStats, PositionChange, PricePoint, SocialActivity, TradeSide,
    TradeTiming,
};

const NEWS_SOURCES: [&str; 4] = ["CNN", "BBC", "Reuters", "Bloomberg"];

/// Deterministic synthetic data keyed by entity, market or trade id.
#[derive(Debug, Clone)]
pub struct SeededMockProvider {
    /// All generated timestamps are relative to this instant.
    anchor: DateTime<Utc>,
}

impl Default for SeededMockProvider {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl SeededMockProvider {
    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self { anchor }
    }

    fn rng(seed: i64) -> StdRng {
        StdRng::seed_from_u64(seed as u64)
    }

    fn address_seed(address: &str) -> i64 {
        address.bytes().map(i64::from).sum()
    }
}

#[async_trait]
impl CapabilityProvider for SeededMockProvider {
    async fn holding_period(&self, trade_id: i64) -> Result<Capability<Option<i64>>> {
        let mut rng = Self::rng(trade_id);
        let roll: f64 = rng.gen();
        let secs = if roll < 0.3 {
            rng.gen_range(3_600..=86_400)
        } else if roll < 0.7 {
            rng.gen_range(86_400..=604_800)
        } else {
            rng.gen_range(604_800..=2_592_000)
        };
        Ok(Capability::Available(Some(secs)))
    }

    async fn trade_timestamps(&self, entity_id: i64) -> Result<Capability<Vec<TradeTiming>>> {
        let mut rng = Self::rng(entity_id);
        let count = rng.gen_range(10..=50);

        let timings = (0..count)
            .map(|i| {
                let entry = self.anchor - Duration::days(rng.gen_range(0..=90));
                let created = entry - Duration::days(rng.gen_range(1..=30));
                let days_to_end = rng.gen_range(1..=60);
                let end = entry + Duration::days(days_to_end);
                let exit = rng
                    .gen_bool(0.5)
                    .then(|| entry + Duration::days(rng.gen_range(1..=days_to_end.min(30))));
                TradeTiming {
                    trade_id: entity_id * 1000 + i,
                    entry_time: entry,
                    exit_time: exit,
                    market_created_at: Some(created),
                    market_end: Some(end),
                }
            })
            .collect();

        Ok(Capability::Available(timings))
    }

    async fn position_changes(&self, entity_id: i64) -> Result<Capability<Vec<PositionChange>>> {
        let mut rng = Self::rng(entity_id);
        let count = rng.gen_range(20..=100);

        let mut changes: Vec<PositionChange> = (0..count)
            .map(|_| PositionChange {
                market_id: rng.gen_range(1..=100),
                timestamp: self.anchor
                    - Duration::days(rng.gen_range(0..=90))
                    - Duration::hours(rng.gen_range(0..=23)),
                side: if rng.gen_bool(0.5) { TradeSide::Buy } else { TradeSide::Sell },
                amount: rng.gen_range(100.0..10_000.0),
                outcome: if rng.gen_bool(0.5) { Outcome::Yes } else { Outcome::No },
            })
            .collect();
        changes.sort_by_key(|c| c.timestamp);

        Ok(Capability::Available(changes))
    }

    async fn pattern_stats(&self, entity_id: i64) -> Result<Capability<PatternStats>> {
        let mut rng = Self::rng(entity_id);
        let stats = if rng.gen_bool(0.1) {
            PatternStats {
                timing_variance: rng.gen_range(100.0..1_000.0),
                amount_variance: rng.gen_range(10.0..100.0),
                distinct_amounts: rng.gen_range(1..=3),
                mean_response_secs: rng.gen_range(1.0..5.0),
            }
        } else {
            PatternStats {
                timing_variance: rng.gen_range(10_000.0..100_000.0),
                amount_variance: rng.gen_range(1_000.0..10_000.0),
                distinct_amounts: rng.gen_range(10..=50),
                mean_response_secs: rng.gen_range(60.0..600.0),
            }
        };
        Ok(Capability::Available(stats))
    }

    async fn linked_addresses(&self, entity_id: i64) -> Result<Capability<Vec<i64>>> {
        let mut rng = Self::rng(entity_id);
        let linked = if rng.gen_bool(0.05) {
            let n = rng.gen_range(1..=5);
            (1..=n).map(|i| entity_id + i).collect()
        } else {
            Vec::new()
        };
        Ok(Capability::Available(linked))
    }

    async fn market_news(&self, market_id: i64, days: u32) -> Result<Capability<Vec<NewsItem>>> {
        let mut rng = Self::rng(market_id);
        if !rng.gen_bool(0.2) {
            return Ok(Capability::Available(Vec::new()));
        }

        let count = rng.gen_range(1..=5);
        let news = (1..=count)
            .map(|i| NewsItem {
                title: format!("Synthetic headline {i} for market {market_id}"),
                published_at: self.anchor - Duration::days(rng.gen_range(0..=i64::from(days))),
                source: NEWS_SOURCES[rng.gen_range(0..NEWS_SOURCES.len())].to_string(),
            })
            .collect();
        Ok(Capability::Available(news))
    }

    async fn social_activity(&self, address: &str) -> Result<Capability<SocialActivity>> {
        let mut rng = Self::rng(Self::address_seed(address));
        if !rng.gen_bool(0.1) {
            return Ok(Capability::Available(SocialActivity::NEUTRAL));
        }

        let activity = if rng.gen_bool(0.5) {
            SocialActivity {
                followers: rng.gen_range(10_000..=100_000),
                mentions: rng.gen_range(100..=1_000),
                community_messages: rng.gen_range(50..=500),
                verified: true,
            }
        } else {
            SocialActivity {
                followers: rng.gen_range(100..=5_000),
                mentions: rng.gen_range(10..=100),
                community_messages: rng.gen_range(5..=50),
                verified: false,
            }
        };
        Ok(Capability::Available(activity))
    }

    async fn price_history(&self, market_id: i64) -> Result<Capability<Vec<PricePoint>>> {
        let mut rng = Self::rng(market_id);
        let mut price: f64 = rng.gen_range(0.4..0.6);

        let history = (0..30)
            .map(|i| {
                price = (price + rng.gen_range(-0.05..0.05)).clamp(0.01, 0.99);
                PricePoint {
                    timestamp: self.anchor - Duration::days(30 - i),
                    price,
                    volume: rng.gen_range(1_000.0..100_000.0),
                }
            })
            .collect();
        Ok(Capability::Available(history))
    }
}
