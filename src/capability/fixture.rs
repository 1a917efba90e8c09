//! Hand-filled capability provider.
//!
//! Anything not explicitly set stays `Unavailable`, so a test can wire exactly
//! the capabilities a rule needs and leave the rest degraded.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;

use super::{Capability, CapabilityProvider};
use crate::types::{NewsItem, PatternStats, PositionChange, PricePoint, SocialActivity, TradeTiming};

#[derive(Debug, Clone, Default)]
pub struct FixtureCapabilities {
    holding_periods: HashMap<i64, Option<i64>>,
    timestamps: HashMap<i64, Vec<TradeTiming>>,
    position_changes: HashMap<i64, Vec<PositionChange>>,
    pattern_stats: HashMap<i64, PatternStats>,
    linked: HashMap<i64, Vec<i64>>,
    /// `None` means the news source is not wired at all.
    news: Option<HashMap<i64, Vec<NewsItem>>>,
    social: HashMap<String, SocialActivity>,
    /// `None` means the price source is not wired at all.
    prices: Option<HashMap<i64, Vec<PricePoint>>>,
    /// Lookups that fail outright, by capability name.
    failing: Vec<&'static str>,
}

impl FixtureCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_holding_period(mut self, trade_id: i64, secs: Option<i64>) -> Self {
        self.holding_periods.insert(trade_id, secs);
        self
    }

    pub fn with_trade_timestamps(mut self, entity_id: i64, timings: Vec<TradeTiming>) -> Self {
        self.timestamps.insert(entity_id, timings);
        self
    }

    pub fn with_position_changes(mut self, entity_id: i64, changes: Vec<PositionChange>) -> Self {
        self.position_changes.insert(entity_id, changes);
        self
    }

    pub fn with_pattern_stats(mut self, entity_id: i64, stats: PatternStats) -> Self {
        self.pattern_stats.insert(entity_id, stats);
        self
    }

    pub fn with_linked_addresses(mut self, entity_id: i64, linked: Vec<i64>) -> Self {
        self.linked.insert(entity_id, linked);
        self
    }

    /// Wire the news source; markets without an entry return no news.
    pub fn with_news(mut self, market_id: i64, items: Vec<NewsItem>) -> Self {
        self.news.get_or_insert_with(HashMap::new).insert(market_id, items);
        self
    }

    /// Wire the price source; markets without an entry return an empty history.
    pub fn with_price_history(mut self, market_id: i64, points: Vec<PricePoint>) -> Self {
        self.prices.get_or_insert_with(HashMap::new).insert(market_id, points);
        self
    }

    pub fn with_social(mut self, address: &str, activity: SocialActivity) -> Self {
        self.social.insert(address.to_string(), activity);
        self
    }

    /// Make every lookup of `capability` return an error.
    pub fn failing(mut self, capability: &'static str) -> Self {
        self.failing.push(capability);
        self
    }

    fn check(&self, capability: &str) -> Result<()> {
        if self.failing.iter().any(|f| *f == capability) {
            bail!("fixture capability {capability} forced to fail");
        }
        Ok(())
    }
}

#[async_trait]
impl CapabilityProvider for FixtureCapabilities {
    async fn holding_period(&self, trade_id: i64) -> Result<Capability<Option<i64>>> {
        self.check("holding_period")?;
        Ok(self.holding_periods.get(&trade_id).copied().into())
    }

    async fn trade_timestamps(&self, entity_id: i64) -> Result<Capability<Vec<TradeTiming>>> {
        self.check("trade_timestamps")?;
        Ok(self.timestamps.get(&entity_id).cloned().into())
    }

    async fn position_changes(&self, entity_id: i64) -> Result<Capability<Vec<PositionChange>>> {
        self.check("position_changes")?;
        Ok(self.position_changes.get(&entity_id).cloned().into())
    }

    async fn pattern_stats(&self, entity_id: i64) -> Result<Capability<PatternStats>> {
        self.check("pattern_stats")?;
        Ok(self.pattern_stats.get(&entity_id).copied().into())
    }

    async fn linked_addresses(&self, entity_id: i64) -> Result<Capability<Vec<i64>>> {
        self.check("linked_addresses")?;
        Ok(self.linked.get(&entity_id).cloned().into())
    }

    async fn market_news(&self, market_id: i64, _days: u32) -> Result<Capability<Vec<NewsItem>>> {
        self.check("market_news")?;
        Ok(self
            .news
            .as_ref()
            .map(|news| news.get(&market_id).cloned().unwrap_or_default())
            .into())
    }

    async fn social_activity(&self, address: &str) -> Result<Capability<SocialActivity>> {
        self.check("social_activity")?;
        Ok(self.social.get(address).copied().into())
    }

    async fn price_history(&self, market_id: i64) -> Result<Capability<Vec<PricePoint>>> {
        self.check("price_history")?;
        Ok(self
            .prices
            .as_ref()
            .map(|prices| prices.get(&market_id).cloned().unwrap_or_default())
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_unset_capabilities_stay_unavailable() {
        let f = FixtureCapabilities::new().with_linked_addresses(1, vec![2, 3]);
        assert_eq!(f.linked_addresses(1).await.unwrap(), Capability::Available(vec![2, 3]));
        assert_eq!(f.linked_addresses(9).await.unwrap(), Capability::Unavailable);
        assert_eq!(f.market_news(1, 7).await.unwrap(), Capability::Unavailable);
    }

    #[tokio::test]
    async fn test_wired_news_returns_empty_for_unknown_market() {
        let item = NewsItem {
            title: "Debate tonight".into(),
            published_at: Utc::now(),
            source: "Reuters".into(),
        };
        let f = FixtureCapabilities::new().with_news(1, vec![item]);
        assert_eq!(f.market_news(1, 1).await.unwrap().into_option().unwrap().len(), 1);
        assert_eq!(f.market_news(2, 1).await.unwrap(), Capability::Available(vec![]));
    }

    #[tokio::test]
    async fn test_forced_failure() {
        let f = FixtureCapabilities::new().failing("price_history");
        assert!(f.price_history(1).await.is_err());
        assert!(f.pattern_stats(1).await.is_ok());
    }
}
