//! Risk-appetite labels read off the entry-price distribution.
//!
//! Prices are implied probabilities, so buying near 0 or 1 is a bet on a
//! near-certain outcome while buying near 0.5 is a coin flip.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{share, Tagger, TaggerContext};
use crate::config::{active, HighRiskRule, LowRiskRule, RiskRules};
use crate::types::{EntityProfile, LabelName, LabelResult};

pub struct RiskTagger {
    ctx: TaggerContext,
    rules: RiskRules,
}

impl RiskTagger {
    pub fn new(ctx: TaggerContext, rules: RiskRules) -> Self {
        Self { ctx, rules }
    }

    fn low_risk(&self, prices: &[f64], rule: &LowRiskRule) -> Option<LabelResult> {
        if prices.len() < rule.min_trades {
            return None;
        }
        let ratio = share(prices, |p| p <= rule.price_threshold_low || p >= rule.price_threshold_high);
        if ratio < rule.ratio_threshold {
            return None;
        }
        let confidence = self.ctx.confidence.ratio(ratio, rule.ratio_threshold);
        Some(LabelResult::new(LabelName::LowRisk, confidence))
    }

    fn high_risk(&self, prices: &[f64], rule: &HighRiskRule) -> Option<LabelResult> {
        if prices.len() < rule.min_trades {
            return None;
        }
        let ratio = share(prices, |p| (rule.price_range_low..=rule.price_range_high).contains(&p));
        if ratio < rule.ratio_threshold {
            return None;
        }
        let confidence = self.ctx.confidence.ratio(ratio, rule.ratio_threshold);
        Some(LabelResult::new(LabelName::HighRisk, confidence))
    }
}

#[async_trait]
impl Tagger for RiskTagger {
    fn name(&self) -> &'static str {
        "risk"
    }

    async fn evaluate(&self, profile: &EntityProfile, _as_of: DateTime<Utc>) -> Result<Vec<LabelResult>> {
        let low = active(&self.rules.low_risk);
        let high = active(&self.rules.high_risk);
        if low.is_none() && high.is_none() {
            return Ok(Vec::new());
        }

        let prices = self.ctx.store.price_distribution(profile.id).await?;
        let mut labels = Vec::new();
        labels.extend(low.and_then(|r| self.low_risk(&prices, r)));
        labels.extend(high.and_then(|r| self.high_risk(&prices, r)));
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::taggers::testing::*;

    fn rules() -> RiskRules {
        RiskRules {
            low_risk: Some(LowRiskRule {
                enabled: true,
                price_threshold_low: 0.2,
                price_threshold_high: 0.8,
                ratio_threshold: 0.6,
                min_trades: 5,
            }),
            high_risk: Some(HighRiskRule {
                enabled: true,
                price_range_low: 0.4,
                price_range_high: 0.6,
                ratio_threshold: 0.5,
                min_trades: 5,
            }),
            ..Default::default()
        }
    }

    fn store_with_prices(prices: &[f64]) -> InMemoryStore {
        prices.iter().enumerate().fold(InMemoryStore::new(), |store, (i, price)| {
            let i = i as i64;
            store.with_trade(1, trade(i, 1, days_ago(i + 1), *price), 0.0)
        })
    }

    #[tokio::test]
    async fn test_low_risk_on_extreme_prices() {
        let store = store_with_prices(&[0.9, 0.95, 0.1, 0.85, 0.5]);
        let tagger = RiskTagger::new(unwired(store), rules());
        let labels = tagger.evaluate(&profile(5, 0.5), as_of()).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, LabelName::LowRisk);
        assert!(approx(labels[0].confidence, (0.8 - 0.6) / 0.4));
    }

    #[tokio::test]
    async fn test_high_risk_on_coin_flips() {
        let store = store_with_prices(&[0.45, 0.5, 0.55, 0.6, 0.9, 0.4]);
        let tagger = RiskTagger::new(unwired(store), rules());
        let labels = tagger.evaluate(&profile(6, 0.5), as_of()).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, LabelName::HighRisk);
    }

    #[tokio::test]
    async fn test_needs_min_trades() {
        let store = store_with_prices(&[0.9, 0.95, 0.99]);
        let tagger = RiskTagger::new(unwired(store), rules());
        assert!(tagger.evaluate(&profile(3, 0.5), as_of()).await.unwrap().is_empty());
    }
}
