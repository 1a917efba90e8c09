//! Trading-style labels computed from the profile and trade counts.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Tagger, TaggerContext};
use crate::config::{
    active, HighFrequencyRule, HighWinRateRule, LargeVolumeRule, SmallFrequentRule,
    StableProfitRule, TradingStyleRules,
};
use crate::types::{EntityProfile, LabelName, LabelResult};

pub struct TradingStyleTagger {
    ctx: TaggerContext,
    rules: TradingStyleRules,
}

impl TradingStyleTagger {
    pub fn new(ctx: TaggerContext, rules: TradingStyleRules) -> Self {
        Self { ctx, rules }
    }

    fn high_win_rate(&self, p: &EntityProfile, rule: &HighWinRateRule) -> Option<LabelResult> {
        if p.win_rate < rule.win_rate_threshold || p.total_trades < rule.min_trades {
            return None;
        }
        let confidence = self.ctx.confidence.ratio(p.win_rate, rule.win_rate_threshold);
        Some(LabelResult::new(LabelName::HighWinRate, confidence))
    }

    fn large_volume(&self, p: &EntityProfile, rule: &LargeVolumeRule) -> Option<LabelResult> {
        let threshold = rule.avg_trade_size_threshold;
        if p.avg_trade_size < threshold {
            return None;
        }
        let confidence = self.ctx.confidence.score(p.avg_trade_size, threshold, threshold * 5.0);
        Some(LabelResult::new(LabelName::LargeVolume, confidence))
    }

    async fn high_frequency(
        &self,
        p: &EntityProfile,
        rule: &HighFrequencyRule,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LabelResult>> {
        let days = i64::from(rule.lookback_days);
        let recent = self.ctx.recent_count(p.id, as_of, days).await?;
        let per_day = recent as f64 / days as f64;

        let threshold = rule.trades_per_day_threshold;
        if per_day < threshold {
            return Ok(None);
        }
        let confidence = self.ctx.confidence.score(per_day, threshold, threshold * 3.0);
        Ok(Some(LabelResult::new(LabelName::HighFrequency, confidence)))
    }

    async fn stable_profit(&self, p: &EntityProfile, rule: &StableProfitRule) -> Result<Option<LabelResult>> {
        let months = self.ctx.store.monthly_pnl(p.id).await?;
        let total = months.len() as u32;
        let profitable = months.iter().filter(|m| m.pnl > 0.0).count() as u32;

        if profitable < rule.min_profitable_months || total < rule.min_total_months || total == 0 {
            return Ok(None);
        }
        let confidence = self.ctx.confidence.ratio(
            f64::from(profitable) / f64::from(total),
            f64::from(rule.min_profitable_months) / f64::from(rule.min_total_months),
        );
        Ok(Some(LabelResult::new(LabelName::StableProfit, confidence)))
    }

    fn small_frequent(&self, p: &EntityProfile, rule: &SmallFrequentRule) -> Option<LabelResult> {
        if p.avg_trade_size >= rule.max_avg_trade_size || p.total_trades < rule.min_trades {
            return None;
        }
        let confidence = self.ctx.confidence.count(p.total_trades, rule.min_trades, None);
        Some(LabelResult::new(LabelName::SmallFrequent, confidence))
    }
}

#[async_trait]
impl Tagger for TradingStyleTagger {
    fn name(&self) -> &'static str {
        "trading_style"
    }

    async fn evaluate(&self, profile: &EntityProfile, as_of: DateTime<Utc>) -> Result<Vec<LabelResult>> {
        let mut labels = Vec::new();

        if let Some(rule) = active(&self.rules.high_win_rate) {
            labels.extend(self.high_win_rate(profile, rule));
        }
        if let Some(rule) = active(&self.rules.large_volume) {
            labels.extend(self.large_volume(profile, rule));
        }
        if let Some(rule) = active(&self.rules.high_frequency) {
            labels.extend(self.high_frequency(profile, rule, as_of).await?);
        }
        if let Some(rule) = active(&self.rules.stable_profit) {
            labels.extend(self.stable_profit(profile, rule).await?);
        }
        if let Some(rule) = active(&self.rules.small_frequent) {
            labels.extend(self.small_frequent(profile, rule));
        }

        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::taggers::testing::*;
    use chrono::Duration;

    fn rules() -> TradingStyleRules {
        TradingStyleRules {
            high_win_rate: Some(HighWinRateRule {
                enabled: true,
                win_rate_threshold: 0.55,
                min_trades: 10,
            }),
            large_volume: Some(LargeVolumeRule {
                enabled: true,
                avg_trade_size_threshold: 1000.0,
            }),
            high_frequency: Some(HighFrequencyRule {
                enabled: true,
                lookback_days: 7,
                trades_per_day_threshold: 1.0,
            }),
            stable_profit: Some(StableProfitRule {
                enabled: true,
                min_profitable_months: 2,
                min_total_months: 3,
            }),
            small_frequent: Some(SmallFrequentRule {
                enabled: true,
                max_avg_trade_size: 100.0,
                min_trades: 20,
            }),
            ..Default::default()
        }
    }

    fn names(labels: &[LabelResult]) -> Vec<LabelName> {
        labels.iter().map(|l| l.name).collect()
    }

    #[tokio::test]
    async fn test_high_win_rate_example() {
        let tagger = TradingStyleTagger::new(unwired(InMemoryStore::new()), rules());
        let labels = tagger.evaluate(&profile(20, 0.70), as_of()).await.unwrap();
        assert_eq!(names(&labels), vec![LabelName::HighWinRate]);
        assert!(approx(labels[0].confidence, 1.0 / 3.0));
    }

    #[tokio::test]
    async fn test_high_win_rate_needs_min_trades() {
        let tagger = TradingStyleTagger::new(unwired(InMemoryStore::new()), rules());
        let labels = tagger.evaluate(&profile(9, 0.90), as_of()).await.unwrap();
        assert!(labels.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_rule_is_skipped() {
        let mut rules = rules();
        if let Some(r) = rules.high_win_rate.as_mut() {
            r.enabled = false;
        }
        let tagger = TradingStyleTagger::new(unwired(InMemoryStore::new()), rules);
        assert!(tagger.evaluate(&profile(20, 0.70), as_of()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_large_volume_saturates_at_five_times() {
        let tagger = TradingStyleTagger::new(unwired(InMemoryStore::new()), rules());
        let mut p = profile(1, 0.0);
        p.avg_trade_size = 3000.0;
        let labels = tagger.evaluate(&p, as_of()).await.unwrap();
        assert_eq!(names(&labels), vec![LabelName::LargeVolume]);
        assert!(approx(labels[0].confidence, 0.5));
    }

    #[tokio::test]
    async fn test_high_frequency_counts_lookback_window() {
        let mut store = InMemoryStore::new();
        for i in 0..14 {
            store = store.with_trade(1, trade(i, 1, as_of() - Duration::hours(10 * i), 0.5), 0.0);
        }
        // one trade outside the window
        store = store.with_trade(1, trade(99, 1, days_ago(30), 0.5), 0.0);
        let tagger = TradingStyleTagger::new(unwired(store), rules());
        let labels = tagger.evaluate(&profile(15, 0.0), as_of()).await.unwrap();
        let freq = labels.iter().find(|l| l.name == LabelName::HighFrequency).unwrap();
        // 14 trades / 7 days = 2 per day, halfway between 1 and 3
        assert!(approx(freq.confidence, 0.5));
    }

    #[tokio::test]
    async fn test_stable_profit_over_months() {
        let store = InMemoryStore::new()
            .with_trade(1, trade(1, 1, days_ago(135), 0.5), 50.0)
            .with_trade(1, trade(2, 1, days_ago(105), 0.5), 20.0)
            .with_trade(1, trade(3, 1, days_ago(75), 0.5), -10.0)
            .with_trade(1, trade(4, 1, days_ago(45), 0.5), 5.0);
        let tagger = TradingStyleTagger::new(unwired(store), rules());
        let labels = tagger.evaluate(&profile(4, 0.0), as_of()).await.unwrap();
        let stable = labels.iter().find(|l| l.name == LabelName::StableProfit).unwrap();
        // 3 of 4 months profitable against a 2/3 threshold
        assert!(approx(stable.confidence, (0.75 - 2.0 / 3.0) / (1.0 - 2.0 / 3.0)));
    }

    #[tokio::test]
    async fn test_small_frequent() {
        let tagger = TradingStyleTagger::new(unwired(InMemoryStore::new()), rules());
        let mut p = profile(40, 0.0);
        p.avg_trade_size = 20.0;
        let labels = tagger.evaluate(&p, as_of()).await.unwrap();
        assert_eq!(names(&labels), vec![LabelName::SmallFrequent]);
        assert!(approx(labels[0].confidence, 0.5));
    }

    #[tokio::test]
    async fn test_zero_trade_entity_gets_nothing() {
        let tagger = TradingStyleTagger::new(unwired(InMemoryStore::new()), rules());
        let labels = tagger.evaluate(&profile(0, 0.0), as_of()).await.unwrap();
        assert!(labels.is_empty());
    }
}
