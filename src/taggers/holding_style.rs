//! Holding-period labels: swing trader, long term holder, flash trader.
//!
//! Needs trade timings. Without them each label guesses from trade
//! frequency alone and reports `HEURISTIC_CONFIDENCE`. The three duration
//! windows are evaluated independently, so overlapping configurations can
//! fire more than one label.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{holding_secs, mean, Tagger, TaggerContext, HEURISTIC_CONFIDENCE};
use crate::capability::settle;
use crate::config::{active, FlashTraderRule, LongTermHolderRule, SwingTraderRule, TradingStyleRules};
use crate::types::{EntityProfile, LabelName, LabelResult, TradeTiming};

const SECS_PER_DAY: f64 = 86_400.0;
const SECS_PER_HOUR: f64 = 3_600.0;
const WEEKS_PER_MONTH: f64 = 4.3;

pub struct HoldingStyleTagger {
    ctx: TaggerContext,
    rules: TradingStyleRules,
}

impl HoldingStyleTagger {
    pub fn new(ctx: TaggerContext, rules: TradingStyleRules) -> Self {
        Self { ctx, rules }
    }

    /// Mean holding in seconds, if enough timings qualify.
    fn mean_holding(timings: &[TradeTiming], min_trades: usize) -> Option<f64> {
        if timings.len() < min_trades {
            return None;
        }
        mean(&holding_secs(timings))
    }

    fn swing(&self, timings: &[TradeTiming], rule: &SwingTraderRule) -> Option<LabelResult> {
        let days = Self::mean_holding(timings, rule.min_trades)? / SECS_PER_DAY;
        if days < rule.min_holding_days || days > rule.max_holding_days {
            return None;
        }
        let mid = (rule.min_holding_days + rule.max_holding_days) / 2.0;
        let half_width = (rule.max_holding_days - rule.min_holding_days) / 2.0;
        let confidence = self.ctx.confidence.clamp(1.0 - 0.5 * (days - mid).abs() / half_width);
        Some(LabelResult::new(LabelName::SwingTrader, confidence))
    }

    fn long_term(&self, timings: &[TradeTiming], rule: &LongTermHolderRule) -> Option<LabelResult> {
        let days = Self::mean_holding(timings, rule.min_trades)? / SECS_PER_DAY;
        if days < rule.min_holding_days {
            return None;
        }
        let confidence = self
            .ctx
            .confidence
            .score(days, rule.min_holding_days, rule.min_holding_days * 3.0);
        Some(LabelResult::new(LabelName::LongTermHolder, confidence))
    }

    fn flash(&self, timings: &[TradeTiming], rule: &FlashTraderRule) -> Option<LabelResult> {
        let hours = Self::mean_holding(timings, rule.min_trades)? / SECS_PER_HOUR;
        if hours > rule.max_holding_hours {
            return None;
        }
        let confidence = self.ctx.confidence.clamp(1.0 - 0.5 * hours / rule.max_holding_hours);
        Some(LabelResult::new(LabelName::FlashTrader, confidence))
    }

    async fn swing_fallback(
        &self,
        p: &EntityProfile,
        rule: &SwingTraderRule,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LabelResult>> {
        if p.total_trades < rule.min_trades as u64 {
            return Ok(None);
        }
        let per_week = self.ctx.recent_count(p.id, as_of, 30).await? as f64 / WEEKS_PER_MONTH;
        Ok((1.0..=3.0)
            .contains(&per_week)
            .then(|| LabelResult::new(LabelName::SwingTrader, HEURISTIC_CONFIDENCE)))
    }

    async fn long_term_fallback(
        &self,
        p: &EntityProfile,
        rule: &LongTermHolderRule,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LabelResult>> {
        if p.total_trades < rule.min_trades as u64 {
            return Ok(None);
        }
        let per_month = self.ctx.recent_count(p.id, as_of, 90).await? as f64 / 3.0;
        Ok((per_month < 2.0).then(|| LabelResult::new(LabelName::LongTermHolder, HEURISTIC_CONFIDENCE)))
    }

    async fn flash_fallback(
        &self,
        p: &EntityProfile,
        rule: &FlashTraderRule,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LabelResult>> {
        if p.total_trades < rule.min_trades as u64 {
            return Ok(None);
        }
        let per_day = self.ctx.recent_count(p.id, as_of, 7).await? as f64 / 7.0;
        Ok((per_day > 3.0).then(|| LabelResult::new(LabelName::FlashTrader, HEURISTIC_CONFIDENCE)))
    }
}

#[async_trait]
impl Tagger for HoldingStyleTagger {
    fn name(&self) -> &'static str {
        "holding_style"
    }

    async fn evaluate(&self, profile: &EntityProfile, as_of: DateTime<Utc>) -> Result<Vec<LabelResult>> {
        let swing = active(&self.rules.swing_trader);
        let long_term = active(&self.rules.long_term_holder);
        let flash = active(&self.rules.flash_trader);
        if swing.is_none() && long_term.is_none() && flash.is_none() {
            return Ok(Vec::new());
        }

        let timings = settle(
            "trade_timestamps",
            profile.id,
            self.ctx.capabilities.trade_timestamps(profile.id).await,
        );

        let mut labels = Vec::new();
        match timings {
            Some(timings) => {
                labels.extend(swing.and_then(|r| self.swing(&timings, r)));
                labels.extend(long_term.and_then(|r| self.long_term(&timings, r)));
                labels.extend(flash.and_then(|r| self.flash(&timings, r)));
            }
            None => {
                if let Some(rule) = swing {
                    labels.extend(self.swing_fallback(profile, rule, as_of).await?);
                }
                if let Some(rule) = long_term {
                    labels.extend(self.long_term_fallback(profile, rule, as_of).await?);
                }
                if let Some(rule) = flash {
                    labels.extend(self.flash_fallback(profile, rule, as_of).await?);
                }
            }
        }

        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::fixture::FixtureCapabilities;
    use crate::store::memory::InMemoryStore;
    use crate::taggers::testing::*;
    use chrono::Duration;

    fn rules() -> TradingStyleRules {
        TradingStyleRules {
            swing_trader: Some(SwingTraderRule {
                enabled: true,
                min_trades: 3,
                min_holding_days: 7.0,
                max_holding_days: 30.0,
            }),
            long_term_holder: Some(LongTermHolderRule {
                enabled: true,
                min_trades: 3,
                min_holding_days: 30.0,
            }),
            flash_trader: Some(FlashTraderRule {
                enabled: true,
                min_trades: 3,
                max_holding_hours: 24.0,
            }),
            ..Default::default()
        }
    }

    fn held_for(n: usize, held: Duration) -> Vec<TradeTiming> {
        (0..n as i64)
            .map(|i| {
                let entry = days_ago(200) + Duration::days(i);
                TradeTiming {
                    trade_id: i,
                    entry_time: entry,
                    exit_time: Some(entry + held),
                    market_created_at: None,
                    market_end: None,
                }
            })
            .collect()
    }

    fn with_timings(timings: Vec<TradeTiming>) -> HoldingStyleTagger {
        let caps = FixtureCapabilities::new().with_trade_timestamps(1, timings);
        HoldingStyleTagger::new(context(InMemoryStore::new(), caps), rules())
    }

    #[tokio::test]
    async fn test_swing_peaks_at_window_midpoint() {
        let tagger = with_timings(held_for(4, Duration::hours(18 * 24 + 12)));
        let labels = tagger.evaluate(&profile(4, 0.5), as_of()).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, LabelName::SwingTrader);
        assert!(approx(labels[0].confidence, 1.0));
    }

    #[tokio::test]
    async fn test_long_term_holder_scored_against_triple_minimum() {
        let tagger = with_timings(held_for(3, Duration::days(60)));
        let labels = tagger.evaluate(&profile(3, 0.5), as_of()).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, LabelName::LongTermHolder);
        assert!(approx(labels[0].confidence, 0.5));
    }

    #[tokio::test]
    async fn test_flash_trader_confidence_stays_in_range() {
        let tagger = with_timings(held_for(5, Duration::hours(12)));
        let labels = tagger.evaluate(&profile(5, 0.5), as_of()).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, LabelName::FlashTrader);
        assert!(approx(labels[0].confidence, 0.75));
    }

    #[tokio::test]
    async fn test_open_positions_use_market_end() {
        let entry = days_ago(100);
        let timings: Vec<TradeTiming> = (0..3)
            .map(|i| TradeTiming {
                trade_id: i,
                entry_time: entry,
                exit_time: None,
                market_created_at: None,
                market_end: Some(entry + Duration::days(90)),
            })
            .collect();
        let labels = with_timings(timings).evaluate(&profile(3, 0.5), as_of()).await.unwrap();
        assert_eq!(labels[0].name, LabelName::LongTermHolder);
        assert!(approx(labels[0].confidence, 1.0));
    }

    #[tokio::test]
    async fn test_too_few_timings_yields_nothing() {
        let tagger = with_timings(held_for(2, Duration::days(10)));
        assert!(tagger.evaluate(&profile(2, 0.5), as_of()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_uses_recent_frequency() {
        // 5 trades in the last 30 days (~1.2 per week), none older
        let mut store = InMemoryStore::new();
        for i in 0..5 {
            store = store.with_trade(1, trade(i, 1, days_ago(5 * i + 1), 0.5), 0.0);
        }
        let tagger = HoldingStyleTagger::new(unwired(store), rules());
        let labels = tagger.evaluate(&profile(5, 0.5), as_of()).await.unwrap();
        let names: Vec<LabelName> = labels.iter().map(|l| l.name).collect();
        // 5 trades over 90 days is under 2 per month as well
        assert_eq!(names, vec![LabelName::SwingTrader, LabelName::LongTermHolder]);
        assert!(labels.iter().all(|l| l.confidence == HEURISTIC_CONFIDENCE));
    }

    #[tokio::test]
    async fn test_fallback_skips_zero_trade_entity() {
        let tagger = HoldingStyleTagger::new(unwired(InMemoryStore::new()), rules());
        assert!(tagger.evaluate(&profile(0, 0.0), as_of()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_provider_takes_fallback() {
        let mut store = InMemoryStore::new();
        for i in 0..30 {
            store = store.with_trade(1, trade(i, 1, as_of() - Duration::hours(4 * i + 1), 0.5), 0.0);
        }
        let caps = FixtureCapabilities::new().failing("trade_timestamps");
        let tagger = HoldingStyleTagger::new(context(store, caps), rules());
        let labels = tagger.evaluate(&profile(30, 0.5), as_of()).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, LabelName::FlashTrader);
        assert_eq!(labels[0].confidence, HEURISTIC_CONFIDENCE);
    }
}
