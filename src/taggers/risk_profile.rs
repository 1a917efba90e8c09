//! Risk-profile labels combining entry prices with holding periods.
//!
//! Balanced, conservative and aggressive each look at one price band and one
//! holding window. When trade timings are missing only the price band is
//! checked, against fixed bands, and the label reports `HEURISTIC_CONFIDENCE`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{holding_secs, mean, share, Tagger, TaggerContext, HEURISTIC_CONFIDENCE};
use crate::capability::settle;
use crate::config::{active, AggressiveRule, BalancedRule, ConservativeRule, RiskRules};
use crate::types::{EntityProfile, LabelName, LabelResult};

const SECS_PER_DAY: f64 = 86_400.0;

// Fixed bands used when holding periods are unknown.
const FALLBACK_LOW_PRICE: f64 = 0.3;
const FALLBACK_HIGH_PRICE: f64 = 0.7;

pub struct RiskProfileTagger {
    ctx: TaggerContext,
    rules: RiskRules,
}

/// Measurements shared by the three rules of one evaluation.
struct Evidence {
    prices: Vec<f64>,
    /// `None` when trade timings are unavailable.
    holding_days: Option<Option<f64>>,
}

impl RiskProfileTagger {
    pub fn new(ctx: TaggerContext, rules: RiskRules) -> Self {
        Self { ctx, rules }
    }

    fn graded(&self, label: LabelName, share: f64) -> LabelResult {
        LabelResult::new(label, self.ctx.confidence.clamp(0.3 + 0.7 * share))
    }

    fn balanced(&self, ev: &Evidence, rule: &BalancedRule) -> Option<LabelResult> {
        if ev.prices.len() < rule.min_trades {
            return None;
        }
        match ev.holding_days {
            Some(days) => {
                let days = days?;
                let ratio = share(&ev.prices, |p| (rule.price_range_min..=rule.price_range_max).contains(&p));
                (ratio >= rule.price_ratio_threshold
                    && (rule.holding_days_min..=rule.holding_days_max).contains(&days))
                .then(|| self.graded(LabelName::Balanced, ratio))
            }
            None => {
                let ratio = share(&ev.prices, |p| (FALLBACK_LOW_PRICE..=FALLBACK_HIGH_PRICE).contains(&p));
                (ratio >= 0.5).then(|| LabelResult::new(LabelName::Balanced, HEURISTIC_CONFIDENCE))
            }
        }
    }

    fn conservative(&self, ev: &Evidence, rule: &ConservativeRule) -> Option<LabelResult> {
        if ev.prices.len() < rule.min_trades {
            return None;
        }
        match ev.holding_days {
            Some(days) => {
                let days = days?;
                let ratio = share(&ev.prices, |p| p > rule.price_threshold);
                (ratio >= rule.high_prob_ratio_threshold && days >= rule.min_holding_days)
                    .then(|| self.graded(LabelName::Conservative, ratio))
            }
            None => {
                let ratio = share(&ev.prices, |p| p > FALLBACK_HIGH_PRICE);
                (ratio >= 0.6).then(|| LabelResult::new(LabelName::Conservative, HEURISTIC_CONFIDENCE))
            }
        }
    }

    fn aggressive(&self, ev: &Evidence, rule: &AggressiveRule) -> Option<LabelResult> {
        if ev.prices.len() < rule.min_trades {
            return None;
        }
        match ev.holding_days {
            Some(days) => {
                let days = days?;
                let ratio = share(&ev.prices, |p| p < rule.price_threshold);
                (ratio >= rule.low_prob_ratio_threshold && days <= rule.max_holding_days)
                    .then(|| self.graded(LabelName::Aggressive, ratio))
            }
            None => {
                let ratio = share(&ev.prices, |p| p < FALLBACK_LOW_PRICE);
                (ratio >= 0.5).then(|| LabelResult::new(LabelName::Aggressive, HEURISTIC_CONFIDENCE))
            }
        }
    }
}

#[async_trait]
impl Tagger for RiskProfileTagger {
    fn name(&self) -> &'static str {
        "risk_profile"
    }

    async fn evaluate(&self, profile: &EntityProfile, _as_of: DateTime<Utc>) -> Result<Vec<LabelResult>> {
        let balanced = active(&self.rules.balanced);
        let conservative = active(&self.rules.conservative);
        let aggressive = active(&self.rules.aggressive);
        if balanced.is_none() && conservative.is_none() && aggressive.is_none() {
            return Ok(Vec::new());
        }

        let prices = self.ctx.store.price_distribution(profile.id).await?;
        let holding_days = settle(
            "trade_timestamps",
            profile.id,
            self.ctx.capabilities.trade_timestamps(profile.id).await,
        )
        .map(|timings| mean(&holding_secs(&timings)).map(|secs| secs / SECS_PER_DAY));
        let ev = Evidence { prices, holding_days };

        let mut labels = Vec::new();
        labels.extend(balanced.and_then(|r| self.balanced(&ev, r)));
        labels.extend(conservative.and_then(|r| self.conservative(&ev, r)));
        labels.extend(aggressive.and_then(|r| self.aggressive(&ev, r)));
        Ok(labels)
    }
}
