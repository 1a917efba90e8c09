//! Entry-timing labels relative to the market lifecycle.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Tagger, TaggerContext};
use crate::config::{active, StrategyRules};
use crate::types::{EntityProfile, LabelName, LabelResult};

pub struct StrategyTagger {
    ctx: TaggerContext,
    rules: StrategyRules,
}

impl StrategyTagger {
    pub fn new(ctx: TaggerContext, rules: StrategyRules) -> Self {
        Self { ctx, rules }
    }

    fn timed_entry(
        &self,
        label: LabelName,
        count: u64,
        p: &EntityProfile,
        ratio_threshold: f64,
        min_trades: u64,
    ) -> Option<LabelResult> {
        let ratio = count as f64 / p.total_trades as f64;
        if ratio < ratio_threshold || count < min_trades {
            return None;
        }
        Some(LabelResult::new(label, self.ctx.confidence.ratio(ratio, ratio_threshold)))
    }
}

#[async_trait]
impl Tagger for StrategyTagger {
    fn name(&self) -> &'static str {
        "strategy"
    }

    async fn evaluate(&self, profile: &EntityProfile, _as_of: DateTime<Utc>) -> Result<Vec<LabelResult>> {
        if profile.total_trades == 0 {
            return Ok(Vec::new());
        }
        let mut labels = Vec::new();

        if let Some(rule) = active(&self.rules.late_entry) {
            let count = self.ctx.store.late_entry_count(profile.id, rule.days_before_close).await?;
            labels.extend(self.timed_entry(
                LabelName::LateEntry,
                count,
                profile,
                rule.ratio_threshold,
                rule.min_trades,
            ));
        }
        if let Some(rule) = active(&self.rules.early_entry) {
            let count = self
                .ctx
                .store
                .early_entry_count(profile.id, rule.hours_after_creation)
                .await?;
            labels.extend(self.timed_entry(
                LabelName::EarlyEntry,
                count,
                profile,
                rule.ratio_threshold,
                rule.min_trades,
            ));
        }

        Ok(labels)
    }
}
