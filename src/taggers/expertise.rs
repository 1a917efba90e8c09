//! Market-domain expertise labels.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Tagger, TaggerContext};
use crate::config::{active, CategoryExpertRule, ExpertiseRules, KeywordExpertRule, WellRoundedRule};
use crate::types::{EntityProfile, LabelName, LabelResult, MarketCategory};

pub struct ExpertiseTagger {
    ctx: TaggerContext,
    rules: ExpertiseRules,
}

impl ExpertiseTagger {
    pub fn new(ctx: TaggerContext, rules: ExpertiseRules) -> Self {
        Self { ctx, rules }
    }

    /// Shared gate for both expert shapes: enough trades and a large enough share.
    fn grade(&self, label: LabelName, count: u64, total: u64, ratio_threshold: f64, min_count: u64) -> Option<LabelResult> {
        let ratio = count as f64 / total as f64;
        if ratio < ratio_threshold || count < min_count {
            return None;
        }
        Some(LabelResult::new(label, self.ctx.confidence.ratio(ratio, ratio_threshold)))
    }

    async fn category_expert(
        &self,
        p: &EntityProfile,
        label: LabelName,
        rule: &CategoryExpertRule,
    ) -> Result<Option<LabelResult>> {
        let count = self.ctx.store.category_trade_count(p.id, rule.market_category).await?;
        Ok(self.grade(label, count, p.total_trades, rule.ratio_threshold, rule.min_category_trades))
    }

    async fn keyword_expert(
        &self,
        p: &EntityProfile,
        label: LabelName,
        rule: &KeywordExpertRule,
    ) -> Result<Option<LabelResult>> {
        let count = self
            .ctx
            .store
            .keyword_trade_count(p.id, &rule.keywords, rule.parent_category)
            .await?;
        Ok(self.grade(label, count, p.total_trades, rule.ratio_threshold, rule.min_category_trades))
    }

    async fn well_rounded(&self, p: &EntityProfile, rule: &WellRoundedRule) -> Result<Option<LabelResult>> {
        if p.total_trades < rule.min_trades {
            return Ok(None);
        }

        let mut counts = Vec::with_capacity(MarketCategory::ALL.len());
        for category in MarketCategory::ALL {
            counts.push(self.ctx.store.category_trade_count(p.id, *category).await?);
        }
        let covered = counts.iter().filter(|c| **c > 0).count();
        let largest = counts.iter().copied().max().unwrap_or(0) as f64 / p.total_trades as f64;

        if covered < rule.min_categories || largest >= rule.max_category_ratio {
            return Ok(None);
        }
        let confidence = self.ctx.confidence.count(
            covered as u64,
            rule.min_categories as u64,
            Some(MarketCategory::ALL.len() as u64),
        );
        Ok(Some(LabelResult::new(LabelName::WellRounded, confidence)))
    }
}

#[async_trait]
impl Tagger for ExpertiseTagger {
    fn name(&self) -> &'static str {
        "expertise"
    }

    async fn evaluate(&self, profile: &EntityProfile, _as_of: DateTime<Utc>) -> Result<Vec<LabelResult>> {
        if profile.total_trades == 0 {
            return Ok(Vec::new());
        }
        let mut labels = Vec::new();

        for (label, rule) in self.rules.category_experts() {
            if let Some(rule) = active(rule) {
                labels.extend(self.category_expert(profile, label, rule).await?);
            }
        }
        for (label, rule) in self.rules.keyword_experts() {
            if let Some(rule) = active(rule) {
                labels.extend(self.keyword_expert(profile, label, rule).await?);
            }
        }
        if let Some(rule) = active(&self.rules.well_rounded) {
            labels.extend(self.well_rounded(profile, rule).await?);
        }

        Ok(labels)
    }
}
