//! Special-case labels: insiders, bots, manipulators, newcomers and the like.
//!
//! These rules lean hardest on enrichment. Suspected insider, bot and
//! manipulation keep a profile-only heuristic for when their capability is
//! missing; news trader does not and stays silent instead. Social activity
//! and linked addresses fall back to their neutral values.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};

use super::{
    news_aligned, quick_reversals, share, Tagger, TaggerContext, HEURISTIC_CONFIDENCE,
    WEAK_HEURISTIC_CONFIDENCE,
};
use crate::capability::settle;
use crate::config::{
    active, BotRule, CelebrityRule, DormantAwakenedRule, InsiderRule, InstitutionRule, ManipulationRule,
    MultiAccountRule, NewbieRule, NewsTraderRule, SingleMarketFocusRule, SpecialRules,
};
use crate::types::{EntityProfile, LabelName, LabelResult, SocialActivity, TradeRecord};

/// Follower count at which celebrity confidence saturates.
const CELEBRITY_FOLLOWER_SATURATION: f64 = 100_000.0;
const INSTITUTION_VOLUME_SATURATION: f64 = 1_000_000.0;
const DORMANCY_SATURATION_DAYS: f64 = 180.0;

pub struct SpecialTagger {
    ctx: TaggerContext,
    rules: SpecialRules,
}

impl SpecialTagger {
    pub fn new(ctx: TaggerContext, rules: SpecialRules) -> Self {
        Self { ctx, rules }
    }

    async fn suspected_insider(
        &self,
        p: &EntityProfile,
        trades: &[TradeRecord],
        rule: &InsiderRule,
    ) -> Option<LabelResult> {
        if trades.is_empty() || trades.len() < rule.min_trades || p.win_rate < rule.min_win_rate {
            return None;
        }
        let Some(news) = self.ctx.news_by_market(p.id, trades, 3).await else {
            return (p.win_rate >= 0.8 && p.total_trades >= 10)
                .then(|| LabelResult::new(LabelName::SuspectedInsider, WEAK_HEURISTIC_CONFIDENCE));
        };

        // positioned within the day before the story broke
        let day = Duration::days(1);
        let early = news_aligned(trades, &news, |lead| lead > Duration::zero() && lead < day);
        let ratio = early as f64 / trades.len() as f64;
        if ratio < rule.early_trade_ratio_threshold {
            return None;
        }
        let confidence = self.ctx.confidence.clamp((p.win_rate * ratio).min(1.0));
        Some(LabelResult::new(LabelName::SuspectedInsider, confidence))
    }

    async fn news_trader(
        &self,
        p: &EntityProfile,
        trades: &[TradeRecord],
        rule: &NewsTraderRule,
    ) -> Option<LabelResult> {
        if trades.is_empty() || trades.len() < rule.min_trades {
            return None;
        }
        let news = self.ctx.news_by_market(p.id, trades, 1).await?;

        // traded within the hour after publication
        let hour = Duration::hours(1);
        let reacting = news_aligned(trades, &news, |lead| lead < Duration::zero() && -lead < hour);
        let ratio = reacting as f64 / trades.len() as f64;
        if ratio < rule.news_ratio_threshold {
            return None;
        }
        let confidence = self.ctx.confidence.ratio(ratio, rule.news_ratio_threshold);
        Some(LabelResult::new(LabelName::NewsTrader, confidence))
    }

    fn celebrity(&self, social: &SocialActivity, rule: &CelebrityRule) -> Option<LabelResult> {
        if social.followers < rule.min_followers || !social.verified {
            return None;
        }
        let reach = (social.followers as f64 / CELEBRITY_FOLLOWER_SATURATION).min(1.0);
        Some(LabelResult::new(LabelName::Celebrity, self.ctx.confidence.clamp(reach)))
    }

    async fn bot(
        &self,
        p: &EntityProfile,
        trades: &[TradeRecord],
        rule: &BotRule,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LabelResult>> {
        let stats = settle("pattern_stats", p.id, self.ctx.capabilities.pattern_stats(p.id).await);

        let Some(stats) = stats else {
            if trades.len() < 20 {
                return Ok(None);
            }
            // amounts compared at cent precision
            let distinct: BTreeSet<i64> = trades.iter().map(|t| (t.amount * 100.0).round() as i64).collect();
            if distinct.len() > 3 {
                return Ok(None);
            }
            let recent = self.ctx.recent_count(p.id, as_of, 7).await?;
            return Ok((recent >= 20).then(|| LabelResult::new(LabelName::Bot, HEURISTIC_CONFIDENCE)));
        };

        let max_amounts = rule.max_unique_amounts as f64;
        if stats.timing_variance >= rule.max_time_variance
            || stats.distinct_amounts as f64 >= max_amounts
            || stats.mean_response_secs >= rule.max_response_time
        {
            return Ok(None);
        }
        let regularity = [
            1.0 - stats.timing_variance / rule.max_time_variance,
            1.0 - stats.distinct_amounts as f64 / max_amounts,
            1.0 - stats.mean_response_secs / rule.max_response_time,
        ];
        let confidence = self.ctx.confidence.clamp(regularity.iter().sum::<f64>() / 3.0);
        Ok(Some(LabelResult::new(LabelName::Bot, confidence)))
    }

    fn multi_account(&self, linked: &[i64], rule: &MultiAccountRule) -> Option<LabelResult> {
        if linked.len() < rule.min_linked_accounts {
            return None;
        }
        let confidence = (linked.len() as f64 / rule.saturation_count as f64).min(1.0);
        Some(LabelResult::new(LabelName::MultiAccount, self.ctx.confidence.clamp(confidence)))
    }

    async fn manipulation(
        &self,
        p: &EntityProfile,
        trades: &[TradeRecord],
        rule: &ManipulationRule,
    ) -> Option<LabelResult> {
        if trades.is_empty() || trades.len() < rule.min_trades {
            return None;
        }
        let amounts: Vec<f64> = trades.iter().map(|t| t.amount).collect();
        let changes = settle("position_changes", p.id, self.ctx.capabilities.position_changes(p.id).await);

        let Some(changes) = changes else {
            let whale_share = share(&amounts, |a| a > 50_000.0);
            return (trades.len() >= 5 && whale_share >= 0.5 && p.total_volume >= 500_000.0)
                .then(|| LabelResult::new(LabelName::Manipulation, WEAK_HEURISTIC_CONFIDENCE));
        };

        let large = share(&amounts, |a| a > rule.large_trade_threshold);
        let reversed = if changes.is_empty() {
            0.0
        } else {
            quick_reversals(&changes, |gap| gap < Duration::hours(1)) as f64 / changes.len() as f64
        };
        if large < rule.large_trade_ratio_threshold || reversed < rule.reverse_op_ratio_threshold {
            return None;
        }
        let confidence = self.ctx.confidence.clamp((large + reversed) / 2.0);
        Some(LabelResult::new(LabelName::Manipulation, confidence))
    }

    fn institution(&self, p: &EntityProfile, rule: &InstitutionRule) -> Option<LabelResult> {
        if p.total_volume < rule.min_total_volume || p.win_rate < rule.min_win_rate || p.total_trades < rule.min_trades {
            return None;
        }
        let confidence = (p.total_volume / INSTITUTION_VOLUME_SATURATION).min(1.0);
        Some(LabelResult::new(LabelName::Institution, self.ctx.confidence.clamp(confidence)))
    }

    fn newbie(
        &self,
        p: &EntityProfile,
        trades: &[TradeRecord],
        rule: &NewbieRule,
        as_of: DateTime<Utc>,
    ) -> Option<LabelResult> {
        let first = trades.iter().map(|t| t.timestamp).min()?;
        let days = (as_of - first).num_days();
        if days > rule.max_days_since_first_trade || p.total_trades > rule.max_trades {
            return None;
        }
        let max_days = rule.max_days_since_first_trade.max(1) as f64;
        let confidence = self.ctx.confidence.clamp(1.0 - 0.5 * days as f64 / max_days);
        Some(LabelResult::new(LabelName::Newbie, confidence))
    }

    async fn dormant_awakened(
        &self,
        p: &EntityProfile,
        trades: &[TradeRecord],
        rule: &DormantAwakenedRule,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LabelResult>> {
        let Some(gap_days) = trades
            .windows(2)
            .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_days())
            .max()
        else {
            return Ok(None);
        };
        if gap_days < rule.min_dormant_days {
            return Ok(None);
        }
        let recent = self.ctx.recent_count(p.id, as_of, 30).await?;
        if recent < rule.min_recent_trades {
            return Ok(None);
        }
        let confidence = (gap_days as f64 / DORMANCY_SATURATION_DAYS).min(1.0);
        Ok(Some(LabelResult::new(LabelName::DormantAwakened, self.ctx.confidence.clamp(confidence))))
    }

    fn single_market_focus(&self, trades: &[TradeRecord], rule: &SingleMarketFocusRule) -> Option<LabelResult> {
        if trades.is_empty() || trades.len() < rule.min_trades {
            return None;
        }
        let mut per_market: HashMap<i64, usize> = HashMap::new();
        for t in trades {
            *per_market.entry(t.market_id).or_default() += 1;
        }
        let top = per_market.values().copied().max().unwrap_or(0);
        let ratio = top as f64 / trades.len() as f64;
        if ratio < rule.focus_ratio_threshold {
            return None;
        }
        let confidence = self.ctx.confidence.ratio(ratio, rule.focus_ratio_threshold);
        Some(LabelResult::new(LabelName::SingleMarketFocus, confidence))
    }
}

#[async_trait]
impl Tagger for SpecialTagger {
    fn name(&self) -> &'static str {
        "special"
    }

    async fn evaluate(&self, profile: &EntityProfile, as_of: DateTime<Utc>) -> Result<Vec<LabelResult>> {
        let rules = &self.rules;
        let trades = self.ctx.store.trades(profile.id).await?;
        let mut labels = Vec::new();

        if let Some(rule) = active(&rules.suspected_insider) {
            labels.extend(self.suspected_insider(profile, &trades, rule).await);
        }
        if let Some(rule) = active(&rules.news_trader) {
            labels.extend(self.news_trader(profile, &trades, rule).await);
        }
        if let Some(rule) = active(&rules.celebrity) {
            let social = settle(
                "social_activity",
                profile.id,
                self.ctx.capabilities.social_activity(&profile.address).await,
            )
            .unwrap_or(SocialActivity::NEUTRAL);
            labels.extend(self.celebrity(&social, rule));
        }
        if let Some(rule) = active(&rules.bot) {
            labels.extend(self.bot(profile, &trades, rule, as_of).await?);
        }
        if let Some(rule) = active(&rules.multi_account) {
            let linked = settle(
                "linked_addresses",
                profile.id,
                self.ctx.capabilities.linked_addresses(profile.id).await,
            )
            .unwrap_or_default();
            labels.extend(self.multi_account(&linked, rule));
        }
        if let Some(rule) = active(&rules.manipulation) {
            labels.extend(self.manipulation(profile, &trades, rule).await);
        }
        if let Some(rule) = active(&rules.institution) {
            labels.extend(self.institution(profile, rule));
        }
        if let Some(rule) = active(&rules.newbie) {
            labels.extend(self.newbie(profile, &trades, rule, as_of));
        }
        if let Some(rule) = active(&rules.dormant_awakened) {
            labels.extend(self.dormant_awakened(profile, &trades, rule, as_of).await?);
        }
        if let Some(rule) = active(&rules.single_market_focus) {
            labels.extend(self.single_market_focus(&trades, rule));
        }

        Ok(labels)
    }
}
