//! Strategy labels that need market or position history.
//!
//! Contrarian and momentum read price trends, arbitrageur and hedger read
//! position changes, event driven reads market news. Value hunter, market
//! maker and sniper only need the trade list and the profile.
//!
//! Trend follower and mean reversion have no rules of their own: they rerun
//! the momentum and value-hunter computations under their own label.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};

use super::{
    mean, news_aligned, quick_reversals, share, Tagger, TaggerContext, WEAK_HEURISTIC_CONFIDENCE,
};
use crate::capability::settle;
use crate::config::{
    active, ArbitrageurRule, EventDrivenRule, HedgerRule, MarketMakerRule, SniperRule, StrategyRules,
    TrendRule, ValueHunterRule,
};
use crate::types::{EntityProfile, LabelName, LabelResult, Outcome, PositionChange, TradeRecord, TradeSide};

/// Price points looked at when deciding a market's trend.
const TREND_WINDOW: usize = 5;

pub struct AdvancedStrategyTagger {
    ctx: TaggerContext,
    rules: StrategyRules,
}

/// Which way a trade leans against its market's trend.
#[derive(Clone, Copy)]
enum TrendStance {
    Against,
    With,
}

impl TrendStance {
    fn matches(self, side: TradeSide, trend: f64) -> bool {
        if trend == 0.0 {
            return false;
        }
        let rising = trend > 0.0;
        match (self, side) {
            (TrendStance::With, TradeSide::Buy) | (TrendStance::Against, TradeSide::Sell) => rising,
            (TrendStance::With, TradeSide::Sell) | (TrendStance::Against, TradeSide::Buy) => !rising,
        }
    }
}

impl AdvancedStrategyTagger {
    pub fn new(ctx: TaggerContext, rules: StrategyRules) -> Self {
        Self { ctx, rules }
    }

    /// Net trend over the last few price points of every traded market.
    ///
    /// Markets with fewer than two points are left out. `None` when price
    /// history is not available for some market.
    async fn market_trends(&self, entity_id: i64, trades: &[TradeRecord]) -> Option<HashMap<i64, f64>> {
        let markets: BTreeSet<i64> = trades.iter().map(|t| t.market_id).collect();
        let mut trends = HashMap::new();
        for market_id in markets {
            let history = settle(
                "price_history",
                entity_id,
                self.ctx.capabilities.price_history(market_id).await,
            )?;
            let tail = &history[history.len().saturating_sub(TREND_WINDOW)..];
            if let [first, .., last] = tail {
                trends.insert(market_id, last.price - first.price);
            }
        }
        Some(trends)
    }

    fn trend_share(
        &self,
        label: LabelName,
        stance: TrendStance,
        trades: &[TradeRecord],
        trends: &HashMap<i64, f64>,
        rule: &TrendRule,
    ) -> Option<LabelResult> {
        // trades in markets without history are left out; flat markets still count
        let graded: Vec<(TradeSide, f64)> = trades
            .iter()
            .filter_map(|t| trends.get(&t.market_id).map(|trend| (t.side, *trend)))
            .collect();
        if graded.is_empty() || graded.len() < rule.min_trades {
            return None;
        }
        let matching = graded.iter().filter(|(side, trend)| stance.matches(*side, *trend)).count();
        let ratio = matching as f64 / graded.len() as f64;
        if ratio < rule.ratio_threshold {
            return None;
        }
        Some(LabelResult::new(label, self.ctx.confidence.ratio(ratio, rule.ratio_threshold)))
    }

    fn contrarian(
        &self,
        trades: &[TradeRecord],
        trends: Option<&HashMap<i64, f64>>,
        rule: &TrendRule,
    ) -> Option<LabelResult> {
        match trends {
            Some(trends) => self.trend_share(LabelName::Contrarian, TrendStance::Against, trades, trends, rule),
            None => {
                // buying at the extremes hints at fading the crowd
                if trades.len() < 5 {
                    return None;
                }
                let prices: Vec<f64> = trades.iter().map(|t| t.price).collect();
                (share(&prices, |p| !(0.2..=0.8).contains(&p)) >= 0.5)
                    .then(|| LabelResult::new(LabelName::Contrarian, WEAK_HEURISTIC_CONFIDENCE))
            }
        }
    }

    async fn momentum(
        &self,
        label: LabelName,
        p: &EntityProfile,
        trades: &[TradeRecord],
        trends: Option<&HashMap<i64, f64>>,
        rule: &TrendRule,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LabelResult>> {
        if let Some(trends) = trends {
            return Ok(self.trend_share(label, TrendStance::With, trades, trends, rule));
        }
        if trades.len() < 10 {
            return Ok(None);
        }
        let recent = self.ctx.recent_count(p.id, as_of, 7).await?;
        Ok((recent >= 10).then(|| LabelResult::new(label, WEAK_HEURISTIC_CONFIDENCE)))
    }

    fn value_hunter(&self, label: LabelName, trades: &[TradeRecord], rule: &ValueHunterRule) -> Option<LabelResult> {
        if trades.is_empty() || trades.len() < rule.min_trades {
            return None;
        }
        let prices: Vec<f64> = trades.iter().map(|t| t.price).collect();
        let ratio = share(&prices, |p| {
            (rule.undervalued_min..=rule.undervalued_max).contains(&p)
                || (rule.overvalued_min..=rule.overvalued_max).contains(&p)
        });
        if ratio < rule.value_ratio_threshold {
            return None;
        }
        let confidence = self.ctx.confidence.ratio(ratio, rule.value_ratio_threshold);
        Some(LabelResult::new(label, confidence))
    }

    fn arbitrageur(&self, changes: &[PositionChange], rule: &ArbitrageurRule) -> Option<LabelResult> {
        if changes.is_empty() || changes.len() < rule.min_trades {
            return None;
        }
        let ratio = quick_reversals(changes, |gap| gap <= Duration::hours(1)) as f64 / changes.len() as f64;
        if ratio < rule.arbitrage_ratio_threshold {
            return None;
        }
        let confidence = self.ctx.confidence.ratio(ratio, rule.arbitrage_ratio_threshold);
        Some(LabelResult::new(LabelName::Arbitrageur, confidence))
    }

    async fn event_driven(
        &self,
        p: &EntityProfile,
        trades: &[TradeRecord],
        rule: &EventDrivenRule,
    ) -> Option<LabelResult> {
        if trades.is_empty() || trades.len() < rule.min_trades {
            return None;
        }
        match self.ctx.news_by_market(p.id, trades, 1).await {
            Some(news) => {
                let hour = Duration::hours(1).num_seconds();
                let aligned = news_aligned(trades, &news, |offset| offset.num_seconds().abs() < hour);
                let ratio = aligned as f64 / trades.len() as f64;
                if ratio < rule.event_ratio_threshold {
                    return None;
                }
                let confidence = self.ctx.confidence.ratio(ratio, rule.event_ratio_threshold);
                Some(LabelResult::new(LabelName::EventDriven, confidence))
            }
            None => {
                // bursts of trading stand in for news reactions
                if trades.len() < 5 {
                    return None;
                }
                let gaps: Vec<f64> = trades
                    .windows(2)
                    .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64)
                    .collect();
                let bursty = mean(&gaps).is_some_and(|gap| gap < Duration::days(1).num_seconds() as f64);
                bursty.then(|| LabelResult::new(LabelName::EventDriven, WEAK_HEURISTIC_CONFIDENCE))
            }
        }
    }

    fn hedger(&self, changes: &[PositionChange], rule: &HedgerRule) -> Option<LabelResult> {
        if changes.is_empty() || changes.len() < rule.min_trades {
            return None;
        }
        // net exposure per market, (yes, no)
        let mut exposure: HashMap<i64, (f64, f64)> = HashMap::new();
        for change in changes {
            let signed = match change.side {
                TradeSide::Buy => change.amount,
                TradeSide::Sell => -change.amount,
            };
            let entry = exposure.entry(change.market_id).or_default();
            match change.outcome {
                Outcome::Yes => entry.0 += signed,
                Outcome::No => entry.1 += signed,
            }
        }
        let hedged = exposure.values().filter(|(yes, no)| *yes > 0.0 && *no > 0.0).count();
        let ratio = hedged as f64 / exposure.len() as f64;
        if ratio < rule.hedge_ratio_threshold {
            return None;
        }
        let confidence = self.ctx.confidence.ratio(ratio, rule.hedge_ratio_threshold);
        Some(LabelResult::new(LabelName::Hedger, confidence))
    }

    fn market_maker(&self, trades: &[TradeRecord], rule: &MarketMakerRule) -> Option<LabelResult> {
        if trades.len() < rule.min_trades {
            return None;
        }
        let buys = trades.iter().filter(|t| t.side == TradeSide::Buy).count();
        let sells = trades.len() - buys;
        if buys == 0 || sells == 0 {
            return None;
        }
        let balance = buys.min(sells) as f64 / buys.max(sells) as f64;
        let volume: f64 = trades.iter().map(|t| t.amount).sum();
        if balance < rule.buy_sell_ratio_threshold || volume < rule.min_volume {
            return None;
        }
        let confidence = self.ctx.confidence.clamp(0.3 + 0.7 * balance);
        Some(LabelResult::new(LabelName::MarketMaker, confidence))
    }

    fn sniper(&self, p: &EntityProfile, rule: &SniperRule) -> Option<LabelResult> {
        let few_trades = (1..=rule.max_trades as u64).contains(&p.total_trades);
        if !few_trades || p.avg_trade_size < rule.min_avg_trade_size || p.win_rate < rule.min_win_rate {
            return None;
        }
        let confidence = self.ctx.confidence.clamp(0.3 + 0.7 * p.win_rate);
        Some(LabelResult::new(LabelName::Sniper, confidence))
    }
}

#[async_trait]
impl Tagger for AdvancedStrategyTagger {
    fn name(&self) -> &'static str {
        "advanced_strategy"
    }

    async fn evaluate(&self, profile: &EntityProfile, as_of: DateTime<Utc>) -> Result<Vec<LabelResult>> {
        let rules = &self.rules;
        let contrarian = active(&rules.contrarian);
        let momentum = active(&rules.momentum);
        // aliases run their delegate's rule even when the delegate label is off
        let trend_follower = active(&rules.trend_follower).and(rules.momentum.as_ref());
        let mean_reversion = active(&rules.mean_reversion).and(rules.value_hunter.as_ref());

        let trades = self.ctx.store.trades(profile.id).await?;

        let trends = if contrarian.is_some() || momentum.is_some() || trend_follower.is_some() {
            self.market_trends(profile.id, &trades).await
        } else {
            None
        };

        let changes = if active(&rules.arbitrageur).is_some() || active(&rules.hedger).is_some() {
            settle(
                "position_changes",
                profile.id,
                self.ctx.capabilities.position_changes(profile.id).await,
            )
        } else {
            None
        };

        let mut labels = Vec::new();

        if let Some(rule) = contrarian {
            labels.extend(self.contrarian(&trades, trends.as_ref(), rule));
        }
        if let Some(rule) = momentum {
            labels.extend(
                self.momentum(LabelName::Momentum, profile, &trades, trends.as_ref(), rule, as_of)
                    .await?,
            );
        }
        if let Some(rule) = active(&rules.value_hunter) {
            labels.extend(self.value_hunter(LabelName::ValueHunter, &trades, rule));
        }
        if let (Some(rule), Some(changes)) = (active(&rules.arbitrageur), changes.as_deref()) {
            labels.extend(self.arbitrageur(changes, rule));
        }
        if let Some(rule) = active(&rules.event_driven) {
            labels.extend(self.event_driven(profile, &trades, rule).await);
        }
        if let (Some(rule), Some(changes)) = (active(&rules.hedger), changes.as_deref()) {
            labels.extend(self.hedger(changes, rule));
        }
        if let Some(rule) = active(&rules.market_maker) {
            labels.extend(self.market_maker(&trades, rule));
        }
        if let Some(rule) = trend_follower {
            labels.extend(
                self.momentum(LabelName::TrendFollower, profile, &trades, trends.as_ref(), rule, as_of)
                    .await?,
            );
        }
        if let Some(rule) = mean_reversion {
            labels.extend(self.value_hunter(LabelName::MeanReversion, &trades, rule));
        }
        if let Some(rule) = active(&rules.sniper) {
            labels.extend(self.sniper(profile, rule));
        }

        Ok(labels)
    }
}
