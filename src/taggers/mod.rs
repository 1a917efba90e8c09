//! Rule evaluators.
//!
//! Defines the `Tagger` trait and the nine evaluators the engine runs for
//! every entity. Each evaluator owns the rules of its label family, calls
//! every enabled label function and collects the labels that fire. Label
//! functions are independent: one label's outcome never feeds another's,
//! except for the explicit trend-follower and mean-reversion aliases.
//!
//! Rules that need a capability grade their evidence through the shared
//! `ConfidenceCalculator`. When the capability is missing they run a cruder
//! heuristic over profile-store data and report a flat, lower confidence.

pub mod advanced_strategy;
pub mod expertise;
pub mod holding_style;
pub mod risk;
pub mod risk_profile;
pub mod social;
pub mod special;
pub mod strategy;
pub mod trading_style;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::capability::{settle, CapabilityProvider};
use crate::confidence::ConfidenceCalculator;
use crate::config::TagsConfig;
use crate::store::ProfileStore;
use crate::types::{EntityProfile, LabelResult, NewsItem, PositionChange, TradeRecord, TradeTiming};

pub use advanced_strategy::AdvancedStrategyTagger;
pub use expertise::ExpertiseTagger;
pub use holding_style::HoldingStyleTagger;
pub use risk::RiskTagger;
pub use risk_profile::RiskProfileTagger;
pub use social::SocialTagger;
pub use special::SpecialTagger;
pub use strategy::StrategyTagger;
pub use trading_style::TradingStyleTagger;

/// Confidence reported by holding-style, risk-profile and bot fallbacks.
pub const HEURISTIC_CONFIDENCE: f64 = 0.6;

/// Confidence reported by the remaining strategy and special-label fallbacks.
pub const WEAK_HEURISTIC_CONFIDENCE: f64 = 0.5;

/// One family of labels.
#[async_trait]
pub trait Tagger: Send + Sync {
    /// Evaluator name for logging.
    fn name(&self) -> &'static str;

    /// Run every enabled label function against one entity.
    ///
    /// `as_of` anchors every recency window so repeated evaluation of the
    /// same data yields the same labels.
    async fn evaluate(&self, profile: &EntityProfile, as_of: DateTime<Utc>) -> Result<Vec<LabelResult>>;
}

/// Collaborators shared by every evaluator.
#[derive(Clone)]
pub struct TaggerContext {
    pub store: Arc<dyn ProfileStore>,
    pub capabilities: Arc<dyn CapabilityProvider>,
    pub confidence: ConfidenceCalculator,
}

impl TaggerContext {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        capabilities: Arc<dyn CapabilityProvider>,
        confidence: ConfidenceCalculator,
    ) -> Self {
        Self {
            store,
            capabilities,
            confidence,
        }
    }

    /// Trades of an entity in the `days` days up to `as_of`.
    pub async fn recent_count(&self, entity_id: i64, as_of: DateTime<Utc>, days: i64) -> Result<u64> {
        self.store
            .recent_trade_count(entity_id, days_before(as_of, days)?)
            .await
    }

    /// News of every market the trades touch, fetched once per market.
    ///
    /// `None` as soon as one market's news cannot be had: a partial view
    /// would undercount news-aligned trades.
    pub async fn news_by_market(
        &self,
        entity_id: i64,
        trades: &[TradeRecord],
        days: u32,
    ) -> Option<HashMap<i64, Vec<NewsItem>>> {
        let markets: BTreeSet<i64> = trades.iter().map(|t| t.market_id).collect();
        let mut news = HashMap::with_capacity(markets.len());
        for market_id in markets {
            let items = settle(
                "market_news",
                entity_id,
                self.capabilities.market_news(market_id, days).await,
            )?;
            news.insert(market_id, items);
        }
        Some(news)
    }
}

/// The nine evaluators, in the order their labels are reported.
pub fn default_taggers(ctx: &TaggerContext, tags: &TagsConfig) -> Vec<Arc<dyn Tagger>> {
    vec![
        Arc::new(TradingStyleTagger::new(ctx.clone(), tags.trading_style.clone())),
        Arc::new(ExpertiseTagger::new(ctx.clone(), tags.expertise.clone())),
        Arc::new(RiskTagger::new(ctx.clone(), tags.risk.clone())),
        Arc::new(StrategyTagger::new(ctx.clone(), tags.strategy.clone())),
        Arc::new(HoldingStyleTagger::new(ctx.clone(), tags.trading_style.clone())),
        Arc::new(RiskProfileTagger::new(ctx.clone(), tags.risk.clone())),
        Arc::new(AdvancedStrategyTagger::new(ctx.clone(), tags.strategy.clone())),
        Arc::new(SpecialTagger::new(ctx.clone(), tags.special.clone())),
        Arc::new(SocialTagger::new(ctx.clone(), tags.social.clone())),
    ]
}

// ---------------------------------------------------------------------------
// Shared measurements
// ---------------------------------------------------------------------------

/// Holding durations in seconds of the trades whose closing boundary is known.
pub(crate) fn holding_secs(timings: &[TradeTiming]) -> Vec<f64> {
    timings
        .iter()
        .filter_map(TradeTiming::holding_duration)
        .map(|d| d.num_seconds() as f64)
        .collect()
}

/// The instant `days` days before `as_of`, or an error when it falls
/// outside the representable range.
pub fn days_before(as_of: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|window| as_of.checked_sub_signed(window))
        .ok_or_else(|| anyhow!("a window of {days} days before {as_of} is out of range"))
}

/// Consecutive position changes that flip side with a gap accepted by `quick`.
pub(crate) fn quick_reversals(changes: &[PositionChange], quick: impl Fn(Duration) -> bool) -> usize {
    changes
        .windows(2)
        .filter(|pair| pair[0].side != pair[1].side && quick(pair[1].timestamp - pair[0].timestamp))
        .count()
}

/// Trades with at least one news item whose offset `published - traded`
/// satisfies `aligned`.
pub(crate) fn news_aligned(
    trades: &[TradeRecord],
    news: &HashMap<i64, Vec<NewsItem>>,
    aligned: impl Fn(Duration) -> bool,
) -> usize {
    trades
        .iter()
        .filter(|t| {
            news.get(&t.market_id)
                .is_some_and(|items| items.iter().any(|n| aligned(n.published_at - t.timestamp)))
        })
        .count()
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Fraction of `values` satisfying `pred`; 0 for an empty slice.
pub(crate) fn share(values: &[f64], pred: impl Fn(f64) -> bool) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|v| pred(**v)).count() as f64 / values.len() as f64
}
