//! Configuration loading from TOML with eager validation.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs, one
//! record per label. Category sections are mandatory, unknown keys are
//! rejected and every threshold is range-checked before the engine starts,
//! so a typo or a missing threshold can never read as "label disabled".

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::confidence::ScoringMethod;
use crate::types::{LabelName, MarketCategory, TaggerError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub tags: TagsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    /// Env var that, when set, overrides `url` (keeps credentials out of the file).
    #[serde(default)]
    pub url_env: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// The connection URL, preferring `url_env` when it resolves.
    pub fn resolved_url(&self) -> String {
        self.url_env
            .as_deref()
            .and_then(|env| AppConfig::resolve_env(env).ok())
            .unwrap_or_else(|| self.url.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfidenceConfig {
    #[serde(default)]
    pub method: ScoringMethod,
    #[serde(default)]
    pub min_confidence: f64,
    #[serde(default = "default_max_confidence")]
    pub max_confidence: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            method: ScoringMethod::Linear,
            min_confidence: 0.0,
            max_confidence: default_max_confidence(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Entities evaluated concurrently during a batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Log batch progress every N entities.
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
    /// Activity window for `update`.
    #[serde(default = "default_update_lookback_days")]
    pub update_lookback_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            progress_every: default_progress_every(),
            update_lookback_days: default_update_lookback_days(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_max_confidence() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_progress_every() -> usize {
    100
}

fn default_update_lookback_days() -> u32 {
    7
}

fn enabled_by_default() -> bool {
    true
}

fn default_linked_saturation() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Rule records
// ---------------------------------------------------------------------------

/// A label rule that can be switched off without deleting its thresholds.
pub trait RuleToggle {
    fn enabled(&self) -> bool;
}

/// The rule, if it is configured and enabled.
pub fn active<T: RuleToggle>(rule: &Option<T>) -> Option<&T> {
    rule.as_ref().filter(|r| r.enabled())
}

macro_rules! rule_config {
    ($(#[$meta:meta])* $name:ident { $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct $name {
            #[serde(default = "enabled_by_default")]
            pub enabled: bool,
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl RuleToggle for $name {
            fn enabled(&self) -> bool {
                self.enabled
            }
        }
    };
}

rule_config!(HighWinRateRule { win_rate_threshold: f64, min_trades: u64 });
rule_config!(LargeVolumeRule { avg_trade_size_threshold: f64 });
rule_config!(HighFrequencyRule { lookback_days: u32, trades_per_day_threshold: f64 });
rule_config!(StableProfitRule { min_profitable_months: u32, min_total_months: u32 });
rule_config!(SmallFrequentRule { max_avg_trade_size: f64, min_trades: u64 });
rule_config!(SwingTraderRule { min_trades: usize, min_holding_days: f64, max_holding_days: f64 });
rule_config!(LongTermHolderRule { min_trades: usize, min_holding_days: f64 });
rule_config!(FlashTraderRule { min_trades: usize, max_holding_hours: f64 });

rule_config!(CategoryExpertRule {
    market_category: MarketCategory,
    ratio_threshold: f64,
    min_category_trades: u64,
});
rule_config!(KeywordExpertRule {
    keywords: Vec<String>,
    #[serde(default)]
    parent_category: Option<MarketCategory>,
    ratio_threshold: f64,
    min_category_trades: u64,
});
rule_config!(WellRoundedRule { min_trades: u64, min_categories: usize, max_category_ratio: f64 });

rule_config!(LowRiskRule {
    price_threshold_low: f64,
    price_threshold_high: f64,
    ratio_threshold: f64,
    min_trades: usize,
});
rule_config!(HighRiskRule {
    price_range_low: f64,
    price_range_high: f64,
    ratio_threshold: f64,
    min_trades: usize,
});
rule_config!(BalancedRule {
    min_trades: usize,
    price_range_min: f64,
    price_range_max: f64,
    price_ratio_threshold: f64,
    holding_days_min: f64,
    holding_days_max: f64,
});
rule_config!(ConservativeRule {
    min_trades: usize,
    price_threshold: f64,
    high_prob_ratio_threshold: f64,
    min_holding_days: f64,
});
rule_config!(AggressiveRule {
    min_trades: usize,
    price_threshold: f64,
    low_prob_ratio_threshold: f64,
    max_holding_days: f64,
});

rule_config!(LateEntryRule { days_before_close: u32, ratio_threshold: f64, min_trades: u64 });
rule_config!(EarlyEntryRule { hours_after_creation: u32, ratio_threshold: f64, min_trades: u64 });
rule_config!(
    /// Shared by contrarian and momentum.
    TrendRule { min_trades: usize, ratio_threshold: f64 }
);
rule_config!(ValueHunterRule {
    min_trades: usize,
    undervalued_min: f64,
    undervalued_max: f64,
    overvalued_min: f64,
    overvalued_max: f64,
    value_ratio_threshold: f64,
});
rule_config!(ArbitrageurRule { min_trades: usize, arbitrage_ratio_threshold: f64 });
rule_config!(EventDrivenRule { min_trades: usize, event_ratio_threshold: f64 });
rule_config!(HedgerRule { min_trades: usize, hedge_ratio_threshold: f64 });
rule_config!(MarketMakerRule { min_trades: usize, buy_sell_ratio_threshold: f64, min_volume: f64 });
rule_config!(
    /// A label that reuses another label's computation and thresholds.
    AliasRule {}
);
rule_config!(SniperRule { max_trades: usize, min_avg_trade_size: f64, min_win_rate: f64 });

rule_config!(InsiderRule { min_trades: usize, min_win_rate: f64, early_trade_ratio_threshold: f64 });
rule_config!(NewsTraderRule { min_trades: usize, news_ratio_threshold: f64 });
rule_config!(CelebrityRule { min_followers: u64 });
rule_config!(BotRule { max_time_variance: f64, max_unique_amounts: u64, max_response_time: f64 });
rule_config!(MultiAccountRule {
    min_linked_accounts: usize,
    #[serde(default = "default_linked_saturation")]
    saturation_count: usize,
});
rule_config!(ManipulationRule {
    min_trades: usize,
    large_trade_threshold: f64,
    large_trade_ratio_threshold: f64,
    reverse_op_ratio_threshold: f64,
});
rule_config!(InstitutionRule { min_total_volume: f64, min_win_rate: f64, min_trades: u64 });
rule_config!(NewbieRule { max_days_since_first_trade: i64, max_trades: u64 });
rule_config!(DormantAwakenedRule { min_dormant_days: i64, min_recent_trades: u64 });
rule_config!(SingleMarketFocusRule { min_trades: usize, focus_ratio_threshold: f64 });

rule_config!(KolRule { min_followers: u64, min_mentions: u64 });
rule_config!(CommunityLeaderRule { min_messages: u64, min_mentions: u64 });
rule_config!(CopyTargetRule { min_win_rate: f64, min_total_volume: f64, min_trades: u64 });
rule_config!(SilentWhaleRule {
    min_total_volume: f64,
    min_win_rate: f64,
    max_followers: u64,
    max_mentions: u64,
});

// ---------------------------------------------------------------------------
// Category sections
// ---------------------------------------------------------------------------

/// All label rules, grouped by category. Every section must be present.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TagsConfig {
    pub trading_style: TradingStyleRules,
    pub expertise: ExpertiseRules,
    pub risk: RiskRules,
    pub strategy: StrategyRules,
    pub special: SpecialRules,
    pub social: SocialRules,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TradingStyleRules {
    pub high_win_rate: Option<HighWinRateRule>,
    pub large_volume: Option<LargeVolumeRule>,
    pub high_frequency: Option<HighFrequencyRule>,
    pub stable_profit: Option<StableProfitRule>,
    pub small_frequent: Option<SmallFrequentRule>,
    pub swing_trader: Option<SwingTraderRule>,
    pub long_term_holder: Option<LongTermHolderRule>,
    pub flash_trader: Option<FlashTraderRule>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ExpertiseRules {
    pub politics_expert: Option<CategoryExpertRule>,
    pub sports_expert: Option<CategoryExpertRule>,
    pub crypto_expert: Option<CategoryExpertRule>,
    pub entertainment_expert: Option<CategoryExpertRule>,
    pub economics_expert: Option<CategoryExpertRule>,
    pub election_expert: Option<KeywordExpertRule>,
    pub nfl_expert: Option<KeywordExpertRule>,
    pub nba_expert: Option<KeywordExpertRule>,
    pub soccer_expert: Option<KeywordExpertRule>,
    pub well_rounded: Option<WellRoundedRule>,
}

impl ExpertiseRules {
    pub fn category_experts(&self) -> [(LabelName, &Option<CategoryExpertRule>); 5] {
        [
            (LabelName::PoliticsExpert, &self.politics_expert),
            (LabelName::SportsExpert, &self.sports_expert),
            (LabelName::CryptoExpert, &self.crypto_expert),
            (LabelName::EntertainmentExpert, &self.entertainment_expert),
            (LabelName::EconomicsExpert, &self.economics_expert),
        ]
    }

    pub fn keyword_experts(&self) -> [(LabelName, &Option<KeywordExpertRule>); 4] {
        [
            (LabelName::ElectionExpert, &self.election_expert),
            (LabelName::NflExpert, &self.nfl_expert),
            (LabelName::NbaExpert, &self.nba_expert),
            (LabelName::SoccerExpert, &self.soccer_expert),
        ]
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct RiskRules {
    pub low_risk: Option<LowRiskRule>,
    pub high_risk: Option<HighRiskRule>,
    pub balanced: Option<BalancedRule>,
    pub conservative: Option<ConservativeRule>,
    pub aggressive: Option<AggressiveRule>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct StrategyRules {
    pub late_entry: Option<LateEntryRule>,
    pub early_entry: Option<EarlyEntryRule>,
    pub contrarian: Option<TrendRule>,
    pub momentum: Option<TrendRule>,
    pub value_hunter: Option<ValueHunterRule>,
    pub arbitrageur: Option<ArbitrageurRule>,
    pub event_driven: Option<EventDrivenRule>,
    pub hedger: Option<HedgerRule>,
    pub market_maker: Option<MarketMakerRule>,
    pub trend_follower: Option<AliasRule>,
    pub mean_reversion: Option<AliasRule>,
    pub sniper: Option<SniperRule>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct SpecialRules {
    pub suspected_insider: Option<InsiderRule>,
    pub news_trader: Option<NewsTraderRule>,
    pub celebrity: Option<CelebrityRule>,
    pub bot: Option<BotRule>,
    pub multi_account: Option<MultiAccountRule>,
    pub manipulation: Option<ManipulationRule>,
    pub institution: Option<InstitutionRule>,
    pub newbie: Option<NewbieRule>,
    pub dormant_awakened: Option<DormantAwakenedRule>,
    pub single_market_focus: Option<SingleMarketFocusRule>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct SocialRules {
    pub kol: Option<KolRule>,
    pub community_leader: Option<CommunityLeaderRule>,
    pub copy_target: Option<CopyTargetRule>,
    pub silent_whale: Option<SilentWhaleRule>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Collects every problem so a bad config reports all of them at once.
#[derive(Default)]
struct Checks {
    problems: Vec<String>,
}

/// Longest day window a rule may look back or ahead over.
pub const MAX_WINDOW_DAYS: u32 = 36_500;
const MAX_WINDOW_HOURS: f64 = MAX_WINDOW_DAYS as f64 * 24.0;

impl Checks {
    fn ratio(&mut self, label: LabelName, field: &str, value: f64) {
        if !(0.0..=1.0).contains(&value) {
            self.problems
                .push(format!("{label}.{field} must be within [0, 1], got {value}"));
        }
    }

    fn positive(&mut self, label: LabelName, field: &str, value: f64) {
        if value.is_nan() || value <= 0.0 {
            self.problems
                .push(format!("{label}.{field} must be positive, got {value}"));
        }
    }

    fn ordered(&mut self, label: LabelName, low: (&str, f64), high: (&str, f64)) {
        if low.1 > high.1 {
            self.problems.push(format!(
                "{label}.{} ({}) must not exceed {label}.{} ({})",
                low.0, low.1, high.0, high.1
            ));
        }
    }

    fn days(&mut self, label: LabelName, field: &str, value: f64) {
        self.at_most(label, field, value, MAX_WINDOW_DAYS as f64);
    }

    fn hours(&mut self, label: LabelName, field: &str, value: f64) {
        self.at_most(label, field, value, MAX_WINDOW_HOURS);
    }

    fn at_most(&mut self, label: LabelName, field: &str, value: f64, max: f64) {
        if value > max {
            self.problems
                .push(format!("{label}.{field} must not exceed {max}, got {value}"));
        }
    }

    fn require(&mut self, ok: bool, message: String) {
        if !ok {
            self.problems.push(message);
        }
    }

    fn finish(self) -> std::result::Result<(), TaggerError> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(TaggerError::Config(self.problems.join("; ")))
        }
    }
}

impl TagsConfig {
    /// Range-check every configured rule, enabled or not.
    pub fn validate(&self) -> std::result::Result<(), TaggerError> {
        let mut c = Checks::default();
        self.trading_style.check(&mut c);
        self.expertise.check(&mut c);
        self.risk.check(&mut c);
        self.strategy.check(&mut c);
        self.special.check(&mut c);
        self.social.check(&mut c);
        c.finish()
    }
}

impl TradingStyleRules {
    fn check(&self, c: &mut Checks) {
        if let Some(r) = &self.high_win_rate {
            c.ratio(LabelName::HighWinRate, "win_rate_threshold", r.win_rate_threshold);
        }
        if let Some(r) = &self.large_volume {
            c.positive(LabelName::LargeVolume, "avg_trade_size_threshold", r.avg_trade_size_threshold);
        }
        if let Some(r) = &self.high_frequency {
            c.positive(LabelName::HighFrequency, "lookback_days", r.lookback_days as f64);
            c.days(LabelName::HighFrequency, "lookback_days", r.lookback_days as f64);
            c.positive(LabelName::HighFrequency, "trades_per_day_threshold", r.trades_per_day_threshold);
        }
        if let Some(r) = &self.stable_profit {
            c.positive(LabelName::StableProfit, "min_total_months", r.min_total_months as f64);
            c.ordered(
                LabelName::StableProfit,
                ("min_profitable_months", r.min_profitable_months as f64),
                ("min_total_months", r.min_total_months as f64),
            );
        }
        if let Some(r) = &self.small_frequent {
            c.positive(LabelName::SmallFrequent, "max_avg_trade_size", r.max_avg_trade_size);
        }
        if let Some(r) = &self.swing_trader {
            c.positive(LabelName::SwingTrader, "max_holding_days", r.max_holding_days);
            c.days(LabelName::SwingTrader, "max_holding_days", r.max_holding_days);
            c.require(
                r.min_holding_days < r.max_holding_days,
                format!("{}.min_holding_days must be below max_holding_days", LabelName::SwingTrader),
            );
        }
        if let Some(r) = &self.long_term_holder {
            c.positive(LabelName::LongTermHolder, "min_holding_days", r.min_holding_days);
            c.days(LabelName::LongTermHolder, "min_holding_days", r.min_holding_days);
        }
        if let Some(r) = &self.flash_trader {
            c.positive(LabelName::FlashTrader, "max_holding_hours", r.max_holding_hours);
            c.hours(LabelName::FlashTrader, "max_holding_hours", r.max_holding_hours);
        }
    }
}

impl ExpertiseRules {
    fn check(&self, c: &mut Checks) {
        for (label, rule) in self.category_experts() {
            if let Some(r) = rule {
                c.ratio(label, "ratio_threshold", r.ratio_threshold);
            }
        }
        for (label, rule) in self.keyword_experts() {
            if let Some(r) = rule {
                c.ratio(label, "ratio_threshold", r.ratio_threshold);
                c.require(!r.keywords.is_empty(), format!("{label}.keywords must not be empty"));
            }
        }
        if let Some(r) = &self.well_rounded {
            c.ratio(LabelName::WellRounded, "max_category_ratio", r.max_category_ratio);
            c.require(
                (1..=MarketCategory::ALL.len()).contains(&r.min_categories),
                format!(
                    "{}.min_categories must be within 1..={}",
                    LabelName::WellRounded,
                    MarketCategory::ALL.len()
                ),
            );
        }
    }
}

impl RiskRules {
    fn check(&self, c: &mut Checks) {
        if let Some(r) = &self.low_risk {
            let l = LabelName::LowRisk;
            c.ratio(l, "price_threshold_low", r.price_threshold_low);
            c.ratio(l, "price_threshold_high", r.price_threshold_high);
            c.ratio(l, "ratio_threshold", r.ratio_threshold);
            c.ordered(l, ("price_threshold_low", r.price_threshold_low), ("price_threshold_high", r.price_threshold_high));
        }
        if let Some(r) = &self.high_risk {
            let l = LabelName::HighRisk;
            c.ratio(l, "price_range_low", r.price_range_low);
            c.ratio(l, "price_range_high", r.price_range_high);
            c.ratio(l, "ratio_threshold", r.ratio_threshold);
            c.ordered(l, ("price_range_low", r.price_range_low), ("price_range_high", r.price_range_high));
        }
        if let Some(r) = &self.balanced {
            let l = LabelName::Balanced;
            c.ratio(l, "price_range_min", r.price_range_min);
            c.ratio(l, "price_range_max", r.price_range_max);
            c.ratio(l, "price_ratio_threshold", r.price_ratio_threshold);
            c.ordered(l, ("price_range_min", r.price_range_min), ("price_range_max", r.price_range_max));
            c.ordered(l, ("holding_days_min", r.holding_days_min), ("holding_days_max", r.holding_days_max));
            c.days(l, "holding_days_max", r.holding_days_max);
        }
        if let Some(r) = &self.conservative {
            let l = LabelName::Conservative;
            c.ratio(l, "price_threshold", r.price_threshold);
            c.ratio(l, "high_prob_ratio_threshold", r.high_prob_ratio_threshold);
            c.days(l, "min_holding_days", r.min_holding_days);
        }
        if let Some(r) = &self.aggressive {
            let l = LabelName::Aggressive;
            c.ratio(l, "price_threshold", r.price_threshold);
            c.ratio(l, "low_prob_ratio_threshold", r.low_prob_ratio_threshold);
            c.positive(l, "max_holding_days", r.max_holding_days);
            c.days(l, "max_holding_days", r.max_holding_days);
        }
    }
}

impl StrategyRules {
    fn check(&self, c: &mut Checks) {
        if let Some(r) = &self.late_entry {
            c.ratio(LabelName::LateEntry, "ratio_threshold", r.ratio_threshold);
            c.days(LabelName::LateEntry, "days_before_close", r.days_before_close as f64);
        }
        if let Some(r) = &self.early_entry {
            c.ratio(LabelName::EarlyEntry, "ratio_threshold", r.ratio_threshold);
            c.positive(LabelName::EarlyEntry, "hours_after_creation", r.hours_after_creation as f64);
            c.hours(LabelName::EarlyEntry, "hours_after_creation", r.hours_after_creation as f64);
        }
        if let Some(r) = &self.contrarian {
            c.ratio(LabelName::Contrarian, "ratio_threshold", r.ratio_threshold);
        }
        if let Some(r) = &self.momentum {
            c.ratio(LabelName::Momentum, "ratio_threshold", r.ratio_threshold);
        }
        if let Some(r) = &self.value_hunter {
            let l = LabelName::ValueHunter;
            c.ratio(l, "value_ratio_threshold", r.value_ratio_threshold);
            c.ordered(l, ("undervalued_min", r.undervalued_min), ("undervalued_max", r.undervalued_max));
            c.ordered(l, ("overvalued_min", r.overvalued_min), ("overvalued_max", r.overvalued_max));
        }
        if let Some(r) = &self.arbitrageur {
            c.ratio(LabelName::Arbitrageur, "arbitrage_ratio_threshold", r.arbitrage_ratio_threshold);
        }
        if let Some(r) = &self.event_driven {
            c.ratio(LabelName::EventDriven, "event_ratio_threshold", r.event_ratio_threshold);
        }
        if let Some(r) = &self.hedger {
            c.ratio(LabelName::Hedger, "hedge_ratio_threshold", r.hedge_ratio_threshold);
        }
        if let Some(r) = &self.market_maker {
            c.ratio(LabelName::MarketMaker, "buy_sell_ratio_threshold", r.buy_sell_ratio_threshold);
        }
        if let Some(r) = &self.sniper {
            c.ratio(LabelName::Sniper, "min_win_rate", r.min_win_rate);
        }
        if active(&self.trend_follower).is_some() {
            c.require(
                self.momentum.is_some(),
                format!("{} reuses momentum and needs [tags.strategy.momentum]", LabelName::TrendFollower),
            );
        }
        if active(&self.mean_reversion).is_some() {
            c.require(
                self.value_hunter.is_some(),
                format!("{} reuses value hunter and needs [tags.strategy.value_hunter]", LabelName::MeanReversion),
            );
        }
    }
}

impl SpecialRules {
    fn check(&self, c: &mut Checks) {
        if let Some(r) = &self.suspected_insider {
            c.ratio(LabelName::SuspectedInsider, "min_win_rate", r.min_win_rate);
            c.ratio(LabelName::SuspectedInsider, "early_trade_ratio_threshold", r.early_trade_ratio_threshold);
        }
        if let Some(r) = &self.news_trader {
            c.ratio(LabelName::NewsTrader, "news_ratio_threshold", r.news_ratio_threshold);
        }
        if let Some(r) = &self.bot {
            let l = LabelName::Bot;
            c.positive(l, "max_time_variance", r.max_time_variance);
            c.positive(l, "max_unique_amounts", r.max_unique_amounts as f64);
            c.positive(l, "max_response_time", r.max_response_time);
        }
        if let Some(r) = &self.multi_account {
            c.positive(LabelName::MultiAccount, "saturation_count", r.saturation_count as f64);
        }
        if let Some(r) = &self.manipulation {
            let l = LabelName::Manipulation;
            c.ratio(l, "large_trade_ratio_threshold", r.large_trade_ratio_threshold);
            c.ratio(l, "reverse_op_ratio_threshold", r.reverse_op_ratio_threshold);
        }
        if let Some(r) = &self.institution {
            c.ratio(LabelName::Institution, "min_win_rate", r.min_win_rate);
        }
        if let Some(r) = &self.newbie {
            c.positive(LabelName::Newbie, "max_days_since_first_trade", r.max_days_since_first_trade as f64);
            c.days(LabelName::Newbie, "max_days_since_first_trade", r.max_days_since_first_trade as f64);
        }
        if let Some(r) = &self.dormant_awakened {
            c.days(LabelName::DormantAwakened, "min_dormant_days", r.min_dormant_days as f64);
        }
        if let Some(r) = &self.single_market_focus {
            c.ratio(LabelName::SingleMarketFocus, "focus_ratio_threshold", r.focus_ratio_threshold);
        }
    }
}

impl SocialRules {
    fn check(&self, c: &mut Checks) {
        if let Some(r) = &self.copy_target {
            c.ratio(LabelName::CopyTarget, "min_win_rate", r.min_win_rate);
        }
        if let Some(r) = &self.silent_whale {
            c.ratio(LabelName::SilentWhale, "min_win_rate", r.min_win_rate);
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), TaggerError> {
        let conf = &self.confidence;
        if !(0.0..=1.0).contains(&conf.min_confidence)
            || !(0.0..=1.0).contains(&conf.max_confidence)
            || conf.min_confidence > conf.max_confidence
        {
            return Err(TaggerError::Config(format!(
                "confidence bounds must satisfy 0 <= min ({}) <= max ({}) <= 1",
                conf.min_confidence, conf.max_confidence
            )));
        }
        if self.engine.concurrency == 0 {
            return Err(TaggerError::Config("engine.concurrency must be at least 1".into()));
        }
        if self.engine.update_lookback_days > MAX_WINDOW_DAYS {
            return Err(TaggerError::Config(format!(
                "engine.update_lookback_days must not exceed {MAX_WINDOW_DAYS}, got {}",
                self.engine.update_lookback_days
            )));
        }
        self.tags.validate()
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
