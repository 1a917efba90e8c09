//! Shared types for the address tagger.
//!
//! These types form the data model used across all modules. Stores,
//! capability providers, taggers and the engine all depend on them, so
//! they carry no behaviour beyond small derived helpers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Aggregate statistics for one trading address.
///
/// A read-only snapshot: taggers receive `&EntityProfile` and never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub id: i64,
    /// On-chain address string (0x...), used for social lookups.
    pub address: String,
    pub total_trades: u64,
    /// Fraction of resolved trades that won (0.0–1.0)
    pub win_rate: f64,
    pub avg_trade_size: f64,
    pub total_volume: f64,
}

impl fmt::Display for EntityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} (trades: {} | win: {:.0}% | vol: ${:.0})",
            self.id,
            self.address,
            self.total_trades,
            self.win_rate * 100.0,
            self.total_volume,
        )
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeSide {
    type Err = TaggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            other => Err(TaggerError::Storage(format!("unknown trade side: {other}"))),
        }
    }
}

/// Binary market outcome a position is held on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "Yes",
            Outcome::No => "No",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = TaggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" => Ok(Outcome::Yes),
            "no" => Ok(Outcome::No),
            other => Err(TaggerError::Storage(format!("unknown outcome: {other}"))),
        }
    }
}

/// Market category, the single list every category-aware rule iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketCategory {
    Politics,
    Sports,
    Crypto,
    Entertainment,
    Economics,
}

impl MarketCategory {
    /// All known categories (useful for iteration).
    pub const ALL: &'static [MarketCategory] = &[
        MarketCategory::Politics,
        MarketCategory::Sports,
        MarketCategory::Crypto,
        MarketCategory::Entertainment,
        MarketCategory::Economics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCategory::Politics => "Politics",
            MarketCategory::Sports => "Sports",
            MarketCategory::Crypto => "Crypto",
            MarketCategory::Entertainment => "Entertainment",
            MarketCategory::Economics => "Economics",
        }
    }
}

impl fmt::Display for MarketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempt to parse a string into a MarketCategory (case-insensitive).
impl std::str::FromStr for MarketCategory {
    type Err = TaggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "politics" | "political" => Ok(MarketCategory::Politics),
            "sports" | "sport" => Ok(MarketCategory::Sports),
            "crypto" | "cryptocurrency" => Ok(MarketCategory::Crypto),
            "entertainment" | "culture" | "pop culture" => Ok(MarketCategory::Entertainment),
            "economics" | "economy" | "econ" => Ok(MarketCategory::Economics),
            other => Err(TaggerError::Storage(format!("unknown market category: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw records
// ---------------------------------------------------------------------------

/// A single fill by an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: i64,
    pub market_id: i64,
    pub timestamp: DateTime<Utc>,
    /// Execution price (0.0–1.0, the implied probability)
    pub price: f64,
    pub amount: f64,
    pub side: TradeSide,
    pub outcome: Outcome,
}

/// One step of an entity's position history, used to rebuild net exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionChange {
    pub market_id: i64,
    pub timestamp: DateTime<Utc>,
    pub side: TradeSide,
    pub amount: f64,
    pub outcome: Outcome,
}

/// Entry/exit boundaries of a trade and of the market it was placed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTiming {
    pub trade_id: i64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub market_created_at: Option<DateTime<Utc>>,
    pub market_end: Option<DateTime<Utc>>,
}

impl TradeTiming {
    /// How long the position was held.
    ///
    /// An open position is assumed held until settlement, so the market end
    /// is the closing boundary when no exit exists.
    pub fn holding_duration(&self) -> Option<Duration> {
        self.exit_time
            .or(self.market_end)
            .map(|close| close - self.entry_time)
    }
}

/// A news article attached to a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
}

/// Social footprint of an address.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SocialActivity {
    pub followers: u64,
    pub mentions: u64,
    pub community_messages: u64,
    pub verified: bool,
}

impl SocialActivity {
    /// Substituted when no social source is wired: no presence at all.
    pub const NEUTRAL: SocialActivity = SocialActivity {
        followers: 0,
        mentions: 0,
        community_messages: 0,
        verified: false,
    };

    pub fn has_presence(&self) -> bool {
        self.followers > 0 || self.community_messages > 0
    }
}

impl Default for SocialActivity {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Summary statistics over an entity's trade timestamps and amounts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    /// Variance of trade times (seconds²)
    pub timing_variance: f64,
    pub amount_variance: f64,
    pub distinct_amounts: u64,
    /// Mean reaction time to market moves (seconds)
    pub mean_response_secs: f64,
}

/// One observation of a market's price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
}

/// Realised PnL of an entity for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPnl {
    /// "YYYY-MM"
    pub month: String,
    pub pnl: f64,
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Top-level grouping of labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LabelCategory {
    TradingStyle,
    Expertise,
    RiskAppetite,
    Strategy,
    Special,
    SocialInfluence,
}

impl LabelCategory {
    pub const ALL: &'static [LabelCategory] = &[
        LabelCategory::TradingStyle,
        LabelCategory::Expertise,
        LabelCategory::RiskAppetite,
        LabelCategory::Strategy,
        LabelCategory::Special,
        LabelCategory::SocialInfluence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LabelCategory::TradingStyle => "trading style",
            LabelCategory::Expertise => "expertise",
            LabelCategory::RiskAppetite => "risk appetite",
            LabelCategory::Strategy => "strategy",
            LabelCategory::Special => "special",
            LabelCategory::SocialInfluence => "social influence",
        }
    }
}

impl fmt::Display for LabelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! label_names {
    ($( $variant:ident => ($name:literal, $category:ident) ),+ $(,)?) => {
        /// Every label the engine can emit.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum LabelName {
            $( $variant, )+
        }

        impl LabelName {
            pub const ALL: &'static [LabelName] = &[ $( LabelName::$variant, )+ ];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( LabelName::$variant => $name, )+
                }
            }

            pub fn category(&self) -> LabelCategory {
                match self {
                    $( LabelName::$variant => LabelCategory::$category, )+
                }
            }
        }

        impl std::str::FromStr for LabelName {
            type Err = TaggerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $name => Ok(LabelName::$variant), )+
                    other => Err(TaggerError::Storage(format!("unknown label: {other}"))),
                }
            }
        }
    };
}

label_names! {
    HighWinRate => ("high win rate", TradingStyle),
    LargeVolume => ("large volume", TradingStyle),
    HighFrequency => ("high frequency", TradingStyle),
    StableProfit => ("stable profit", TradingStyle),
    SmallFrequent => ("small frequent", TradingStyle),
    SwingTrader => ("swing trader", TradingStyle),
    LongTermHolder => ("long term holder", TradingStyle),
    FlashTrader => ("flash trader", TradingStyle),

    PoliticsExpert => ("politics expert", Expertise),
    SportsExpert => ("sports expert", Expertise),
    CryptoExpert => ("crypto expert", Expertise),
    EntertainmentExpert => ("entertainment expert", Expertise),
    EconomicsExpert => ("economics expert", Expertise),
    ElectionExpert => ("election expert", Expertise),
    NflExpert => ("nfl expert", Expertise),
    NbaExpert => ("nba expert", Expertise),
    SoccerExpert => ("soccer expert", Expertise),
    WellRounded => ("well rounded", Expertise),

    LowRisk => ("low risk", RiskAppetite),
    HighRisk => ("high risk", RiskAppetite),
    Balanced => ("balanced", RiskAppetite),
    Conservative => ("conservative", RiskAppetite),
    Aggressive => ("aggressive", RiskAppetite),

    LateEntry => ("late entry", Strategy),
    EarlyEntry => ("early entry", Strategy),
    Contrarian => ("contrarian", Strategy),
    Momentum => ("momentum", Strategy),
    ValueHunter => ("value hunter", Strategy),
    Arbitrageur => ("arbitrageur", Strategy),
    EventDriven => ("event driven", Strategy),
    Hedger => ("hedger", Strategy),
    MarketMaker => ("market maker", Strategy),
    TrendFollower => ("trend follower", Strategy),
    MeanReversion => ("mean reversion", Strategy),
    Sniper => ("sniper", Strategy),

    SuspectedInsider => ("suspected insider", Special),
    NewsTrader => ("news trader", Special),
    Celebrity => ("celebrity", Special),
    Bot => ("bot", Special),
    MultiAccount => ("multi account", Special),
    Manipulation => ("manipulation", Special),
    Institution => ("institution", Special),
    Newbie => ("newbie", Special),
    DormantAwakened => ("dormant awakened", Special),
    SingleMarketFocus => ("single market focus", Special),

    Kol => ("kol", SocialInfluence),
    CommunityLeader => ("community leader", SocialInfluence),
    CopyTarget => ("copy target", SocialInfluence),
    SilentWhale => ("silent whale", SocialInfluence),
}

impl fmt::Display for LabelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label produced by one evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelResult {
    pub category: LabelCategory,
    pub name: LabelName,
    pub confidence: f64,
}

impl LabelResult {
    /// Build a label; the category always follows from the name.
    pub fn new(name: LabelName, confidence: f64) -> Self {
        Self {
            category: name.category(),
            name,
            confidence,
        }
    }
}

impl fmt::Display for LabelResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} (confidence: {:.2})", self.category, self.name, self.confidence)
    }
}

/// A label row as persisted by a label store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLabel {
    pub entity_id: i64,
    pub category: String,
    pub label_name: String,
    pub confidence_score: f64,
    pub is_manual: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the tagger.
#[derive(Debug, thiserror::Error)]
pub enum TaggerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(i64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Capability provider error ({capability}): {message}")]
    Capability { capability: String, message: String },

    #[error("Export error: {0}")]
    Export(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_holding_duration_prefers_exit() {
        let timing = TradeTiming {
            trade_id: 1,
            entry_time: at(1, 0),
            exit_time: Some(at(2, 0)),
            market_created_at: None,
            market_end: Some(at(20, 0)),
        };
        assert_eq!(timing.holding_duration(), Some(Duration::days(1)));
    }

    #[test]
    fn test_holding_duration_open_position_uses_market_end() {
        let timing = TradeTiming {
            trade_id: 1,
            entry_time: at(1, 0),
            exit_time: None,
            market_created_at: None,
            market_end: Some(at(11, 0)),
        };
        assert_eq!(timing.holding_duration(), Some(Duration::days(10)));
    }

    #[test]
    fn test_holding_duration_unknown_boundary() {
        let timing = TradeTiming {
            trade_id: 1,
            entry_time: at(1, 0),
            exit_time: None,
            market_created_at: None,
            market_end: None,
        };
        assert!(timing.holding_duration().is_none());
    }

    #[test]
    fn test_every_label_round_trips_through_its_name() {
        for label in LabelName::ALL {
            let parsed: LabelName = label.as_str().parse().unwrap();
            assert_eq!(parsed, *label);
        }
        assert_eq!(LabelName::ALL.len(), 49);
    }

    #[test]
    fn test_label_result_category_follows_name() {
        let label = LabelResult::new(LabelName::HighWinRate, 0.5);
        assert_eq!(label.category, LabelCategory::TradingStyle);
        assert_eq!(label.category.to_string(), "trading style");
        assert_eq!(label.name.to_string(), "high win rate");

        assert_eq!(LabelName::TrendFollower.category(), LabelCategory::Strategy);
        assert_eq!(LabelName::SilentWhale.category(), LabelCategory::SocialInfluence);
    }

    #[test]
    fn test_every_category_has_labels() {
        for category in LabelCategory::ALL {
            assert!(LabelName::ALL.iter().any(|l| l.category() == *category));
        }
    }

    #[test]
    fn test_market_category_from_str() {
        assert_eq!("politics".parse::<MarketCategory>().unwrap(), MarketCategory::Politics);
        assert_eq!("SPORTS".parse::<MarketCategory>().unwrap(), MarketCategory::Sports);
        assert_eq!("econ".parse::<MarketCategory>().unwrap(), MarketCategory::Economics);
        assert_eq!("culture".parse::<MarketCategory>().unwrap(), MarketCategory::Entertainment);
        assert!("nonsense".parse::<MarketCategory>().is_err());
    }

    #[test]
    fn test_side_and_outcome_parse() {
        assert_eq!("BUY".parse::<TradeSide>().unwrap(), TradeSide::Buy);
        assert_eq!("sell".parse::<TradeSide>().unwrap(), TradeSide::Sell);
        assert_eq!("yes".parse::<Outcome>().unwrap(), Outcome::Yes);
        assert_eq!("No".parse::<Outcome>().unwrap(), Outcome::No);
        assert!("hold".parse::<TradeSide>().is_err());
    }

    #[test]
    fn test_neutral_social_activity_has_no_presence() {
        assert!(!SocialActivity::NEUTRAL.has_presence());
        assert_eq!(SocialActivity::default(), SocialActivity::NEUTRAL);
    }
}
