//! Capability providers.
//!
//! Defines the `CapabilityProvider` trait, the single seam through which
//! taggers reach enrichment data beyond the profile store:
//! - `UnwiredCapabilities`: nothing wired, every rule degrades
//! - `mock::SeededMockProvider`: deterministic synthetic data for demos
//! - `fixture::FixtureCapabilities`: hand-filled data for tests and embedders
//!
//! Absence is a value (`Capability::Unavailable`), not an error, so a rule can
//! tell "this source is not wired" apart from "the source failed".

pub mod fixture;
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::types::{NewsItem, PatternStats, PositionChange, PricePoint, SocialActivity, TradeTiming};

/// Outcome of a capability lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability<T> {
    Available(T),
    Unavailable,
}

impl<T> Capability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Capability::Available(value) => Some(value),
            Capability::Unavailable => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Capability<U> {
        match self {
            Capability::Available(value) => Capability::Available(f(value)),
            Capability::Unavailable => Capability::Unavailable,
        }
    }
}

impl<T> From<Option<T>> for Capability<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Capability::Available(v),
            None => Capability::Unavailable,
        }
    }
}

/// Source of enrichment data.
///
/// Every method defaults to `Unavailable`: an implementor only overrides the
/// lookups it can actually serve.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Seconds a trade's position was held; `Available(None)` for open positions.
    async fn holding_period(&self, _trade_id: i64) -> Result<Capability<Option<i64>>> {
        Ok(Capability::Unavailable)
    }

    /// Entry/exit boundaries of every trade of an entity.
    async fn trade_timestamps(&self, _entity_id: i64) -> Result<Capability<Vec<TradeTiming>>> {
        Ok(Capability::Unavailable)
    }

    /// Time-ordered position history of an entity.
    async fn position_changes(&self, _entity_id: i64) -> Result<Capability<Vec<PositionChange>>> {
        Ok(Capability::Unavailable)
    }

    async fn pattern_stats(&self, _entity_id: i64) -> Result<Capability<PatternStats>> {
        Ok(Capability::Unavailable)
    }

    /// Other entities believed to be controlled by the same owner.
    async fn linked_addresses(&self, _entity_id: i64) -> Result<Capability<Vec<i64>>> {
        Ok(Capability::Unavailable)
    }

    /// News attached to a market over the last `days` days.
    async fn market_news(&self, _market_id: i64, _days: u32) -> Result<Capability<Vec<NewsItem>>> {
        Ok(Capability::Unavailable)
    }

    async fn social_activity(&self, _address: &str) -> Result<Capability<SocialActivity>> {
        Ok(Capability::Unavailable)
    }

    /// Price observations of a market, oldest first.
    async fn price_history(&self, _market_id: i64) -> Result<Capability<Vec<PricePoint>>> {
        Ok(Capability::Unavailable)
    }
}

/// A provider with nothing wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnwiredCapabilities;

impl CapabilityProvider for UnwiredCapabilities {}

/// Collapse a lookup into an optional value.
///
/// `Unavailable` and provider failures both yield `None`; the caller then
/// takes its fallback path or its named default. Failures are logged so a
/// broken source is visible even though the rule keeps going.
pub fn settle<T>(capability: &'static str, entity_id: i64, lookup: Result<Capability<T>>) -> Option<T> {
    match lookup {
        Ok(Capability::Available(value)) => Some(value),
        Ok(Capability::Unavailable) => {
            debug!(capability, entity_id, "Capability unavailable");
            None
        }
        Err(e) => {
            warn!(capability, entity_id, error = %e, "Capability lookup failed, degrading");
            None
        }
    }
}
