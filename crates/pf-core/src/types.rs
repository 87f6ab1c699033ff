//! Market data and account types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Price;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    /// No directional bias (signal generators use this for "no trade").
    None,
}

impl Direction {
    /// +1 for long, -1 for short, 0 for none.
    #[inline]
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
            Self::None => Decimal::ZERO,
        }
    }

    /// Opposite direction (used for flatten orders).
    #[inline]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
            Self::None => Self::None,
        }
    }

    /// Signed move from `from` to `to` measured in the trade's favor.
    #[inline]
    pub fn favorable_move(&self, from: Price, to: Price) -> Decimal {
        (to - from) * self.sign()
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Market regime as classified by the external indicator pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    #[default]
    Unknown,
}

/// Indicator values attached to a bar.
///
/// Computed outside this workspace; every field is optional because
/// warm-up bars do not have enough history for the longer windows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub atr: Option<Decimal>,
    pub ema_fast: Option<Decimal>,
    pub ema_slow: Option<Decimal>,
    pub momentum: Option<Decimal>,
    #[serde(default)]
    pub regime: MarketRegime,
}

/// One OHLCV bar. `timestamp` is the bar close time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: u64,
    #[serde(default)]
    pub indicators: IndicatorSnapshot,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: u64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            indicators: IndicatorSnapshot::default(),
        }
    }

    /// Attach indicator values.
    #[must_use]
    pub fn with_indicators(mut self, indicators: IndicatorSnapshot) -> Self {
        self.indicators = indicators;
        self
    }
}

/// Account phase of the funding program.
///
/// Selects the threshold table that every risk component consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountMode {
    /// Evaluation phase.
    #[default]
    Challenge,
    /// Funded account before the first payout.
    FundedPrePayout,
    /// Funded account after the first payout.
    FundedPostPayout,
}

impl AccountMode {
    #[inline]
    pub fn is_funded(&self) -> bool {
        !matches!(self, Self::Challenge)
    }
}

impl std::fmt::Display for AccountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Challenge => write!(f, "challenge"),
            Self::FundedPrePayout => write!(f, "funded_pre_payout"),
            Self::FundedPostPayout => write!(f, "funded_post_payout"),
        }
    }
}
