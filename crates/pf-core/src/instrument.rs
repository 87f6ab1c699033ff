//! Contract specifications.
//!
//! `InstrumentBook` is built once from configuration and passed into the
//! components that need it; there is no process-wide table.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Specification for one futures contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Root symbol, e.g. `MES`.
    pub symbol: String,
    /// Currency value of a one-point move for one contract.
    pub point_value: Decimal,
    /// Minimum price increment in points.
    pub tick_size: Decimal,
    /// Typical intraday margin per contract.
    pub typical_margin: Decimal,
    /// Modeled slippage per fill, in ticks.
    #[serde(default = "default_slippage_ticks")]
    pub slippage_ticks_per_fill: Decimal,
    /// Commission and fees for one entry plus one exit.
    #[serde(default)]
    pub commission_round_trip: Decimal,
}

fn default_slippage_ticks() -> Decimal {
    Decimal::ONE
}

impl InstrumentSpec {
    pub fn new(
        symbol: impl Into<String>,
        point_value: Decimal,
        tick_size: Decimal,
        typical_margin: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            point_value,
            tick_size,
            typical_margin,
            slippage_ticks_per_fill: default_slippage_ticks(),
            commission_round_trip: Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn with_costs(mut self, slippage_ticks_per_fill: Decimal, commission_round_trip: Decimal) -> Self {
        self.slippage_ticks_per_fill = slippage_ticks_per_fill;
        self.commission_round_trip = commission_round_trip;
        self
    }

    /// Currency value of one tick for one contract.
    #[inline]
    pub fn tick_value(&self) -> Decimal {
        self.tick_size * self.point_value
    }

    /// Currency value of `points` for one contract.
    #[inline]
    pub fn points_to_currency(&self, points: Decimal) -> Decimal {
        points * self.point_value
    }

    /// Modeled slippage per fill in currency for one contract.
    #[inline]
    pub fn slippage_per_fill(&self) -> Decimal {
        self.slippage_ticks_per_fill * self.tick_value()
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(CoreError::InvalidConfig("instrument symbol is empty".to_string()));
        }
        if self.point_value <= Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "{}: point_value must be positive",
                self.symbol
            )));
        }
        if self.tick_size <= Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "{}: tick_size must be positive",
                self.symbol
            )));
        }
        if self.typical_margin <= Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "{}: typical_margin must be positive",
                self.symbol
            )));
        }
        Ok(())
    }
}

/// Symbol-keyed set of contract specifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentBook {
    specs: BTreeMap<String, InstrumentSpec>,
}

impl InstrumentBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// CME micro contracts traded by the reference configuration.
    pub fn reference() -> Self {
        let mut book = Self::new();
        for spec in [
            InstrumentSpec::new("MES", dec!(5), dec!(0.25), dec!(1500)).with_costs(dec!(1), dec!(1.24)),
            InstrumentSpec::new("MNQ", dec!(2), dec!(0.25), dec!(2100)).with_costs(dec!(1), dec!(1.24)),
            InstrumentSpec::new("MYM", dec!(0.5), dec!(1), dec!(1100)).with_costs(dec!(1), dec!(1.24)),
            InstrumentSpec::new("M2K", dec!(5), dec!(0.1), dec!(800)).with_costs(dec!(1), dec!(1.24)),
            InstrumentSpec::new("MGC", dec!(10), dec!(0.1), dec!(1000)).with_costs(dec!(1), dec!(1.74)),
            InstrumentSpec::new("MCL", dec!(100), dec!(0.01), dec!(1400)).with_costs(dec!(2), dec!(1.74)),
        ] {
            book.insert(spec);
        }
        book
    }

    pub fn insert(&mut self, spec: InstrumentSpec) {
        self.specs.insert(spec.symbol.clone(), spec);
    }

    /// Look up a symbol. Unknown symbols are a configuration error.
    pub fn get(&self, symbol: &str) -> Result<&InstrumentSpec> {
        self.specs
            .get(symbol)
            .ok_or_else(|| CoreError::UnknownInstrument(symbol.to_string()))
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.specs.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Validate every spec in the book.
    pub fn validate(&self) -> Result<()> {
        self.specs.values().try_for_each(InstrumentSpec::validate)
    }
}
