//! Core domain types for the prop-futures trading control plane.
//!
//! This crate provides the types shared by every other crate:
//! - `Price`: Precision-safe price type
//! - `Bar`, `IndicatorSnapshot`: Price bars with precomputed indicator values
//! - `TradeSetup`: Candidate trade produced by a signal generator
//! - `OrderRequest`, `BracketOrder`: Orders sent to the execution venue
//! - `InstrumentSpec`, `InstrumentBook`: Contract specifications
//! - `VenueClock`: Venue-local calendar and time-of-day
//! - `SignalGenerator`: Capability interface implemented by strategies

pub mod decimal;
pub mod error;
pub mod instrument;
pub mod order;
pub mod session;
pub mod setup;
pub mod strategy;
pub mod types;

pub use decimal::Price;
pub use error::{CoreError, Result};
pub use instrument::{InstrumentBook, InstrumentSpec};
pub use order::{BracketIds, BracketOrder, ClientOrderId, OrderRequest, OrderRole, OrderType};
pub use session::VenueClock;
pub use setup::{ExitProfile, TradeSetup};
pub use strategy::{ExitAction, PositionView, SignalGenerator};
pub use types::{AccountMode, Bar, Direction, IndicatorSnapshot, MarketRegime};
