//! Order-related types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::Price;
use crate::types::Direction;

/// Order type as understood by the execution venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// What an order is for within a position's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderRole {
    Entry,
    Stop,
    Target,
    Flatten,
}

impl fmt::Display for OrderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => write!(f, "entry"),
            Self::Stop => write!(f, "stop"),
            Self::Target => write!(f, "target"),
            Self::Flatten => write!(f, "flatten"),
        }
    }
}

/// Client order ID.
///
/// Every order carries a unique id so a retried submission can be matched
/// to the original instead of doubling the position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Format: `pf_{role}_{uuid_short}`
    pub fn new(role: OrderRole) -> Self {
        let uuid_short = &Uuid::new_v4().simple().to_string()[..12];
        Self(format!("pf_{role}_{uuid_short}"))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClientOrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One order to submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_id: ClientOrderId,
    pub instrument: String,
    /// Buy for `Long`, sell for `Short`.
    pub direction: Direction,
    pub contracts: u32,
    pub order_type: OrderType,
    /// Limit or stop trigger price; `None` for market orders.
    pub price: Option<Price>,
    pub role: OrderRole,
}

impl OrderRequest {
    pub fn market(instrument: &str, direction: Direction, contracts: u32, role: OrderRole) -> Self {
        Self {
            client_id: ClientOrderId::new(role),
            instrument: instrument.to_string(),
            direction,
            contracts,
            order_type: OrderType::Market,
            price: None,
            role,
        }
    }

    pub fn limit(
        instrument: &str,
        direction: Direction,
        contracts: u32,
        price: Price,
        role: OrderRole,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(instrument, direction, contracts, role)
        }
    }

    pub fn stop(instrument: &str, direction: Direction, contracts: u32, trigger: Price) -> Self {
        Self {
            order_type: OrderType::Stop,
            price: Some(trigger),
            ..Self::market(instrument, direction, contracts, OrderRole::Stop)
        }
    }
}

/// Entry order with its protective stop and profit target (OCO children).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketOrder {
    pub entry: OrderRequest,
    pub stop: OrderRequest,
    pub target: OrderRequest,
}

impl BracketOrder {
    /// Limit entry at `entry`, stop and target on the exit side.
    pub fn new(
        instrument: &str,
        direction: Direction,
        contracts: u32,
        entry: Price,
        stop: Price,
        target: Price,
    ) -> Self {
        let exit_side = direction.opposite();
        Self {
            entry: OrderRequest::limit(instrument, direction, contracts, entry, OrderRole::Entry),
            stop: OrderRequest::stop(instrument, exit_side, contracts, stop),
            target: OrderRequest::limit(instrument, exit_side, contracts, target, OrderRole::Target),
        }
    }

    pub fn ids(&self) -> BracketIds {
        BracketIds {
            entry: Some(self.entry.client_id.clone()),
            stop: Some(self.stop.client_id.clone()),
            target: Some(self.target.client_id.clone()),
        }
    }
}

/// Order ids attached to an open or pending position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketIds {
    pub entry: Option<ClientOrderId>,
    pub stop: Option<ClientOrderId>,
    pub target: Option<ClientOrderId>,
}

impl BracketIds {
    pub fn set(&mut self, role: OrderRole, id: ClientOrderId) {
        match role {
            OrderRole::Entry => self.entry = Some(id),
            OrderRole::Stop => self.stop = Some(id),
            OrderRole::Target => self.target = Some(id),
            OrderRole::Flatten => {}
        }
    }

    /// Child orders that may still be working at the venue.
    pub fn working_children(&self) -> Vec<ClientOrderId> {
        self.stop.iter().chain(self.target.iter()).cloned().collect()
    }

    /// Every known id, entry first.
    pub fn all(&self) -> Vec<ClientOrderId> {
        self.entry
            .iter()
            .chain(self.stop.iter())
            .chain(self.target.iter())
            .cloned()
            .collect()
    }
}
