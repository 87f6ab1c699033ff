//! Position flattening on shutdown or operator request.
//!
//! Closing a position means cancelling its working children and sending an
//! opposing market order, then waiting a bounded grace period for the fill.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use pf_core::{ClientOrderId, Direction, OrderRequest, OrderRole};
use serde::{Deserialize, Serialize};

use crate::position::Position;

/// Default wait for a flatten order to fill: 30 seconds.
pub const FLATTEN_GRACE_SECS: i64 = 30;

/// Reason for flattening a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlattenReason {
    /// Graceful shutdown of the live runtime.
    Shutdown,
    /// Manual flatten request from operator.
    Manual,
}

impl std::fmt::Display for FlattenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shutdown => write!(f, "Shutdown"),
            Self::Manual => write!(f, "Manual"),
        }
    }
}

/// Request to flatten (close) a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenRequest {
    pub instrument: String,
    /// Opposite of the position's direction.
    pub direction: Direction,
    pub contracts: u32,
    /// Child orders to cancel before the market order goes out.
    pub cancel: Vec<ClientOrderId>,
    pub reason: FlattenReason,
    pub requested_at: DateTime<Utc>,
}

impl FlattenRequest {
    /// The opposing market order.
    pub fn to_order(&self) -> OrderRequest {
        OrderRequest::market(&self.instrument, self.direction, self.contracts, OrderRole::Flatten)
    }
}

/// State of the flattening process for an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlattenState {
    NotStarted,
    /// Market order submitted, waiting for fill.
    InProgress {
        order_id: ClientOrderId,
        started_at: DateTime<Utc>,
    },
    Completed {
        completed_at: DateTime<Utc>,
    },
    /// Timed out or the order was refused.
    Failed {
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl FlattenState {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Tracks flatten state per instrument and detects timeouts.
#[derive(Debug)]
pub struct Flattener {
    states: HashMap<String, FlattenState>,
    grace: Duration,
}

impl Flattener {
    pub fn new(grace: Duration) -> Self {
        Self {
            states: HashMap::new(),
            grace,
        }
    }

    pub fn with_default() -> Self {
        Self::new(Duration::seconds(FLATTEN_GRACE_SECS))
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Build a flatten request for an open position.
    ///
    /// Returns `None` if a flatten is already in progress for the
    /// instrument or the position has no contracts. Call
    /// `mark_in_progress` once the order is actually submitted.
    pub fn start_flatten(
        &mut self,
        position: &Position,
        reason: FlattenReason,
        now: DateTime<Utc>,
    ) -> Option<FlattenRequest> {
        if self
            .states
            .get(&position.instrument)
            .is_some_and(FlattenState::is_in_progress)
        {
            tracing::debug!(
                instrument = %position.instrument,
                "Flatten already in progress, ignoring duplicate request"
            );
            return None;
        }

        if position.contracts == 0 || position.direction == Direction::None {
            tracing::debug!(instrument = %position.instrument, "Nothing to flatten");
            return None;
        }

        self.states
            .insert(position.instrument.clone(), FlattenState::NotStarted);

        Some(FlattenRequest {
            instrument: position.instrument.clone(),
            direction: position.direction.opposite(),
            contracts: position.contracts,
            cancel: position.orders.working_children(),
            reason,
            requested_at: now,
        })
    }

    pub fn mark_in_progress(&mut self, instrument: &str, order_id: ClientOrderId, now: DateTime<Utc>) {
        tracing::info!(instrument, %order_id, "Flatten order submitted");
        self.states.insert(
            instrument.to_string(),
            FlattenState::InProgress {
                order_id,
                started_at: now,
            },
        );
    }

    pub fn mark_completed(&mut self, instrument: &str, now: DateTime<Utc>) {
        self.states.insert(
            instrument.to_string(),
            FlattenState::Completed { completed_at: now },
        );
        tracing::info!(instrument, "Flatten completed");
    }

    pub fn mark_failed(&mut self, instrument: &str, reason: String, now: DateTime<Utc>) {
        tracing::error!(instrument, reason = %reason, "Flatten failed");
        self.states.insert(
            instrument.to_string(),
            FlattenState::Failed {
                reason,
                failed_at: now,
            },
        );
    }

    /// Whether `order_id` is the in-flight flatten order for `instrument`.
    pub fn is_flatten_order(&self, instrument: &str, order_id: &ClientOrderId) -> bool {
        matches!(
            self.states.get(instrument),
            Some(FlattenState::InProgress { order_id: id, .. }) if id == order_id
        )
    }

    /// Mark flattens older than the grace period as failed.
    ///
    /// Returns (instrument, message) for each one that timed out.
    pub fn check_timeouts(&mut self, now: DateTime<Utc>) -> Vec<(String, String)> {
        let timed_out: Vec<(String, String)> = self
            .states
            .iter()
            .filter_map(|(instrument, state)| match state {
                FlattenState::InProgress { started_at, .. } if now - *started_at >= self.grace => {
                    let elapsed = (now - *started_at).num_seconds();
                    Some((instrument.clone(), format!("Flatten timeout after {elapsed}s")))
                }
                _ => None,
            })
            .collect();

        for (instrument, reason) in &timed_out {
            self.mark_failed(instrument, reason.clone(), now);
        }
        timed_out
    }

    pub fn get_state(&self, instrument: &str) -> Option<&FlattenState> {
        self.states.get(instrument)
    }
}

impl Default for Flattener {
    fn default() -> Self {
        Self::with_default()
    }
}
