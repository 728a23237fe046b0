//! Rebalance event log.

use crate::policies::ResetReason;
use crate::state::{PolicyBands, PositionState};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// One liquidate-and-replace, as recorded by the driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceEvent {
    /// Index of the price observation this fired on.
    pub step: usize,
    pub time: DateTime<Utc>,
    pub price: Decimal,
    pub reason: ResetReason,
    /// Total token amounts redeployed into the new placement.
    pub redeployed_0: Decimal,
    pub redeployed_1: Decimal,
    pub bands: PolicyBands,
}

impl RebalanceEvent {
    /// Captures the event from a post-rebalance state. Fees were swept into
    /// the placement, so the state totals are exactly what was redeployed.
    pub(crate) fn capture(step: usize, state: &PositionState, reason: ResetReason) -> Self {
        Self {
            step,
            time: state.time,
            price: state.price,
            reason,
            redeployed_0: state.total_token_0(),
            redeployed_1: state.total_token_1(),
            bands: state.bands,
        }
    }
}
