//! Error taxonomy for a backtest run.
//!
//! Every variant is fatal for the run it occurs in and carries enough
//! context (timestamp where applicable) to reproduce the failure. Nothing
//! here is retried; retries belong to data acquisition, outside this crate.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacktestError {
    /// Degenerate or inverted range bounds supplied to the range placer.
    #[error("invalid range at {time}: {reason}")]
    InvalidRange {
        time: DateTime<Utc>,
        reason: String,
    },

    /// Negative balances or an allocation that violates conservation.
    #[error("invalid state at {time}: {reason}")]
    InvalidState {
        time: DateTime<Utc>,
        reason: String,
    },

    /// Price or swap series not monotonically ordered, or swaps outside the
    /// price series' time range. Rejected before the replay starts.
    #[error("input ordering violation: {reason}")]
    InputOrdering { reason: String },

    /// Negative swap virtual liquidity; the thin-liquidity full-capture
    /// fallback only covers values at or above zero.
    #[error("degenerate virtual liquidity at {time}")]
    DegenerateLiquidity { time: DateTime<Utc> },

    /// The forecasting collaborator could not produce a forecast.
    #[error("forecast failure at {time}: {reason}")]
    Forecast {
        time: DateTime<Utc>,
        reason: String,
    },
}

impl BacktestError {
    pub(crate) fn invalid_range(time: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            time,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_state(time: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            time,
            reason: reason.into(),
        }
    }

    pub(crate) fn ordering(reason: impl Into<String>) -> Self {
        Self::InputOrdering {
            reason: reason.into(),
        }
    }
}
