//! Baseline fixed-width policy: bounds at fixed proportional offsets from
//! the current price, triggers on range exit and limit imbalance only.

use super::{RebalancePolicy, TargetBounds};
use crate::errors::BacktestError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Fixed proportional bands around the placement price.
///
/// `alpha` and `tau` are total band widths: the base range spans
/// `price * (1 ± alpha/2)` and the reset band `price * (1 ± tau/2)`.
#[derive(Debug, Clone)]
pub struct RangeExitPolicy {
    pub alpha: Decimal,
    pub tau: Decimal,
    pub limit_parameter: Decimal,
}

impl RangeExitPolicy {
    pub fn new(alpha: Decimal, tau: Decimal, limit_parameter: Decimal) -> Self {
        Self {
            alpha,
            tau,
            limit_parameter,
        }
    }
}

impl RebalancePolicy for RangeExitPolicy {
    fn name(&self) -> &'static str {
        "range_exit"
    }

    fn limit_parameter(&self) -> Decimal {
        self.limit_parameter
    }

    fn target_bounds(
        &mut self,
        price: Decimal,
        _time: DateTime<Utc>,
    ) -> Result<TargetBounds, BacktestError> {
        let two = Decimal::from(2);
        let half_alpha = self.alpha / two;
        let half_tau = self.tau / two;
        Ok(TargetBounds {
            base_lower: price * (Decimal::ONE - half_alpha),
            base_upper: price * (Decimal::ONE + half_alpha),
            reset_lower: price * (Decimal::ONE - half_tau),
            reset_upper: price * (Decimal::ONE + half_tau),
            volatility: None,
            return_forecast: None,
        })
    }
}
