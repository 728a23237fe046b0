//! Quantile-driven policy: bounds from the inverse empirical CDF of
//! historical returns.

use super::{RebalancePolicy, TargetBounds};
use crate::ecdf::EmpiricalCdf;
use crate::errors::BacktestError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

/// Bounds at `(1 + inverse_cdf(q)) * price`, with `q` placing symmetric
/// probability mass `alpha` inside the base range and `tau` inside the
/// reset band. Triggers are the shared exit/imbalance ones only.
#[derive(Debug, Clone)]
pub struct QuantilePolicy {
    pub alpha: Decimal,
    pub tau: Decimal,
    pub limit_parameter: Decimal,
    ecdf: EmpiricalCdf,
}

impl QuantilePolicy {
    pub fn new(alpha: Decimal, tau: Decimal, limit_parameter: Decimal, ecdf: EmpiricalCdf) -> Self {
        Self {
            alpha,
            tau,
            limit_parameter,
            ecdf,
        }
    }

    fn quantile_bound(
        &self,
        price: Decimal,
        probability: f64,
        time: DateTime<Utc>,
    ) -> Result<Decimal, BacktestError> {
        let q = self
            .ecdf
            .inverse_cdf(probability)
            .map_err(|e| BacktestError::invalid_state(time, e))?;
        let factor = Decimal::from_f64(1.0 + q).ok_or_else(|| {
            BacktestError::invalid_state(time, format!("quantile {q} not representable"))
        })?;
        Ok(factor * price)
    }
}

impl RebalancePolicy for QuantilePolicy {
    fn name(&self) -> &'static str {
        "quantile"
    }

    fn limit_parameter(&self) -> Decimal {
        self.limit_parameter
    }

    fn target_bounds(
        &mut self,
        price: Decimal,
        time: DateTime<Utc>,
    ) -> Result<TargetBounds, BacktestError> {
        let alpha = self.alpha.to_f64().unwrap_or(0.0);
        let tau = self.tau.to_f64().unwrap_or(0.0);

        Ok(TargetBounds {
            base_lower: self.quantile_bound(price, (1.0 - alpha) / 2.0, time)?,
            base_upper: self.quantile_bound(price, 1.0 - (1.0 - alpha) / 2.0, time)?,
            reset_lower: self.quantile_bound(price, (1.0 - tau) / 2.0, time)?,
            reset_upper: self.quantile_bound(price, 1.0 - (1.0 - tau) / 2.0, time)?,
            volatility: None,
            return_forecast: None,
        })
    }
}
