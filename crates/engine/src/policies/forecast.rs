//! Forecast-driven policy: bounds scaled by a fitted return/volatility
//! forecast, with a periodic volatility-collapse trigger.

use super::{RebalancePolicy, ResetReason, TargetBounds};
use crate::errors::BacktestError;
use crate::forecast::{Forecast, ReturnForecaster};
use crate::state::PositionState;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

/// Places ranges around the forecast price, `alpha`/`tau` standard
/// deviations wide. On top of the shared triggers, refits the model every
/// `check_interval_minutes` whole minutes since placement and rebalances
/// when the fresh volatility forecast has fallen to
/// `volatility_reset_ratio` of the placement volatility or below; rising
/// volatility needs no trigger of its own since it hits the reset band.
#[derive(Debug, Clone)]
pub struct ForecastPolicy<F> {
    pub alpha: Decimal,
    pub tau: Decimal,
    pub limit_parameter: Decimal,
    pub volatility_reset_ratio: Decimal,
    pub check_interval_minutes: i64,
    pub horizon: usize,
    forecaster: F,
    /// Trailing return observations the model is refit on; entries at or
    /// after the evaluation time are ignored.
    model_returns: Vec<(DateTime<Utc>, f64)>,
}

impl<F: ReturnForecaster> ForecastPolicy<F> {
    pub fn new(
        alpha: Decimal,
        tau: Decimal,
        limit_parameter: Decimal,
        volatility_reset_ratio: Decimal,
        forecaster: F,
        model_returns: Vec<(DateTime<Utc>, f64)>,
    ) -> Self {
        Self {
            alpha,
            tau,
            limit_parameter,
            volatility_reset_ratio,
            check_interval_minutes: 60,
            horizon: 1,
            forecaster,
            model_returns,
        }
    }

    pub fn with_check_interval(mut self, minutes: i64) -> Self {
        self.check_interval_minutes = minutes.max(1);
        self
    }

    fn fit(&self, time: DateTime<Utc>) -> Result<Forecast, BacktestError> {
        let trailing: Vec<f64> = self
            .model_returns
            .iter()
            .take_while(|(t, _)| *t < time)
            .map(|(_, r)| *r)
            .collect();
        self.forecaster
            .fit_and_forecast(&trailing, self.horizon)
            .map_err(|e| BacktestError::Forecast {
                time,
                reason: e.to_string(),
            })
    }
}

impl<F: ReturnForecaster> RebalancePolicy for ForecastPolicy<F> {
    fn name(&self) -> &'static str {
        "forecast"
    }

    fn limit_parameter(&self) -> Decimal {
        self.limit_parameter
    }

    fn target_bounds(
        &mut self,
        price: Decimal,
        time: DateTime<Utc>,
    ) -> Result<TargetBounds, BacktestError> {
        let forecast = self.fit(time)?;
        let mean = Decimal::from_f64(forecast.mean).ok_or_else(|| BacktestError::Forecast {
            time,
            reason: format!("mean forecast {} not representable", forecast.mean),
        })?;
        let sd = Decimal::from_f64(forecast.sd).ok_or_else(|| BacktestError::Forecast {
            time,
            reason: format!("sd forecast {} not representable", forecast.sd),
        })?;

        let target_price = (Decimal::ONE + mean) * price;
        let band = |k: Decimal| target_price * (Decimal::ONE + mean + k * sd);

        Ok(TargetBounds {
            base_lower: band(-self.alpha),
            base_upper: band(self.alpha),
            reset_lower: band(-self.tau),
            reset_upper: band(self.tau),
            volatility: Some(sd),
            return_forecast: Some(mean),
        })
    }

    fn extra_trigger(
        &mut self,
        state: &PositionState,
    ) -> Result<Option<ResetReason>, BacktestError> {
        let base = &state.ranges.base;
        let Some(placement_vol) = base.volatility else {
            return Ok(None);
        };
        if placement_vol <= Decimal::ZERO {
            return Ok(None);
        }

        let elapsed_minutes = (state.time - base.placed_at).num_minutes();
        if elapsed_minutes <= 0 || elapsed_minutes % self.check_interval_minutes != 0 {
            return Ok(None);
        }

        let forecast = self.fit(state.time)?;
        let sd = Decimal::from_f64(forecast.sd).unwrap_or(Decimal::ZERO);
        if sd / placement_vol <= self.volatility_reset_ratio {
            return Ok(Some(ResetReason::VolRebalance));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::{LiquidityRange, RangePair};
    use crate::state::PolicyBands;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    /// Forecaster stub returning a fixed forecast regardless of input.
    struct ConstForecaster(Forecast);

    impl ReturnForecaster for ConstForecaster {
        fn fit_and_forecast(
            &self,
            _returns: &[f64],
            _horizon: usize,
        ) -> Result<Forecast, &'static str> {
            Ok(self.0)
        }
    }

    fn t(mins: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + mins * 60, 0).unwrap()
    }

    fn policy(sd: f64) -> ForecastPolicy<ConstForecaster> {
        ForecastPolicy::new(
            dec!(1),
            dec!(2),
            dec!(0.5),
            dec!(0.5),
            ConstForecaster(Forecast { mean: 0.0, sd }),
            Vec::new(),
        )
    }

    fn holding_state(placed_at: DateTime<Utc>, now: DateTime<Utc>, vol: Decimal) -> PositionState {
        let leg = LiquidityRange {
            lower_tick: 0,
            upper_tick: 60,
            liquidity: dec!(1),
            token_0: dec!(100),
            token_1: Decimal::ZERO,
            lower_price: dec!(0.9),
            upper_price: dec!(1.1),
            placed_at,
            placement_price: dec!(1),
            volatility: Some(vol),
            return_forecast: Some(Decimal::ZERO),
        };
        PositionState {
            time: now,
            price: dec!(1),
            current_tick: 0,
            ranges: RangePair {
                base: leg.clone(),
                limit: leg,
            },
            leftover_0: Decimal::ZERO,
            leftover_1: Decimal::ZERO,
            uncollected_fees_0: Decimal::ZERO,
            uncollected_fees_1: Decimal::ZERO,
            period_fees_0: Decimal::ZERO,
            period_fees_1: Decimal::ZERO,
            reset: None,
            bands: PolicyBands {
                base_lower: dec!(0.9),
                base_upper: dec!(1.1),
                limit_lower: dec!(1),
                limit_upper: dec!(1.1),
                reset_lower: dec!(0.8),
                reset_upper: dec!(1.2),
            },
        }
    }

    #[test]
    fn test_bounds_scale_with_forecast_sd() {
        let mut p = policy(0.02);
        let b = p.target_bounds(dec!(100), t(0)).unwrap();
        // mean 0: target = 100, base = 100 * (1 +/- 1 * 0.02)
        assert_eq!(b.base_lower, dec!(98));
        assert_eq!(b.base_upper, dec!(102));
        assert_eq!(b.reset_lower, dec!(96));
        assert_eq!(b.reset_upper, dec!(104));
        assert_eq!(b.volatility, Some(dec!(0.02)));
    }

    #[test]
    fn test_vol_trigger_fires_on_collapse() {
        // Placement vol 0.04, fresh forecast 0.02: ratio 0.5 <= 0.5.
        let mut p = policy(0.02);
        let s = holding_state(t(0), t(60), dec!(0.04));
        assert_eq!(
            p.extra_trigger(&s).unwrap(),
            Some(ResetReason::VolRebalance)
        );
    }

    #[test]
    fn test_vol_trigger_respects_check_interval() {
        let mut p = policy(0.02);
        // 30 minutes since placement: not a whole check interval yet.
        let s = holding_state(t(0), t(30), dec!(0.04));
        assert_eq!(p.extra_trigger(&s).unwrap(), None);
    }

    #[test]
    fn test_vol_trigger_quiet_when_vol_holds() {
        // Fresh forecast equals placement vol: ratio 1 > 0.5.
        let mut p = policy(0.04);
        let s = holding_state(t(0), t(60), dec!(0.04));
        assert_eq!(p.extra_trigger(&s).unwrap(), None);
    }
}
