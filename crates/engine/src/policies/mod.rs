//! Rebalance policies: when to liquidate and where to re-place.
//!
//! All variants share the exit-of-reset-band and limit-imbalance triggers;
//! they differ in how the next placement's bounds are chosen and in any
//! policy-specific trigger layered on top.

mod forecast;
mod quantile;
mod range_exit;

pub use forecast::ForecastPolicy;
pub use quantile::QuantilePolicy;
pub use range_exit::RangeExitPolicy;

use crate::errors::BacktestError;
use crate::state::PositionState;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a rebalance fired. Variants are ordered by trigger precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    /// Price left the reset band.
    ExitedRange,
    /// Limit leg filled into both tokens and outgrew the base leg.
    LimitImbalance,
    /// Forecast volatility collapsed relative to placement.
    VolRebalance,
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ExitedRange => "exited_range",
            Self::LimitImbalance => "limit_imbalance",
            Self::VolRebalance => "vol_rebalance",
        };
        f.write_str(s)
    }
}

/// Price bounds for the next placement, plus placement metadata the policy
/// wants recorded on the ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetBounds {
    pub base_lower: Decimal,
    pub base_upper: Decimal,
    pub reset_lower: Decimal,
    pub reset_upper: Decimal,
    pub volatility: Option<Decimal>,
    pub return_forecast: Option<Decimal>,
}

/// A rebalance/range-selection policy.
pub trait RebalancePolicy {
    fn name(&self) -> &'static str;

    /// Target ratio parameter for the shared limit-imbalance trigger.
    fn limit_parameter(&self) -> Decimal;

    /// Bounds for the initial placement or a re-placement at `price`.
    fn target_bounds(
        &mut self,
        price: Decimal,
        time: DateTime<Utc>,
    ) -> Result<TargetBounds, BacktestError>;

    /// Policy-specific trigger, evaluated after the common ones.
    fn extra_trigger(
        &mut self,
        _state: &PositionState,
    ) -> Result<Option<ResetReason>, BacktestError> {
        Ok(None)
    }

    /// Full trigger evaluation in fixed precedence: exited range, then
    /// limit imbalance, then whatever the policy adds.
    fn should_rebalance(
        &mut self,
        state: &PositionState,
    ) -> Result<Option<ResetReason>, BacktestError> {
        if state.price < state.bands.reset_lower || state.price > state.bands.reset_upper {
            return Ok(Some(ResetReason::ExitedRange));
        }
        if limit_imbalance(state, self.limit_parameter()) {
            return Ok(Some(ResetReason::LimitImbalance));
        }
        self.extra_trigger(state)
    }
}

/// The limit leg has filled into both tokens near the target ratio while its
/// value outgrew the base leg.
///
/// The ratio check is a band `[limit_parameter, limit_parameter + 1]`; the
/// source this models used an OR of the two comparisons, which is satisfied
/// by any positive ratio.
fn limit_imbalance(state: &PositionState, limit_parameter: Decimal) -> bool {
    let limit = &state.ranges.limit;
    if limit.token_0 <= Decimal::ZERO || limit.token_1 <= Decimal::ZERO {
        return false;
    }
    let ratio = limit.token_0 / limit.token_1;
    let in_band = ratio >= limit_parameter && ratio <= limit_parameter + Decimal::ONE;
    if !in_band {
        return false;
    }
    let base_value = state.ranges.base.value_in_token_0(state.price);
    if base_value > Decimal::ZERO {
        let limit_value = state.ranges.limit.value_in_token_0(state.price);
        limit_value > (Decimal::ONE + limit_parameter) * base_value
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::{LiquidityRange, RangePair};
    use crate::state::PolicyBands;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn leg(t0: Decimal, t1: Decimal) -> LiquidityRange {
        LiquidityRange {
            lower_tick: 0,
            upper_tick: 60,
            liquidity: dec!(1),
            token_0: t0,
            token_1: t1,
            lower_price: dec!(0.9),
            upper_price: dec!(1.1),
            placed_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            placement_price: dec!(1),
            volatility: None,
            return_forecast: None,
        }
    }

    fn state(base: LiquidityRange, limit: LiquidityRange, price: Decimal) -> PositionState {
        PositionState {
            time: Utc.timestamp_opt(1_700_000_060, 0).unwrap(),
            price,
            current_tick: 0,
            ranges: RangePair { base, limit },
            leftover_0: Decimal::ZERO,
            leftover_1: Decimal::ZERO,
            uncollected_fees_0: Decimal::ZERO,
            uncollected_fees_1: Decimal::ZERO,
            period_fees_0: Decimal::ZERO,
            period_fees_1: Decimal::ZERO,
            reset: None,
            bands: PolicyBands {
                base_lower: dec!(0.95),
                base_upper: dec!(1.05),
                limit_lower: dec!(1),
                limit_upper: dec!(1.05),
                reset_lower: dec!(0.9),
                reset_upper: dec!(1.1),
            },
        }
    }

    #[test]
    fn test_single_sided_limit_never_imbalanced() {
        let s = state(leg(dec!(100), dec!(100)), leg(dec!(50), dec!(0)), dec!(1));
        assert!(!limit_imbalance(&s, dec!(0.5)));
    }

    #[test]
    fn test_imbalance_needs_value_dominance() {
        // Ratio 1 is inside [0.5, 1.5], but limit value (40) < 1.5 * base (300).
        let s = state(leg(dec!(100), dec!(100)), leg(dec!(20), dec!(20)), dec!(1));
        assert!(!limit_imbalance(&s, dec!(0.5)));

        // Limit value 600 > 1.5 * 200.
        let s = state(leg(dec!(50), dec!(50)), leg(dec!(300), dec!(300)), dec!(1));
        assert!(limit_imbalance(&s, dec!(0.5)));
    }

    #[test]
    fn test_ratio_outside_band_does_not_fire() {
        // Ratio 10 is above limit_parameter + 1.
        let s = state(leg(dec!(1), dec!(1)), leg(dec!(1000), dec!(100)), dec!(1));
        assert!(!limit_imbalance(&s, dec!(0.5)));
    }

    #[test]
    fn test_exit_takes_precedence() {
        struct Fixed;
        impl RebalancePolicy for Fixed {
            fn name(&self) -> &'static str {
                "fixed"
            }
            fn limit_parameter(&self) -> Decimal {
                dec!(0.5)
            }
            fn target_bounds(
                &mut self,
                _price: Decimal,
                _time: DateTime<Utc>,
            ) -> Result<TargetBounds, BacktestError> {
                unreachable!()
            }
            fn extra_trigger(
                &mut self,
                _state: &PositionState,
            ) -> Result<Option<ResetReason>, BacktestError> {
                Ok(Some(ResetReason::VolRebalance))
            }
        }

        // Price outside the reset band and an extra trigger armed: the exit
        // reason wins.
        let s = state(leg(dec!(50), dec!(50)), leg(dec!(300), dec!(300)), dec!(1.5));
        let mut p = Fixed;
        assert_eq!(
            p.should_rebalance(&s).unwrap(),
            Some(ResetReason::ExitedRange)
        );

        // Back inside the band, imbalance beats the extra trigger.
        let s = state(leg(dec!(50), dec!(50)), leg(dec!(300), dec!(300)), dec!(1));
        assert_eq!(
            p.should_rebalance(&s).unwrap(),
            Some(ResetReason::LimitImbalance)
        );
    }

    #[test]
    fn test_reset_reason_display() {
        assert_eq!(ResetReason::ExitedRange.to_string(), "exited_range");
        assert_eq!(ResetReason::LimitImbalance.to_string(), "limit_imbalance");
        assert_eq!(ResetReason::VolRebalance.to_string(), "vol_rebalance");
    }
}
