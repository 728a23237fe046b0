//! Pro-rata fee attribution from observed swap flow.

use crate::errors::BacktestError;
use crate::range::RangePair;
use crate::series::{SwapEvent, TokenSide};
use rust_decimal::Decimal;
use tracing::warn;

/// Below this, the pool's virtual liquidity is numerically indistinguishable
/// from zero and the position is treated as capturing the entire fee.
/// Thin-liquidity pools otherwise blow up the share division.
pub fn min_virtual_liquidity() -> Decimal {
    Decimal::new(1, 9) // 1e-9
}

/// Aggregate fees accrued over one step's swap window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeesAccrued {
    pub fees_0: Decimal,
    pub fees_1: Decimal,
}

/// Attributes a fee share of each swap to each open range.
///
/// A swap contributes to a range iff its tick lies inside the range's tick
/// bounds (inclusive). The position's share is
/// `liquidity / (liquidity + virtual_liquidity)`, with full capture when the
/// virtual liquidity falls under the degeneracy threshold. Negative virtual
/// liquidity is outside what the fallback can interpret and fails the run.
pub fn accrue(
    ranges: &RangePair,
    swaps: &[SwapEvent],
    fee_tier: Decimal,
) -> Result<FeesAccrued, BacktestError> {
    let mut accrued = FeesAccrued::default();
    let threshold = min_virtual_liquidity();

    for swap in swaps {
        if swap.virtual_liquidity < Decimal::ZERO {
            return Err(BacktestError::DegenerateLiquidity { time: swap.time });
        }
        for range in ranges.iter() {
            let in_range = range.lower_tick <= swap.tick && swap.tick <= range.upper_tick;
            if !in_range {
                continue;
            }

            let fraction = if swap.virtual_liquidity < threshold {
                warn!(
                    time = %swap.time,
                    virtual_liquidity = %swap.virtual_liquidity,
                    "degenerate virtual liquidity, position captures full fee"
                );
                Decimal::ONE
            } else {
                range.liquidity / (range.liquidity + swap.virtual_liquidity)
            };

            let fee = fee_tier * fraction * swap.traded_in;
            match swap.token_in {
                TokenSide::Token0 => accrued.fees_0 += fee,
                TokenSide::Token1 => accrued.fees_1 += fee,
            }
        }
    }
    Ok(accrued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::LiquidityRange;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn leg(lower: i32, upper: i32, liquidity: Decimal) -> LiquidityRange {
        LiquidityRange {
            lower_tick: lower,
            upper_tick: upper,
            liquidity,
            token_0: Decimal::ZERO,
            token_1: Decimal::ZERO,
            lower_price: Decimal::ZERO,
            upper_price: Decimal::ZERO,
            placed_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            placement_price: Decimal::ONE,
            volatility: None,
            return_forecast: None,
        }
    }

    fn swap(tick: i32, token_in: TokenSide, traded_in: Decimal, virtual_liq: Decimal) -> SwapEvent {
        SwapEvent {
            time: Utc.timestamp_opt(1_700_000_060, 0).unwrap(),
            tick,
            token_in,
            traded_in,
            virtual_liquidity: virtual_liq,
        }
    }

    #[test]
    fn test_fee_share_is_pro_rata() {
        let ranges = RangePair {
            base: leg(-100, 100, dec!(1000)),
            limit: leg(200, 300, dec!(500)),
        };
        // Swap at tick 0 hits only the base leg.
        let swaps = [swap(0, TokenSide::Token0, dec!(10000), dec!(3000))];
        let accrued = accrue(&ranges, &swaps, dec!(0.003)).unwrap();

        // 0.003 * 10000 * 1000/(1000+3000) = 7.5
        assert_eq!(accrued.fees_0, dec!(7.5));
        assert_eq!(accrued.fees_1, Decimal::ZERO);
    }

    #[test]
    fn test_token_1_swaps_credit_token_1() {
        let ranges = RangePair {
            base: leg(-100, 100, dec!(1000)),
            limit: leg(-100, 50, dec!(1000)),
        };
        // Tick 25 is inside both legs.
        let swaps = [swap(25, TokenSide::Token1, dec!(2000), dec!(1000))];
        let accrued = accrue(&ranges, &swaps, dec!(0.003)).unwrap();

        assert_eq!(accrued.fees_0, Decimal::ZERO);
        // Both legs earn 0.003 * 2000 * 0.5 = 3
        assert_eq!(accrued.fees_1, dec!(6));
    }

    #[test]
    fn test_out_of_range_swap_earns_nothing() {
        let ranges = RangePair {
            base: leg(-100, 100, dec!(1000)),
            limit: leg(100, 200, dec!(1000)),
        };
        let swaps = [swap(500, TokenSide::Token0, dec!(10000), dec!(3000))];
        assert_eq!(
            accrue(&ranges, &swaps, dec!(0.003)).unwrap(),
            FeesAccrued::default()
        );
    }

    #[test]
    fn test_thin_liquidity_full_capture() {
        let ranges = RangePair {
            base: leg(-100, 100, dec!(1000)),
            limit: leg(200, 300, dec!(500)),
        };
        // virtual_liquidity = 1e-12, under the 1e-9 threshold.
        let swaps = [swap(0, TokenSide::Token0, dec!(100), Decimal::new(1, 12))];
        let accrued = accrue(&ranges, &swaps, dec!(0.0003)).unwrap();

        // fraction == 1, no division blow-up: 0.0003 * 100
        assert_eq!(accrued.fees_0, dec!(0.03));
    }

    #[test]
    fn test_negative_virtual_liquidity_is_fatal() {
        let ranges = RangePair {
            base: leg(-100, 100, dec!(1000)),
            limit: leg(200, 300, dec!(500)),
        };
        let swaps = [swap(0, TokenSide::Token0, dec!(100), dec!(-1))];
        assert!(matches!(
            accrue(&ranges, &swaps, dec!(0.0003)),
            Err(BacktestError::DegenerateLiquidity { .. })
        ));
    }
}
