//! Per-timestep position state and the open/advance transitions.
//!
//! A backtest is a fold over the price series: `open` seeds the first state
//! from the initial balances, `advance` produces each successor by marking
//! the ranges to the new tick, accruing the step's swap fees and, when the
//! policy fires, liquidating and re-placing everything.

use crate::errors::BacktestError;
use crate::fees;
use crate::placement::RangePlacer;
use crate::policies::{RebalancePolicy, ResetReason, TargetBounds};
use crate::range::RangePair;
use crate::series::SwapEvent;
use chrono::{DateTime, Utc};
use clmm_backtest_domain::PoolConfig;
use clmm_backtest_domain::math::tick::spaced_tick_floor;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

/// Relative tolerance for the token-conservation check at each placement.
fn conservation_tolerance() -> Decimal {
    Decimal::new(1, 6) // 1e-6
}

/// The bands the position was placed under, in price terms. `should_rebalance`
/// evaluates the current price against these, not against fresh bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolicyBands {
    pub base_lower: Decimal,
    pub base_upper: Decimal,
    pub limit_lower: Decimal,
    pub limit_upper: Decimal,
    pub reset_lower: Decimal,
    pub reset_upper: Decimal,
}

/// Complete position snapshot at one price observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionState {
    pub time: DateTime<Utc>,
    /// Pool price, token 1 per token 0.
    pub price: Decimal,
    /// Spacing-aligned pool tick implied by `price`.
    pub current_tick: i32,
    pub ranges: RangePair,
    /// Capital that did not fit into either leg.
    pub leftover_0: Decimal,
    pub leftover_1: Decimal,
    /// Fees earned since the last rebalance, not yet redeployed.
    pub uncollected_fees_0: Decimal,
    pub uncollected_fees_1: Decimal,
    /// Fees earned in this step alone.
    pub period_fees_0: Decimal,
    pub period_fees_1: Decimal,
    /// Set when this step liquidated and re-placed the position.
    pub reset: Option<ResetReason>,
    pub bands: PolicyBands,
}

impl PositionState {
    /// Opens the initial position from free balances.
    pub fn open(
        time: DateTime<Utc>,
        price: Decimal,
        pool: &PoolConfig,
        available_0: Decimal,
        available_1: Decimal,
        policy: &mut dyn RebalancePolicy,
    ) -> Result<Self, BacktestError> {
        let tick = aligned_tick(time, price, pool)?;
        let bounds = policy.target_bounds(price, time)?;
        let placement = RangePlacer::new(pool).place_ranges(
            time,
            price,
            tick,
            available_0,
            available_1,
            &bounds,
        )?;
        check_conservation(
            time,
            available_0,
            available_1,
            &placement.ranges,
            placement.leftover_0,
            placement.leftover_1,
        )?;

        Ok(Self {
            time,
            price,
            current_tick: tick,
            bands: bands_from(&bounds, &placement.ranges),
            ranges: placement.ranges,
            leftover_0: placement.leftover_0,
            leftover_1: placement.leftover_1,
            uncollected_fees_0: Decimal::ZERO,
            uncollected_fees_1: Decimal::ZERO,
            period_fees_0: Decimal::ZERO,
            period_fees_1: Decimal::ZERO,
            reset: None,
        })
    }

    /// Advances to the next price observation.
    ///
    /// `swaps` must be the events in the half-open window between the
    /// previous observation (exclusive) and `time` (inclusive).
    pub fn advance(
        &self,
        time: DateTime<Utc>,
        price: Decimal,
        swaps: &[SwapEvent],
        pool: &PoolConfig,
        policy: &mut dyn RebalancePolicy,
    ) -> Result<Self, BacktestError> {
        let tick = aligned_tick(time, price, pool)?;

        let mut ranges = self.ranges.clone();
        ranges
            .base
            .refresh_amounts(tick, pool)
            .map_err(|e| BacktestError::invalid_state(time, e))?;
        ranges
            .limit
            .refresh_amounts(tick, pool)
            .map_err(|e| BacktestError::invalid_state(time, e))?;

        let accrued = fees::accrue(&ranges, swaps, pool.fee_tier)?;

        let mut next = Self {
            time,
            price,
            current_tick: tick,
            ranges,
            leftover_0: self.leftover_0,
            leftover_1: self.leftover_1,
            uncollected_fees_0: self.uncollected_fees_0 + accrued.fees_0,
            uncollected_fees_1: self.uncollected_fees_1 + accrued.fees_1,
            period_fees_0: accrued.fees_0,
            period_fees_1: accrued.fees_1,
            reset: None,
            bands: self.bands,
        };

        if let Some(reason) = policy.should_rebalance(&next)? {
            next.rebalance(reason, pool, policy)?;
        }
        Ok(next)
    }

    /// Liquidates both legs, sweeps leftovers and uncollected fees back into
    /// free balances, and re-places at the current price.
    fn rebalance(
        &mut self,
        reason: ResetReason,
        pool: &PoolConfig,
        policy: &mut dyn RebalancePolicy,
    ) -> Result<(), BacktestError> {
        let (placed_0, placed_1) = self.ranges.total_amounts();
        let available_0 = placed_0 + self.leftover_0 + self.uncollected_fees_0;
        let available_1 = placed_1 + self.leftover_1 + self.uncollected_fees_1;

        debug!(
            time = %self.time, price = %self.price, %reason,
            %available_0, %available_1,
            "liquidating position for rebalance"
        );

        let bounds = policy.target_bounds(self.price, self.time)?;
        let placement = RangePlacer::new(pool).place_ranges(
            self.time,
            self.price,
            self.current_tick,
            available_0,
            available_1,
            &bounds,
        )?;
        check_conservation(
            self.time,
            available_0,
            available_1,
            &placement.ranges,
            placement.leftover_0,
            placement.leftover_1,
        )?;

        self.bands = bands_from(&bounds, &placement.ranges);
        self.ranges = placement.ranges;
        self.leftover_0 = placement.leftover_0;
        self.leftover_1 = placement.leftover_1;
        self.uncollected_fees_0 = Decimal::ZERO;
        self.uncollected_fees_1 = Decimal::ZERO;
        self.reset = Some(reason);
        Ok(())
    }

    /// Total token 0 under management: both legs, leftover and fees.
    pub fn total_token_0(&self) -> Decimal {
        self.ranges.total_amounts().0 + self.leftover_0 + self.uncollected_fees_0
    }

    /// Total token 1 under management: both legs, leftover and fees.
    pub fn total_token_1(&self) -> Decimal {
        self.ranges.total_amounts().1 + self.leftover_1 + self.uncollected_fees_1
    }

    /// Everything under management, valued in token 0 at the current price.
    pub fn value_in_token_0(&self) -> Decimal {
        if self.price.is_zero() {
            return self.total_token_0();
        }
        self.total_token_0() + self.total_token_1() / self.price
    }
}

fn aligned_tick(
    time: DateTime<Utc>,
    price: Decimal,
    pool: &PoolConfig,
) -> Result<i32, BacktestError> {
    spaced_tick_floor(price, pool.decimals_0, pool.decimals_1, pool.tick_spacing())
        .map_err(|e| BacktestError::invalid_range(time, e))
}

fn bands_from(bounds: &TargetBounds, ranges: &RangePair) -> PolicyBands {
    PolicyBands {
        base_lower: bounds.base_lower,
        base_upper: bounds.base_upper,
        limit_lower: ranges.limit.lower_price,
        limit_upper: ranges.limit.upper_price,
        reset_lower: bounds.reset_lower,
        reset_upper: bounds.reset_upper,
    }
}

/// Placed amounts plus leftovers must equal what went in, up to a relative
/// rounding tolerance per token.
fn check_conservation(
    time: DateTime<Utc>,
    available_0: Decimal,
    available_1: Decimal,
    ranges: &RangePair,
    leftover_0: Decimal,
    leftover_1: Decimal,
) -> Result<(), BacktestError> {
    let (placed_0, placed_1) = ranges.total_amounts();
    let check = |token: &str, available: Decimal, out: Decimal| {
        let tolerance = conservation_tolerance() * available.max(Decimal::ONE);
        if (out - available).abs() > tolerance {
            return Err(BacktestError::invalid_state(
                time,
                format!("{token} not conserved: {available} in, {out} out"),
            ));
        }
        Ok(())
    };
    check("token 0", available_0, placed_0 + leftover_0)?;
    check("token 1", available_1, placed_1 + leftover_1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::RangeExitPolicy;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn pool() -> PoolConfig {
        PoolConfig::new(dec!(0.0003), 6, 18)
    }

    fn policy() -> RangeExitPolicy {
        RangeExitPolicy::new(dec!(0.1), dec!(0.2), dec!(0.5))
    }

    #[test]
    fn test_open_conserves_balances() {
        let mut p = policy();
        let s = PositionState::open(t(0), dec!(1), &pool(), dec!(1000), dec!(0), &mut p).unwrap();

        let diff = (s.total_token_0() - dec!(1000)).abs();
        assert!(diff < dec!(0.001), "token 0 leaked: {diff}");
        assert!(s.total_token_1() < dec!(0.001));
        assert!(s.reset.is_none());
        assert_eq!(s.bands.reset_lower, dec!(0.9));
        assert_eq!(s.bands.reset_upper, dec!(1.1));
    }

    #[test]
    fn test_advance_inside_band_holds_position() {
        let mut p = policy();
        let pool = pool();
        let s0 =
            PositionState::open(t(0), dec!(1), &pool, dec!(1000), dec!(800), &mut p).unwrap();
        let s1 = s0.advance(t(60), dec!(1.02), &[], &pool, &mut p).unwrap();

        assert!(s1.reset.is_none());
        assert_eq!(s1.bands, s0.bands);
        assert_eq!(s1.ranges.base.lower_tick, s0.ranges.base.lower_tick);
        assert_eq!(s1.period_fees_0, Decimal::ZERO);
    }

    #[test]
    fn test_advance_out_of_band_rebalances() {
        let mut p = policy();
        let pool = pool();
        let s0 =
            PositionState::open(t(0), dec!(1), &pool, dec!(1000), dec!(800), &mut p).unwrap();
        let s1 = s0.advance(t(60), dec!(1.2), &[], &pool, &mut p).unwrap();

        assert_eq!(s1.reset, Some(ResetReason::ExitedRange));
        // Bands re-centered on the new price.
        assert_eq!(s1.bands.reset_lower, dec!(1.08));
        assert_eq!(s1.bands.reset_upper, dec!(1.32));
        assert_eq!(s1.uncollected_fees_0, Decimal::ZERO);
        assert_eq!(s1.uncollected_fees_1, Decimal::ZERO);
    }

    #[test]
    fn test_rebalance_conserves_total_value() {
        let mut p = policy();
        let pool = pool();
        let s0 =
            PositionState::open(t(0), dec!(1), &pool, dec!(1000), dec!(800), &mut p).unwrap();

        // Mark to the new price first, then compare against the rebalanced
        // state at that same price: liquidation itself must not move value.
        let marked = {
            let mut ranges = s0.ranges.clone();
            let tick = aligned_tick(t(60), dec!(1.2), &pool).unwrap();
            ranges.base.refresh_amounts(tick, &pool).unwrap();
            ranges.limit.refresh_amounts(tick, &pool).unwrap();
            let (m0, m1) = ranges.total_amounts();
            (m0 + s0.leftover_0, m1 + s0.leftover_1)
        };
        let s1 = s0.advance(t(60), dec!(1.2), &[], &pool, &mut p).unwrap();

        let diff_0 = (s1.total_token_0() - marked.0).abs();
        let diff_1 = (s1.total_token_1() - marked.1).abs();
        assert!(diff_0 < dec!(0.01), "token 0 moved: {diff_0}");
        assert!(diff_1 < dec!(0.01), "token 1 moved: {diff_1}");
    }

    #[test]
    fn test_fees_carry_until_rebalance() {
        use crate::series::TokenSide;

        let mut p = policy();
        let pool = pool();
        let s0 =
            PositionState::open(t(0), dec!(1), &pool, dec!(1000), dec!(800), &mut p).unwrap();

        let swap = SwapEvent {
            time: t(30),
            tick: s0.current_tick,
            token_in: TokenSide::Token0,
            traded_in: dec!(10000),
            virtual_liquidity: dec!(1),
        };
        let s1 = s0.advance(t(60), dec!(1), &[swap], &pool, &mut p).unwrap();
        assert!(s1.period_fees_0 > Decimal::ZERO);
        assert_eq!(s1.uncollected_fees_0, s1.period_fees_0);

        let s2 = s1.advance(t(120), dec!(1), &[], &pool, &mut p).unwrap();
        assert_eq!(s2.period_fees_0, Decimal::ZERO);
        // Carried forward, not dropped.
        assert_eq!(s2.uncollected_fees_0, s1.uncollected_fees_0);
    }
}
