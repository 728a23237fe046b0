//! Capital allocation into a tick-aligned base range plus a single-sided
//! limit range.

use crate::errors::BacktestError;
use crate::policies::TargetBounds;
use crate::range::{LiquidityRange, RangePair};
use chrono::{DateTime, Utc};
use clmm_backtest_domain::PoolConfig;
use clmm_backtest_domain::math::liquidity::{amounts_for_liquidity, liquidity_for_amounts};
use clmm_backtest_domain::math::tick::spaced_tick_round;
use rust_decimal::Decimal;
use tracing::debug;

/// Result of one placement: both legs plus whatever could not be allocated.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub ranges: RangePair,
    pub leftover_0: Decimal,
    pub leftover_1: Decimal,
}

/// Allocates available balances into base and limit ranges for a pool.
pub struct RangePlacer<'a> {
    pool: &'a PoolConfig,
}

impl<'a> RangePlacer<'a> {
    pub fn new(pool: &'a PoolConfig) -> Self {
        Self { pool }
    }

    /// Places the base range over the policy's target bounds, then a
    /// single-sided limit range on the higher-valued leftover side.
    ///
    /// Residual capital after both placements becomes leftover, floored at
    /// zero; a residual more negative than rounding noise is an invariant
    /// violation and fails the run.
    pub fn place_ranges(
        &self,
        time: DateTime<Utc>,
        price: Decimal,
        tick_current: i32,
        available_0: Decimal,
        available_1: Decimal,
        bounds: &TargetBounds,
    ) -> Result<Placement, BacktestError> {
        if available_0 < Decimal::ZERO || available_1 < Decimal::ZERO {
            return Err(BacktestError::invalid_state(
                time,
                format!("negative available balances: ({available_0}, {available_1})"),
            ));
        }
        if bounds.base_lower >= bounds.base_upper || bounds.base_lower <= Decimal::ZERO {
            return Err(BacktestError::invalid_range(
                time,
                format!(
                    "degenerate base bounds [{}, {}]",
                    bounds.base_lower, bounds.base_upper
                ),
            ));
        }

        let spacing = self.pool.tick_spacing();
        let (d0, d1) = (self.pool.decimals_0, self.pool.decimals_1);

        let base_lower_tick = spaced_tick_round(bounds.base_lower, d0, d1, spacing)
            .map_err(|e| BacktestError::invalid_range(time, e))?;
        let base_upper_tick = spaced_tick_round(bounds.base_upper, d0, d1, spacing)
            .map_err(|e| BacktestError::invalid_range(time, e))?;
        if base_lower_tick >= base_upper_tick {
            return Err(BacktestError::invalid_range(
                time,
                format!("base bounds collapse onto one tick ({base_lower_tick})"),
            ));
        }

        // Two-sided base sizing against everything available.
        let base_liquidity = liquidity_for_amounts(
            tick_current,
            base_lower_tick,
            base_upper_tick,
            available_0,
            available_1,
            d0,
            d1,
        )
        .map_err(|e| BacktestError::invalid_range(time, e))?;
        let (base_0, base_1) = amounts_for_liquidity(
            tick_current,
            base_lower_tick,
            base_upper_tick,
            base_liquidity,
            d0,
            d1,
        )
        .map_err(|e| BacktestError::invalid_range(time, e))?;

        let rem_0 = available_0 - base_0;
        let rem_1 = available_1 - base_1;

        debug!(
            %time, %price,
            lower = base_lower_tick, upper = base_upper_tick,
            %base_0, %base_1, %base_liquidity,
            "base leg placed"
        );

        // Single-sided limit leg on whichever side holds more value.
        let token_0_side = rem_0 * price > rem_1;
        let (limit_lower_price, limit_upper_price) = if token_0_side {
            (price, bounds.base_upper)
        } else {
            (bounds.base_lower, price)
        };

        let mut limit_lower_tick = spaced_tick_round(limit_lower_price, d0, d1, spacing)
            .map_err(|e| BacktestError::invalid_range(time, e))?;
        let mut limit_upper_tick = spaced_tick_round(limit_upper_price, d0, d1, spacing)
            .map_err(|e| BacktestError::invalid_range(time, e))?;
        // Alignment can collapse or invert the leg when the current price
        // sits next to the shared base bound; push the far bound out one
        // spacing so the residual side stays placeable.
        if limit_upper_tick <= limit_lower_tick {
            if token_0_side {
                limit_upper_tick = limit_lower_tick + spacing;
            } else {
                limit_lower_tick = limit_upper_tick - spacing;
            }
        }

        // The bounds are round-aligned while the current tick is
        // floor-aligned, so the current tick can land strictly inside the
        // leg and zero out the one-sided sizing. Sizing from the leg's
        // price-side boundary tick keeps the full residual deployable.
        let limit_sizing_tick = if token_0_side {
            limit_lower_tick
        } else {
            limit_upper_tick
        };

        let (offer_0, offer_1) = if token_0_side {
            (rem_0.max(Decimal::ZERO), Decimal::ZERO)
        } else {
            (Decimal::ZERO, rem_1.max(Decimal::ZERO))
        };
        let limit_liquidity = liquidity_for_amounts(
            limit_sizing_tick,
            limit_lower_tick,
            limit_upper_tick,
            offer_0,
            offer_1,
            d0,
            d1,
        )
        .map_err(|e| BacktestError::invalid_range(time, e))?;
        let (limit_0, limit_1) = amounts_for_liquidity(
            limit_sizing_tick,
            limit_lower_tick,
            limit_upper_tick,
            limit_liquidity,
            d0,
            d1,
        )
        .map_err(|e| BacktestError::invalid_range(time, e))?;

        debug!(
            %time,
            lower = limit_lower_tick, upper = limit_upper_tick,
            %limit_0, %limit_1, %limit_liquidity,
            side = if token_0_side { "token_0" } else { "token_1" },
            "limit leg placed"
        );

        let leftover_0 = self.residual(time, available_0, rem_0 - limit_0)?;
        let leftover_1 = self.residual(time, available_1, rem_1 - limit_1)?;

        let leg = |lower_tick, upper_tick, liquidity, t0, t1, lower_price, upper_price| {
            LiquidityRange {
                lower_tick,
                upper_tick,
                liquidity,
                token_0: t0,
                token_1: t1,
                lower_price,
                upper_price,
                placed_at: time,
                placement_price: price,
                volatility: bounds.volatility,
                return_forecast: bounds.return_forecast,
            }
        };

        Ok(Placement {
            ranges: RangePair {
                base: leg(
                    base_lower_tick,
                    base_upper_tick,
                    base_liquidity,
                    base_0,
                    base_1,
                    bounds.base_lower,
                    bounds.base_upper,
                ),
                limit: leg(
                    limit_lower_tick,
                    limit_upper_tick,
                    limit_liquidity,
                    limit_0,
                    limit_1,
                    limit_lower_price,
                    limit_upper_price,
                ),
            },
            leftover_0,
            leftover_1,
        })
    }

    /// Floors rounding-level negative residuals at zero; anything larger is
    /// over-allocation and fatal.
    fn residual(
        &self,
        time: DateTime<Utc>,
        available: Decimal,
        residual: Decimal,
    ) -> Result<Decimal, BacktestError> {
        let tolerance = Decimal::new(1, 6) * available.max(Decimal::ONE);
        if residual < -tolerance {
            return Err(BacktestError::invalid_state(
                time,
                format!("allocated {} more than available {available}", -residual),
            ));
        }
        Ok(residual.max(Decimal::ZERO))
    }
}
