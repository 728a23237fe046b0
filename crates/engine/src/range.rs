//! Open liquidity position legs.

use chrono::{DateTime, Utc};
use clmm_backtest_domain::PoolConfig;
use clmm_backtest_domain::math::liquidity::amounts_for_liquidity;
use rust_decimal::Decimal;
use serde::Serialize;

/// One open position leg ("base" or "limit").
///
/// `token_0`/`token_1` are always the amounts implied by the current tick
/// and `liquidity`; they are refreshed whenever the pool price moves and are
/// never mutated independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidityRange {
    /// Lower tick, aligned to the pool's tick spacing.
    pub lower_tick: i32,
    /// Upper tick, aligned to the pool's tick spacing.
    pub upper_tick: i32,
    /// Position liquidity in the AMM's liquidity unit.
    pub liquidity: Decimal,
    /// Current token 0 amount implied by tick and liquidity.
    pub token_0: Decimal,
    /// Current token 1 amount implied by tick and liquidity.
    pub token_1: Decimal,
    /// Price bound the lower tick was derived from.
    pub lower_price: Decimal,
    /// Price bound the upper tick was derived from.
    pub upper_price: Decimal,
    /// When this leg was placed.
    pub placed_at: DateTime<Utc>,
    /// Pool price at placement.
    pub placement_price: Decimal,
    /// Forecast volatility at placement (forecast policy only).
    pub volatility: Option<Decimal>,
    /// Forecast return at placement (forecast policy only).
    pub return_forecast: Option<Decimal>,
}

impl LiquidityRange {
    /// Recomputes the implied token amounts for a new current tick.
    pub fn refresh_amounts(
        &mut self,
        tick_current: i32,
        pool: &PoolConfig,
    ) -> Result<(), &'static str> {
        let (a0, a1) = amounts_for_liquidity(
            tick_current,
            self.lower_tick,
            self.upper_tick,
            self.liquidity,
            pool.decimals_0,
            pool.decimals_1,
        )?;
        self.token_0 = a0;
        self.token_1 = a1;
        Ok(())
    }

    /// Leg value in token 0 terms at the given price (token 1 per token 0).
    pub fn value_in_token_0(&self, price: Decimal) -> Decimal {
        if price.is_zero() {
            return self.token_0;
        }
        self.token_0 + self.token_1 / price
    }
}

/// The two legs of a placement, in fixed order: base first, then limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangePair {
    pub base: LiquidityRange,
    pub limit: LiquidityRange,
}

impl RangePair {
    pub fn iter(&self) -> impl Iterator<Item = &LiquidityRange> {
        [&self.base, &self.limit].into_iter()
    }

    /// Total token amounts across both legs.
    pub fn total_amounts(&self) -> (Decimal, Decimal) {
        (
            self.base.token_0 + self.limit.token_0,
            self.base.token_1 + self.limit.token_1,
        )
    }
}
