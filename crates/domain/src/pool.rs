use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// Static parameters of the pool being backtested.
///
/// Prices throughout the system are quoted as token_1 per token_0 in
/// decimal-adjusted (human) units; `decimals_0`/`decimals_1` feed the tick
/// and liquidity math that works in raw units internally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Fee tier as a decimal fraction (e.g. 0.003 for a 30 bps pool).
    pub fee_tier: Decimal,
    /// Decimals of token 0.
    pub decimals_0: u32,
    /// Decimals of token 1.
    pub decimals_1: u32,
}

impl PoolConfig {
    pub fn new(fee_tier: Decimal, decimals_0: u32, decimals_1: u32) -> Self {
        Self {
            fee_tier,
            decimals_0,
            decimals_1,
        }
    }

    /// Tick spacing derived from the fee tier: `fee_tier * 2 * 10000`.
    pub fn tick_spacing(&self) -> i32 {
        (self.fee_tier * Decimal::from(20_000))
            .to_i32()
            .unwrap_or(1)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tick_spacing_from_fee_tier() {
        assert_eq!(PoolConfig::new(dec!(0.0003), 6, 18).tick_spacing(), 6);
        assert_eq!(PoolConfig::new(dec!(0.003), 6, 18).tick_spacing(), 60);
        assert_eq!(PoolConfig::new(dec!(0.01), 6, 18).tick_spacing(), 200);
    }
}
