//! Price/tick conversions and concentrated-liquidity sizing math.

pub mod liquidity;
pub mod tick;
