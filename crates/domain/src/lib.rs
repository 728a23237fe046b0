//! Domain primitives for concentrated-liquidity backtesting: pool
//! configuration and the tick / liquidity math used to size positions.

pub mod math;
pub mod pool;

pub use pool::PoolConfig;
