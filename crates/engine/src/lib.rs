//! Backtesting engine for concentrated-liquidity LP strategies.
//!
//! The engine replays a historical price series and the pool's swap log
//! against a rebalance policy: the position holds a two-sided base range and
//! a single-sided limit range, accrues a pro-rata share of swap fees, and is
//! liquidated and re-placed whenever the policy's triggers fire.

pub mod driver;
pub mod ecdf;
pub mod errors;
pub mod event;
pub mod fees;
pub mod forecast;
pub mod metrics;
pub mod placement;
pub mod policies;
pub mod prelude;
pub mod range;
pub mod series;
pub mod state;
