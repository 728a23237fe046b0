//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use clmm_backtest_engine::prelude::*;
//! ```

// Driver
pub use crate::driver::{SimulationOutput, run};

// Errors
pub use crate::errors::BacktestError;

// Events
pub use crate::event::RebalanceEvent;

// Fees
pub use crate::fees::FeesAccrued;

// Forecasting
pub use crate::forecast::{Ar1EwmaForecaster, Forecast, ReturnForecaster};

// Metrics
pub use crate::metrics::{StepRecord, StrategySummary, analyze, build_series};

// Placement
pub use crate::placement::{Placement, RangePlacer};

// Policies
pub use crate::policies::{
    ForecastPolicy, QuantilePolicy, RangeExitPolicy, RebalancePolicy, ResetReason, TargetBounds,
};

// Quantiles
pub use crate::ecdf::EmpiricalCdf;

// Ranges
pub use crate::range::{LiquidityRange, RangePair};

// Series
pub use crate::series::{PricePoint, PriceSeries, SwapEvent, SwapSeries, TokenSide};

// State
pub use crate::state::{PolicyBands, PositionState};
