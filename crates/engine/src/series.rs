//! Validated input series: pool prices and raw swap events.
//!
//! Both series are checked once at construction; the replay loop can then
//! slice swap windows without re-validating order.

use crate::errors::BacktestError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price observation: pool price quoted as token_1 per token_0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time: DateTime<Utc>,
    pub price: Decimal,
}

/// Which token was swapped into the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSide {
    Token0,
    Token1,
}

/// One observed swap from the pool's event log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwapEvent {
    pub time: DateTime<Utc>,
    /// Pool tick at which the swap executed.
    pub tick: i32,
    pub token_in: TokenSide,
    /// Decimal-adjusted amount of the input token.
    pub traded_in: Decimal,
    /// Total active liquidity in the pool at the moment of the swap.
    pub virtual_liquidity: Decimal,
}

/// Price observations in strictly increasing time order.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Result<Self, BacktestError> {
        if points.is_empty() {
            return Err(BacktestError::ordering("price series is empty"));
        }
        for pair in points.windows(2) {
            if pair[1].time <= pair[0].time {
                return Err(BacktestError::ordering(format!(
                    "price series not strictly increasing at {}",
                    pair[1].time
                )));
            }
        }
        if let Some(p) = points.iter().find(|p| p.price <= Decimal::ZERO) {
            return Err(BacktestError::ordering(format!(
                "non-positive price at {}",
                p.time
            )));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn first(&self) -> &PricePoint {
        &self.points[0]
    }

    pub fn last(&self) -> &PricePoint {
        &self.points[self.points.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Simple per-step returns, paired with the timestamp of the later
    /// observation. Used to feed the forecast and ECDF collaborators.
    pub fn returns(&self) -> Vec<(DateTime<Utc>, f64)> {
        use rust_decimal::prelude::ToPrimitive as _;
        self.points
            .windows(2)
            .map(|w| {
                let prev = w[0].price.to_f64().unwrap_or(f64::NAN);
                let curr = w[1].price.to_f64().unwrap_or(f64::NAN);
                (w[1].time, curr / prev - 1.0)
            })
            .collect()
    }
}

/// Swap events in non-decreasing time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwapSeries {
    events: Vec<SwapEvent>,
}

impl SwapSeries {
    pub fn new(events: Vec<SwapEvent>) -> Result<Self, BacktestError> {
        for pair in events.windows(2) {
            if pair[1].time < pair[0].time {
                return Err(BacktestError::ordering(format!(
                    "swap series not ordered at {}",
                    pair[1].time
                )));
            }
        }
        Ok(Self { events })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SwapEvent] {
        &self.events
    }

    /// Swaps with timestamp in the half-open window `(after, upto]`.
    pub fn window(&self, after: DateTime<Utc>, upto: DateTime<Utc>) -> &[SwapEvent] {
        let start = self.events.partition_point(|s| s.time <= after);
        let end = self.events.partition_point(|s| s.time <= upto);
        &self.events[start..end]
    }

    /// Rejects swaps timestamped outside the price series' time range.
    pub fn check_within(&self, prices: &PriceSeries) -> Result<(), BacktestError> {
        let (lo, hi) = (prices.first().time, prices.last().time);
        if let Some(s) = self.events.iter().find(|s| s.time < lo || s.time > hi) {
            return Err(BacktestError::ordering(format!(
                "swap at {} outside price series range [{lo}, {hi}]",
                s.time
            )));
        }
        Ok(())
    }
}
