//! Flattened per-step records and summary statistics over a finished run.

use crate::policies::ResetReason;
use crate::state::PositionState;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// One backtest step, flattened for reporting and CSV export.
///
/// Values are in token 0 terms; the `*_usd` fields are populated when a USD
/// price series for token 0 was supplied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub time: DateTime<Utc>,
    /// Pool price, token 1 per token 0.
    pub price: Decimal,
    /// Inverse quote, token 0 per token 1.
    pub price_inverse: Decimal,
    pub reset: Option<ResetReason>,
    pub base_lower: Decimal,
    pub base_upper: Decimal,
    pub limit_lower: Decimal,
    pub limit_upper: Decimal,
    pub reset_lower: Decimal,
    pub reset_upper: Decimal,
    pub period_fees_0: Decimal,
    pub period_fees_1: Decimal,
    pub cum_fees_0: Decimal,
    pub cum_fees_1: Decimal,
    pub leftover_0: Decimal,
    pub leftover_1: Decimal,
    pub allocated_0: Decimal,
    pub allocated_1: Decimal,
    pub total_0: Decimal,
    pub total_1: Decimal,
    pub value_base: Decimal,
    pub value_limit: Decimal,
    pub value_leftover: Decimal,
    pub value_position: Decimal,
    /// Same-balance buy-and-hold benchmark, valued at this step's price.
    pub value_hold: Decimal,
    /// Base range width relative to the current price.
    pub base_width_rel: Decimal,
    pub usd_price_0: Option<Decimal>,
    pub value_base_usd: Option<Decimal>,
    pub value_limit_usd: Option<Decimal>,
    pub value_position_usd: Option<Decimal>,
    pub value_hold_usd: Option<Decimal>,
}

/// Flattens run states into records, joining an optional USD price series
/// for token 0 (backward as-of: the latest quote at or before each step).
///
/// The hold benchmark freezes the first step's total balances and marks them
/// at each later price.
pub fn build_series(
    states: &[PositionState],
    usd: Option<&[(DateTime<Utc>, Decimal)]>,
) -> Vec<StepRecord> {
    let Some(first) = states.first() else {
        return Vec::new();
    };
    let hold_0 = first.total_token_0();
    let hold_1 = first.total_token_1();

    let mut cum_fees_0 = Decimal::ZERO;
    let mut cum_fees_1 = Decimal::ZERO;

    states
        .iter()
        .map(|s| {
            cum_fees_0 += s.period_fees_0;
            cum_fees_1 += s.period_fees_1;

            let (allocated_0, allocated_1) = s.ranges.total_amounts();
            let value_base = s.ranges.base.value_in_token_0(s.price);
            let value_limit = s.ranges.limit.value_in_token_0(s.price);
            let value_leftover = in_token_0(s.leftover_0, s.leftover_1, s.price);
            let value_position = s.value_in_token_0();
            let value_hold = in_token_0(hold_0, hold_1, s.price);

            let usd_price_0 = usd.and_then(|series| as_of(series, s.time));

            StepRecord {
                time: s.time,
                price: s.price,
                price_inverse: if s.price.is_zero() {
                    Decimal::ZERO
                } else {
                    Decimal::ONE / s.price
                },
                reset: s.reset,
                base_lower: s.bands.base_lower,
                base_upper: s.bands.base_upper,
                limit_lower: s.bands.limit_lower,
                limit_upper: s.bands.limit_upper,
                reset_lower: s.bands.reset_lower,
                reset_upper: s.bands.reset_upper,
                period_fees_0: s.period_fees_0,
                period_fees_1: s.period_fees_1,
                cum_fees_0,
                cum_fees_1,
                leftover_0: s.leftover_0,
                leftover_1: s.leftover_1,
                allocated_0,
                allocated_1,
                total_0: s.total_token_0(),
                total_1: s.total_token_1(),
                value_base,
                value_limit,
                value_leftover,
                value_position,
                value_hold,
                base_width_rel: if s.price.is_zero() {
                    Decimal::ZERO
                } else {
                    (s.bands.base_upper - s.bands.base_lower) / s.price
                },
                usd_price_0,
                value_base_usd: usd_price_0.map(|p| value_base * p),
                value_limit_usd: usd_price_0.map(|p| value_limit * p),
                value_position_usd: usd_price_0.map(|p| value_position * p),
                value_hold_usd: usd_price_0.map(|p| value_hold * p),
            }
        })
        .collect()
}

fn in_token_0(amount_0: Decimal, amount_1: Decimal, price: Decimal) -> Decimal {
    if price.is_zero() {
        amount_0
    } else {
        amount_0 + amount_1 / price
    }
}

/// Base-leg share of deployed capital: both legs plus leftover. Uncollected
/// fees are not deployed and do not enter the denominator.
fn base_allocation(r: &StepRecord) -> f64 {
    let deployed = (r.value_base + r.value_limit + r.value_leftover)
        .to_f64()
        .unwrap_or(f64::NAN);
    if deployed > 0.0 {
        r.value_base.to_f64().unwrap_or(0.0) / deployed
    } else {
        0.0
    }
}

/// Latest quote at or before `time`; `series` must be time-sorted.
fn as_of(series: &[(DateTime<Utc>, Decimal)], time: DateTime<Utc>) -> Option<Decimal> {
    let idx = series.partition_point(|(t, _)| *t <= time);
    idx.checked_sub(1).map(|i| series[i].1)
}

/// Summary statistics over one run.
///
/// Returns and APRs are fractions, not percentages. USD-valued series are
/// used when present on every record, token 0 terms otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySummary {
    pub days: f64,
    pub gross_fee_return: f64,
    pub gross_fee_apr: f64,
    pub net_return: f64,
    pub net_apr: f64,
    pub rebalances: usize,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub impermanent_loss: f64,
    pub mean_base_allocation: f64,
    pub median_base_allocation: f64,
    pub mean_base_width: f64,
    pub final_value: f64,
}

impl StrategySummary {
    /// Flat metric map, keyed by stable snake_case names.
    pub fn as_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("days", self.days),
            ("gross_fee_return", self.gross_fee_return),
            ("gross_fee_apr", self.gross_fee_apr),
            ("net_return", self.net_return),
            ("net_apr", self.net_apr),
            ("rebalances", self.rebalances as f64),
            ("max_drawdown", self.max_drawdown),
            ("volatility", self.volatility),
            ("sharpe_ratio", self.sharpe_ratio),
            ("impermanent_loss", self.impermanent_loss),
            ("mean_base_allocation", self.mean_base_allocation),
            ("median_base_allocation", self.median_base_allocation),
            ("mean_base_width", self.mean_base_width),
            ("final_value", self.final_value),
        ])
    }
}

/// Computes the summary over a record series.
///
/// Needs at least two records; annualization uses the median observation
/// interval so an occasional gap does not skew the per-year scaling.
pub fn analyze(records: &[StepRecord]) -> Result<StrategySummary, &'static str> {
    if records.len() < 2 {
        return Err("Need at least two records to analyze");
    }

    let use_usd = records.iter().all(|r| r.value_position_usd.is_some());
    let value = |r: &StepRecord| -> f64 {
        let v = if use_usd {
            r.value_position_usd.unwrap_or(r.value_position)
        } else {
            r.value_position
        };
        v.to_f64().unwrap_or(f64::NAN)
    };
    let hold = |r: &StepRecord| -> f64 {
        let v = if use_usd {
            r.value_hold_usd.unwrap_or(r.value_hold)
        } else {
            r.value_hold
        };
        v.to_f64().unwrap_or(f64::NAN)
    };

    let first = &records[0];
    let last = &records[records.len() - 1];
    let initial = value(first);
    let final_value = value(last);
    if !(initial > 0.0) {
        return Err("Initial position value must be positive");
    }

    let seconds = (last.time - first.time).num_seconds();
    if seconds <= 0 {
        return Err("Record series spans no time");
    }
    let days = seconds as f64 / 86_400.0;
    let annualize = 365.0 / days;

    // Cumulative fees valued in position terms at each step's price.
    let fee_value: f64 = records
        .iter()
        .map(|r| {
            let fee = in_token_0(r.period_fees_0, r.period_fees_1, r.price);
            let fee = fee.to_f64().unwrap_or(0.0);
            if use_usd {
                fee * r.usd_price_0.and_then(|p| p.to_f64()).unwrap_or(1.0)
            } else {
                fee
            }
        })
        .sum();
    let gross_fee_return = fee_value / initial;
    let net_return = final_value / initial - 1.0;

    // Per-step value returns.
    let returns: Vec<f64> = records
        .windows(2)
        .map(|w| value(&w[1]) / value(&w[0]) - 1.0)
        .collect();
    let mean_r = returns.iter().sum::<f64>() / returns.len() as f64;
    let var_r = returns.iter().map(|r| (r - mean_r) * (r - mean_r)).sum::<f64>()
        / returns.len() as f64;
    let sd_r = var_r.sqrt();

    let mut dts: Vec<i64> = records
        .windows(2)
        .map(|w| (w[1].time - w[0].time).num_seconds())
        .collect();
    dts.sort_unstable();
    let median_dt = dts[dts.len() / 2].max(1) as f64;
    let periods_per_year = 365.0 * 86_400.0 / median_dt;

    let volatility = sd_r * periods_per_year.sqrt();
    let sharpe_ratio = if sd_r > 0.0 {
        mean_r / sd_r * periods_per_year.sqrt()
    } else {
        0.0
    };

    let mut peak = f64::MIN;
    let mut max_drawdown = 0.0f64;
    for r in records {
        let v = value(r);
        peak = peak.max(v);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - v) / peak);
        }
    }

    let hold_end = hold(last);
    let impermanent_loss = if hold_end > 0.0 {
        final_value / hold_end - 1.0
    } else {
        0.0
    };

    let mut allocations: Vec<f64> = records.iter().map(base_allocation).collect();
    let mean_base_allocation = allocations.iter().sum::<f64>() / allocations.len() as f64;
    allocations.sort_unstable_by(f64::total_cmp);
    let median_base_allocation = allocations[allocations.len() / 2];

    let mean_base_width = records
        .iter()
        .map(|r| r.base_width_rel.to_f64().unwrap_or(0.0))
        .sum::<f64>()
        / records.len() as f64;

    Ok(StrategySummary {
        days,
        gross_fee_return,
        gross_fee_apr: gross_fee_return * annualize,
        net_return,
        net_apr: net_return * annualize,
        rebalances: records.iter().filter(|r| r.reset.is_some()).count(),
        max_drawdown,
        volatility,
        sharpe_ratio,
        impermanent_loss,
        mean_base_allocation,
        median_base_allocation,
        mean_base_width,
        final_value,
    })
}
