//! Sequential backtest driver.

use crate::errors::BacktestError;
use crate::event::RebalanceEvent;
use crate::policies::RebalancePolicy;
use crate::series::{PriceSeries, SwapSeries};
use crate::state::PositionState;
use clmm_backtest_domain::PoolConfig;
use rust_decimal::Decimal;
use tracing::info;

/// Everything a run produces: one state per price observation plus the
/// rebalance log.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutput {
    pub states: Vec<PositionState>,
    pub rebalances: Vec<RebalanceEvent>,
}

/// Replays the price series against the policy.
///
/// The first observation opens the position; each later one advances it with
/// the swaps in the half-open window since the previous observation. The
/// loop is strictly sequential: each state depends on its predecessor.
pub fn run(
    prices: &PriceSeries,
    swaps: &SwapSeries,
    pool: &PoolConfig,
    initial_0: Decimal,
    initial_1: Decimal,
    policy: &mut dyn RebalancePolicy,
) -> Result<SimulationOutput, BacktestError> {
    swaps.check_within(prices)?;

    let first = prices.first();
    let mut state =
        PositionState::open(first.time, first.price, pool, initial_0, initial_1, policy)?;
    info!(
        policy = policy.name(),
        start = %first.time,
        steps = prices.len(),
        "backtest started"
    );

    let mut states = Vec::with_capacity(prices.len());
    let mut rebalances = Vec::new();

    for (step, point) in prices.points().iter().enumerate().skip(1) {
        let window = swaps.window(state.time, point.time);
        let next = state.advance(point.time, point.price, window, pool, policy)?;
        if let Some(reason) = next.reset {
            info!(step, time = %next.time, price = %next.price, %reason, "rebalanced");
            rebalances.push(RebalanceEvent::capture(step, &next, reason));
        }
        states.push(state);
        state = next;
    }
    states.push(state);

    info!(rebalances = rebalances.len(), "backtest finished");
    Ok(SimulationOutput { states, rebalances })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::{RangeExitPolicy, ResetReason};
    use crate::series::PricePoint;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn prices(series: &[(i64, Decimal)]) -> PriceSeries {
        PriceSeries::new(
            series
                .iter()
                .map(|&(s, price)| PricePoint { time: t(s), price })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_one_state_per_observation() {
        let prices = prices(&[(0, dec!(1)), (60, dec!(1.01)), (120, dec!(0.99))]);
        let pool = PoolConfig::new(dec!(0.0003), 6, 18);
        let mut policy = RangeExitPolicy::new(dec!(0.1), dec!(0.2), dec!(0.5));

        let out = run(
            &prices,
            &SwapSeries::empty(),
            &pool,
            dec!(1000),
            dec!(0),
            &mut policy,
        )
        .unwrap();

        assert_eq!(out.states.len(), 3);
        assert!(out.rebalances.is_empty());
        for (state, point) in out.states.iter().zip(prices.points()) {
            assert_eq!(state.time, point.time);
            assert_eq!(state.price, point.price);
        }
    }

    #[test]
    fn test_rebalance_log_matches_states() {
        let prices = prices(&[(0, dec!(1)), (60, dec!(1.3)), (120, dec!(1.31))]);
        let pool = PoolConfig::new(dec!(0.0003), 6, 18);
        let mut policy = RangeExitPolicy::new(dec!(0.1), dec!(0.2), dec!(0.5));

        let out = run(
            &prices,
            &SwapSeries::empty(),
            &pool,
            dec!(1000),
            dec!(500),
            &mut policy,
        )
        .unwrap();

        assert_eq!(out.rebalances.len(), 1);
        let event = &out.rebalances[0];
        assert_eq!(event.step, 1);
        assert_eq!(event.reason, ResetReason::ExitedRange);
        assert_eq!(out.states[1].reset, Some(ResetReason::ExitedRange));
        assert_eq!(event.bands, out.states[1].bands);
    }

    #[test]
    fn test_swaps_outside_range_rejected_up_front() {
        let prices = prices(&[(0, dec!(1)), (60, dec!(1.01))]);
        let pool = PoolConfig::new(dec!(0.0003), 6, 18);
        let mut policy = RangeExitPolicy::new(dec!(0.1), dec!(0.2), dec!(0.5));

        let swaps = SwapSeries::new(vec![crate::series::SwapEvent {
            time: t(3600),
            tick: 0,
            token_in: crate::series::TokenSide::Token0,
            traded_in: dec!(1),
            virtual_liquidity: dec!(1),
        }])
        .unwrap();

        let err = run(&prices, &swaps, &pool, dec!(1000), dec!(0), &mut policy);
        assert!(matches!(err, Err(BacktestError::InputOrdering { .. })));
    }
}
