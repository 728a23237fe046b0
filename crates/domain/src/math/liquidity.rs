//! Two-sided position sizing for a concentrated-liquidity range.
//!
//! Amounts are decimal-adjusted (human) units; internally the math works on
//! raw units and f64 sqrt prices, the precision loss being far below the
//! 1e-6 relative tolerance the simulation guarantees.

use crate::math::tick::sqrt_price_at_tick;
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

fn scale(decimals: u32) -> f64 {
    10f64.powi(decimals as i32)
}

fn sqrt_bounds(
    tick_current: i32,
    tick_lower: i32,
    tick_upper: i32,
) -> Result<(f64, f64, f64), &'static str> {
    if tick_lower >= tick_upper {
        return Err("Inverted or degenerate tick range");
    }
    let sa = sqrt_price_at_tick(tick_lower);
    let sb = sqrt_price_at_tick(tick_upper);
    // Clamping the current sqrt price into [sa, sb] folds the out-of-range
    // cases into the in-range formulas.
    let sp = sqrt_price_at_tick(tick_current).clamp(sa, sb);
    Ok((sa, sb, sp))
}

/// Token amounts held by `liquidity` over `[tick_lower, tick_upper]` at the
/// current tick.
///
/// delta_x = L * (sqrt(P_b) - sqrt(P)) / (sqrt(P) * sqrt(P_b))
/// delta_y = L * (sqrt(P) - sqrt(P_a))
pub fn amounts_for_liquidity(
    tick_current: i32,
    tick_lower: i32,
    tick_upper: i32,
    liquidity: Decimal,
    decimals_0: u32,
    decimals_1: u32,
) -> Result<(Decimal, Decimal), &'static str> {
    if liquidity < Decimal::ZERO {
        return Err("Liquidity must be non-negative");
    }
    let (sa, sb, sp) = sqrt_bounds(tick_current, tick_lower, tick_upper)?;
    let l = liquidity.to_f64().ok_or("Overflow converting liquidity")?;

    let raw_0 = l * (sb - sp) / (sp * sb);
    let raw_1 = l * (sp - sa);

    let amount_0 = Decimal::from_f64(raw_0 / scale(decimals_0)).ok_or("Overflow in amount 0")?;
    let amount_1 = Decimal::from_f64(raw_1 / scale(decimals_1)).ok_or("Overflow in amount 1")?;
    Ok((amount_0, amount_1))
}

/// Maximal liquidity placeable over `[tick_lower, tick_upper]` given the
/// available amounts: the binding side of
/// L_0 = raw_0 * sqrt(P) * sqrt(P_b) / (sqrt(P_b) - sqrt(P))
/// L_1 = raw_1 / (sqrt(P) - sqrt(P_a))
pub fn liquidity_for_amounts(
    tick_current: i32,
    tick_lower: i32,
    tick_upper: i32,
    amount_0: Decimal,
    amount_1: Decimal,
    decimals_0: u32,
    decimals_1: u32,
) -> Result<Decimal, &'static str> {
    if amount_0 < Decimal::ZERO || amount_1 < Decimal::ZERO {
        return Err("Amounts must be non-negative");
    }
    let (sa, sb, sp) = sqrt_bounds(tick_current, tick_lower, tick_upper)?;
    let raw_0 = amount_0.to_f64().ok_or("Overflow converting amount 0")? * scale(decimals_0);
    let raw_1 = amount_1.to_f64().ok_or("Overflow converting amount 1")? * scale(decimals_1);

    let l0 = (sb > sp).then(|| raw_0 * sp * sb / (sb - sp));
    let l1 = (sp > sa).then(|| raw_1 / (sp - sa));

    let liquidity = match (l0, l1) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return Err("Inverted or degenerate tick range"),
    };
    Decimal::from_f64(liquidity).ok_or("Overflow converting liquidity")
}
