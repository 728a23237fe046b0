use rust_decimal::Decimal;
use rust_decimal::prelude::*;

/// Log base of the tick grid: price = 1.0001^tick (decimal-adjusted).
const TICK_BASE: f64 = 1.0001;

fn decimal_adjustment(decimals_0: u32, decimals_1: u32) -> f64 {
    10f64.powi(decimals_1 as i32 - decimals_0 as i32)
}

/// Fractional ticks closer than this to an integer are treated as exact.
const TICK_SNAP_TOLERANCE: f64 = 1e-6;

/// Exact (fractional) tick for a decimal-adjusted price.
///
/// f64 log noise can land a price sitting exactly on a tick boundary a hair
/// below it, which would drop a whole tick under `floor`; such values are
/// snapped back onto the integer grid.
fn tick_exact(price: Decimal, decimals_0: u32, decimals_1: u32) -> Result<f64, &'static str> {
    if price <= Decimal::ZERO {
        return Err("Price must be positive");
    }
    let price_f64 = price.to_f64().ok_or("Overflow converting price")?;
    let raw = decimal_adjustment(decimals_0, decimals_1) * price_f64;
    let tick = raw.log(TICK_BASE);
    let nearest = tick.round();
    if (tick - nearest).abs() < TICK_SNAP_TOLERANCE {
        Ok(nearest)
    } else {
        Ok(tick)
    }
}

/// Returns the tick corresponding to a given price, floored to an integer.
pub fn price_to_tick(price: Decimal, decimals_0: u32, decimals_1: u32) -> Result<i32, &'static str> {
    Ok(tick_exact(price, decimals_0, decimals_1)?.floor() as i32)
}

/// Returns the decimal-adjusted price at a given tick.
/// P = 1.0001 ^ tick / 10^(decimals_1 - decimals_0)
pub fn tick_to_price(tick: i32, decimals_0: u32, decimals_1: u32) -> Result<Decimal, &'static str> {
    let price_f64 = TICK_BASE.powi(tick) / decimal_adjustment(decimals_0, decimals_1);
    Decimal::from_f64(price_f64).ok_or("Overflow converting price")
}

/// Aligns a tick down to a multiple of the spacing (Euclidean floor, so
/// negative ticks align toward negative infinity).
pub fn align_floor(tick: i32, spacing: i32) -> i32 {
    tick.div_euclid(spacing) * spacing
}

/// Floor-aligned spaced tick for a price; the grid position of the current
/// pool price.
pub fn spaced_tick_floor(
    price: Decimal,
    decimals_0: u32,
    decimals_1: u32,
    spacing: i32,
) -> Result<i32, &'static str> {
    let exact = tick_exact(price, decimals_0, decimals_1)?;
    Ok(((exact / spacing as f64).floor() as i32) * spacing)
}

/// Nearest spaced tick for a price; used when converting policy-supplied
/// range bounds onto the grid.
pub fn spaced_tick_round(
    price: Decimal,
    decimals_0: u32,
    decimals_1: u32,
    spacing: i32,
) -> Result<i32, &'static str> {
    let exact = tick_exact(price, decimals_0, decimals_1)?;
    Ok(((exact / spacing as f64).round() as i32) * spacing)
}

/// Raw (not decimal-adjusted) sqrt price at a tick: 1.0001^(tick/2).
pub(crate) fn sqrt_price_at_tick(tick: i32) -> f64 {
    TICK_BASE.powf(tick as f64 / 2.0)
}
