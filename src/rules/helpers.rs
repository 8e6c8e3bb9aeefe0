//! Comparison and ratio helpers shared by the rule modules

use crate::{EngineError, EvalContext, Result};

/// Tolerance applied at every threshold edge
pub const EPSILON: f64 = 1e-9;

/// `value >= threshold`, forgiving binary rounding at the edge
#[inline]
pub fn at_least(value: f64, threshold: f64) -> bool {
    value >= threshold - EPSILON
}

/// `value <= threshold`, forgiving binary rounding at the edge
#[inline]
pub fn at_most(value: f64, threshold: f64) -> bool {
    value <= threshold + EPSILON
}

/// Relative change from `prev` to `current`
#[inline]
pub fn change_ratio(prev: f64, current: f64) -> Result<f64> {
    if prev <= 0.0 || !prev.is_finite() {
        return Err(EngineError::Arithmetic("previous close is not positive"));
    }
    Ok((current - prev) / prev)
}

/// Today's volume as a multiple of the prior day's
#[inline]
pub fn volume_ratio(prev: f64, current: f64) -> Result<f64> {
    if prev <= 0.0 || !prev.is_finite() {
        return Err(EngineError::Arithmetic("previous volume is not positive"));
    }
    Ok(current / prev)
}

/// Prior close and volume, or the history error a rule should report
#[inline]
pub fn previous_day(ctx: &EvalContext) -> Result<(f64, f64)> {
    match (ctx.prev_close, ctx.prev_volume) {
        (Some(close), Some(volume)) => Ok((close, volume)),
        _ => Err(EngineError::InsufficientHistory { need: 2, got: 1 }),
    }
}
