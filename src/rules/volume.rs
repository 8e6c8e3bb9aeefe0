//! Volume-driven rules: breakout, breakdown and volume/price divergence

use super::helpers::{at_least, at_most, change_ratio, previous_day, volume_ratio};
use crate::{
    config::StrategyConfig, EvalContext, Period, Ratio, Result, RuleId, Signal, SignalKind,
    SignalRule, Tier, OHLCV,
};

impl_with_defaults!(VolumeBreakoutRule, VolumeBreakdownRule, DivergenceRule);

// ============================================================
// BREAKOUT
// ============================================================

/// Gain on expanding volume, closing above the short average
#[derive(Debug, Clone)]
pub struct VolumeBreakoutRule {
    pub min_change: Ratio,
    pub min_volume_ratio: f64,
    pub confirm_window: Period,
}

impl VolumeBreakoutRule {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            min_change: config.breakout_change,
            min_volume_ratio: config.breakout_volume_ratio,
            confirm_window: config.confirm_window,
        }
    }
}

impl SignalRule for VolumeBreakoutRule {
    fn id(&self) -> RuleId {
        RuleId("VOLUME_BREAKOUT")
    }

    fn tier(&self) -> Tier {
        Tier::VolumeThrust
    }

    fn min_bars(&self) -> usize {
        self.confirm_window.get().max(2)
    }

    fn evaluate<B: OHLCV>(&self, _bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>> {
        let (prev_close, prev_volume) = previous_day(ctx)?;
        let change = change_ratio(prev_close, ctx.close)?;
        let volume = volume_ratio(prev_volume, ctx.volume)?;
        let short = ctx.indicators.today(self.confirm_window)?;

        if !at_least(change, self.min_change.get())
            || !at_least(volume, self.min_volume_ratio)
            || ctx.close <= short
        {
            return Ok(None);
        }

        Ok(Some(Signal::new(
            SignalKind::VolumeBreakout,
            format!(
                "volume-confirmed breakout: {:+.1}% on {:.1}x volume",
                change * 100.0,
                volume
            ),
            true,
        )))
    }
}

// ============================================================
// BREAKDOWN
// ============================================================

/// Loss on expanding volume, closing below the short average
#[derive(Debug, Clone)]
pub struct VolumeBreakdownRule {
    pub min_drop: Ratio,
    pub min_volume_ratio: f64,
    pub confirm_window: Period,
}

impl VolumeBreakdownRule {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            min_drop: config.breakdown_change,
            min_volume_ratio: config.breakout_volume_ratio,
            confirm_window: config.confirm_window,
        }
    }
}

impl SignalRule for VolumeBreakdownRule {
    fn id(&self) -> RuleId {
        RuleId("VOLUME_BREAKDOWN")
    }

    fn tier(&self) -> Tier {
        Tier::VolumeThrust
    }

    fn min_bars(&self) -> usize {
        self.confirm_window.get().max(2)
    }

    fn evaluate<B: OHLCV>(&self, _bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>> {
        let (prev_close, prev_volume) = previous_day(ctx)?;
        let change = change_ratio(prev_close, ctx.close)?;
        let volume = volume_ratio(prev_volume, ctx.volume)?;
        let short = ctx.indicators.today(self.confirm_window)?;

        if !at_most(change, -self.min_drop.get())
            || !at_least(volume, self.min_volume_ratio)
            || ctx.close >= short
        {
            return Ok(None);
        }

        Ok(Some(Signal::new(
            SignalKind::VolumeBreakdown,
            format!(
                "volume-confirmed breakdown: {:+.1}% on {:.1}x volume",
                change * 100.0,
                volume
            ),
            true,
        )))
    }
}

// ============================================================
// DIVERGENCE
// ============================================================

/// Volume expands while price closes below the short average and the prior close
#[derive(Debug, Clone)]
pub struct DivergenceRule {
    pub min_volume_ratio: f64,
    pub confirm_window: Period,
}

impl DivergenceRule {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            min_volume_ratio: config.divergence_volume_ratio,
            confirm_window: config.confirm_window,
        }
    }
}

impl SignalRule for DivergenceRule {
    fn id(&self) -> RuleId {
        RuleId("DIVERGENCE")
    }

    fn tier(&self) -> Tier {
        Tier::Divergence
    }

    fn min_bars(&self) -> usize {
        self.confirm_window.get().max(2)
    }

    fn evaluate<B: OHLCV>(&self, _bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>> {
        let (prev_close, prev_volume) = previous_day(ctx)?;
        let volume = volume_ratio(prev_volume, ctx.volume)?;
        let short = ctx.indicators.today(self.confirm_window)?;

        if !at_least(volume, self.min_volume_ratio) || ctx.close >= short || ctx.close >= prev_close
        {
            return Ok(None);
        }

        Ok(Some(Signal::new(
            SignalKind::Divergence,
            format!(
                "divergence warning: {:.1}x volume but close below {}MA and prior close",
                volume, self.confirm_window
            ),
            true,
        )))
    }
}

// ============================================================
// TESTS
// ============================================================
