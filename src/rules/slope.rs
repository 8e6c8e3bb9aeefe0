//! Trend slope composites: short averages turn while price is still on the far side of the baseline

use crate::{
    config::StrategyConfig, EvalContext, Result, RuleId, Signal, SignalKind, SignalRule, Tier,
    OHLCV,
};

impl_with_defaults!(SlopeReversalRule);

/// Bottom turning: enough averages rising below the baseline.
/// Top consolidating: enough averages falling above it.
#[derive(Debug, Clone)]
pub struct SlopeReversalRule {
    pub min_count: usize,
    /// Number of slope windows, for the message
    pub windows: usize,
    min_bars: usize,
}

impl SlopeReversalRule {
    pub fn from_config(config: &StrategyConfig) -> Self {
        let longest = config
            .slope_windows
            .iter()
            .map(|w| w.get())
            .max()
            .unwrap_or(1);
        Self {
            min_count: config.slope_min_count,
            windows: config.slope_windows.len(),
            min_bars: (longest + 1).max(config.baseline_window.get()),
        }
    }
}

impl SignalRule for SlopeReversalRule {
    fn id(&self) -> RuleId {
        RuleId("SLOPE_REVERSAL")
    }

    fn tier(&self) -> Tier {
        Tier::TrendSlope
    }

    fn min_bars(&self) -> usize {
        self.min_bars
    }

    fn evaluate<B: OHLCV>(&self, _bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>> {
        let tally = &ctx.slope;
        let window = ctx.baseline_window;

        if tally.up_count >= self.min_count && ctx.close < ctx.baseline {
            return Ok(Some(Signal::new(
                SignalKind::BottomTurning,
                format!(
                    "bottom turning: {}/{} short averages rising below {window}MA",
                    tally.up_count, self.windows
                ),
                true,
            )));
        }
        if tally.down_count >= self.min_count && ctx.close > ctx.baseline {
            return Ok(Some(Signal::new(
                SignalKind::TopConsolidating,
                format!(
                    "top consolidating: {}/{} short averages falling above {window}MA",
                    tally.down_count, self.windows
                ),
                true,
            )));
        }
        Ok(None)
    }
}
