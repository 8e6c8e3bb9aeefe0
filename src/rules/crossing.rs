//! Baseline crossing: price moves through the baseline average between yesterday and today

use crate::{
    config::StrategyConfig, EngineError, EvalContext, Period, Result, RuleId, Signal, SignalKind,
    SignalRule, Tier, OHLCV,
};

impl_with_defaults!(BaselineCrossRule);

#[derive(Debug, Clone)]
pub struct BaselineCrossRule {
    pub baseline_window: Period,
}

impl BaselineCrossRule {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            baseline_window: config.baseline_window,
        }
    }
}

impl SignalRule for BaselineCrossRule {
    fn id(&self) -> RuleId {
        RuleId("BASELINE_CROSS")
    }

    fn tier(&self) -> Tier {
        Tier::BaselineCross
    }

    fn min_bars(&self) -> usize {
        self.baseline_window.get() + 1
    }

    fn evaluate<B: OHLCV>(&self, bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>> {
        let (Some(prev_close), Some(prev_baseline)) = (ctx.prev_close, ctx.prev_baseline) else {
            return Err(EngineError::InsufficientHistory {
                need: self.min_bars(),
                got: bars.len(),
            });
        };
        let window = ctx.baseline_window;

        if prev_close <= prev_baseline && ctx.close > ctx.baseline {
            return Ok(Some(Signal::new(
                SignalKind::TurnBullish,
                format!(
                    "turn bullish: close {:.2} crossed above {window}MA {:.2}",
                    ctx.close, ctx.baseline
                ),
                true,
            )));
        }
        if prev_close >= prev_baseline && ctx.close < ctx.baseline {
            return Ok(Some(Signal::new(
                SignalKind::TurnBearish,
                format!(
                    "turn bearish: close {:.2} crossed below {window}MA {:.2}",
                    ctx.close, ctx.baseline
                ),
                true,
            )));
        }
        Ok(None)
    }
}
