//! Fallback message when no other rule fired

use crate::{
    config::StrategyConfig, EvalContext, Result, RuleId, Signal, SignalKind, SignalRule, Tier,
    OHLCV,
};

impl_with_defaults!(DriftRule);

#[derive(Debug, Clone)]
pub struct DriftRule {
    /// Whether the drift message sets notify
    pub notify: bool,
}

impl DriftRule {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            notify: config.notify_on_drift,
        }
    }
}

impl SignalRule for DriftRule {
    fn id(&self) -> RuleId {
        RuleId("DRIFT")
    }

    fn tier(&self) -> Tier {
        Tier::Fallback
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn evaluate<B: OHLCV>(&self, _bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>> {
        let window = ctx.baseline_window;
        let signal = if ctx.close > ctx.baseline {
            Signal::new(
                SignalKind::BullishDrift,
                format!("bullish drift: price above {window}MA"),
                self.notify,
            )
        } else {
            Signal::new(
                SignalKind::BearishConsolidation,
                format!("bearish consolidation: price at or below {window}MA"),
                self.notify,
            )
        };
        Ok(Some(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::{context, series};

    #[test]
    fn test_drift_direction() {
        let closes: Vec<f64> = (0..70).map(|i| 50.0 + i as f64).collect();
        let bars = series(&closes);
        let signal = DriftRule::with_defaults()
            .evaluate(&bars, &context(&bars))
            .unwrap()
            .unwrap();
        assert_eq!(signal.kind, SignalKind::BullishDrift);
        assert!(signal.contributes_to_notify);

        let bars = series(&[50.0; 70]);
        let signal = DriftRule { notify: false }
            .evaluate(&bars, &context(&bars))
            .unwrap()
            .unwrap();
        assert_eq!(signal.kind, SignalKind::BearishConsolidation);
        assert!(!signal.contributes_to_notify);
    }
}
