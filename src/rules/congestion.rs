//! Congestion: the three shortest averages converge

use super::helpers::EPSILON;
use crate::{
    config::StrategyConfig, EngineError, EvalContext, Period, Ratio, Result, RuleId, Signal,
    SignalKind, SignalRule, Tier, OHLCV,
};

impl_with_defaults!(CongestionRule);

/// Never sets notify on its own
#[derive(Debug, Clone)]
pub struct CongestionRule {
    /// The three shortest distinct averages
    pub windows: Vec<Period>,
    pub max_spread: Ratio,
}

impl CongestionRule {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            windows: config.distinct_windows().into_iter().take(3).collect(),
            max_spread: config.congestion_spread,
        }
    }

    /// `(max - min) / min` of the three averages today
    pub fn spread(&self, ctx: &EvalContext) -> Result<f64> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &w in &self.windows {
            let v = ctx.indicators.today(w)?;
            min = min.min(v);
            max = max.max(v);
        }
        if min <= 0.0 {
            return Err(EngineError::Arithmetic("shortest average is not positive"));
        }
        Ok((max - min) / min)
    }
}

impl SignalRule for CongestionRule {
    fn id(&self) -> RuleId {
        RuleId("CONGESTION")
    }

    fn tier(&self) -> Tier {
        Tier::Congestion
    }

    fn min_bars(&self) -> usize {
        self.windows.iter().map(|w| w.get()).max().unwrap_or(1)
    }

    fn evaluate<B: OHLCV>(&self, _bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>> {
        let spread = self.spread(ctx)?;
        if spread >= self.max_spread.get() - EPSILON {
            return Ok(None);
        }

        let &[a, b, c] = self.windows.as_slice() else {
            return Err(EngineError::InvalidConfig(
                "congestion needs exactly three averages".into(),
            ));
        };
        Ok(Some(Signal::new(
            SignalKind::Congestion,
            format!(
                "congestion: {a}/{b}/{c}MA within {:.1}%, breakout imminent",
                spread * 100.0
            ),
            false,
        )))
    }

    fn validate_config(&self) -> Result<()> {
        if self.windows.len() != 3 {
            return Err(EngineError::InvalidConfig(format!(
                "congestion needs three distinct averages, got {}",
                self.windows.len()
            )));
        }
        Ok(())
    }
}
