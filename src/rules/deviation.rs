//! Deviation ("bias") of price from the baseline average

use super::helpers::at_least;
use crate::{
    config::StrategyConfig, EngineError, EvalContext, Result, RuleId, Signal, SignalKind,
    SignalRule, Tier, OHLCV,
};

impl_with_defaults!(DeviationRule);

/// `(price - baseline) / baseline * 100`
///
/// Undefined when the baseline is zero, negative or not finite.
pub fn deviation_pct(price: f64, baseline: f64) -> Result<f64> {
    if !baseline.is_finite() || baseline <= 0.0 {
        return Err(EngineError::UndefinedBaseline { value: baseline });
    }
    Ok((price - baseline) / baseline * 100.0)
}

/// Deviation band, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviationBand {
    Severe,
    Elevated,
}

impl DeviationBand {
    /// Bucket a deviation. Band edges are inclusive within [`EPSILON`](super::helpers::EPSILON).
    pub fn classify(pct: f64, elevated: f64, severe: f64) -> Option<Self> {
        if at_least(pct, severe) {
            Some(DeviationBand::Severe)
        } else if at_least(pct, elevated) {
            Some(DeviationBand::Elevated)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviationRule {
    pub elevated: f64,
    pub severe: f64,
}

impl DeviationRule {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            elevated: config.deviation_elevated,
            severe: config.deviation_severe,
        }
    }
}

impl SignalRule for DeviationRule {
    fn id(&self) -> RuleId {
        RuleId("DEVIATION")
    }

    fn tier(&self) -> Tier {
        Tier::Deviation
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn evaluate<B: OHLCV>(&self, _bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>> {
        let pct = match ctx.deviation_pct {
            Some(pct) => pct,
            None => deviation_pct(ctx.close, ctx.baseline)?,
        };
        let window = ctx.baseline_window;

        let signal = match DeviationBand::classify(pct, self.elevated, self.severe) {
            Some(DeviationBand::Severe) => Signal::new(
                SignalKind::SevereDeviation,
                format!("severe deviation: {pct:+.1}% above {window}MA"),
                true,
            ),
            Some(DeviationBand::Elevated) => Signal::new(
                SignalKind::ElevatedDeviation,
                format!("elevated deviation: {pct:+.1}% above {window}MA"),
                true,
            ),
            None => return Ok(None),
        };
        Ok(Some(signal))
    }

    fn validate_config(&self) -> Result<()> {
        if self.elevated >= self.severe {
            return Err(EngineError::InvalidConfig(format!(
                "elevated deviation band ({}) must be below the severe band ({})",
                self.elevated, self.severe
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deviation_pct() {
        assert!((deviation_pct(106.0, 100.0).unwrap() - 6.0).abs() < 1e-9);
        assert!((deviation_pct(90.0, 100.0).unwrap() + 10.0).abs() < 1e-9);
        assert_eq!(
            deviation_pct(10.0, 0.0),
            Err(EngineError::UndefinedBaseline { value: 0.0 })
        );
        assert!(deviation_pct(10.0, f64::NAN).is_err());
    }

    #[test]
    fn test_band_edges() {
        let baseline = 80.0;
        let pct = |factor: f64| deviation_pct(baseline * factor, baseline).unwrap();

        assert_eq!(
            DeviationBand::classify(pct(1.15), 15.0, 30.0),
            Some(DeviationBand::Elevated)
        );
        assert_eq!(
            DeviationBand::classify(pct(1.30), 15.0, 30.0),
            Some(DeviationBand::Severe)
        );
        assert_eq!(DeviationBand::classify(pct(1.149999), 15.0, 30.0), None);
        assert_eq!(DeviationBand::classify(-40.0, 15.0, 30.0), None);
    }

    #[test]
    fn test_inverted_bands_rejected() {
        let rule = DeviationRule {
            elevated: 30.0,
            severe: 30.0,
        };
        assert!(rule.validate_config().is_err());
        assert!(DeviationRule::with_defaults().validate_config().is_ok());
    }
}
