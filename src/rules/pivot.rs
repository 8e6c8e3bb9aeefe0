//! Double bottom ("W") and double top ("M") pivot patterns
//!
//! Pivots are searched over the `pattern_window` bars that precede the current
//! bar. The current close is then compared with the neckline:
//!
//! - **A**: outer extreme (lowest low for a bottom, highest high for a top)
//! - **B**: neckline, the opposite extreme strictly after A
//! - **C**: optional right leg, the outer extreme strictly after B
//!
//! When A is the window extreme the right leg can never undercut it, so a
//! failed primary search is retried with the window extreme as C, the most
//! extreme bar before it as A and the neckline between them.
//!
//! The current bar is never a pivot, but a current bar that breaks past A by
//! more than the undercut tolerance invalidates the pattern.

use std::ops::Range;

use super::helpers::{at_least, at_most};
use crate::{
    config::StrategyConfig, EngineError, EvalContext, PatternState, Period, Ratio, Result, RuleId,
    Signal, SignalKind, SignalRule, Tier, OHLCV,
};

impl_with_defaults!(DoubleBottomRule, DoubleTopRule);

// ============================================================
// PIVOTS
// ============================================================

/// A local extreme: price and bar index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub value: f64,
    pub index: usize,
}

/// Outer pivot, neckline and optional right leg
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternCandidate {
    pub a: Pivot,
    pub b: Pivot,
    pub c: Option<Pivot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formation {
    DoubleBottom,
    DoubleTop,
}

impl Formation {
    #[inline]
    fn outer<B: OHLCV>(self, bar: &B) -> f64 {
        match self {
            Formation::DoubleBottom => bar.low(),
            Formation::DoubleTop => bar.high(),
        }
    }

    #[inline]
    fn neck<B: OHLCV>(self, bar: &B) -> f64 {
        match self {
            Formation::DoubleBottom => bar.high(),
            Formation::DoubleTop => bar.low(),
        }
    }

    /// `a` is strictly more extreme than `b` on the outer side
    #[inline]
    fn outer_beats(self, a: f64, b: f64) -> bool {
        match self {
            Formation::DoubleBottom => a < b,
            Formation::DoubleTop => a > b,
        }
    }

    #[inline]
    fn neck_beats(self, a: f64, b: f64) -> bool {
        match self {
            Formation::DoubleBottom => a > b,
            Formation::DoubleTop => a < b,
        }
    }

    /// Relative swing from A to the neckline
    #[inline]
    pub fn amplitude(self, a: f64, b: f64) -> f64 {
        match self {
            Formation::DoubleBottom => (b - a) / a,
            Formation::DoubleTop => (a - b) / a,
        }
    }

    /// How far the right leg broke past A, relative to A
    #[inline]
    pub fn undercut(self, a: f64, c: f64) -> f64 {
        match self {
            Formation::DoubleBottom => (a - c) / a,
            Formation::DoubleTop => (c - a) / a,
        }
    }

    /// Whether the close has crossed the neckline
    #[inline]
    pub fn state(self, close: f64, neckline: f64) -> PatternState {
        let crossed = match self {
            Formation::DoubleBottom => close > neckline,
            Formation::DoubleTop => close < neckline,
        };
        if crossed {
            PatternState::Confirmed
        } else {
            PatternState::Forming
        }
    }
}

/// Earliest bar in `range` whose value beats every other
fn extreme<B: OHLCV>(
    bars: &[B],
    range: Range<usize>,
    value: impl Fn(&B) -> f64,
    beats: impl Fn(f64, f64) -> bool,
) -> Option<Pivot> {
    let mut best: Option<Pivot> = None;
    for index in range {
        let v = value(&bars[index]);
        match best {
            Some(p) if !beats(v, p.value) => {}
            _ => best = Some(Pivot { value: v, index }),
        }
    }
    best
}

// ============================================================
// SEARCH
// ============================================================

/// Pivot search settings shared by both formations
#[derive(Debug, Clone)]
pub struct PivotSearch {
    pub window: Period,
    pub min_gap: Period,
    pub amplitude_threshold: Ratio,
    pub undercut_tolerance: Ratio,
    pub require_right_leg: bool,
}

impl PivotSearch {
    /// Look for a qualifying pattern in the bars before the last one.
    ///
    /// `Ok(None)` is the normal "no pattern" outcome.
    pub fn find<B: OHLCV>(
        &self,
        formation: Formation,
        bars: &[B],
    ) -> Result<Option<PatternCandidate>> {
        let end = match bars.len().checked_sub(1) {
            Some(end) if end > 0 => end,
            _ => return Ok(None),
        };
        let start = end - self.window.get().min(end);
        let today = formation.outer(&bars[end]);

        let outer = |b: &B| formation.outer(b);
        let neck = |b: &B| formation.neck(b);
        let outer_beats = |x: f64, y: f64| formation.outer_beats(x, y);
        let neck_beats = |x: f64, y: f64| formation.neck_beats(x, y);

        // Primary: A is the window extreme
        if let Some(a) = extreme(bars, start..end, outer, outer_beats) {
            if let Some(b) = extreme(bars, a.index + 1..end, neck, neck_beats) {
                let c = extreme(bars, b.index + 1..end, outer, outer_beats);
                let candidate = PatternCandidate { a, b, c };
                if self.qualifies(formation, &candidate, today)? {
                    return Ok(Some(candidate));
                }
            }
        }

        // Retry: the window extreme is the right leg
        let Some(c) = extreme(bars, start..end, outer, outer_beats) else {
            return Ok(None);
        };
        let Some(a) = extreme(bars, start..c.index, outer, outer_beats) else {
            return Ok(None);
        };
        let Some(b) = extreme(bars, a.index + 1..c.index, neck, neck_beats) else {
            return Ok(None);
        };
        let candidate = PatternCandidate { a, b, c: Some(c) };
        if self.qualifies(formation, &candidate, today)? {
            Ok(Some(candidate))
        } else {
            Ok(None)
        }
    }

    fn qualifies(&self, formation: Formation, p: &PatternCandidate, today: f64) -> Result<bool> {
        if p.a.value <= 0.0 {
            return Err(EngineError::Arithmetic("pivot price is not positive"));
        }
        if p.b.index - p.a.index < self.min_gap.get() {
            return Ok(false);
        }

        let amplitude = formation.amplitude(p.a.value, p.b.value);
        if amplitude <= 0.0 || !at_least(amplitude, self.amplitude_threshold.get()) {
            return Ok(false);
        }

        let tolerance = self.undercut_tolerance.get();
        if !at_most(formation.undercut(p.a.value, today), tolerance) {
            return Ok(false);
        }

        match p.c {
            Some(c) => Ok(at_most(
                formation.undercut(p.a.value, c.value),
                tolerance,
            )),
            None => Ok(!self.require_right_leg),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.min_gap.get() >= self.window.get() {
            return Err(EngineError::InvalidConfig(format!(
                "min_pivot_gap ({}) must be below pattern_window ({})",
                self.min_gap, self.window
            )));
        }
        Ok(())
    }
}

/// Evaluate one formation and render its message
fn pattern_signal<B: OHLCV>(
    search: &PivotSearch,
    formation: Formation,
    bars: &[B],
    close: f64,
) -> Result<Option<Signal>> {
    let Some(p) = search.find(formation, bars)? else {
        return Ok(None);
    };
    if p.b.value <= 0.0 {
        return Err(EngineError::Arithmetic("neckline price is not positive"));
    }

    let last = bars.len() - 1;
    let distance = (close - p.b.value) / p.b.value * 100.0;
    let state = formation.state(close, p.b.value);

    let (kind, name, status, legs) = match formation {
        Formation::DoubleBottom => (
            SignalKind::DoubleBottom(state),
            "double bottom",
            match state {
                PatternState::Confirmed => "breakout confirmed",
                PatternState::Forming => "opportunity",
            },
            "troughs",
        ),
        Formation::DoubleTop => (
            SignalKind::DoubleTop(state),
            "double top",
            match state {
                PatternState::Confirmed => "breakdown confirmed",
                PatternState::Forming => "formation in progress",
            },
            "peaks",
        ),
    };

    let pivots = match p.c {
        Some(c) => format!(
            "{legs} {} and {} bars ago, neckline {} bars ago",
            last - p.a.index,
            last - c.index,
            last - p.b.index
        ),
        None => format!(
            "first leg {} bars ago, neckline {} bars ago, right leg pending",
            last - p.a.index,
            last - p.b.index
        ),
    };

    Ok(Some(Signal::new(
        kind,
        format!(
            "{name} {status}: {distance:+.1}% vs neckline {:.2} ({pivots})",
            p.b.value
        ),
        true,
    )))
}

// ============================================================
// RULES
// ============================================================

/// Two troughs around a neckline peak
#[derive(Debug, Clone)]
pub struct DoubleBottomRule {
    pub search: PivotSearch,
}

impl DoubleBottomRule {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            search: PivotSearch {
                window: config.pattern_window,
                min_gap: config.min_pivot_gap,
                amplitude_threshold: config.amplitude_threshold_bottom,
                undercut_tolerance: config.undercut_tolerance,
                require_right_leg: config.require_right_leg,
            },
        }
    }
}

impl SignalRule for DoubleBottomRule {
    fn id(&self) -> RuleId {
        RuleId("DOUBLE_BOTTOM")
    }

    fn tier(&self) -> Tier {
        Tier::Pattern
    }

    fn min_bars(&self) -> usize {
        self.search.min_gap.get() + 2
    }

    fn evaluate<B: OHLCV>(&self, bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>> {
        pattern_signal(&self.search, Formation::DoubleBottom, bars, ctx.close)
    }

    fn validate_config(&self) -> Result<()> {
        self.search.validate()
    }
}

/// Two peaks around a neckline trough
#[derive(Debug, Clone)]
pub struct DoubleTopRule {
    pub search: PivotSearch,
}

impl DoubleTopRule {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            search: PivotSearch {
                window: config.pattern_window,
                min_gap: config.min_pivot_gap,
                amplitude_threshold: config.amplitude_threshold_top,
                undercut_tolerance: config.undercut_tolerance,
                require_right_leg: config.require_right_leg,
            },
        }
    }
}

impl SignalRule for DoubleTopRule {
    fn id(&self) -> RuleId {
        RuleId("DOUBLE_TOP")
    }

    fn tier(&self) -> Tier {
        Tier::Pattern
    }

    fn min_bars(&self) -> usize {
        self.search.min_gap.get() + 2
    }

    fn evaluate<B: OHLCV>(&self, bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>> {
        pattern_signal(&self.search, Formation::DoubleTop, bars, ctx.close)
    }

    fn validate_config(&self) -> Result<()> {
        self.search.validate()
    }
}

// ============================================================
// TESTS
// ============================================================
