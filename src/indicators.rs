//! Windowed averages and the trend slope tally
//!
//! Every average value is summed over its own span rather than maintained as a
//! rolling sum, so a value depends only on the `window` closes ending at its index.

use std::collections::BTreeMap;

use crate::{EngineError, Period, Result, OHLCV};

/// Simple moving average of `values`, aligned 1:1 with the input.
///
/// Indices before `window - 1` have no value.
pub fn sma(values: &[f64], window: Period) -> Vec<Option<f64>> {
    let w = window.get();
    let mut out = vec![None; values.len()];
    if values.len() < w {
        return out;
    }
    for (i, span) in values.windows(w).enumerate() {
        let sum: f64 = span.iter().sum();
        out[i + w - 1] = Some(sum / w as f64);
    }
    out
}

// ============================================================
// INDICATOR SET
// ============================================================

/// Averages of `close` for a fixed set of windows
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    len: usize,
    series: BTreeMap<Period, Vec<Option<f64>>>,
}

impl IndicatorSet {
    pub fn compute<B: OHLCV>(bars: &[B], windows: &[Period]) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
        let series = windows.iter().map(|&w| (w, sma(&closes, w))).collect();
        Self {
            len: bars.len(),
            series,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Full series for a window, if it was computed
    pub fn series(&self, window: Period) -> Option<&[Option<f64>]> {
        self.series.get(&window).map(Vec::as_slice)
    }

    /// Value `back` bars before the last one
    pub fn value_at(&self, window: Period, back: usize) -> Result<f64> {
        let series = self.series.get(&window).ok_or_else(|| {
            EngineError::InvalidConfig(format!("average {window} was not computed"))
        })?;
        let need = window.get() + back;
        if self.len < need {
            return Err(EngineError::InsufficientHistory {
                need,
                got: self.len,
            });
        }
        series[self.len - 1 - back].ok_or(EngineError::InsufficientHistory {
            need,
            got: self.len,
        })
    }

    #[inline]
    pub fn today(&self, window: Period) -> Result<f64> {
        self.value_at(window, 0)
    }

    #[inline]
    pub fn yesterday(&self, window: Period) -> Result<f64> {
        self.value_at(window, 1)
    }
}

// ============================================================
// SLOPE TALLY
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeDirection {
    Up,
    Down,
}

/// Today's versus yesterday's average across the slope windows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlopeTally {
    pub up_count: usize,
    pub down_count: usize,
    /// Per-window direction; windows lacking two values are absent
    pub directions: Vec<(Period, SlopeDirection)>,
}

impl SlopeTally {
    pub fn compute(indicators: &IndicatorSet, windows: &[Period]) -> Self {
        let mut tally = Self::default();
        for &w in windows {
            let (Ok(today), Ok(yesterday)) = (indicators.today(w), indicators.yesterday(w)) else {
                continue;
            };
            let direction = if today > yesterday {
                tally.up_count += 1;
                SlopeDirection::Up
            } else {
                tally.down_count += 1;
                SlopeDirection::Down
            };
            tally.directions.push((w, direction));
        }
        tally
    }
}

// ============================================================
// TESTS
// ============================================================
