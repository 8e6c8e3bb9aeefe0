//! Strategy configuration
//!
//! One flat, serde-(de)serializable settings struct shared by every rule.
//! All fields have defaults, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! pattern_window = 30
//! deviation_elevated = 12.0
//! windows = [5, 10, 20, 60]
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::params::{get_f64, get_flag, get_period, get_ratio, ParamMeta};
use crate::{EngineError, Period, Ratio, Result};

const fn p(n: usize) -> Period {
    Period::new_const(n)
}

const fn r(v: f64) -> Ratio {
    Ratio::new_const(v)
}

/// Every tunable of the signal engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    /// Averages computed for every evaluation
    pub windows: Vec<Period>,
    /// Average the deviation and crossing rules compare against
    pub baseline_window: Period,
    /// Averages whose slope feeds the trend composite rules
    pub slope_windows: Vec<Period>,
    /// Short average that confirms volume breakouts and divergences
    pub confirm_window: Period,
    /// Bars searched for pivots, before the current bar
    pub pattern_window: Period,
    /// Minimum index distance between the outer pivot and the neckline
    pub min_pivot_gap: Period,
    /// Reject patterns that have no right leg yet
    pub require_right_leg: bool,
    pub amplitude_threshold_bottom: Ratio,
    pub amplitude_threshold_top: Ratio,
    pub undercut_tolerance: Ratio,
    /// Percent above baseline for an elevated deviation
    pub deviation_elevated: f64,
    /// Percent above baseline for a severe deviation
    pub deviation_severe: f64,
    pub breakout_change: Ratio,
    pub breakdown_change: Ratio,
    pub breakout_volume_ratio: f64,
    pub divergence_volume_ratio: f64,
    pub congestion_spread: Ratio,
    pub slope_min_count: usize,
    /// Whether the fallback drift message sets the notify flag
    pub notify_on_drift: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            windows: vec![p(3), p(5), p(10), p(20), p(60), p(240)],
            baseline_window: p(60),
            slope_windows: vec![p(5), p(10), p(20)],
            confirm_window: p(5),
            pattern_window: p(60),
            min_pivot_gap: p(3),
            require_right_leg: false,
            amplitude_threshold_bottom: r(0.10),
            amplitude_threshold_top: r(0.12),
            undercut_tolerance: r(0.03),
            deviation_elevated: 15.0,
            deviation_severe: 30.0,
            breakout_change: r(0.04),
            breakdown_change: r(0.05),
            breakout_volume_ratio: 1.5,
            divergence_volume_ratio: 1.2,
            congestion_spread: r(0.02),
            slope_min_count: 2,
            notify_on_drift: true,
        }
    }
}

static STRATEGY_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("baseline_window", 60.0, (2.0, 1000.0), "Baseline average window"),
    ParamMeta::period("confirm_window", 5.0, (1.0, 250.0), "Short confirmation average window"),
    ParamMeta::period("pattern_window", 60.0, (5.0, 1000.0), "Bars searched for pivots"),
    ParamMeta::period("min_pivot_gap", 3.0, (1.0, 250.0), "Minimum bars from outer pivot to neckline"),
    ParamMeta::flag("require_right_leg", false, "Reject patterns without a right leg"),
    ParamMeta::ratio(
        "amplitude_threshold_bottom",
        0.10,
        (0.001, 1.0),
        "Minimum trough-to-neckline rally for a double bottom",
    ),
    ParamMeta::ratio(
        "amplitude_threshold_top",
        0.12,
        (0.001, 1.0),
        "Minimum peak-to-neckline drop for a double top",
    ),
    ParamMeta::ratio(
        "undercut_tolerance",
        0.03,
        (0.0, 0.5),
        "How far the right leg may break past the left leg",
    ),
    ParamMeta::percent("deviation_elevated", 15.0, (0.1, 1000.0), "Elevated deviation band, percent"),
    ParamMeta::percent("deviation_severe", 30.0, (0.1, 1000.0), "Severe deviation band, percent"),
    ParamMeta::ratio("breakout_change", 0.04, (0.001, 1.0), "Same-day gain for a breakout"),
    ParamMeta::ratio("breakdown_change", 0.05, (0.001, 1.0), "Same-day loss for a breakdown"),
    ParamMeta::factor(
        "breakout_volume_ratio",
        1.5,
        (1.0, 100.0),
        "Volume versus prior day for a breakout or breakdown",
    ),
    ParamMeta::factor(
        "divergence_volume_ratio",
        1.2,
        (1.0, 100.0),
        "Volume versus prior day for a divergence warning",
    ),
    ParamMeta::ratio(
        "congestion_spread",
        0.02,
        (0.0001, 1.0),
        "Maximum spread of the three shortest averages",
    ),
    ParamMeta::period("slope_min_count", 2.0, (1.0, 20.0), "Rising or falling averages for a turn"),
    ParamMeta::flag("notify_on_drift", true, "Fallback drift message sets notify"),
];

impl StrategyConfig {
    /// Metadata for every numeric setting
    pub fn param_meta() -> &'static [ParamMeta] {
        STRATEGY_PARAMS
    }

    /// Current value of a numeric setting, by name
    pub fn param_value(&self, name: &str) -> Option<f64> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let value = match name {
            "baseline_window" => self.baseline_window.get() as f64,
            "confirm_window" => self.confirm_window.get() as f64,
            "pattern_window" => self.pattern_window.get() as f64,
            "min_pivot_gap" => self.min_pivot_gap.get() as f64,
            "require_right_leg" => flag(self.require_right_leg),
            "amplitude_threshold_bottom" => self.amplitude_threshold_bottom.get(),
            "amplitude_threshold_top" => self.amplitude_threshold_top.get(),
            "undercut_tolerance" => self.undercut_tolerance.get(),
            "deviation_elevated" => self.deviation_elevated,
            "deviation_severe" => self.deviation_severe,
            "breakout_change" => self.breakout_change.get(),
            "breakdown_change" => self.breakdown_change.get(),
            "breakout_volume_ratio" => self.breakout_volume_ratio,
            "divergence_volume_ratio" => self.divergence_volume_ratio,
            "congestion_spread" => self.congestion_spread.get(),
            "slope_min_count" => self.slope_min_count as f64,
            "notify_on_drift" => flag(self.notify_on_drift),
            _ => return None,
        };
        Some(value)
    }

    /// Parse from TOML and validate
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply key/value overrides. Unknown keys are rejected.
    pub fn with_overrides(self, params: &HashMap<&str, f64>) -> Result<Self> {
        if let Some(unknown) = params
            .keys()
            .find(|k| !STRATEGY_PARAMS.iter().any(|m| m.name == **k))
        {
            return Err(EngineError::InvalidConfig(format!(
                "unknown parameter `{unknown}`"
            )));
        }

        let config = Self {
            baseline_window: get_period(params, "baseline_window", self.baseline_window)?,
            confirm_window: get_period(params, "confirm_window", self.confirm_window)?,
            pattern_window: get_period(params, "pattern_window", self.pattern_window)?,
            min_pivot_gap: get_period(params, "min_pivot_gap", self.min_pivot_gap)?,
            require_right_leg: get_flag(params, "require_right_leg", self.require_right_leg),
            amplitude_threshold_bottom: get_ratio(
                params,
                "amplitude_threshold_bottom",
                self.amplitude_threshold_bottom,
            )?,
            amplitude_threshold_top: get_ratio(
                params,
                "amplitude_threshold_top",
                self.amplitude_threshold_top,
            )?,
            undercut_tolerance: get_ratio(params, "undercut_tolerance", self.undercut_tolerance)?,
            deviation_elevated: get_f64(params, "deviation_elevated", self.deviation_elevated),
            deviation_severe: get_f64(params, "deviation_severe", self.deviation_severe),
            breakout_change: get_ratio(params, "breakout_change", self.breakout_change)?,
            breakdown_change: get_ratio(params, "breakdown_change", self.breakdown_change)?,
            breakout_volume_ratio: get_f64(
                params,
                "breakout_volume_ratio",
                self.breakout_volume_ratio,
            ),
            divergence_volume_ratio: get_f64(
                params,
                "divergence_volume_ratio",
                self.divergence_volume_ratio,
            ),
            congestion_spread: get_ratio(params, "congestion_spread", self.congestion_spread)?,
            slope_min_count: get_period(
                params,
                "slope_min_count",
                Period::new(self.slope_min_count.max(1))?,
            )?
            .get(),
            notify_on_drift: get_flag(params, "notify_on_drift", self.notify_on_drift),
            ..self
        };
        config.validate()?;
        Ok(config)
    }

    /// Range checks for every knob plus cross-field constraints
    pub fn validate(&self) -> Result<()> {
        for meta in STRATEGY_PARAMS {
            if let Some(value) = self.param_value(meta.name) {
                meta.validate(value)?;
            }
        }

        if self.deviation_elevated >= self.deviation_severe {
            return Err(EngineError::InvalidConfig(format!(
                "deviation_elevated ({}) must be below deviation_severe ({})",
                self.deviation_elevated, self.deviation_severe
            )));
        }
        self.congestion_windows()?;
        if self.slope_windows.is_empty() {
            return Err(EngineError::InvalidConfig(
                "slope_windows must not be empty".into(),
            ));
        }
        if self.slope_min_count > self.slope_windows.len() {
            return Err(EngineError::InvalidConfig(format!(
                "slope_min_count ({}) exceeds the number of slope windows ({})",
                self.slope_min_count,
                self.slope_windows.len()
            )));
        }
        Ok(())
    }

    /// Every window any rule reads, sorted and de-duplicated
    pub fn indicator_windows(&self) -> Vec<Period> {
        let mut all: Vec<Period> = self
            .windows
            .iter()
            .chain(&self.slope_windows)
            .copied()
            .chain([self.baseline_window, self.confirm_window])
            .collect();
        all.sort();
        all.dedup();
        all
    }

    /// Configured averages, shortest first, without duplicates
    pub fn distinct_windows(&self) -> Vec<Period> {
        let mut sorted = self.windows.clone();
        sorted.sort();
        sorted.dedup();
        sorted
    }

    /// The three shortest distinct averages
    pub fn congestion_windows(&self) -> Result<[Period; 3]> {
        match self.distinct_windows().as_slice() {
            &[a, b, c, ..] => Ok([a, b, c]),
            other => Err(EngineError::InvalidConfig(format!(
                "at least three distinct averages are needed for congestion, got {}",
                other.len()
            ))),
        }
    }
}

// ============================================================
// TESTS
// ============================================================
