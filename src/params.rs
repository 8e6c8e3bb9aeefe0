//! Parameter metadata for strategy knobs
//!
//! Every numeric setting of [`StrategyConfig`](crate::config::StrategyConfig) is
//! described by a [`ParamMeta`], enabling:
//! - Range validation of loaded configurations
//! - Key/value overrides (`--set pattern_window=30`)
//! - Parameter documentation
//!
//! # Example
//!
//! ```rust
//! use stratsig::config::StrategyConfig;
//!
//! for param in StrategyConfig::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{EngineError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fraction in 0.0..=1.0
  Ratio,
  /// Bar count (positive integer)
  Period,
  /// Percentage points (15.0 means 15%)
  Percent,
  /// Multiplier such as a volume ratio
  Factor,
  /// On/off switch, 0 or 1
  Flag,
}

/// Metadata for a single strategy parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name, identical to the config field
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Valid range: (min, max)
  pub range: (f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn percent(
    name: &'static str,
    default: f64,
    range: (f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Percent, default, range, description }
  }

  pub const fn factor(
    name: &'static str,
    default: f64,
    range: (f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Factor, default, range, description }
  }

  pub const fn flag(name: &'static str, default: bool, description: &'static str) -> Self {
    let default = if default { 1.0 } else { 0.0 };
    Self { name, param_type: ParamType::Flag, default, range: (0.0, 1.0), description }
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    if value.is_nan() {
      return Err(EngineError::InvalidValue("parameter value cannot be NaN"));
    }
    let (min, max) = self.range;
    if value < min || value > max {
      return Err(EngineError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Period if value.fract() != 0.0 => {
        Err(EngineError::InvalidValue("Period must be a positive integer"))
      },
      ParamType::Flag if value != 0.0 && value != 1.0 => {
        Err(EngineError::InvalidValue("Flag must be 0 or 1"))
      },
      _ => Ok(()),
    }
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: Ratio) -> Result<Ratio> {
  match params.get(key) {
    Some(&value) => Ratio::new(value),
    None => Ok(default),
  }
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: Period) -> Result<Period> {
  match params.get(key) {
    Some(&value) if value < 1.0 || value.fract() != 0.0 => {
      Err(EngineError::InvalidValue("Period must be a positive integer"))
    },
    Some(&value) => Period::new(value as usize),
    None => Ok(default),
  }
}

/// Helper to get a plain number from params with default fallback
pub fn get_f64(params: &HashMap<&str, f64>, key: &str, default: f64) -> f64 {
  params.get(key).copied().unwrap_or(default)
}

/// Helper to get a flag (non-zero = on) from params with default fallback
pub fn get_flag(params: &HashMap<&str, f64>, key: &str, default: bool) -> bool {
  params.get(key).map_or(default, |v| *v != 0.0)
}

// ============================================================
// TESTS
// ============================================================
