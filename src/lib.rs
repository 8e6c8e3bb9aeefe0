//! # stratsig - Strategy Signal Engine
//!
//! Turns a daily bar history into a short list of trading signals and a single
//! notify decision: moving averages, a deviation band against a baseline average,
//! double-bottom / double-top pivot patterns and a tiered rule resolver.
//!
//! ## Quick Start
//!
//! ```rust
//! use stratsig::prelude::*;
//! use chrono::{Days, NaiveDate};
//!
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let bars: Vec<Bar> = (0..120u64)
//!     .map(|i| {
//!         let c = 100.0 + (i % 7) as f64;
//!         Bar::new(start + Days::new(i), c, c + 1.0, c - 1.0, c, 1_000.0)
//!     })
//!     .collect();
//!
//! let engine = SignalEngine::new(StrategyConfig::default()).unwrap();
//! let record = engine.evaluate(&bars);
//! assert!(record.is_analyzed());
//! println!("{} (notify = {})", record.signal_text, record.notify);
//! ```

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub mod config;
pub mod data;
pub mod digest;
pub mod indicators;
pub mod logging;
pub mod params;
pub mod rules;
pub mod watchlist;

pub mod prelude {
    pub use crate::{
        // Configuration
        config::StrategyConfig,
        // Indicators
        indicators::{IndicatorSet, SlopeDirection, SlopeTally},
        // Parameters
        params::{ParamMeta, ParamType},
        // Rules
        rules::*,
        // Parallel
        evaluate_parallel,
        // Types
        Bar,
        BuiltinRule,
        // Core traits
        DynSignalRule,
        EngineBuilder,
        // Errors
        EngineError,
        EvalContext,
        Evaluation,
        EvaluationError,
        OHLCVExt,
        PatternState,
        Period,
        Ratio,
        RecordStatus,
        Result,
        ResultRecord,
        RuleId,
        Signal,
        SignalEngine,
        SIGNAL_SEPARATOR,
        SignalKind,
        SignalRule,
        Slot,
        Tier,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while configuring the engine or evaluating a series
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient history: need {need} bars, got {got}")]
    InsufficientHistory { need: usize, got: usize },

    #[error("Undefined baseline average: {value}")]
    UndefinedBaseline { value: f64 },

    #[error("Malformed bar at index {index}: {reason}")]
    MalformedBar { index: usize, reason: &'static str },

    #[error("Arithmetic error: {0}")]
    Arithmetic(&'static str),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(EngineError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(EngineError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Bar count (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(EngineError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// Ordering key. When present, bars must be strictly increasing in it.
    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Read-only views (`&Bar`, `&dyn OHLCV`) are bars too
impl<T: OHLCV + ?Sized> OHLCV for &T {
    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn volume(&self) -> f64 {
        (**self).volume()
    }

    fn timestamp(&self) -> Option<i64> {
        (**self).timestamp()
    }
}

/// Extension trait with checks over OHLCV data
pub trait OHLCVExt: OHLCV {
    /// Validate bar consistency. The index is filled in by the caller.
    fn validate(&self) -> Result<()> {
        let fields = [
            self.open(),
            self.high(),
            self.low(),
            self.close(),
            self.volume(),
        ];
        if fields.iter().any(|v| v.is_nan()) {
            return Err(EngineError::MalformedBar {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if fields.iter().any(|v| v.is_infinite()) {
            return Err(EngineError::MalformedBar {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if fields.iter().any(|v| *v < 0.0) {
            return Err(EngineError::MalformedBar {
                index: 0,
                reason: "negative price or volume",
            });
        }
        if self.high() < self.low() {
            return Err(EngineError::MalformedBar {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

// ============================================================
// BAR
// ============================================================

/// One trading day for an instrument
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(alias = "Date")]
    pub date: NaiveDate,
    #[serde(alias = "Open")]
    pub open: f64,
    #[serde(alias = "High")]
    pub high: f64,
    #[serde(alias = "Low")]
    pub low: f64,
    #[serde(alias = "Close")]
    pub close: f64,
    #[serde(alias = "Volume")]
    pub volume: f64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(i64::from(self.date.num_days_from_ce()))
    }
}

// ============================================================
// SIGNALS
// ============================================================

/// Unique identifier for a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RuleId(pub &'static str);

impl RuleId {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Whether a pattern's neckline has already been crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternState {
    Confirmed,
    Forming,
}

/// What a signal reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    VolumeBreakout,
    VolumeBreakdown,
    DoubleBottom(PatternState),
    DoubleTop(PatternState),
    TurnBullish,
    TurnBearish,
    BottomTurning,
    TopConsolidating,
    Divergence,
    Congestion,
    ElevatedDeviation,
    SevereDeviation,
    BullishDrift,
    BearishConsolidation,
    Custom(&'static str),
}

/// One fired rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub text: String,
    pub contributes_to_notify: bool,
}

impl Signal {
    pub fn new(kind: SignalKind, text: impl Into<String>, contributes_to_notify: bool) -> Self {
        Self {
            kind,
            text: text.into(),
            contributes_to_notify,
        }
    }
}

/// Rule precedence, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    VolumeThrust,
    Pattern,
    BaselineCross,
    TrendSlope,
    Divergence,
    Congestion,
    Deviation,
    Fallback,
}

/// Output slot a tier writes to. Only the momentum slot is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Momentum,
    Pattern,
    Deviation,
    Fallback,
}

impl Tier {
    pub fn slot(self) -> Slot {
        match self {
            Tier::VolumeThrust
            | Tier::BaselineCross
            | Tier::TrendSlope
            | Tier::Divergence
            | Tier::Congestion => Slot::Momentum,
            Tier::Pattern => Slot::Pattern,
            Tier::Deviation => Slot::Deviation,
            Tier::Fallback => Slot::Fallback,
        }
    }
}

// ============================================================
// EVALUATION CONTEXT
// ============================================================

/// Everything derived once per evaluation and shared by all rules
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub indicators: IndicatorSet,
    pub baseline_window: Period,
    pub close: f64,
    pub prev_close: Option<f64>,
    pub volume: f64,
    pub prev_volume: Option<f64>,
    /// Today's baseline average
    pub baseline: f64,
    pub prev_baseline: Option<f64>,
    /// `None` when the baseline is zero or not finite
    pub deviation_pct: Option<f64>,
    pub slope: SlopeTally,
}

impl EvalContext {
    pub fn build<B: OHLCV>(bars: &[B], config: &StrategyConfig) -> Result<Self> {
        let len = bars.len();
        let baseline_window = config.baseline_window;
        if len == 0 || len < baseline_window.get() {
            return Err(EngineError::InsufficientHistory {
                need: baseline_window.get(),
                got: len,
            });
        }

        let indicators = IndicatorSet::compute(bars, &config.indicator_windows());
        let baseline = indicators.today(baseline_window)?;
        let prev_baseline = indicators.yesterday(baseline_window).ok();

        let last = &bars[len - 1];
        let prev = len.checked_sub(2).map(|i| &bars[i]);
        let close = last.close();

        let deviation_pct = rules::deviation_pct(close, baseline).ok();

        Ok(Self {
            slope: SlopeTally::compute(&indicators, &config.slope_windows),
            indicators,
            baseline_window,
            close,
            prev_close: prev.map(|b| b.close()),
            volume: last.volume(),
            prev_volume: prev.map(|b| b.volume()),
            baseline,
            prev_baseline,
            deviation_pct,
        })
    }
}

// ============================================================
// RULE TRAITS
// ============================================================

/// Generic rule trait - for concrete types
pub trait SignalRule: Send + Sync {
    fn id(&self) -> RuleId;
    fn tier(&self) -> Tier;
    fn min_bars(&self) -> usize;

    /// `Ok(None)` means the rule did not fire. Errors degrade the rule only.
    fn evaluate<B: OHLCV>(&self, bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

/// Object-safe rule trait - for custom rules
pub trait DynSignalRule: Send + Sync {
    fn id(&self) -> RuleId;
    fn tier(&self) -> Tier;
    fn min_bars(&self) -> usize;
    fn evaluate(&self, bars: &[&dyn OHLCV], ctx: &EvalContext) -> Result<Option<Signal>>;
    fn validate_config(&self) -> Result<()>;
}

impl<R: SignalRule> DynSignalRule for R {
    fn id(&self) -> RuleId {
        SignalRule::id(self)
    }

    fn tier(&self) -> Tier {
        SignalRule::tier(self)
    }

    fn min_bars(&self) -> usize {
        SignalRule::min_bars(self)
    }

    fn evaluate(&self, bars: &[&dyn OHLCV], ctx: &EvalContext) -> Result<Option<Signal>> {
        SignalRule::evaluate(self, bars, ctx)
    }

    fn validate_config(&self) -> Result<()> {
        SignalRule::validate_config(self)
    }
}

// ============================================================
// BUILTIN RULES - generated via macro
// ============================================================

use config::StrategyConfig;
use indicators::{IndicatorSet, SlopeTally};
use rules::*;

/// Macro to generate BuiltinRule enum without boilerplate
macro_rules! define_builtin_rules {
    (
        $(
            $variant:ident($rule:ty)
        ),* $(,)?
    ) => {
        /// All builtin rules - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinRule {
            $($variant($rule)),*
        }

        impl BuiltinRule {
            #[inline]
            pub fn evaluate<B: OHLCV>(&self, bars: &[B], ctx: &EvalContext) -> Result<Option<Signal>> {
                match self {
                    $(Self::$variant(r) => SignalRule::evaluate(r, bars, ctx)),*
                }
            }

            #[inline]
            pub fn id(&self) -> RuleId {
                match self {
                    $(Self::$variant(r) => SignalRule::id(r)),*
                }
            }

            #[inline]
            pub fn tier(&self) -> Tier {
                match self {
                    $(Self::$variant(r) => SignalRule::tier(r)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(r) => SignalRule::min_bars(r)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(r) => SignalRule::validate_config(r)),*
                }
            }

            /// One instance of every builtin rule, parameterized from `config`
            pub fn all_from_config(config: &StrategyConfig) -> Vec<Self> {
                vec![$(Self::$variant(<$rule>::from_config(config))),*]
            }
        }
    };
}

define_builtin_rules! {
    // Tier 1
    VolumeBreakout(VolumeBreakoutRule),
    VolumeBreakdown(VolumeBreakdownRule),
    // Tier 2
    DoubleBottom(DoubleBottomRule),
    DoubleTop(DoubleTopRule),
    // Tier 3
    BaselineCross(BaselineCrossRule),
    // Tier 4
    SlopeReversal(SlopeReversalRule),
    // Tier 5
    Divergence(DivergenceRule),
    // Tier 6
    Congestion(CongestionRule),
    // Tier 7
    Deviation(DeviationRule),
    // Tier 8
    Drift(DriftRule),
}

// ============================================================
// RESULT RECORD
// ============================================================

/// Separator between signal texts in `ResultRecord::signal_text`
pub const SIGNAL_SEPARATOR: &str = "; ";

/// Whether a record carries an analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordStatus {
    Analyzed,
    InsufficientData { need: usize, got: usize },
    /// Enough history, but the shared indicators could not be computed
    Failed { reason: String },
}

/// Return contract of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub status: RecordStatus,
    /// Last valid close
    pub price: Option<f64>,
    pub baseline_average: Option<f64>,
    pub deviation_pct: Option<f64>,
    pub signal_text: String,
    pub signals: Vec<Signal>,
    pub notify: bool,
    /// Malformed bars removed before computation
    pub dropped_bars: usize,
}

impl ResultRecord {
    fn analyzed(ctx: &EvalContext, signals: Vec<Signal>, dropped_bars: usize) -> Self {
        let signal_text = signals
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(SIGNAL_SEPARATOR);
        let notify = signals.iter().any(|s| s.contributes_to_notify);

        Self {
            status: RecordStatus::Analyzed,
            price: Some(ctx.close),
            baseline_average: Some(ctx.baseline),
            deviation_pct: ctx.deviation_pct,
            signal_text,
            signals,
            notify,
            dropped_bars,
        }
    }

    /// Record for a series too short to analyze. Never notifies.
    pub fn insufficient(need: usize, got: usize, price: Option<f64>, dropped_bars: usize) -> Self {
        Self {
            status: RecordStatus::InsufficientData { need, got },
            price,
            baseline_average: None,
            deviation_pct: None,
            signal_text: format!("insufficient data: need {need} bars, got {got}"),
            signals: Vec::new(),
            notify: false,
            dropped_bars,
        }
    }

    /// Record for a series that has enough bars but could not be analyzed.
    /// Never notifies.
    pub fn failed(error: &EngineError, price: Option<f64>, dropped_bars: usize) -> Self {
        Self {
            status: RecordStatus::Failed {
                reason: error.to_string(),
            },
            price,
            baseline_average: None,
            deviation_pct: None,
            signal_text: format!("could not analyze: {error}"),
            signals: Vec::new(),
            notify: false,
            dropped_bars,
        }
    }

    #[inline]
    pub fn is_analyzed(&self) -> bool {
        matches!(self.status, RecordStatus::Analyzed)
    }

    pub fn has_signal(&self, kind: SignalKind) -> bool {
        self.signals.iter().any(|s| s.kind == kind)
    }
}

// ============================================================
// SIGNAL ENGINE
// ============================================================

#[derive(Debug, Clone, Copy)]
enum RuleRef {
    Builtin(usize),
    Custom(usize),
}

/// Main evaluation engine. Immutable once built; share it across threads.
pub struct SignalEngine {
    builtin: Vec<BuiltinRule>,
    custom: Vec<Box<dyn DynSignalRule>>,
    /// Rule indices sorted by tier, insertion order within a tier
    order: Vec<RuleRef>,
    config: StrategyConfig,
}

impl SignalEngine {
    /// Engine with every builtin rule parameterized from `config`
    pub fn new(config: StrategyConfig) -> Result<Self> {
        EngineBuilder::new().config(config).with_all_defaults().build()
    }

    #[inline]
    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Minimum clean bars for an analyzed record
    #[inline]
    pub fn required_bars(&self) -> usize {
        self.config.baseline_window.get()
    }

    // ===========================================
    // LOW-LEVEL: Primitives
    // ===========================================

    /// Drop malformed bars. Returns the clean view and one error per dropped bar.
    pub fn sanitize<'a, T: OHLCV>(&self, bars: &'a [T]) -> (Vec<&'a T>, Vec<EngineError>) {
        let mut kept = Vec::with_capacity(bars.len());
        let mut dropped = Vec::new();
        let mut last_ts: Option<i64> = None;

        for (i, bar) in bars.iter().enumerate() {
            let checked = bar.validate().and_then(|()| match (last_ts, bar.timestamp()) {
                (Some(prev), Some(ts)) if ts <= prev => Err(EngineError::MalformedBar {
                    index: 0,
                    reason: "date not after previous bar",
                }),
                _ => Ok(()),
            });

            match checked {
                Ok(()) => {
                    if let Some(ts) = bar.timestamp() {
                        last_ts = Some(ts);
                    }
                    kept.push(bar);
                }
                Err(e) => {
                    let e = match e {
                        EngineError::MalformedBar { reason, .. } => {
                            EngineError::MalformedBar { index: i, reason }
                        }
                        other => other,
                    };
                    warn!(index = i, error = %e, "dropping malformed bar");
                    dropped.push(e);
                }
            }
        }

        (kept, dropped)
    }

    /// Indicators, baseline and slope tally for an already clean series
    #[inline]
    pub fn compute_context<B: OHLCV>(&self, bars: &[B]) -> Result<EvalContext> {
        EvalContext::build(bars, &self.config)
    }

    // ===========================================
    // MID-LEVEL: Resolver
    // ===========================================

    /// Run the rule table in tier order and return the fired signals.
    pub fn resolve<B: OHLCV>(&self, bars: &[B], ctx: &EvalContext) -> Vec<Signal> {
        if self.custom.is_empty() {
            self.resolve_internal(bars, &[], ctx)
        } else {
            let bar_refs: Vec<&dyn OHLCV> = bars.iter().map(|b| b as &dyn OHLCV).collect();
            self.resolve_internal(bars, &bar_refs, ctx)
        }
    }

    // ===========================================
    // HIGH-LEVEL: Evaluation
    // ===========================================

    /// Evaluate a series. Fails only when no analysis is possible at all.
    pub fn try_evaluate<T: OHLCV>(&self, bars: &[T]) -> Result<ResultRecord> {
        let (clean, dropped) = self.sanitize(bars);
        self.evaluate_clean(&clean, dropped.len())
    }

    /// Evaluate a series. A series too short for the baseline yields an
    /// insufficient-data record with `notify == false`.
    pub fn evaluate<T: OHLCV>(&self, bars: &[T]) -> ResultRecord {
        let (clean, dropped) = self.sanitize(bars);
        let price = clean.last().map(|b| b.close());

        let need = self.required_bars();
        if clean.len() < need {
            debug!(need, got = clean.len(), "insufficient history for evaluation");
            return ResultRecord::insufficient(need, clean.len(), price, dropped.len());
        }

        match self.evaluate_clean(&clean, dropped.len()) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "evaluation failed");
                ResultRecord::failed(&e, price, dropped.len())
            }
        }
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn evaluate_clean<B: OHLCV>(&self, clean: &[B], dropped: usize) -> Result<ResultRecord> {
        if dropped > 0 {
            warn!(dropped, kept = clean.len(), "malformed bars removed from series");
        }

        let ctx = self.compute_context(clean)?;
        let signals = self.resolve(clean, &ctx);
        Ok(ResultRecord::analyzed(&ctx, signals, dropped))
    }

    fn rule_meta(&self, entry: RuleRef) -> (RuleId, Tier, usize) {
        match entry {
            RuleRef::Builtin(i) => {
                let r = &self.builtin[i];
                (r.id(), r.tier(), r.min_bars())
            }
            RuleRef::Custom(i) => {
                let r = &self.custom[i];
                (r.id(), r.tier(), r.min_bars())
            }
        }
    }

    fn resolve_internal<B: OHLCV>(
        &self,
        bars: &[B],
        bar_refs: &[&dyn OHLCV],
        ctx: &EvalContext,
    ) -> Vec<Signal> {
        let mut signals: Vec<Signal> = Vec::new();
        let mut momentum: Option<RuleId> = None;

        for &entry in &self.order {
            let (id, tier, min_bars) = self.rule_meta(entry);

            if tier.slot() == Slot::Fallback && !signals.is_empty() {
                continue;
            }
            if tier.slot() == Slot::Momentum {
                if let Some(winner) = momentum {
                    debug!(rule = id.as_str(), winner = winner.as_str(), "suppressed by higher tier");
                    continue;
                }
            }
            if bars.len() < min_bars {
                debug!(rule = id.as_str(), need = min_bars, got = bars.len(), "skipping rule");
                continue;
            }

            let outcome = match entry {
                RuleRef::Builtin(i) => self.builtin[i].evaluate(bars, ctx),
                RuleRef::Custom(i) => self.custom[i].evaluate(bar_refs, ctx),
            };

            match outcome {
                Ok(Some(signal)) => {
                    if signals.iter().any(|s| s.kind == signal.kind) {
                        debug!(rule = id.as_str(), "duplicate signal dropped");
                        continue;
                    }
                    if tier.slot() == Slot::Momentum {
                        momentum = Some(id);
                    }
                    signals.push(signal);
                }
                Ok(None) => {}
                Err(e @ EngineError::InsufficientHistory { .. }) => {
                    debug!(rule = id.as_str(), error = %e, "skipping rule");
                }
                Err(e) => {
                    warn!(rule = id.as_str(), error = %e, "rule degraded to not fired");
                }
            }
        }

        signals
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        for r in &self.builtin {
            r.validate_config()?;
        }
        for r in &self.custom {
            r.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating SignalEngine instances
pub struct EngineBuilder {
    config: StrategyConfig,
    default_rules: bool,
    builtin: Vec<BuiltinRule>,
    custom: Vec<Box<dyn DynSignalRule>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: StrategyConfig::default(),
            default_rules: false,
            builtin: Vec::new(),
            custom: Vec::new(),
        }
    }

    /// Replace the strategy configuration
    pub fn config(mut self, config: StrategyConfig) -> Self {
        self.config = config;
        self
    }

    /// Add every builtin rule, parameterized from the final configuration at `build()`
    pub fn with_all_defaults(mut self) -> Self {
        self.default_rules = true;
        self
    }

    /// Add a builtin rule
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, rule: BuiltinRule) -> Self {
        self.builtin.push(rule);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, rule: BuiltinRule) -> Result<Self> {
        rule.validate_config()?;
        self.builtin.push(rule);
        Ok(self)
    }

    /// Add a custom rule (slow path)
    pub fn add_custom<R: DynSignalRule + 'static>(mut self, rule: R) -> Self {
        self.custom.push(Box::new(rule));
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<SignalEngine> {
        let mut builtin = if self.default_rules {
            BuiltinRule::all_from_config(&self.config)
        } else {
            Vec::new()
        };
        builtin.extend(self.builtin);

        let mut order: Vec<(Tier, RuleRef)> = builtin
            .iter()
            .enumerate()
            .map(|(i, r)| (r.tier(), RuleRef::Builtin(i)))
            .chain(
                self.custom
                    .iter()
                    .enumerate()
                    .map(|(i, r)| (r.tier(), RuleRef::Custom(i))),
            )
            .collect();
        // stable: builtin before custom within a tier
        order.sort_by_key(|(tier, _)| *tier);

        let engine = SignalEngine {
            builtin,
            custom: self.custom,
            order: order.into_iter().map(|(_, r)| r).collect(),
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL EVALUATION
// ============================================================

use rayon::prelude::*;

/// Result of evaluating a single instrument
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub symbol: String,
    pub record: ResultRecord,
}

/// Error from evaluating a single instrument
#[derive(Debug, Clone)]
pub struct EvaluationError {
    pub symbol: String,
    pub error: EngineError,
}

/// Parallel evaluation of multiple instruments. One failure never affects the others.
pub fn evaluate_parallel<'a, T, I>(
    engine: &SignalEngine,
    instruments: I,
) -> (Vec<Evaluation>, Vec<EvaluationError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .try_evaluate(bars)
                .map(|record| Evaluation {
                    symbol: symbol.to_string(),
                    record,
                })
                .map_err(|error| EvaluationError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => {
                debug!(symbol = %e.symbol, error = %e.error, "could not analyze");
                errors.push(e)
            }
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
