//! End-to-end scenarios for the signal engine.
//!
//! Each test builds a synthetic daily series, runs the full engine and checks the
//! resulting record.

use chrono::{Days, NaiveDate};
use stratsig::prelude::*;

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Days::new(i as u64)
}

fn bar(i: usize, low: f64, high: f64, close: f64) -> Bar {
    Bar::new(day(i), close, high, low, close, 1000.0)
}

fn flat(n: usize, price: f64) -> Vec<Bar> {
    (0..n).map(|i| bar(i, price, price, price)).collect()
}

fn default_engine() -> SignalEngine {
    SignalEngine::new(StrategyConfig::default()).unwrap()
}

fn double_bottom_only() -> SignalEngine {
    EngineBuilder::new()
        .add(BuiltinRule::DoubleBottom(DoubleBottomRule::with_defaults()))
        .build()
        .unwrap()
}

/// Descent to a trough of 80 at bar 240, neckline high of 92 at bar 250,
/// right leg low of 81 at bar 255. Bar 260 closes at `last_close`.
fn w_bottom(last_close: f64) -> Vec<Bar> {
    let mut bars = Vec::with_capacity(261);
    for i in 0..200 {
        bars.push(bar(i, 99.5, 100.5, 100.0));
    }
    for i in 200..=240 {
        let c = 99.0 - (i - 200) as f64 * 0.45;
        bars.push(bar(i, c - 1.0, c + 1.0, c));
    }
    bars[240] = bar(240, 80.0, 82.0, 81.0);
    for i in 241..=250 {
        let c = 81.0 + (i - 240) as f64;
        bars.push(bar(i, c - 1.0, c + 1.0, c));
    }
    for i in 251..=255 {
        let c = 91.0 - (i - 250) as f64 * 1.8;
        bars.push(bar(i, c - 1.0, c + 1.0, c));
    }
    bars[255] = bar(255, 81.0, 83.0, 82.0);
    for i in 256..=259 {
        let c = 82.0 + (i - 255) as f64 * 1.5;
        bars.push(bar(i, c - 0.5, c + 0.5, c));
    }
    bars.push(bar(260, last_close - 1.0, last_close + 1.0, last_close));
    bars
}

// ============================================================
// DETERMINISM
// ============================================================

#[test]
fn test_evaluation_is_idempotent() {
    let engine = default_engine();
    let bars = w_bottom(90.0);

    let first = engine.evaluate(&bars);
    let second = engine.evaluate(&bars);
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

// ============================================================
// DEVIATION BANDS
// ============================================================

#[test]
fn test_deviation_band_edges() {
    for baseline in [0.37, 12.5, 80.0, 599.3, 1234.567] {
        let classify = |factor: f64| {
            let pct = deviation_pct(baseline * factor, baseline).unwrap();
            DeviationBand::classify(pct, 15.0, 30.0)
        };
        assert_eq!(classify(1.15), Some(DeviationBand::Elevated), "{baseline}");
        assert_eq!(classify(1.30), Some(DeviationBand::Severe), "{baseline}");
        assert_eq!(classify(1.149999), None, "{baseline}");
    }
}

#[test]
fn test_deviation_appended_after_event_tiers() {
    let mut bars = flat(80, 100.0);
    bars.push(bar(80, 100.0, 140.0, 140.0));

    let record = default_engine().evaluate(&bars);
    assert!(record.notify);
    assert_eq!(record.signals.len(), 2);
    assert_eq!(record.signals[0].kind, SignalKind::TurnBullish);
    assert_eq!(record.signals[1].kind, SignalKind::SevereDeviation);
    assert!(record.signal_text.contains("; severe deviation: +39.1% above 60MA"));
}

#[test]
fn test_zero_baseline_skips_deviation_only() {
    let record = default_engine().evaluate(&flat(70, 0.0));
    assert!(record.is_analyzed());
    assert_eq!(record.deviation_pct, None);
    assert!(!record.has_signal(SignalKind::ElevatedDeviation));
    assert!(!record.has_signal(SignalKind::SevereDeviation));
    assert!(record.has_signal(SignalKind::BearishConsolidation));
}

// ============================================================
// PATTERN BOUNDARIES
// ============================================================

/// Trough low of 100 at bar 55, neckline high of `peak` at bar 60, current bar 69
fn amplitude_series(peak: f64) -> Vec<Bar> {
    let mut bars: Vec<Bar> = (0..55).map(|i| bar(i, 104.5, 105.5, 105.0)).collect();
    bars.push(bar(55, 100.0, 102.0, 101.0));
    for (i, c) in [(56, 103.0), (57, 105.0), (58, 107.0), (59, 108.0)] {
        bars.push(bar(i, c - 1.0, c + 1.0, c));
    }
    bars.push(bar(60, 108.0, peak, 109.0));
    for i in 61..69 {
        bars.push(bar(i, 105.0, 107.0, 106.0));
    }
    bars.push(bar(69, 105.0, 107.0, 106.0));
    bars
}

#[test]
fn test_amplitude_exactly_at_threshold_accepted() {
    let record = double_bottom_only().evaluate(&amplitude_series(110.0));
    assert!(record.has_signal(SignalKind::DoubleBottom(PatternState::Forming)));
    assert!(record.notify);
}

#[test]
fn test_amplitude_below_threshold_rejected() {
    let record = double_bottom_only().evaluate(&amplitude_series(109.99));
    assert!(record.signals.is_empty());
    assert!(!record.notify);
}

/// Left trough 100 at bar 40, neckline 111 at bar 50, right leg low `c` at bar 60
fn undercut_series(c: f64) -> Vec<Bar> {
    let mut bars: Vec<Bar> = (0..40).map(|i| bar(i, 103.0, 105.0, 104.0)).collect();
    bars.push(bar(40, 100.0, 102.0, 101.0));
    for i in 41..50 {
        let close = 102.0 + (i - 41) as f64;
        bars.push(bar(i, close - 0.5, close + 0.5, close));
    }
    bars.push(bar(50, 109.0, 111.0, 110.0));
    for i in 51..60 {
        bars.push(bar(i, 104.0, 106.0, 105.0));
    }
    bars.push(bar(60, c, 100.0, 99.0));
    for i in 61..70 {
        bars.push(bar(i, 99.5, 100.5, 100.0));
    }
    bars
}

#[test]
fn test_undercut_within_tolerance_accepted() {
    let record = double_bottom_only().evaluate(&undercut_series(97.0));
    assert!(record.has_signal(SignalKind::DoubleBottom(PatternState::Forming)));
    assert!(record
        .signal_text
        .contains("troughs 29 and 9 bars ago, neckline 19 bars ago"));
}

#[test]
fn test_undercut_beyond_tolerance_rejected() {
    let record = double_bottom_only().evaluate(&undercut_series(96.99));
    assert!(record.signals.is_empty());
}

#[test]
fn test_current_bar_breaking_left_trough_invalidates_pattern() {
    let mut bars = w_bottom(90.0);
    bars[260] = bar(260, 70.0, 72.0, 71.0);

    let record = double_bottom_only().evaluate(&bars);
    assert!(!record.has_signal(SignalKind::DoubleBottom(PatternState::Forming)));
    assert!(record.signals.is_empty());
    assert!(!record.notify);

    // 2.5% under the left trough stays within tolerance
    bars[260] = bar(260, 78.0, 80.0, 79.0);
    let record = double_bottom_only().evaluate(&bars);
    assert!(record.has_signal(SignalKind::DoubleBottom(PatternState::Forming)));
}

/// Trough 80 at bar 60, neckline 92 at bar 66, right leg 81 at bar 70,
/// then quiet bars up to the current bar 100
fn aged_w_bottom() -> Vec<Bar> {
    let mut bars: Vec<Bar> = (0..60).map(|i| bar(i, 99.5, 100.5, 100.0)).collect();
    bars.push(bar(60, 80.0, 82.0, 81.0));
    for i in 61..=65 {
        let c = 81.0 + (i - 60) as f64 * 1.8;
        bars.push(bar(i, c - 1.0, c + 1.0, c));
    }
    bars.push(bar(66, 90.0, 92.0, 91.0));
    bars.push(bar(67, 86.0, 88.0, 87.0));
    bars.push(bar(68, 84.0, 86.0, 85.0));
    bars.push(bar(69, 82.0, 84.0, 83.0));
    bars.push(bar(70, 81.0, 83.0, 82.0));
    for i in 71..=100 {
        bars.push(bar(i, 89.5, 90.5, 90.0));
    }
    bars
}

fn double_bottom_with_window(window: usize) -> SignalEngine {
    let config = StrategyConfig {
        pattern_window: Period::new(window).unwrap(),
        ..StrategyConfig::default()
    };
    EngineBuilder::new()
        .add(BuiltinRule::DoubleBottom(DoubleBottomRule::from_config(&config)))
        .config(config)
        .build()
        .unwrap()
}

#[test]
fn test_pattern_window_limits_pivot_search() {
    let bars = aged_w_bottom();

    let record = double_bottom_with_window(60).evaluate(&bars);
    assert!(record.has_signal(SignalKind::DoubleBottom(PatternState::Forming)));
    assert!(record.signal_text.contains(
        "double bottom opportunity: -2.2% vs neckline 92.00 \
         (troughs 40 and 30 bars ago, neckline 34 bars ago)"
    ));

    // The left trough is 40 bars back, outside a 30-bar window
    let record = double_bottom_with_window(30).evaluate(&bars);
    assert!(record.signals.is_empty());
    assert!(!record.notify);
}

// ============================================================
// INSUFFICIENT DATA AND BATCH ISOLATION
// ============================================================

#[test]
fn test_short_series_is_insufficient() {
    let bars = flat(59, 100.0);
    let record = default_engine().evaluate(&bars);

    assert_eq!(
        record.status,
        RecordStatus::InsufficientData { need: 60, got: 59 }
    );
    assert!(!record.notify);
    assert!(record.signals.is_empty());
    assert_eq!(record.price, Some(100.0));
    assert!(record.signal_text.starts_with("insufficient data"));
}

#[test]
fn test_batch_isolates_failures() {
    let engine = default_engine();
    let first = w_bottom(90.0);
    let second: Vec<Bar> = Vec::new();
    let third = flat(120, 42.0);

    let instruments: Vec<(&str, &[Bar])> = vec![
        ("FIRST", first.as_slice()),
        ("EMPTY", second.as_slice()),
        ("THIRD", third.as_slice()),
    ];
    let (results, errors) = evaluate_parallel(&engine, instruments);

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.record.is_analyzed()));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].symbol, "EMPTY");
    assert_eq!(
        errors[0].error,
        EngineError::InsufficientHistory { need: 60, got: 0 }
    );
}

// ============================================================
// END-TO-END SCENARIOS
// ============================================================

#[test]
fn test_scenario_volume_breakout() {
    let mut bars = flat(300, 100.0);
    let mut last = bar(300, 100.0, 106.0, 106.0);
    last.open = 100.0;
    last.volume = 2000.0;
    bars.push(last);

    let record = default_engine().evaluate(&bars);
    assert!(record.has_signal(SignalKind::VolumeBreakout));
    assert!(record.notify);
    assert_eq!(record.signals.len(), 1);

    let baseline = record.baseline_average.unwrap();
    assert!((baseline - 100.0).abs() < 0.2, "baseline {baseline}");
    let deviation = record.deviation_pct.unwrap();
    assert!((deviation - 6.0).abs() < 0.2, "deviation {deviation}");
    assert!(!record.has_signal(SignalKind::ElevatedDeviation));
}

#[test]
fn test_scenario_double_bottom_opportunity() {
    let record = default_engine().evaluate(&w_bottom(90.0));
    assert!(record.has_signal(SignalKind::DoubleBottom(PatternState::Forming)));
    assert!(record.notify);
    assert!(record.signal_text.contains(
        "double bottom opportunity: -2.2% vs neckline 92.00 \
         (troughs 20 and 5 bars ago, neckline 10 bars ago)"
    ));
}

#[test]
fn test_scenario_double_bottom_breakout() {
    let record = default_engine().evaluate(&w_bottom(95.0));
    assert!(record.has_signal(SignalKind::DoubleBottom(PatternState::Confirmed)));
    assert!(record.signal_text.contains("double bottom breakout confirmed: +3.3%"));
}

#[test]
fn test_scenario_congestion_does_not_notify() {
    let record = default_engine().evaluate(&flat(70, 50.0));
    assert_eq!(record.signals.len(), 1);
    assert_eq!(record.signals[0].kind, SignalKind::Congestion);
    assert!(!record.notify);
    assert_eq!(record.deviation_pct, Some(0.0));
}

#[test]
fn test_congestion_with_notifying_pattern() {
    let engine = EngineBuilder::new()
        .add(BuiltinRule::DoubleBottom(DoubleBottomRule::with_defaults()))
        .add(BuiltinRule::Congestion(CongestionRule::with_defaults()))
        .build()
        .unwrap();
    let mut bars = amplitude_series(110.0);
    for i in 70..75 {
        bars.push(bar(i, 105.0, 107.0, 106.0));
    }

    let record = engine.evaluate(&bars);
    assert!(record.has_signal(SignalKind::Congestion));
    assert!(record.has_signal(SignalKind::DoubleBottom(PatternState::Forming)));
    assert!(record.notify);
}
