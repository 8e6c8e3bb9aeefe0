//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Determinism - the same series always yields the same record
//! 2. Indicator locality - an average depends only on its own window
//! 3. Resolver invariants - unique kinds, one momentum signal, notify is an OR
//! 4. Short series never notify

use proptest::prelude::*;
use stratsig::indicators::sma;
use stratsig::prelude::*;

/// Bar without a date; ordering is positional
#[derive(Debug, Clone, Copy)]
struct TestBar {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

impl OHLCV for TestBar {
    fn open(&self) -> f64 {
        self.o
    }

    fn high(&self) -> f64 {
        self.h
    }

    fn low(&self) -> f64 {
        self.l
    }

    fn close(&self) -> f64 {
        self.c
    }

    fn volume(&self) -> f64 {
        self.v
    }
}

// ── Strategies ───────────────────────────────────────────────────────

/// Random walk of daily returns within +-8%, volume 500..3000
fn arb_series(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<TestBar>> {
    prop::collection::vec((-0.08..0.08_f64, 500.0..3000.0_f64, 0.0..0.02_f64), len).prop_map(
        |steps| {
            let mut price = 100.0;
            steps
                .into_iter()
                .map(|(ret, v, wick)| {
                    let o = price;
                    price *= 1.0 + ret;
                    let c = price;
                    TestBar {
                        o,
                        h: o.max(c) * (1.0 + wick),
                        l: o.min(c) * (1.0 - wick),
                        c,
                        v,
                    }
                })
                .collect()
        },
    )
}

fn is_momentum(kind: SignalKind) -> bool {
    matches!(
        kind,
        SignalKind::VolumeBreakout
            | SignalKind::VolumeBreakdown
            | SignalKind::TurnBullish
            | SignalKind::TurnBearish
            | SignalKind::BottomTurning
            | SignalKind::TopConsolidating
            | SignalKind::Divergence
            | SignalKind::Congestion
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn evaluation_is_deterministic(bars in arb_series(60..200)) {
        let engine = SignalEngine::new(StrategyConfig::default()).unwrap();
        let first = engine.evaluate(&bars);
        let second = engine.evaluate(&bars);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn average_ignores_bars_outside_window(
        closes in prop::collection::vec(1.0..500.0_f64, 30..80),
        window in 2usize..20,
        replacement in 1.0..500.0_f64,
    ) {
        let window = Period::new(window).unwrap();
        let before = sma(&closes, window);

        let mut changed = closes.clone();
        changed[0] = replacement;
        let after = sma(&changed, window);

        // Every value whose span starts after bar 0 is untouched, bit for bit
        for i in window.get()..closes.len() {
            prop_assert_eq!(before[i].map(f64::to_bits), after[i].map(f64::to_bits));
        }
        for value in &before[..window.get() - 1] {
            prop_assert!(value.is_none());
        }
    }

    #[test]
    fn resolver_invariants_hold(bars in arb_series(60..260)) {
        let engine = SignalEngine::new(StrategyConfig::default()).unwrap();
        let record = engine.evaluate(&bars);
        prop_assert!(record.is_analyzed());

        let kinds: Vec<SignalKind> = record.signals.iter().map(|s| s.kind).collect();
        let total = kinds.len();
        for (i, kind) in kinds.iter().enumerate() {
            prop_assert!(!kinds[i + 1..].contains(kind));
        }
        prop_assert!(total >= 1);

        let momentum = record.signals.iter().filter(|s| is_momentum(s.kind)).count();
        prop_assert!(momentum <= 1);

        let expected = record.signals.iter().any(|s| s.contributes_to_notify);
        prop_assert_eq!(record.notify, expected);

        let joined: Vec<&str> = record.signal_text.split(SIGNAL_SEPARATOR).collect();
        prop_assert_eq!(joined.len(), total);
    }

    #[test]
    fn short_series_never_notify(bars in arb_series(0..60)) {
        let engine = SignalEngine::new(StrategyConfig::default()).unwrap();
        let record = engine.evaluate(&bars);
        prop_assert!(!record.is_analyzed());
        prop_assert!(!record.notify);
        prop_assert!(record.signals.is_empty());
    }

    #[test]
    fn deviation_bands_are_monotonic(a in -50.0..80.0_f64, b in -50.0..80.0_f64) {
        let rank = |pct: f64| match DeviationBand::classify(pct, 15.0, 30.0) {
            None => 0,
            Some(DeviationBand::Elevated) => 1,
            Some(DeviationBand::Severe) => 2,
        };
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(rank(lo) <= rank(hi));
    }
}
