//! End-to-end scan cycles against the mock broker.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use std::sync::{Arc, Mutex};

use breakscan::alerts::{AlertDispatcher, AlertSink};
use breakscan::engine::clock::FixedClock;
use breakscan::engine::scanner::{Scanner, ScannerSettings};
use breakscan::market::throttle::{BackpressurePolicy, ThrottledSource};
use breakscan::signals::breakout::ResetPolicy;
use breakscan::signals::gap::GapKind;
use breakscan::signals::sentiment::Sentiment;
use breakscan::signals::timeframe::TimeframeSpec;
use breakscan::types::{Direction, Instrument, ScanError, SkipReason};

use super::mock_source::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn today() -> NaiveDate {
    date(2026, 3, 4)
}

fn now() -> DateTime<FixedOffset> {
    at(today(), 11, 0)
}

fn instrument(symbol: &str, token: u32) -> Instrument {
    Instrument {
        symbol: symbol.into(),
        token,
        exchange: "NSE".into(),
        instrument_type: "EQ".into(),
    }
}

/// Prior sessions close at 100 within 99..101; today's daily candle opens
/// at `open`.
fn seed_daily(source: &MockSource, token: u32, day: NaiveDate, open: f64) {
    let mut daily = daily_history(day - Duration::days(1), 10, 100.0, 101.0, 99.0, 1_000_000);
    daily.push(candle(at(day, 0, 0), open, open + 0.5, open - 0.5, open, 500_000));
    source.set_daily(token, daily);
}

/// Twenty flat session candles (09:15 to 10:50) around `open`.
fn seed_session(source: &MockSource, token: u32, day: NaiveDate, open: f64) {
    source.set_intraday(token, session(day, 20, open, open + 0.3, open - 0.3, 10_000));
}

fn make_scanner(
    source: &MockSource,
    universe: Vec<Instrument>,
    timeframes: Vec<TimeframeSpec>,
    reset_policy: ResetPolicy,
) -> (Scanner, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(now()));
    let settings = ScannerSettings {
        timeframes,
        reset_policy,
        ..ScannerSettings::default()
    };
    let scanner = Scanner::new(Box::new(source.clone()), clock.clone(), universe, settings);
    (scanner, clock)
}

fn hourly_only() -> Vec<TimeframeSpec> {
    vec![TimeframeSpec::intraday("1h", 12)]
}

/// Collects every delivered message.
#[derive(Default, Clone)]
struct CollectingSink {
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl AlertSink for CollectingSink {
    async fn deliver(&self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collecting"
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tier_one_buy_and_gap_up_are_exclusive() {
    let source = MockSource::new();

    // INFY: opens inside yesterday's range, up 2% on the day.
    source.set_quote(1, 102.0, 100.0, 100_000);
    seed_session(&source, 1, today(), 100.5);
    seed_daily(&source, 1, today(), 100.5);

    // TCS: opens at 103 over a prior high of 101, up 3.2% on the day.
    source.set_quote(2, 103.2, 100.0, 100_000);
    seed_session(&source, 2, today(), 103.0);
    seed_daily(&source, 2, today(), 103.0);

    let universe = vec![instrument("INFY", 1), instrument("TCS", 2)];
    let (mut scanner, _) = make_scanner(&source, universe, hourly_only(), ResetPolicy::Never);
    let snap = scanner.run_cycle().await.unwrap();

    assert_eq!(snap.gap_up.len(), 1);
    assert_eq!(snap.gap_up[0].symbol, "TCS");
    assert_eq!(snap.gap_up[0].gap.kind, GapKind::GapUp);
    assert_eq!(snap.gap_up[0].gap.gap_pct, 3.0);

    let t1: Vec<_> = snap.ranges.t1_buy.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(t1, vec!["INFY"]);
    assert_eq!(snap.ranges.t1_buy[0].pct_change, 2.0);
    assert_eq!(snap.ranges.len(), 1);
    assert!(snap.failures.is_empty());
}

#[tokio::test]
async fn test_gap_needs_open_beyond_prior_extreme() {
    let source = MockSource::new();
    source.set_quote(1, 101.0, 100.0, 100_000);
    seed_session(&source, 1, today(), 101.6);
    // Prior high 102: a 1.6% open is not above it.
    let mut daily = daily_history(today() - Duration::days(1), 5, 100.0, 102.0, 99.0, 1_000_000);
    daily.push(candle(at(today(), 0, 0), 101.6, 102.0, 100.5, 101.0, 500_000));
    source.set_daily(1, daily);

    let (mut scanner, _) =
        make_scanner(&source, vec![instrument("SBIN", 1)], hourly_only(), ResetPolicy::Never);
    let snap = scanner.run_cycle().await.unwrap();

    assert!(snap.gap_up.is_empty());
    assert_eq!(snap.ranges.t3_buy.len(), 1);
    assert_eq!(snap.ranges.t3_buy[0].gap.kind, GapKind::None);
    assert_eq!(snap.ranges.t3_buy[0].gap.gap_pct, 1.6);
}

#[tokio::test]
async fn test_gap_down_sorted_most_negative_first() {
    let source = MockSource::new();
    for (token, open) in [(1, 97.5), (2, 95.0)] {
        source.set_quote(token, open, 100.0, 100_000);
        seed_session(&source, token, today(), open);
        seed_daily(&source, token, today(), open);
    }

    let universe = vec![instrument("A", 1), instrument("B", 2)];
    let (mut scanner, _) = make_scanner(&source, universe, hourly_only(), ResetPolicy::Never);
    let snap = scanner.run_cycle().await.unwrap();

    let order: Vec<_> = snap.gap_down.iter().map(|r| (r.symbol.as_str(), r.gap.gap_pct)).collect();
    assert_eq!(order, vec![("B", -5.0), ("A", -2.5)]);
    assert!(snap.gap_down.iter().all(|r| !r.volume.opening_surge));
    assert!(snap.ranges.is_empty());
}

#[tokio::test]
async fn test_sentiment_tie_is_sideways() {
    let source = MockSource::new();
    for (token, ltp) in [(1, 101.0), (2, 99.0)] {
        source.set_quote(token, ltp, 100.0, 100_000);
        seed_session(&source, token, today(), 100.0);
        seed_daily(&source, token, today(), 100.0);
    }

    let universe = vec![instrument("UP", 1), instrument("DOWN", 2)];
    let (mut scanner, _) = make_scanner(&source, universe, hourly_only(), ResetPolicy::Never);
    let snap = scanner.run_cycle().await.unwrap();

    assert_eq!(snap.breadth.sentiment, Sentiment::Sideways);
    assert_eq!(snap.gainers[0].symbol, "UP");
    assert_eq!(snap.losers[0].symbol, "DOWN");
}

// ---------------------------------------------------------------------------
// Breakouts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_hourly_breakout_fires_once() {
    let source = MockSource::new();
    source.set_quote(1, 151.0, 149.0, 100_000);
    source.set_intraday(1, session(today(), 20, 149.0, 150.0, 148.0, 10_000));
    let mut daily = daily_history(today() - Duration::days(1), 10, 149.0, 155.0, 140.0, 1_000_000);
    daily.push(candle(at(today(), 0, 0), 149.0, 151.0, 148.0, 151.0, 500_000));
    source.set_daily(1, daily);

    let (mut scanner, _) =
        make_scanner(&source, vec![instrument("INFY", 1)], hourly_only(), ResetPolicy::Never);

    let first = scanner.run_cycle().await.unwrap();
    assert_eq!(first.breakouts.len(), 1);
    let alert = &first.breakouts[0];
    assert_eq!(alert.timeframe, "1h");
    assert_eq!(alert.direction, Direction::High);
    assert_eq!(alert.level, 150.0);
    assert_eq!(alert.ltp, 151.0);

    source.set_quote(1, 152.0, 149.0, 100_000);
    let second = scanner.run_cycle().await.unwrap();
    assert!(second.breakouts.is_empty());
    assert_eq!(scanner.break_memory().len(), 1);
}

#[tokio::test]
async fn test_short_history_skips_only_deep_timeframes() {
    let source = MockSource::new();
    source.set_quote(1, 110.0, 100.0, 100_000);
    seed_session(&source, 1, today(), 100.5);
    seed_daily(&source, 1, today(), 100.5);

    let catalog = vec![
        TimeframeSpec::intraday("5m", 1),
        TimeframeSpec::daily("1D", 1),
        TimeframeSpec::daily("1M", 21),
    ];
    let (mut scanner, _) =
        make_scanner(&source, vec![instrument("INFY", 1)], catalog, ResetPolicy::Never);
    let snap = scanner.run_cycle().await.unwrap();

    let labels: Vec<_> = snap.breakouts.iter().map(|b| b.timeframe.as_str()).collect();
    assert_eq!(labels, vec!["5m", "1D"]);
}

#[tokio::test]
async fn test_daily_reset_allows_refire_next_session() {
    let source = MockSource::new();
    source.set_quote(1, 102.0, 100.0, 100_000);
    seed_session(&source, 1, today(), 100.5);
    seed_daily(&source, 1, today(), 100.5);

    let (mut scanner, clock) =
        make_scanner(&source, vec![instrument("INFY", 1)], hourly_only(), ResetPolicy::Daily);
    assert_eq!(scanner.run_cycle().await.unwrap().breakouts.len(), 1);
    assert!(scanner.run_cycle().await.unwrap().breakouts.is_empty());

    let tomorrow = today() + Duration::days(1);
    clock.advance(Duration::days(1));
    seed_session(&source, 1, tomorrow, 100.5);
    seed_daily(&source, 1, tomorrow, 100.5);

    assert_eq!(scanner.run_cycle().await.unwrap().breakouts.len(), 1);
}

#[tokio::test]
async fn test_never_reset_stays_silent_next_session() {
    let source = MockSource::new();
    source.set_quote(1, 102.0, 100.0, 100_000);
    seed_session(&source, 1, today(), 100.5);
    seed_daily(&source, 1, today(), 100.5);

    let (mut scanner, clock) =
        make_scanner(&source, vec![instrument("INFY", 1)], hourly_only(), ResetPolicy::Never);
    assert_eq!(scanner.run_cycle().await.unwrap().breakouts.len(), 1);

    let tomorrow = today() + Duration::days(1);
    clock.advance(Duration::days(1));
    seed_session(&source, 1, tomorrow, 100.5);
    seed_daily(&source, 1, tomorrow, 100.5);

    assert!(scanner.run_cycle().await.unwrap().breakouts.is_empty());
}

// ---------------------------------------------------------------------------
// Volume and smart money
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_opening_surge_uses_prior_session_fetch() {
    let source = MockSource::new();
    source.set_quote(1, 102.0, 100.0, 100_000);

    // Yesterday's close is far outside the 520-minute window.
    let yesterday = today() - Duration::days(1);
    let mut intraday = vec![candle(at(yesterday, 15, 25), 100.0, 100.2, 99.8, 100.0, 1_000)];
    intraday.extend(session(today(), 20, 100.5, 100.8, 100.2, 2_000));
    source.set_intraday(1, intraday);
    seed_daily(&source, 1, today(), 100.5);

    let (mut scanner, _) =
        make_scanner(&source, vec![instrument("INFY", 1)], hourly_only(), ResetPolicy::Never);
    let snap = scanner.run_cycle().await.unwrap();

    let row = &snap.ranges.t1_buy[0];
    assert_eq!(row.volume.first_candle_volume, 2_000);
    assert!(row.volume.opening_surge);
    // intraday + daily + prior session
    assert_eq!(source.history_calls(), 3);

    // The prior session is already held; only the trailing series refresh.
    let snap = scanner.run_cycle().await.unwrap();
    assert!(snap.ranges.t1_buy[0].volume.opening_surge);
    assert_eq!(source.history_calls(), 5);
}

#[tokio::test]
async fn test_smart_money_tag_reaches_gainers() {
    let source = MockSource::new();
    source.set_quote(1, 100.8, 100.0, 100_000);

    let mut intraday = session(today(), 19, 100.3, 100.6, 100.0, 1_000);
    let last = intraday.last().unwrap().timestamp + Duration::minutes(5);
    intraday.push(candle(last, 100.0, 101.0, 99.9, 100.8, 3_000));
    source.set_intraday(1, intraday);
    seed_daily(&source, 1, today(), 100.3);

    let (mut scanner, _) =
        make_scanner(&source, vec![instrument("HDFCBANK", 1)], hourly_only(), ResetPolicy::Never);
    let snap = scanner.run_cycle().await.unwrap();

    assert!(snap.ranges.t3_buy[0].smart_money.flagged);
    assert!(snap.gainers[0].smart_money);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_quote_outage_fails_cycle_then_recovers() {
    let source = MockSource::new();
    source.set_quote(1, 102.0, 100.0, 100_000);
    seed_session(&source, 1, today(), 100.5);
    seed_daily(&source, 1, today(), 100.5);

    let (mut scanner, _) =
        make_scanner(&source, vec![instrument("INFY", 1)], hourly_only(), ResetPolicy::Never);

    source.set_error("gateway timeout");
    let err = scanner.run_cycle().await.unwrap_err();
    assert!(matches!(err, ScanError::QuoteFetch(_)));
    assert!(scanner.break_memory().is_empty());

    source.clear_error();
    let snap = scanner.run_cycle().await.unwrap();
    assert_eq!(snap.cycle_number, 2);
    assert_eq!(snap.breakouts.len(), 1);
}

#[tokio::test]
async fn test_symbol_failures_are_isolated() {
    let source = MockSource::new();
    for token in [1, 2, 3] {
        source.set_quote(token, 101.0, 100.0, 100_000);
        seed_session(&source, token, today(), 100.5);
        seed_daily(&source, token, today(), 100.5);
    }
    source.fail_history(2, "bad token");
    source.set_intraday(3, Vec::new());

    let universe = vec![
        instrument("OK", 1),
        instrument("BROKEN", 2),
        instrument("EARLY", 3),
        instrument("UNQUOTED", 4),
    ];
    let (mut scanner, _) = make_scanner(&source, universe, hourly_only(), ResetPolicy::Never);
    let snap = scanner.run_cycle().await.unwrap();

    assert_eq!(snap.symbols_evaluated, 1);
    let reasons: Vec<_> = snap.failures.iter().map(|f| (f.symbol.as_str(), f.reason.clone())).collect();
    assert!(matches!(reasons[0], ("BROKEN", SkipReason::Upstream(_))));
    assert_eq!(reasons[1], ("EARLY", SkipReason::NoSessionCandle));
    assert_eq!(reasons[2], ("UNQUOTED", SkipReason::NoQuote));
    // Quote-only symbols still count toward breadth.
    assert_eq!(snap.breadth.advancing, 3);
}

#[tokio::test]
async fn test_slow_history_times_out_per_symbol() {
    let source = MockSource::new();
    for token in [1, 2] {
        source.set_quote(token, 101.0, 100.0, 100_000);
        seed_session(&source, token, today(), 100.5);
        seed_daily(&source, token, today(), 100.5);
    }
    source.delay_history(2, std::time::Duration::from_millis(500));

    let throttled = ThrottledSource::new(
        source.clone(),
        BackpressurePolicy {
            history_delay: std::time::Duration::ZERO,
            call_timeout: std::time::Duration::from_millis(50),
        },
    );
    let clock = Arc::new(FixedClock::new(now()));
    let settings = ScannerSettings { timeframes: hourly_only(), ..ScannerSettings::default() };
    let mut scanner = Scanner::new(
        Box::new(throttled),
        clock,
        vec![instrument("FAST", 1), instrument("SLOW", 2)],
        settings,
    );

    let snap = scanner.run_cycle().await.unwrap();
    assert_eq!(snap.symbols_evaluated, 1);
    assert_eq!(snap.failures[0].symbol, "SLOW");
    assert_eq!(snap.failures[0].reason, SkipReason::Timeout);
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_breakout_alert_delivered_once() {
    let source = MockSource::new();
    source.set_quote(1, 151.0, 149.0, 100_000);
    source.set_intraday(1, session(today(), 20, 149.0, 150.0, 148.0, 10_000));
    seed_daily(&source, 1, today(), 149.0);

    let (mut scanner, _) =
        make_scanner(&source, vec![instrument("INFY", 1)], hourly_only(), ResetPolicy::Never);
    let sink = CollectingSink::default();
    let dispatcher = AlertDispatcher::new(Arc::new(sink.clone()), false, 20);

    for _ in 0..3 {
        let snap = scanner.run_cycle().await.unwrap();
        dispatcher.dispatch(&snap).await;
    }

    let sent = sink.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("🚀 *INFY* BREAKS *1h HIGH*"));
    assert!(sent[0].contains("📈 Prev High: ₹150.00"));
}
