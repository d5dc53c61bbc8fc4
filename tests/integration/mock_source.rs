//! Mock market-data source for integration testing.
//!
//! Provides a deterministic `MarketDataSource` that serves canned quotes
//! and candles from memory. State is shared through `Arc`s so a test can
//! keep a handle after the scanner takes ownership of a clone.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use breakscan::market::MarketDataSource;
use breakscan::types::{Candle, QuoteSnapshot, Resolution, ScanError};

/// A mock broker for deterministic testing.
#[derive(Clone, Default)]
pub struct MockSource {
    quotes: Arc<Mutex<HashMap<u32, QuoteSnapshot>>>,
    intraday: Arc<Mutex<HashMap<u32, Vec<Candle>>>>,
    daily: Arc<Mutex<HashMap<u32, Vec<Candle>>>>,
    /// If set, quote calls fail with this message.
    force_error: Arc<Mutex<Option<String>>>,
    /// Per-token historical failures.
    history_errors: Arc<Mutex<HashMap<u32, String>>>,
    /// Per-token artificial latency on historical calls.
    history_latency: Arc<Mutex<HashMap<u32, std::time::Duration>>>,
    history_calls: Arc<Mutex<Vec<(u32, Resolution, DateTime<FixedOffset>, DateTime<FixedOffset>)>>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_quote(&self, token: u32, ltp: f64, previous_close: f64, session_volume: u64) {
        self.quotes.lock().unwrap().insert(
            token,
            QuoteSnapshot { token, last_price: ltp, previous_close, session_volume },
        );
    }

    pub fn set_intraday(&self, token: u32, candles: Vec<Candle>) {
        self.intraday.lock().unwrap().insert(token, candles);
    }

    pub fn set_daily(&self, token: u32, candles: Vec<Candle>) {
        self.daily.lock().unwrap().insert(token, candles);
    }

    /// Force all subsequent quote calls to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn fail_history(&self, token: u32, msg: &str) {
        self.history_errors.lock().unwrap().insert(token, msg.to_string());
    }

    pub fn delay_history(&self, token: u32, by: std::time::Duration) {
        self.history_latency.lock().unwrap().insert(token, by);
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MarketDataSource for MockSource {
    async fn quotes(&self, tokens: &[u32]) -> Result<HashMap<u32, QuoteSnapshot>, ScanError> {
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(ScanError::Broker { status: 503, message: msg });
        }
        let all = self.quotes.lock().unwrap();
        Ok(tokens
            .iter()
            .filter_map(|t| all.get(t).map(|q| (*t, *q)))
            .collect())
    }

    /// Serves the stored series clipped to `[from, to]`, like the broker.
    async fn historical_candles(
        &self,
        token: u32,
        resolution: Resolution,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<Vec<Candle>, ScanError> {
        self.history_calls.lock().unwrap().push((token, resolution, from, to));

        let latency = self.history_latency.lock().unwrap().get(&token).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(msg) = self.history_errors.lock().unwrap().get(&token) {
            return Err(ScanError::HistoryFetch { token, resolution, message: msg.clone() });
        }

        let store = match resolution {
            Resolution::Intraday => &self.intraday,
            Resolution::Daily => &self.daily,
        };
        let series = store.lock().unwrap().get(&token).cloned().unwrap_or_default();
        Ok(series
            .into_iter()
            .filter(|c| c.timestamp >= from && c.timestamp <= to)
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Candle builders
// ---------------------------------------------------------------------------

pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(330 * 60).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(day: NaiveDate, h: u32, min: u32) -> DateTime<FixedOffset> {
    ist()
        .from_local_datetime(&day.and_hms_opt(h, min, 0).unwrap())
        .unwrap()
}

pub fn candle(
    ts: DateTime<FixedOffset>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
) -> Candle {
    Candle { timestamp: ts, open, high, low, close, volume }
}

/// `count` flat 5-minute candles from 09:15 on `day`.
pub fn session(day: NaiveDate, count: i64, open: f64, high: f64, low: f64, volume: u64) -> Vec<Candle> {
    let start = at(day, 9, 15);
    (0..count)
        .map(|i| candle(start + Duration::minutes(5 * i), open, high, low, open, volume))
        .collect()
}

/// `n` daily candles on consecutive days ending at `last`, all alike.
pub fn daily_history(last: NaiveDate, n: i64, close: f64, high: f64, low: f64, volume: u64) -> Vec<Candle> {
    (0..n)
        .rev()
        .map(|back| {
            let day = last - Duration::days(back);
            candle(at(day, 0, 0), close, high, low, close, volume)
        })
        .collect()
}
