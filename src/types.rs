//! Shared types for the BREAKSCAN scanner.
//!
//! These types form the data model used across all modules.
//! They are kept free of I/O so that market-data, signal and engine
//! modules can depend on them without circular references.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Instruments
// ---------------------------------------------------------------------------

/// A tradable instrument from the broker's instrument dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Exchange trading symbol, e.g. "INFY".
    pub symbol: String,
    /// Opaque broker token used for quote/history calls.
    pub token: u32,
    pub exchange: String,
    pub instrument_type: String,
}

// ---------------------------------------------------------------------------
// Candles & quotes
// ---------------------------------------------------------------------------

/// Candle resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// 5-minute intraday candles.
    #[serde(alias = "intraday5m", alias = "5minute")]
    Intraday,
    /// End-of-day candles.
    #[serde(alias = "day")]
    Daily,
}

impl Resolution {
    /// Interval name on the broker's historical-data endpoint.
    pub fn interval(&self) -> &'static str {
        match self {
            Resolution::Intraday => "5minute",
            Resolution::Daily => "day",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Intraday => write!(f, "intraday"),
            Resolution::Daily => write!(f, "daily"),
        }
    }
}

/// An OHLCV aggregate over one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, exchange-local.
    pub timestamp: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Candle {
    /// High minus low.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Exchange-local date the candle belongs to.
    pub fn session_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Live quote for one instrument, superseded every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub token: u32,
    pub last_price: f64,
    pub previous_close: f64,
    /// Cumulative traded volume for the session so far.
    pub session_volume: u64,
}

impl QuoteSnapshot {
    /// Percentage change from the previous close, rounded to 2 decimals.
    /// Returns `None` when the previous close is unusable.
    pub fn pct_change(&self) -> Option<f64> {
        pct_move(self.previous_close, self.last_price)
    }
}

/// `(to - from) / from * 100`, rounded to 2 decimals.
pub fn pct_move(from: f64, to: f64) -> Option<f64> {
    if from <= 0.0 || !from.is_finite() || !to.is_finite() {
        return None;
    }
    Some(round2((to - from) / from * 100.0))
}

/// Round to 2 decimal places.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Breakouts
// ---------------------------------------------------------------------------

/// Which side of a trailing window was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    High,
    Low,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::High => write!(f, "HIGH"),
            Direction::Low => write!(f, "LOW"),
        }
    }
}

/// A breakout fired for the first time in this process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutAlert {
    pub symbol: String,
    /// Timeframe label, e.g. "1h" or "3M".
    pub timeframe: String,
    pub direction: Direction,
    pub ltp: f64,
    /// The window high (for HIGH) or window low (for LOW) that was crossed.
    pub level: f64,
    pub fired_at: DateTime<FixedOffset>,
}

impl fmt::Display for BreakoutAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} broke {} {} at {:.2} (level {:.2})",
            self.symbol, self.timeframe, self.direction, self.ltp, self.level,
        )
    }
}

// ---------------------------------------------------------------------------
// Per-symbol outcomes
// ---------------------------------------------------------------------------

/// Why a symbol contributed nothing (or only partially) to a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The quote batch had no entry for this token.
    NoQuote,
    /// Today's session has not printed a completed candle yet.
    NoSessionCandle,
    /// No prior-session daily candle to compare against.
    InsufficientHistory,
    /// An upstream call exceeded its deadline.
    Timeout,
    /// Any other upstream failure.
    Upstream(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoQuote => write!(f, "no quote"),
            SkipReason::NoSessionCandle => write!(f, "no session candle yet"),
            SkipReason::InsufficientHistory => write!(f, "insufficient history"),
            SkipReason::Timeout => write!(f, "upstream timeout"),
            SkipReason::Upstream(msg) => write!(f, "upstream error: {msg}"),
        }
    }
}

/// A symbol dropped from the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub reason: SkipReason,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for BREAKSCAN.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Quote fetch failed: {0}")]
    QuoteFetch(String),

    #[error("Historical fetch failed for token {token} ({resolution}): {message}")]
    HistoryFetch {
        token: u32,
        resolution: Resolution,
        message: String,
    },

    #[error("Upstream call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Broker API error ({status}): {message}")]
    Broker { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScanError {
    /// Map an upstream failure onto the per-symbol skip taxonomy.
    pub fn skip_reason(&self) -> SkipReason {
        match self {
            ScanError::Timeout(_) => SkipReason::Timeout,
            other => SkipReason::Upstream(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
