//! Multi-timeframe breakout detector.
//!
//! For every configured timeframe, compares the last traded price against
//! the high/low of the trailing window of completed candles (the latest,
//! in-progress candle is never part of its own window). Each
//! `(symbol, timeframe, direction)` fires at most once: the detector owns a
//! [`BreakMemory`] and checks-and-sets it in one step.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use super::timeframe::TimeframeSpec;
use crate::types::{BreakoutAlert, Candle, Direction, Resolution};

// ---------------------------------------------------------------------------
// Break memory
// ---------------------------------------------------------------------------

/// When (if ever) fired breakouts are forgotten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetPolicy {
    /// Single-shot for the life of the process.
    #[default]
    Never,
    /// Forget everything when the exchange-local date rolls over.
    Daily,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BreakKey {
    pub symbol: String,
    pub timeframe: String,
    pub direction: Direction,
}

impl BreakKey {
    pub fn new(symbol: &str, timeframe: &str, direction: Direction) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            direction,
        }
    }
}

/// Set of breakouts already alerted. Entries are only ever added, except
/// by an explicit `ResetPolicy::Daily` rollover.
#[derive(Debug, Default)]
pub struct BreakMemory {
    fired: HashSet<BreakKey>,
    policy: ResetPolicy,
    session: Option<NaiveDate>,
}

impl BreakMemory {
    pub fn new(policy: ResetPolicy) -> Self {
        Self {
            fired: HashSet::new(),
            policy,
            session: None,
        }
    }

    pub fn has_fired(&self, key: &BreakKey) -> bool {
        self.fired.contains(key)
    }

    /// Mark `key` as fired. Returns `true` only the first time.
    pub fn try_fire(&mut self, key: BreakKey) -> bool {
        self.fired.insert(key)
    }

    /// Record the session date of the cycle about to run, applying the
    /// reset policy on a date change.
    pub fn begin_session(&mut self, date: NaiveDate) {
        let rolled = self.session.is_some_and(|d| d != date);
        if rolled && self.policy == ResetPolicy::Daily {
            info!(
                previous = ?self.session,
                current = %date,
                cleared = self.fired.len(),
                "New session, clearing break memory"
            );
            self.fired.clear();
        }
        self.session = Some(date);
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }

    pub fn policy(&self) -> ResetPolicy {
        self.policy
    }
}

// ---------------------------------------------------------------------------
// Window helpers
// ---------------------------------------------------------------------------

/// The `n` candles immediately preceding the last one, or `None` when the
/// series holds fewer than `n + 1` candles.
pub fn trailing_window(series: &[Candle], n: usize) -> Option<&[Candle]> {
    if n == 0 || series.len() < n + 1 {
        return None;
    }
    let end = series.len() - 1;
    Some(&series[end - n..end])
}

/// `(max high, min low)` over a non-empty window.
pub fn window_extremes(window: &[Candle]) -> Option<(f64, f64)> {
    let first = window.first()?;
    Some(window.iter().fold((first.high, first.low), |(hi, lo), c| {
        (hi.max(c.high), lo.min(c.low))
    }))
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct BreakoutDetector {
    catalog: Vec<TimeframeSpec>,
    memory: BreakMemory,
}

impl BreakoutDetector {
    pub fn new(catalog: Vec<TimeframeSpec>, policy: ResetPolicy) -> Self {
        Self::with_memory(catalog, BreakMemory::new(policy))
    }

    pub fn with_memory(catalog: Vec<TimeframeSpec>, memory: BreakMemory) -> Self {
        Self { catalog, memory }
    }

    pub fn memory(&self) -> &BreakMemory {
        &self.memory
    }

    /// Call once at the start of every cycle.
    pub fn begin_cycle(&mut self, session: NaiveDate) {
        self.memory.begin_session(session);
    }

    /// Evaluate every timeframe for one symbol and return the alerts that
    /// fired for the first time. Timeframes without enough history are
    /// skipped silently.
    pub fn detect(
        &mut self,
        symbol: &str,
        ltp: f64,
        intraday: &[Candle],
        daily: &[Candle],
        now: DateTime<FixedOffset>,
    ) -> Vec<BreakoutAlert> {
        let mut alerts = Vec::new();

        for tf in &self.catalog {
            let series = match tf.kind {
                Resolution::Intraday => intraday,
                Resolution::Daily => daily,
            };

            let Some((high, low)) = trailing_window(series, tf.window).and_then(window_extremes)
            else {
                debug!(symbol, tf = %tf.label, have = series.len(), need = tf.window + 1, "Skipping timeframe, not enough candles");
                continue;
            };

            if ltp > high
                && self.memory.try_fire(BreakKey::new(symbol, &tf.label, Direction::High))
            {
                alerts.push(BreakoutAlert {
                    symbol: symbol.to_string(),
                    timeframe: tf.label.clone(),
                    direction: Direction::High,
                    ltp,
                    level: high,
                    fired_at: now,
                });
            }

            if ltp < low && self.memory.try_fire(BreakKey::new(symbol, &tf.label, Direction::Low)) {
                alerts.push(BreakoutAlert {
                    symbol: symbol.to_string(),
                    timeframe: tf.label.clone(),
                    direction: Direction::Low,
                    ltp,
                    level: low,
                    fired_at: now,
                });
            }
        }

        if !alerts.is_empty() {
            info!(symbol, count = alerts.len(), ltp, "Breakouts fired");
        }

        alerts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
