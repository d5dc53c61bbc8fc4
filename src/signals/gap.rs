//! Gap classifier.
//!
//! Compares today's opening print to the prior session. A gap needs both
//! the percentage threshold and a clean break of the prior session's range.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{pct_move, Candle};

/// Default gap threshold in percent.
pub const DEFAULT_GAP_THRESHOLD_PCT: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapKind {
    GapUp,
    GapDown,
    None,
}

impl fmt::Display for GapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapKind::GapUp => write!(f, "GAP-UP"),
            GapKind::GapDown => write!(f, "GAP-DOWN"),
            GapKind::None => write!(f, "NONE"),
        }
    }
}

/// Classification plus the measured gap for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapReading {
    pub kind: GapKind,
    pub gap_pct: f64,
}

/// The prior session's reference levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorSession {
    pub close: f64,
    pub high: f64,
    pub low: f64,
}

impl From<&Candle> for PriorSession {
    fn from(c: &Candle) -> Self {
        Self { close: c.close, high: c.high, low: c.low }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GapClassifier {
    threshold_pct: f64,
}

impl Default for GapClassifier {
    fn default() -> Self {
        Self { threshold_pct: DEFAULT_GAP_THRESHOLD_PCT }
    }
}

impl GapClassifier {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    /// Classify a session given its opening price and the prior session.
    ///
    /// Returns `None` if the prior close is unusable.
    pub fn classify(&self, today_open: f64, prior: PriorSession) -> Option<GapReading> {
        let gap_pct = pct_move(prior.close, today_open)?;

        let kind = if gap_pct >= self.threshold_pct && today_open > prior.high {
            GapKind::GapUp
        } else if gap_pct <= -self.threshold_pct && today_open < prior.low {
            GapKind::GapDown
        } else {
            GapKind::None
        };

        Some(GapReading { kind, gap_pct })
    }
}
