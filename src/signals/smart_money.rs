//! Smart-money evaluator.
//!
//! Flags a volume-and-range expansion on the current 5-minute candle while
//! the day's net price move is still small. Independent of breakouts.

use serde::{Deserialize, Serialize};

use super::range::Side;
use crate::types::Candle;

/// Completed candles averaged against the current one.
pub const LOOKBACK_CANDLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmartMoneyConfig {
    /// Current volume must be at least this multiple of the 5-candle average.
    pub vol_mult: f64,
    /// Current high-low range must be at least this multiple of the average.
    pub range_mult: f64,
    /// Largest absolute day move (percent) still considered unexplained.
    pub max_price_move: f64,
}

impl Default for SmartMoneyConfig {
    fn default() -> Self {
        Self {
            vol_mult: 1.5,
            range_mult: 1.3,
            max_price_move: 1.2,
        }
    }
}

/// Inputs for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct SmartMoneyInput<'a> {
    /// Intraday candles, oldest first; the last one is the current candle.
    pub intraday: &'a [Candle],
    pub pct_change: f64,
    pub previous_close: f64,
    pub session_volume: u64,
    pub avg_daily_volume_5d: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SmartMoneyVerdict {
    pub flagged: bool,
    /// Set when the expansion comes with heavy session participation.
    pub bias: Option<Side>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SmartMoneyEvaluator {
    cfg: SmartMoneyConfig,
}

impl SmartMoneyEvaluator {
    pub fn new(cfg: SmartMoneyConfig) -> Self {
        Self { cfg }
    }

    pub fn evaluate(&self, input: &SmartMoneyInput<'_>) -> SmartMoneyVerdict {
        if input.pct_change.abs() > self.cfg.max_price_move {
            return SmartMoneyVerdict::default();
        }
        if input.intraday.len() < LOOKBACK_CANDLES + 1 {
            return SmartMoneyVerdict::default();
        }

        let end = input.intraday.len() - 1;
        let prior = &input.intraday[end - LOOKBACK_CANDLES..end];
        let current = &input.intraday[end];

        let n = LOOKBACK_CANDLES as f64;
        let avg_vol = prior.iter().map(|c| c.volume as f64).sum::<f64>() / n;
        let avg_rng = prior.iter().map(Candle::range).sum::<f64>() / n;

        let expansion = current.volume as f64 >= self.cfg.vol_mult * avg_vol
            && current.range() >= self.cfg.range_mult * avg_rng;
        if !expansion {
            return SmartMoneyVerdict::default();
        }

        let flagged = current.close >= input.previous_close;

        let heavy_day = input.avg_daily_volume_5d > 0.0
            && input.session_volume as f64 >= self.cfg.vol_mult * input.avg_daily_volume_5d;
        let bias = if !heavy_day {
            None
        } else if input.pct_change > 0.0 {
            Some(Side::Buy)
        } else if input.pct_change < 0.0 {
            Some(Side::Sell)
        } else {
            None
        };

        SmartMoneyVerdict { flagged, bias }
    }
}
