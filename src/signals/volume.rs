//! Session volume profile.
//!
//! Opening-candle surge against the previous session's closing candle,
//! heavy participation against the 5-day average, and Indian-unit
//! formatting for display.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::Candle;

/// Default multiple for both volume comparisons.
pub const DEFAULT_SURGE_MULT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VolumeProfile {
    /// Volume of today's first completed intraday candle.
    pub first_candle_volume: u64,
    /// Cumulative session volume from the quote.
    pub session_volume: u64,
    /// Mean daily volume over the last five completed sessions.
    pub avg_daily_volume_5d: f64,
    /// First candle traded at least `opening_mult` times the previous
    /// session's last candle.
    pub opening_surge: bool,
    /// Session volume is at least `heavy_mult` times the 5-day average.
    pub heavy_participation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeThresholds {
    pub opening_mult: f64,
    pub heavy_mult: f64,
}

impl Default for VolumeThresholds {
    fn default() -> Self {
        Self {
            opening_mult: DEFAULT_SURGE_MULT,
            heavy_mult: DEFAULT_SURGE_MULT,
        }
    }
}

/// Mean volume of the last five daily candles dated before `today`.
pub fn avg_daily_volume_5d(daily: &[Candle], today: NaiveDate) -> f64 {
    let prior: Vec<u64> = daily
        .iter()
        .filter(|c| c.session_date() < today)
        .map(|c| c.volume)
        .collect();
    let last5 = &prior[prior.len().saturating_sub(5)..];
    if last5.is_empty() {
        return 0.0;
    }
    last5.iter().sum::<u64>() as f64 / last5.len() as f64
}

/// Volume of the first candle dated `today`, 0 if none yet.
pub fn first_session_volume(intraday: &[Candle], today: NaiveDate) -> u64 {
    intraday
        .iter()
        .find(|c| c.session_date() == today)
        .map(|c| c.volume)
        .unwrap_or(0)
}

/// Volume of the last candle dated before `today`, if the series reaches
/// back that far.
pub fn last_volume_before(intraday: &[Candle], today: NaiveDate) -> Option<u64> {
    intraday
        .iter()
        .rev()
        .find(|c| c.session_date() < today)
        .map(|c| c.volume)
}

/// `prior_last_volume` is the previous session's closing-candle volume;
/// `None` disables the opening-surge check.
pub fn profile(
    first_candle_volume: u64,
    prior_last_volume: Option<u64>,
    session_volume: u64,
    avg_daily_volume_5d: f64,
    thresholds: VolumeThresholds,
) -> VolumeProfile {
    let opening_surge = prior_last_volume.is_some_and(|prior| {
        prior > 0 && first_candle_volume as f64 >= thresholds.opening_mult * prior as f64
    });
    let heavy_participation = avg_daily_volume_5d > 0.0
        && session_volume as f64 >= thresholds.heavy_mult * avg_daily_volume_5d;

    VolumeProfile {
        first_candle_volume,
        session_volume,
        avg_daily_volume_5d,
        opening_surge,
        heavy_participation,
    }
}

/// Format a volume in crore / lakh / thousand units.
pub fn format_volume(v: u64) -> String {
    let f = v as f64;
    if v >= 10_000_000 {
        format!("{:.2} Cr", f / 10_000_000.0)
    } else if v >= 100_000 {
        format!("{:.2} L", f / 100_000.0)
    } else if v >= 1_000 {
        format!("{:.1} K", f / 1_000.0)
    } else {
        v.to_string()
    }
}
