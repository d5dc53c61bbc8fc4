//! Timeframe catalog.
//!
//! Each timeframe names a trailing window of completed candles at one
//! resolution. The default catalog covers 5 minutes through 6 months.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{Resolution, ScanError};

/// One entry of the timeframe catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeSpec {
    pub label: String,
    pub kind: Resolution,
    /// Number of completed candles in the window (current candle excluded).
    pub window: usize,
}

impl TimeframeSpec {
    pub fn intraday(label: &str, window: usize) -> Self {
        Self { label: label.to_string(), kind: Resolution::Intraday, window }
    }

    pub fn daily(label: &str, window: usize) -> Self {
        Self { label: label.to_string(), kind: Resolution::Daily, window }
    }
}

/// The default catalog, in evaluation order.
pub fn default_catalog() -> Vec<TimeframeSpec> {
    use TimeframeSpec as T;
    vec![
        T::intraday("5m", 1),
        T::intraday("10m", 2),
        T::intraday("15m", 3),
        T::intraday("30m", 6),
        T::intraday("1h", 12),
        T::intraday("2h", 24),
        T::intraday("3h", 36),
        T::intraday("4h", 48),
        T::intraday("5h", 60),
        T::intraday("6h", 72),
        T::daily("1D", 1),
        T::daily("2D", 2),
        T::daily("3D", 3),
        T::daily("4D", 4),
        T::daily("5D", 5),
        T::daily("6D", 6),
        T::daily("7D", 7),
        T::daily("1W", 5),
        T::daily("2W", 10),
        T::daily("3W", 15),
        T::daily("4W", 20),
        T::daily("1M", 21),
        T::daily("2M", 42),
        T::daily("3M", 63),
        T::daily("4M", 84),
        T::daily("5M", 105),
        T::daily("6M", 126),
    ]
}

/// Deepest window of the given resolution (0 when none configured).
pub fn max_window(catalog: &[TimeframeSpec], kind: Resolution) -> usize {
    catalog
        .iter()
        .filter(|tf| tf.kind == kind)
        .map(|tf| tf.window)
        .max()
        .unwrap_or(0)
}

/// Reject empty catalogs, duplicate labels and zero-length windows.
pub fn validate_catalog(catalog: &[TimeframeSpec]) -> Result<(), ScanError> {
    if catalog.is_empty() {
        return Err(ScanError::Config("timeframe catalog is empty".into()));
    }

    let mut seen = HashSet::new();
    for tf in catalog {
        if tf.label.trim().is_empty() {
            return Err(ScanError::Config("timeframe with empty label".into()));
        }
        if tf.window == 0 {
            return Err(ScanError::Config(format!(
                "timeframe {} has a zero-length window",
                tf.label
            )));
        }
        if !seen.insert(tf.label.as_str()) {
            return Err(ScanError::Config(format!("duplicate timeframe label {}", tf.label)));
        }
    }
    Ok(())
}
