//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API key, bot token) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`. Everything here is
//! fixed for the life of the process.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::candles::{DEFAULT_DAILY_LOOKBACK_DAYS, DEFAULT_INTRADAY_LOOKBACK_MINUTES};
use crate::engine::scanner::ScannerSettings;
use crate::market::throttle::BackpressurePolicy;
use crate::signals::breakout::ResetPolicy;
use crate::signals::gap::DEFAULT_GAP_THRESHOLD_PCT;
use crate::signals::smart_money::SmartMoneyConfig;
use crate::signals::timeframe::{default_catalog, validate_catalog, TimeframeSpec};
use crate::signals::volume::{VolumeThresholds, DEFAULT_SURGE_MULT};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub candles: CandlesConfig,
    #[serde(default)]
    pub breakouts: BreakoutsConfig,
    pub broker: BrokerConfig,
    pub universe: UniverseConfig,
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    /// Overrides the built-in timeframe catalog when present.
    #[serde(default)]
    pub timeframes: Option<Vec<TimeframeSpec>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub name: String,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Pause before each historical-data request.
    #[serde(default = "default_history_delay")]
    pub history_delay_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Exchange-local offset from UTC.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignalsConfig {
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold_pct: f64,
    #[serde(default = "default_vol_mult")]
    pub vol_mult: f64,
    #[serde(default = "default_range_mult")]
    pub range_mult: f64,
    #[serde(default = "default_max_price_move")]
    pub max_price_move: f64,
    #[serde(default = "default_surge_mult")]
    pub opening_surge_mult: f64,
    #[serde(default = "default_surge_mult")]
    pub heavy_volume_mult: f64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            gap_threshold_pct: default_gap_threshold(),
            vol_mult: default_vol_mult(),
            range_mult: default_range_mult(),
            max_price_move: default_max_price_move(),
            opening_surge_mult: default_surge_mult(),
            heavy_volume_mult: default_surge_mult(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CandlesConfig {
    #[serde(default = "default_intraday_lookback")]
    pub intraday_lookback_minutes: i64,
    #[serde(default = "default_daily_lookback")]
    pub daily_lookback_days: i64,
}

impl Default for CandlesConfig {
    fn default() -> Self {
        Self {
            intraday_lookback_minutes: default_intraday_lookback(),
            daily_lookback_days: default_daily_lookback(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BreakoutsConfig {
    #[serde(default)]
    pub reset_policy: ResetPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    pub api_key_env: String,
    /// File holding the day's access token.
    pub access_token_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UniverseConfig {
    pub instruments_path: String,
    pub watchlist_path: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_instrument_type")]
    pub instrument_type: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    /// One chat id per line.
    pub subscribers_path: Option<String>,
    #[serde(default = "default_true")]
    pub send_market_summary: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token_env: None,
            subscribers_path: None,
            send_market_summary: true,
        }
    }
}

fn default_scan_interval() -> u64 {
    180
}
fn default_top_n() -> usize {
    20
}
fn default_history_delay() -> u64 {
    350
}
fn default_request_timeout() -> u64 {
    10
}
fn default_utc_offset() -> i32 {
    crate::engine::clock::IST_OFFSET_MINUTES
}
fn default_gap_threshold() -> f64 {
    DEFAULT_GAP_THRESHOLD_PCT
}
fn default_vol_mult() -> f64 {
    1.5
}
fn default_range_mult() -> f64 {
    1.3
}
fn default_max_price_move() -> f64 {
    1.2
}
fn default_surge_mult() -> f64 {
    DEFAULT_SURGE_MULT
}
fn default_intraday_lookback() -> i64 {
    DEFAULT_INTRADAY_LOOKBACK_MINUTES
}
fn default_daily_lookback() -> i64 {
    DEFAULT_DAILY_LOOKBACK_DAYS
}
fn default_exchange() -> String {
    "NSE".to_string()
}
fn default_instrument_type() -> Option<String> {
    Some("EQ".to_string())
}
fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Reject settings the scanner cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scanner.scan_interval_secs == 0 {
            bail!("scanner.scan_interval_secs must be positive");
        }
        if self.scanner.top_n == 0 {
            bail!("scanner.top_n must be positive");
        }
        if self.scanner.request_timeout_secs == 0 {
            bail!("scanner.request_timeout_secs must be positive");
        }

        let s = &self.signals;
        for (name, value) in [
            ("gap_threshold_pct", s.gap_threshold_pct),
            ("vol_mult", s.vol_mult),
            ("range_mult", s.range_mult),
            ("max_price_move", s.max_price_move),
            ("opening_surge_mult", s.opening_surge_mult),
            ("heavy_volume_mult", s.heavy_volume_mult),
        ] {
            if !(value.is_finite() && value > 0.0) {
                bail!("signals.{name} must be a positive number, got {value}");
            }
        }

        if self.candles.intraday_lookback_minutes <= 0 || self.candles.daily_lookback_days <= 0 {
            bail!("candle lookbacks must be positive");
        }

        validate_catalog(&self.timeframe_catalog())?;
        Ok(())
    }

    /// The configured catalog, or the built-in one.
    pub fn timeframe_catalog(&self) -> Vec<TimeframeSpec> {
        self.timeframes.clone().unwrap_or_else(default_catalog)
    }

    pub fn scanner_settings(&self) -> ScannerSettings {
        ScannerSettings {
            top_n: self.scanner.top_n,
            gap_threshold_pct: self.signals.gap_threshold_pct,
            smart_money: SmartMoneyConfig {
                vol_mult: self.signals.vol_mult,
                range_mult: self.signals.range_mult,
                max_price_move: self.signals.max_price_move,
            },
            volume: VolumeThresholds {
                opening_mult: self.signals.opening_surge_mult,
                heavy_mult: self.signals.heavy_volume_mult,
            },
            timeframes: self.timeframe_catalog(),
            reset_policy: self.breakouts.reset_policy,
            intraday_lookback_minutes: self.candles.intraday_lookback_minutes,
            daily_lookback_days: self.candles.daily_lookback_days,
        }
    }

    pub fn backpressure(&self) -> BackpressurePolicy {
        BackpressurePolicy {
            history_delay: Duration::from_millis(self.scanner.history_delay_ms),
            call_timeout: Duration::from_secs(self.scanner.request_timeout_secs),
        }
    }
}
