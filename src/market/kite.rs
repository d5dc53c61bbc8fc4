//! Kite Connect market-data client.
//!
//! API docs: https://kite.trade/docs/connect/v3/
//! Base URL: https://api.kite.trade
//! Auth: `Authorization: token {api_key}:{access_token}`, `X-Kite-Version: 3`
//! Limits: up to 500 instruments per `/quote` call; historical data is
//! throttled upstream, see `ThrottledSource`.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::MarketDataSource;
use crate::types::{Candle, QuoteSnapshot, Resolution, ScanError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.kite.trade";
const SOURCE_NAME: &str = "kite";
const KITE_VERSION: &str = "3";

/// Maximum instruments per `/quote` request.
const QUOTE_BATCH: usize = 500;

/// Timestamp format used in candle arrays, e.g. `2026-03-02T09:15:00+0530`.
const CANDLE_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Format expected by the `from`/`to` query parameters.
const QUERY_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct KiteQuote {
    instrument_token: u32,
    last_price: f64,
    #[serde(default)]
    volume: u64,
    ohlc: KiteOhlc,
}

#[derive(Debug, Deserialize)]
struct KiteOhlc {
    /// Previous session's close.
    close: f64,
}

#[derive(Debug, Deserialize)]
struct HistoricalData {
    candles: Vec<(String, f64, f64, f64, f64, f64)>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct KiteClient {
    http: Client,
    base_url: String,
    api_key: String,
    access_token: SecretString,
    timeout: Duration,
}

impl KiteClient {
    pub fn new(
        api_key: String,
        access_token: SecretString,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ScanError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("BREAKSCAN/0.1.0")
            .build()
            .map_err(|e| ScanError::Config(format!("failed to build Kite HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            access_token,
            timeout,
        })
    }

    fn auth_header(&self) -> String {
        format!("token {}:{}", self.api_key, self.access_token.expose_secret())
    }

    /// GET `url` and unwrap Kite's `{status, data}` envelope.
    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ScanError> {
        debug!(url = %url, "Kite request");

        let resp = self
            .http
            .get(url)
            .header("X-Kite-Version", KITE_VERSION)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(ScanError::Broker { status: status.as_u16(), message });
        }

        let envelope: Envelope<T> = resp.json().await.map_err(|e| self.transport_error(e))?;
        if envelope.status != "success" {
            return Err(ScanError::Broker {
                status: status.as_u16(),
                message: envelope.message.unwrap_or_else(|| envelope.status.clone()),
            });
        }

        envelope.data.ok_or_else(|| ScanError::Broker {
            status: status.as_u16(),
            message: "response has no data".into(),
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> ScanError {
        if e.is_timeout() {
            ScanError::Timeout(self.timeout)
        } else {
            ScanError::Broker { status: e.status().map(|s| s.as_u16()).unwrap_or(0), message: e.to_string() }
        }
    }

    fn quote_url(&self, tokens: &[u32]) -> String {
        let query = tokens
            .iter()
            .map(|t| format!("i={t}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/quote?{query}", self.base_url)
    }

    fn historical_url(
        &self,
        token: u32,
        resolution: Resolution,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> String {
        format!(
            "{}/instruments/historical/{token}/{}?from={}&to={}",
            self.base_url,
            resolution.interval(),
            urlencoding::encode(&from.format(QUERY_TS_FORMAT).to_string()),
            urlencoding::encode(&to.format(QUERY_TS_FORMAT).to_string()),
        )
    }
}

/// Convert Kite candle arrays, dropping rows with unparseable timestamps.
fn parse_candles(rows: Vec<(String, f64, f64, f64, f64, f64)>) -> Vec<Candle> {
    rows.into_iter()
        .filter_map(|(ts, open, high, low, close, volume)| {
            match DateTime::parse_from_str(&ts, CANDLE_TS_FORMAT) {
                Ok(timestamp) => Some(Candle {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume: volume.max(0.0) as u64,
                }),
                Err(e) => {
                    warn!(timestamp = %ts, error = %e, "Dropping candle with bad timestamp");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl MarketDataSource for KiteClient {
    async fn quotes(&self, tokens: &[u32]) -> Result<HashMap<u32, QuoteSnapshot>, ScanError> {
        let mut out = HashMap::with_capacity(tokens.len());

        for chunk in tokens.chunks(QUOTE_BATCH) {
            let data: HashMap<String, KiteQuote> = self
                .get(&self.quote_url(chunk))
                .await
                .map_err(|e| match e {
                    ScanError::Timeout(d) => ScanError::Timeout(d),
                    other => ScanError::QuoteFetch(other.to_string()),
                })?;

            for q in data.into_values() {
                out.insert(
                    q.instrument_token,
                    QuoteSnapshot {
                        token: q.instrument_token,
                        last_price: q.last_price,
                        previous_close: q.ohlc.close,
                        session_volume: q.volume,
                    },
                );
            }
        }

        Ok(out)
    }

    async fn historical_candles(
        &self,
        token: u32,
        resolution: Resolution,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<Vec<Candle>, ScanError> {
        let url = self.historical_url(token, resolution, from, to);
        let data: HistoricalData = self.get(&url).await.map_err(|e| match e {
            ScanError::Timeout(d) => ScanError::Timeout(d),
            other => ScanError::HistoryFetch { token, resolution, message: other.to_string() },
        })?;
        Ok(parse_candles(data.candles))
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
