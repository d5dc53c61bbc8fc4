//! Market data integrations.
//!
//! Defines the `MarketDataSource` trait and provides:
//! - Kite Connect REST client (quotes + historical candles)
//! - `ThrottledSource`, a decorator carrying the backpressure policy
//! - instrument dump / watchlist loaders

pub mod kite;
pub mod throttle;
pub mod universe;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;

use crate::types::{Candle, QuoteSnapshot, Resolution, ScanError};

/// Abstraction over a broker's market-data API.
///
/// Implementors return typed `ScanError`s so the scanner can tell a timed
/// out call from other upstream failures.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch live quotes for a batch of instrument tokens.
    /// Tokens the broker does not know are simply absent from the map.
    async fn quotes(&self, tokens: &[u32]) -> Result<HashMap<u32, QuoteSnapshot>, ScanError>;

    /// Fetch candles in `[from, to]`, oldest first. Sparse data yields a
    /// shorter (possibly empty) vector, never an error.
    async fn historical_candles(
        &self,
        token: u32,
        resolution: Resolution,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<Vec<Candle>, ScanError>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

#[async_trait]
impl<S: MarketDataSource + ?Sized> MarketDataSource for Box<S> {
    async fn quotes(&self, tokens: &[u32]) -> Result<HashMap<u32, QuoteSnapshot>, ScanError> {
        (**self).quotes(tokens).await
    }

    async fn historical_candles(
        &self,
        token: u32,
        resolution: Resolution,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<Vec<Candle>, ScanError> {
        (**self).historical_candles(token, resolution, from, to).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
