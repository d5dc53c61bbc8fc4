//! Client-side backpressure for market-data calls.
//!
//! `ThrottledSource` wraps any `MarketDataSource`, spacing historical-data
//! requests by a fixed delay and bounding every call with a timeout. The
//! signal code never sleeps; tests use a zero-delay policy.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::MarketDataSource;
use crate::types::{Candle, QuoteSnapshot, Resolution, ScanError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpressurePolicy {
    /// Pause before every historical-data request.
    pub history_delay: Duration,
    /// Upper bound on any single upstream call.
    pub call_timeout: Duration,
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        Self {
            history_delay: Duration::from_millis(350),
            call_timeout: Duration::from_secs(10),
        }
    }
}

pub struct ThrottledSource<S> {
    inner: S,
    policy: BackpressurePolicy,
}

impl<S: MarketDataSource> ThrottledSource<S> {
    pub fn new(inner: S, policy: BackpressurePolicy) -> Self {
        Self { inner, policy }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, ScanError>>,
    ) -> Result<T, ScanError> {
        match tokio::time::timeout(self.policy.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    source = self.inner.name(),
                    call = what,
                    timeout_ms = self.policy.call_timeout.as_millis() as u64,
                    "Upstream call timed out"
                );
                Err(ScanError::Timeout(self.policy.call_timeout))
            }
        }
    }
}

#[async_trait]
impl<S: MarketDataSource> MarketDataSource for ThrottledSource<S> {
    async fn quotes(&self, tokens: &[u32]) -> Result<HashMap<u32, QuoteSnapshot>, ScanError> {
        self.bounded("quotes", self.inner.quotes(tokens)).await
    }

    async fn historical_candles(
        &self,
        token: u32,
        resolution: Resolution,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<Vec<Candle>, ScanError> {
        if !self.policy.history_delay.is_zero() {
            tokio::time::sleep(self.policy.history_delay).await;
        }
        self.bounded(
            "historical_candles",
            self.inner.historical_candles(token, resolution, from, to),
        )
        .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// Answers after a fixed delay and counts calls.
    struct SlowSource {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataSource for SlowSource {
        async fn quotes(&self, _tokens: &[u32]) -> Result<HashMap<u32, QuoteSnapshot>, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(HashMap::new())
        }

        async fn historical_candles(
            &self,
            _token: u32,
            _resolution: Resolution,
            _from: DateTime<FixedOffset>,
            _to: DateTime<FixedOffset>,
        ) -> Result<Vec<Candle>, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn t() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 2, 10, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let src = ThrottledSource::new(
            SlowSource { delay: Duration::from_millis(500), calls: AtomicUsize::new(0) },
            BackpressurePolicy {
                history_delay: Duration::ZERO,
                call_timeout: Duration::from_millis(20),
            },
        );
        let err = src.historical_candles(1, Resolution::Daily, t(), t()).await.unwrap_err();
        assert!(matches!(err, ScanError::Timeout(_)));
        let err = src.quotes(&[1]).await.unwrap_err();
        assert!(matches!(err, ScanError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_history_calls_are_spaced() {
        let src = ThrottledSource::new(
            SlowSource { delay: Duration::ZERO, calls: AtomicUsize::new(0) },
            BackpressurePolicy {
                history_delay: Duration::from_millis(30),
                call_timeout: Duration::from_secs(1),
            },
        );
        let started = Instant::now();
        for _ in 0..3 {
            src.historical_candles(1, Resolution::Intraday, t(), t()).await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(90));
        assert_eq!(src.into_inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_quotes_are_not_delayed() {
        let src = ThrottledSource::new(
            SlowSource { delay: Duration::ZERO, calls: AtomicUsize::new(0) },
            BackpressurePolicy {
                history_delay: Duration::from_secs(5),
                call_timeout: Duration::from_secs(1),
            },
        );
        let started = Instant::now();
        tokio_test::assert_ok!(src.quotes(&[1, 2]).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
