//! Candle window cache.
//!
//! Read-through cache of the trailing intraday and daily series per
//! instrument. Each trailing series is fetched at most once per cycle and
//! is never merged across cycles; `clear` runs at the start of every cycle.
//! Whole past sessions are immutable and survive `clear`, one per token.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::market::MarketDataSource;
use crate::signals::timeframe::{max_window, TimeframeSpec};
use crate::types::{Candle, Resolution, ScanError};

pub const DEFAULT_INTRADAY_LOOKBACK_MINUTES: i64 = 520;
pub const DEFAULT_DAILY_LOOKBACK_DAYS: i64 = 160;

/// Calendar days padded on top of the trading-day estimate for holidays.
const HOLIDAY_MARGIN_DAYS: i64 = 10;

pub struct CandleWindowCache {
    intraday_lookback: Duration,
    daily_lookback_days: i64,
    entries: HashMap<(u32, Resolution), Arc<Vec<Candle>>>,
    /// Whole past-session intraday series, newest session per token.
    sessions: HashMap<(u32, NaiveDate), Arc<Vec<Candle>>>,
    fetches: u64,
}

impl CandleWindowCache {
    pub fn new(intraday_lookback_minutes: i64, daily_lookback_days: i64) -> Self {
        Self {
            intraday_lookback: Duration::minutes(intraday_lookback_minutes.max(0)),
            daily_lookback_days: daily_lookback_days.max(0),
            entries: HashMap::new(),
            sessions: HashMap::new(),
            fetches: 0,
        }
    }

    /// Build a cache whose daily lookback is deep enough for every daily
    /// timeframe in `catalog` (five trading days per seven calendar days).
    pub fn for_catalog(
        catalog: &[TimeframeSpec],
        intraday_lookback_minutes: i64,
        daily_lookback_days: i64,
    ) -> Self {
        let deepest = max_window(catalog, Resolution::Daily) as i64;
        let needed = if deepest > 0 {
            ((deepest + 1) * 7 + 4) / 5 + HOLIDAY_MARGIN_DAYS
        } else {
            0
        };

        let days = if needed > daily_lookback_days {
            info!(
                configured = daily_lookback_days,
                widened_to = needed,
                deepest_window = deepest,
                "Daily lookback too short for timeframe catalog, widening"
            );
            needed
        } else {
            daily_lookback_days
        };

        Self::new(intraday_lookback_minutes, days)
    }

    pub fn daily_lookback_days(&self) -> i64 {
        self.daily_lookback_days
    }

    /// Drop the trailing series fetched in the previous cycle. Past
    /// sessions are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Past sessions currently held.
    pub fn sessions_cached(&self) -> usize {
        self.sessions.len()
    }

    /// Upstream fetches performed since construction.
    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    /// Requested `[from, to]` range for a resolution at `now`.
    pub fn range_for(
        &self,
        resolution: Resolution,
        now: DateTime<FixedOffset>,
    ) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
        match resolution {
            Resolution::Intraday => (now - self.intraday_lookback, now),
            Resolution::Daily => {
                let start = now - Duration::days(self.daily_lookback_days);
                let midnight = start
                    .date_naive()
                    .and_time(NaiveTime::MIN)
                    .and_local_timezone(*start.offset())
                    .single()
                    .unwrap_or(start);
                (midnight, now)
            }
        }
    }

    /// Return the cached series, fetching it on first use this cycle.
    /// Candles stamped after `now` are discarded; the result is oldest first.
    pub async fn get(
        &mut self,
        source: &dyn MarketDataSource,
        token: u32,
        resolution: Resolution,
        now: DateTime<FixedOffset>,
    ) -> Result<Arc<Vec<Candle>>, ScanError> {
        if let Some(hit) = self.entries.get(&(token, resolution)) {
            return Ok(Arc::clone(hit));
        }

        let (from, to) = self.range_for(resolution, now);
        let mut candles = source.historical_candles(token, resolution, from, to).await?;
        self.fetches += 1;

        candles.retain(|c| c.timestamp <= now);
        candles.sort_by_key(|c| c.timestamp);

        debug!(token, %resolution, count = candles.len(), "Candles fetched");

        let series = Arc::new(candles);
        self.entries.insert((token, resolution), Arc::clone(&series));
        Ok(series)
    }

    /// Intraday candles of one whole past session, for when the trailing
    /// window does not reach back to it. A non-empty result is kept across
    /// cycles and replaces any older session held for the token.
    pub async fn session(
        &mut self,
        source: &dyn MarketDataSource,
        token: u32,
        date: NaiveDate,
        offset: FixedOffset,
    ) -> Result<Arc<Vec<Candle>>, ScanError> {
        if let Some(hit) = self.sessions.get(&(token, date)) {
            return Ok(Arc::clone(hit));
        }

        let (Some(from), Some(to)) = (
            date.and_time(NaiveTime::MIN).and_local_timezone(offset).single(),
            date.succ_opt()
                .and_then(|next| next.and_time(NaiveTime::MIN).and_local_timezone(offset).single())
                .map(|t| t - Duration::seconds(1)),
        ) else {
            return Ok(Arc::new(Vec::new()));
        };

        let mut candles = source
            .historical_candles(token, Resolution::Intraday, from, to)
            .await?;
        self.fetches += 1;

        candles.retain(|c| c.session_date() == date);
        candles.sort_by_key(|c| c.timestamp);

        debug!(token, %date, count = candles.len(), "Session candles fetched");

        let series = Arc::new(candles);
        if !series.is_empty() {
            self.sessions.retain(|(t, d), _| *t != token || *d > date);
            self.sessions.insert((token, date), Arc::clone(&series));
        }
        Ok(series)
    }
}
