//! Scan cycle orchestrator.
//!
//! One call to [`Scanner::run_cycle`] is one full pass over the watchlist:
//! bulk quotes → per-symbol candles → gap / breakout / smart-money / volume
//! → range buckets, breadth and rankings. A failing symbol is recorded and
//! skipped; only a failed quote fetch aborts the cycle.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::candles::{
    CandleWindowCache, DEFAULT_DAILY_LOOKBACK_DAYS, DEFAULT_INTRADAY_LOOKBACK_MINUTES,
};
use crate::engine::clock::Clock;
use crate::market::MarketDataSource;
use crate::signals::breakout::{BreakMemory, BreakoutDetector, ResetPolicy};
use crate::signals::gap::{GapClassifier, GapKind, GapReading, DEFAULT_GAP_THRESHOLD_PCT};
use crate::signals::range::{bucketize, RangeBuckets};
use crate::signals::sentiment::{top_gainers, top_losers, Breadth};
use crate::signals::smart_money::{
    SmartMoneyConfig, SmartMoneyEvaluator, SmartMoneyInput, SmartMoneyVerdict,
};
use crate::signals::timeframe::{default_catalog, TimeframeSpec};
use crate::signals::volume::{self, VolumeProfile, VolumeThresholds};
use crate::types::{
    BreakoutAlert, Instrument, QuoteSnapshot, Resolution, ScanError, SkipReason, SymbolFailure,
};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Everything the scanner needs besides its collaborators. Fixed at startup.
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub top_n: usize,
    pub gap_threshold_pct: f64,
    pub smart_money: SmartMoneyConfig,
    pub volume: VolumeThresholds,
    pub timeframes: Vec<TimeframeSpec>,
    pub reset_policy: ResetPolicy,
    pub intraday_lookback_minutes: i64,
    pub daily_lookback_days: i64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            top_n: 20,
            gap_threshold_pct: DEFAULT_GAP_THRESHOLD_PCT,
            smart_money: SmartMoneyConfig::default(),
            volume: VolumeThresholds::default(),
            timeframes: default_catalog(),
            reset_policy: ResetPolicy::Never,
            intraday_lookback_minutes: DEFAULT_INTRADAY_LOOKBACK_MINUTES,
            daily_lookback_days: DEFAULT_DAILY_LOOKBACK_DAYS,
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle output
// ---------------------------------------------------------------------------

/// Everything derived for one symbol in one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SignalRecord {
    pub symbol: String,
    pub token: u32,
    pub ltp: f64,
    pub previous_close: f64,
    pub pct_change: f64,
    pub gap: GapReading,
    pub volume: VolumeProfile,
    /// Breakouts that fired for the first time this cycle.
    pub breakouts: Vec<BreakoutAlert>,
    pub smart_money: SmartMoneyVerdict,
}

/// A row of the gainer/loser rankings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mover {
    pub symbol: String,
    pub ltp: f64,
    pub pct_change: f64,
    pub smart_money: bool,
}

/// Immutable result of one cycle, shared with the dashboard and alerting.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSnapshot {
    pub cycle_id: Uuid,
    pub cycle_number: u64,
    pub taken_at: DateTime<FixedOffset>,
    /// Largest gap first.
    pub gap_up: Vec<SignalRecord>,
    /// Largest gap (most negative) first.
    pub gap_down: Vec<SignalRecord>,
    pub ranges: RangeBuckets<SignalRecord>,
    /// Newly fired this cycle, in watchlist then catalog order.
    pub breakouts: Vec<BreakoutAlert>,
    pub breadth: Breadth,
    pub gainers: Vec<Mover>,
    pub losers: Vec<Mover>,
    pub failures: Vec<SymbolFailure>,
    pub symbols_quoted: usize,
    pub symbols_evaluated: usize,
}

impl ScanSnapshot {
    pub fn report(&self) -> CycleReport {
        CycleReport {
            cycle_number: self.cycle_number,
            symbols_quoted: self.symbols_quoted,
            symbols_evaluated: self.symbols_evaluated,
            symbols_failed: self.failures.len(),
            gap_up: self.gap_up.len(),
            gap_down: self.gap_down.len(),
            range_bucketed: self.ranges.len(),
            breakouts: self.breakouts.len(),
            advancing: self.breadth.advancing,
            declining: self.breadth.declining,
        }
    }
}

/// Counts logged after every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub symbols_quoted: usize,
    pub symbols_evaluated: usize,
    pub symbols_failed: usize,
    pub gap_up: usize,
    pub gap_down: usize,
    pub range_bucketed: usize,
    pub breakouts: usize,
    pub advancing: usize,
    pub declining: usize,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct Scanner {
    source: Box<dyn MarketDataSource>,
    clock: Arc<dyn Clock>,
    universe: Vec<Instrument>,
    tokens: Vec<u32>,
    cache: CandleWindowCache,
    gaps: GapClassifier,
    detector: BreakoutDetector,
    smart_money: SmartMoneyEvaluator,
    volume: VolumeThresholds,
    top_n: usize,
    cycle_count: u64,
}

impl Scanner {
    /// `universe` is the resolved watchlist in display order.
    pub fn new(
        source: Box<dyn MarketDataSource>,
        clock: Arc<dyn Clock>,
        universe: Vec<Instrument>,
        settings: ScannerSettings,
    ) -> Self {
        let memory = BreakMemory::new(settings.reset_policy);
        Self::with_memory(source, clock, universe, settings, memory)
    }

    /// Like `new`, but with a caller-supplied break memory.
    pub fn with_memory(
        source: Box<dyn MarketDataSource>,
        clock: Arc<dyn Clock>,
        universe: Vec<Instrument>,
        settings: ScannerSettings,
        memory: BreakMemory,
    ) -> Self {
        let cache = CandleWindowCache::for_catalog(
            &settings.timeframes,
            settings.intraday_lookback_minutes,
            settings.daily_lookback_days,
        );
        let tokens = universe.iter().map(|i| i.token).collect();

        Self {
            source,
            clock,
            universe,
            tokens,
            cache,
            gaps: GapClassifier::new(settings.gap_threshold_pct),
            detector: BreakoutDetector::with_memory(settings.timeframes, memory),
            smart_money: SmartMoneyEvaluator::new(settings.smart_money),
            volume: settings.volume,
            top_n: settings.top_n,
            cycle_count: 0,
        }
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn universe(&self) -> &[Instrument] {
        &self.universe
    }

    pub fn break_memory(&self) -> &BreakMemory {
        self.detector.memory()
    }

    /// Run one full scan. Only a failed bulk quote fetch returns `Err`.
    pub async fn run_cycle(&mut self) -> Result<ScanSnapshot, ScanError> {
        self.cycle_count += 1;
        let cycle_number = self.cycle_count;
        let now = self.clock.now();
        let today = now.date_naive();

        info!(cycle = cycle_number, symbols = self.universe.len(), "Starting scan cycle");

        self.cache.clear();
        self.detector.begin_cycle(today);

        let quotes = self.source.quotes(&self.tokens).await.map_err(|e| match e {
            ScanError::QuoteFetch(msg) => ScanError::QuoteFetch(msg),
            other => ScanError::QuoteFetch(other.to_string()),
        })?;

        let universe = self.universe.clone();
        let mut records = Vec::with_capacity(universe.len());
        let mut movers = Vec::with_capacity(universe.len());
        let mut failures = Vec::new();

        for inst in &universe {
            let Some((quote, pct_change)) = quotes
                .get(&inst.token)
                .and_then(|q| q.pct_change().map(|pct| (q, pct)))
            else {
                debug!(symbol = %inst.symbol, "No usable quote");
                failures.push(SymbolFailure { symbol: inst.symbol.clone(), reason: SkipReason::NoQuote });
                continue;
            };

            movers.push(Mover {
                symbol: inst.symbol.clone(),
                ltp: quote.last_price,
                pct_change,
                smart_money: false,
            });

            match self.evaluate(inst, quote, pct_change, now, today).await {
                Ok(record) => records.push(record),
                Err(reason) => {
                    match &reason {
                        SkipReason::Timeout | SkipReason::Upstream(_) => {
                            warn!(symbol = %inst.symbol, reason = %reason, "Symbol skipped this cycle")
                        }
                        _ => debug!(symbol = %inst.symbol, reason = %reason, "Symbol skipped this cycle"),
                    }
                    failures.push(SymbolFailure { symbol: inst.symbol.clone(), reason });
                }
            }
        }

        let snapshot = self.aggregate(cycle_number, now, records, movers, failures, quotes.len());
        Ok(snapshot)
    }

    /// Derive every signal for one symbol. Errors drop the symbol from
    /// classification for this cycle.
    async fn evaluate(
        &mut self,
        inst: &Instrument,
        quote: &QuoteSnapshot,
        pct_change: f64,
        now: DateTime<FixedOffset>,
        today: NaiveDate,
    ) -> Result<SignalRecord, SkipReason> {
        let intraday = self
            .cache
            .get(self.source.as_ref(), inst.token, Resolution::Intraday, now)
            .await
            .map_err(|e| e.skip_reason())?;
        let daily = self
            .cache
            .get(self.source.as_ref(), inst.token, Resolution::Daily, now)
            .await
            .map_err(|e| e.skip_reason())?;

        let session_open = intraday
            .iter()
            .find(|c| c.session_date() == today)
            .ok_or(SkipReason::NoSessionCandle)?;
        let prior = daily
            .iter()
            .rev()
            .find(|c| c.session_date() < today)
            .ok_or(SkipReason::InsufficientHistory)?;
        let prior_date = prior.session_date();
        let gap = self
            .gaps
            .classify(session_open.open, prior.into())
            .ok_or(SkipReason::InsufficientHistory)?;

        let breakouts = self
            .detector
            .detect(&inst.symbol, quote.last_price, &intraday, &daily, now);

        let avg_5d = volume::avg_daily_volume_5d(&daily, today);
        let prior_last_volume = match volume::last_volume_before(&intraday, today) {
            Some(v) => Some(v),
            None => {
                self.prior_session_close_volume(inst.token, prior_date, *now.offset())
                    .await
            }
        };
        let mut profile = volume::profile(
            volume::first_session_volume(&intraday, today),
            prior_last_volume,
            quote.session_volume,
            avg_5d,
            self.volume,
        );
        if gap.kind == GapKind::GapDown {
            profile.opening_surge = false;
        }

        let smart_money = self.smart_money.evaluate(&SmartMoneyInput {
            intraday: &intraday,
            pct_change,
            previous_close: quote.previous_close,
            session_volume: quote.session_volume,
            avg_daily_volume_5d: avg_5d,
        });

        Ok(SignalRecord {
            symbol: inst.symbol.clone(),
            token: inst.token,
            ltp: quote.last_price,
            previous_close: quote.previous_close,
            pct_change,
            gap,
            volume: profile,
            breakouts,
            smart_money,
        })
    }

    /// Volume of the previous session's last intraday candle. Only an
    /// input to the opening-surge flag, so failures are not fatal.
    async fn prior_session_close_volume(
        &mut self,
        token: u32,
        date: NaiveDate,
        offset: FixedOffset,
    ) -> Option<u64> {
        match self.cache.session(self.source.as_ref(), token, date, offset).await {
            Ok(series) => series.last().map(|c| c.volume),
            Err(e) => {
                debug!(token, error = %e, "Prior session fetch failed, no opening-surge check");
                None
            }
        }
    }

    /// Partition, rank and package the per-symbol results.
    fn aggregate(
        &self,
        cycle_number: u64,
        now: DateTime<FixedOffset>,
        records: Vec<SignalRecord>,
        mut movers: Vec<Mover>,
        failures: Vec<SymbolFailure>,
        symbols_quoted: usize,
    ) -> ScanSnapshot {
        let flagged: HashMap<&str, bool> = records
            .iter()
            .map(|r| (r.symbol.as_str(), r.smart_money.flagged))
            .collect();
        for m in &mut movers {
            m.smart_money = flagged.get(m.symbol.as_str()).copied().unwrap_or(false);
        }

        let breadth = Breadth::from_changes(movers.iter().map(|m| m.pct_change));
        let gainers = top_gainers(&movers, self.top_n, |m| m.pct_change);
        let losers = top_losers(&movers, self.top_n, |m| m.pct_change);

        let breakouts: Vec<BreakoutAlert> =
            records.iter().flat_map(|r| r.breakouts.iter().cloned()).collect();
        let symbols_evaluated = records.len();

        let mut gap_up = Vec::new();
        let mut gap_down = Vec::new();
        let mut ungapped = Vec::new();
        for record in records {
            match record.gap.kind {
                GapKind::GapUp => gap_up.push(record),
                GapKind::GapDown => gap_down.push(record),
                GapKind::None => ungapped.push(record),
            }
        }
        gap_up.sort_by(|a, b| b.gap.gap_pct.total_cmp(&a.gap.gap_pct));
        gap_down.sort_by(|a, b| a.gap.gap_pct.total_cmp(&b.gap.gap_pct));

        let ranges = bucketize(ungapped, |r| r.pct_change);

        ScanSnapshot {
            cycle_id: Uuid::new_v4(),
            cycle_number,
            taken_at: now,
            gap_up,
            gap_down,
            ranges,
            breakouts,
            breadth,
            gainers,
            losers,
            failures,
            symbols_quoted,
            symbols_evaluated,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
