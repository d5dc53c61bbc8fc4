//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`;
//! the scan loop is the only writer.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::scanner::{CycleReport, Mover, ScanSnapshot, SignalRecord};
use crate::signals::range::RangeBuckets;
use crate::signals::sentiment::Breadth;
use crate::signals::volume::format_volume;
use crate::types::{BreakoutAlert, SymbolFailure};

/// Entries kept in the cycle log and breakout feed.
const HISTORY_CAP: usize = 500;
/// Entries returned by list endpoints.
const PAGE: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanPhase {
    Idle,
    Scanning,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPhase::Idle => write!(f, "IDLE"),
            ScanPhase::Scanning => write!(f, "SCANNING"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScannerStatus {
    pub name: String,
    pub phase: ScanPhase,
    pub universe_size: usize,
    pub started_at: DateTime<FixedOffset>,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_cycle_at: Option<DateTime<FixedOffset>>,
    pub last_error: Option<String>,
}

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub status: RwLock<ScannerStatus>,
    pub snapshot: RwLock<Option<Arc<ScanSnapshot>>>,
    pub cycle_log: RwLock<Vec<CycleLogEntry>>,
    pub breakouts: RwLock<Vec<BreakoutAlert>>,
}

impl DashboardState {
    pub fn new(name: &str, universe_size: usize, started_at: DateTime<FixedOffset>) -> Self {
        Self {
            status: RwLock::new(ScannerStatus {
                name: name.to_string(),
                phase: ScanPhase::Idle,
                universe_size,
                started_at,
                cycles_completed: 0,
                cycles_failed: 0,
                last_cycle_at: None,
                last_error: None,
            }),
            snapshot: RwLock::new(None),
            cycle_log: RwLock::new(Vec::new()),
            breakouts: RwLock::new(Vec::new()),
        }
    }

    pub async fn begin_cycle(&self) {
        self.status.write().await.phase = ScanPhase::Scanning;
    }

    /// Publish a completed cycle.
    pub async fn publish(&self, snapshot: Arc<ScanSnapshot>) {
        {
            let mut status = self.status.write().await;
            status.phase = ScanPhase::Idle;
            status.cycles_completed += 1;
            status.last_cycle_at = Some(snapshot.taken_at);
            status.last_error = None;
        }
        {
            let mut log = self.cycle_log.write().await;
            log.push(CycleLogEntry::from_snapshot(&snapshot));
            trim_front(&mut log, HISTORY_CAP);
        }
        {
            let mut feed = self.breakouts.write().await;
            feed.extend(snapshot.breakouts.iter().cloned());
            trim_front(&mut feed, HISTORY_CAP);
        }
        *self.snapshot.write().await = Some(snapshot);
    }

    /// Record a cycle that produced no snapshot. The previous snapshot stays.
    pub async fn record_failure(&self, error: String) {
        let mut status = self.status.write().await;
        status.phase = ScanPhase::Idle;
        status.cycles_failed += 1;
        status.last_error = Some(error);
    }
}

fn trim_front<T>(v: &mut Vec<T>, cap: usize) {
    if v.len() > cap {
        let excess = v.len() - cap;
        v.drain(..excess);
    }
}

fn last_page<T: Clone>(v: &[T]) -> Vec<T> {
    let start = v.len().saturating_sub(PAGE);
    v[start..].to_vec()
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub name: String,
    pub phase: ScanPhase,
    pub universe_size: usize,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_cycle_at: Option<String>,
    pub last_error: Option<String>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleLogEntry {
    pub timestamp: String,
    pub sentiment: String,
    #[serde(flatten)]
    pub report: CycleReport,
}

impl CycleLogEntry {
    fn from_snapshot(s: &ScanSnapshot) -> Self {
        Self {
            timestamp: s.taken_at.to_rfc3339(),
            sentiment: s.breadth.sentiment.to_string(),
            report: s.report(),
        }
    }
}

/// One row of a board table.
#[derive(Debug, Clone, Serialize)]
pub struct BoardRow {
    pub symbol: String,
    pub ltp: f64,
    pub change: f64,
    pub gap_pct: f64,
    pub volume_fmt: String,
    pub total_volume_fmt: String,
    /// Opening-volume surge.
    pub buy: bool,
    /// Heavy participation against the 5-day average.
    pub big: bool,
    pub smart_money: bool,
    pub breakouts: usize,
}

impl From<&SignalRecord> for BoardRow {
    fn from(r: &SignalRecord) -> Self {
        Self {
            symbol: r.symbol.clone(),
            ltp: r.ltp,
            change: r.pct_change,
            gap_pct: r.gap.gap_pct,
            volume_fmt: format_volume(r.volume.first_candle_volume),
            total_volume_fmt: format_volume(r.volume.session_volume),
            buy: r.volume.opening_surge,
            big: r.volume.heavy_participation,
            smart_money: r.smart_money.flagged,
            breakouts: r.breakouts.len(),
        }
    }
}

fn rows(records: &[SignalRecord]) -> Vec<BoardRow> {
    records.iter().map(BoardRow::from).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct GapsResponse {
    pub gap_up: Vec<BoardRow>,
    pub gap_down: Vec<BoardRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoversResponse {
    pub breadth: Breadth,
    pub gainers: Vec<Mover>,
    pub losers: Vec<Mover>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

async fn latest(state: &DashboardState) -> Result<Arc<ScanSnapshot>, StatusCode> {
    state.snapshot.read().await.clone().ok_or(StatusCode::NO_CONTENT)
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.status.read().await;
    let uptime = chrono::Utc::now().signed_duration_since(status.started_at).num_seconds();

    Json(StatusResponse {
        name: status.name.clone(),
        phase: status.phase,
        universe_size: status.universe_size,
        cycles_completed: status.cycles_completed,
        cycles_failed: status.cycles_failed,
        last_cycle_at: status.last_cycle_at.map(|t| t.to_rfc3339()),
        last_error: status.last_error.clone(),
        uptime_secs: uptime,
    })
}

/// GET /api/snapshot
pub async fn get_snapshot(State(state): State<AppState>) -> Result<Json<ScanSnapshot>, StatusCode> {
    let snap = latest(&state).await?;
    Ok(Json(snap.as_ref().clone()))
}

/// GET /api/gaps
pub async fn get_gaps(State(state): State<AppState>) -> Result<Json<GapsResponse>, StatusCode> {
    let snap = latest(&state).await?;
    Ok(Json(GapsResponse {
        gap_up: rows(&snap.gap_up),
        gap_down: rows(&snap.gap_down),
    }))
}

/// GET /api/ranges
pub async fn get_ranges(
    State(state): State<AppState>,
) -> Result<Json<RangeBuckets<BoardRow>>, StatusCode> {
    let snap = latest(&state).await?;
    let r = &snap.ranges;
    Ok(Json(RangeBuckets {
        t1_buy: rows(&r.t1_buy),
        t1_sell: rows(&r.t1_sell),
        t2_buy: rows(&r.t2_buy),
        t2_sell: rows(&r.t2_sell),
        t3_buy: rows(&r.t3_buy),
        t3_sell: rows(&r.t3_sell),
    }))
}

/// GET /api/movers
pub async fn get_movers(State(state): State<AppState>) -> Result<Json<MoversResponse>, StatusCode> {
    let snap = latest(&state).await?;
    Ok(Json(MoversResponse {
        breadth: snap.breadth,
        gainers: snap.gainers.clone(),
        losers: snap.losers.clone(),
    }))
}

/// GET /api/failures
pub async fn get_failures(
    State(state): State<AppState>,
) -> Result<Json<Vec<SymbolFailure>>, StatusCode> {
    let snap = latest(&state).await?;
    Ok(Json(snap.failures.clone()))
}

/// GET /api/breakouts
pub async fn get_breakouts(State(state): State<AppState>) -> Json<Vec<BreakoutAlert>> {
    let feed = state.breakouts.read().await;
    Json(last_page(&feed))
}

/// GET /api/cycles
pub async fn get_cycles(State(state): State<AppState>) -> Json<Vec<CycleLogEntry>> {
    let log = state.cycle_log.read().await;
    Json(last_page(&log))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
