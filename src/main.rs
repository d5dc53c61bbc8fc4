//! BREAKSCAN: intraday watchlist scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! resolves the watchlist against the instrument dump, and runs the
//! scan loop with graceful shutdown between cycles.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use breakscan::alerts::telegram::TelegramNotifier;
use breakscan::alerts::{AlertDispatcher, AlertSink, LogSink};
use breakscan::config::AppConfig;
use breakscan::dashboard::{self, routes::DashboardState};
use breakscan::engine::clock::{Clock, SystemClock};
use breakscan::engine::runner::{self, Cycle};
use breakscan::engine::scanner::{CycleReport, Scanner};
use breakscan::market::kite::KiteClient;
use breakscan::market::throttle::ThrottledSource;
use breakscan::market::universe::{load_lines, InstrumentMap};
use breakscan::types::Instrument;

const BANNER: &str = r#"
 ____  ____  _____    _    _  ______   ____    _    _   _
| __ )|  _ \| ____|  / \  | |/ / ___| / ___|  / \  | \ | |
|  _ \| |_) |  _|   / _ \ | ' /\___ \| |     / _ \ |  \| |
| |_) |  _ <| |___ / ___ \| . \ ___) | |___ / ___ \| |\  |
|____/|_| \_\_____/_/   \_\_|\_\____/ \____/_/   \_\_| \_|

  Multi-timeframe breakout & gap scanner
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        scanner_name = %cfg.scanner.name,
        scan_interval_secs = cfg.scanner.scan_interval_secs,
        top_n = cfg.scanner.top_n,
        reset_policy = ?cfg.breakouts.reset_policy,
        "BREAKSCAN starting up"
    );

    let clock: Arc<dyn Clock> = Arc::new(
        SystemClock::with_offset_minutes(cfg.scanner.utc_offset_minutes).with_context(|| {
            format!("Invalid utc_offset_minutes: {}", cfg.scanner.utc_offset_minutes)
        })?,
    );

    // -- Initialise components -------------------------------------------

    let universe = load_universe(&cfg)?;

    let api_key = AppConfig::resolve_env(&cfg.broker.api_key_env)?;
    let access_token = std::fs::read_to_string(&cfg.broker.access_token_path)
        .with_context(|| format!("Failed to read access token: {}", cfg.broker.access_token_path))?
        .trim()
        .to_string();
    let backpressure = cfg.backpressure();
    let kite = KiteClient::new(
        api_key,
        SecretString::new(access_token),
        cfg.broker.base_url.clone(),
        backpressure.call_timeout,
    )?;
    let source = ThrottledSource::new(kite, backpressure);

    let dispatcher = Arc::new(AlertDispatcher::new(
        build_sink(&cfg)?,
        cfg.alerts.send_market_summary,
        cfg.scanner.top_n,
    ));
    info!(sink = dispatcher.sink_name(), "Alert sink ready");

    let scanner = Scanner::new(
        Box::new(source),
        Arc::clone(&clock),
        universe,
        cfg.scanner_settings(),
    );
    info!(
        reset_policy = ?scanner.break_memory().policy(),
        "Break memory ready"
    );

    let dash_state = Arc::new(DashboardState::new(
        &cfg.scanner.name,
        scanner.universe().len(),
        clock.now(),
    ));
    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(Arc::clone(&dash_state), cfg.dashboard.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    info!(
        interval_secs = cfg.scanner.scan_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    let mut scan_loop = ScanLoop { scanner, dash_state, dispatcher };
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C, stopping");
        }
    };
    runner::run_until_shutdown(
        &mut scan_loop,
        Duration::from_secs(cfg.scanner.scan_interval_secs),
        shutdown,
    )
    .await;

    info!(
        cycles = scan_loop.scanner.cycle_count(),
        breakouts_remembered = scan_loop.scanner.break_memory().len(),
        "BREAKSCAN shut down cleanly."
    );

    Ok(())
}

/// One scan, then publish to the dashboard and hand off to the alert task.
struct ScanLoop {
    scanner: Scanner,
    dash_state: Arc<DashboardState>,
    dispatcher: Arc<AlertDispatcher>,
}

#[async_trait]
impl Cycle for ScanLoop {
    async fn run_once(&mut self) {
        self.dash_state.begin_cycle().await;

        match self.scanner.run_cycle().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                log_cycle_report(&snapshot.report());
                self.dash_state.publish(Arc::clone(&snapshot)).await;
                self.dispatcher.spawn(snapshot);
            }
            Err(e) => {
                error!(error = %e, "Cycle failed, continuing to next");
                self.dash_state.record_failure(e.to_string()).await;
            }
        }
    }
}

/// Resolve the watchlist against the instrument dump. Fatal if nothing
/// resolves.
fn load_universe(cfg: &AppConfig) -> Result<Vec<Instrument>> {
    let instruments = InstrumentMap::load_csv(
        &cfg.universe.instruments_path,
        &cfg.universe.exchange,
        cfg.universe.instrument_type.as_deref(),
    )?;
    let watchlist = load_lines(&cfg.universe.watchlist_path)?;
    let (universe, missing) = instruments.resolve(&watchlist);

    if !missing.is_empty() {
        warn!(count = missing.len(), symbols = ?missing, "Watchlist symbols not in instrument dump, ignoring");
    }
    if universe.is_empty() {
        bail!("No watchlist symbol resolved to an instrument token");
    }

    info!(symbols = universe.len(), "Watchlist resolved");
    Ok(universe)
}

/// Telegram when a bot token is available, the log otherwise.
fn build_sink(cfg: &AppConfig) -> Result<Arc<dyn AlertSink>> {
    let token = cfg
        .alerts
        .telegram_bot_token_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok())
        .filter(|t| !t.is_empty());

    let Some(token) = token else {
        warn!("No Telegram bot token configured, alerts will be logged only");
        return Ok(Arc::new(LogSink));
    };

    let chat_ids = match &cfg.alerts.subscribers_path {
        Some(path) => load_lines(path)?,
        None => Vec::new(),
    };
    if chat_ids.is_empty() {
        warn!("Telegram enabled but no subscribers listed");
    }

    let notifier = TelegramNotifier::new(SecretString::new(token), chat_ids, None)?;
    info!(subscribers = notifier.subscribers(), "Telegram alerts enabled");
    Ok(Arc::new(notifier))
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle_number,
        quoted = report.symbols_quoted,
        evaluated = report.symbols_evaluated,
        failed = report.symbols_failed,
        gap_up = report.gap_up,
        gap_down = report.gap_down,
        bucketed = report.range_bucketed,
        breakouts = report.breakouts,
        advancing = report.advancing,
        declining = report.declining,
        "Cycle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("breakscan=info"));

    let json_logging = std::env::var("BREAKSCAN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
