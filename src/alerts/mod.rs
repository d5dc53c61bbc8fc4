//! Alert fan-out.
//!
//! The scanner never talks to a messenger directly. After each cycle the
//! snapshot is handed to an [`AlertDispatcher`], which renders messages
//! and pushes them through an [`AlertSink`]. Sink failures are logged and
//! counted, never propagated back into the scan loop.

pub mod format;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::scanner::ScanSnapshot;

/// A destination for rendered alert text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Writes alerts to the log. Used when no messenger is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, text: &str) -> Result<()> {
        info!(alert = %text, "Alert");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub delivered: usize,
    pub failed: usize,
}

pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    send_market_summary: bool,
    top_n: usize,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, send_market_summary: bool, top_n: usize) -> Self {
        Self { sink, send_market_summary, top_n }
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Messages for one cycle: every new breakout in order, then the
    /// market summary if enabled.
    pub fn messages_for(&self, snapshot: &ScanSnapshot) -> Vec<String> {
        let mut messages: Vec<String> =
            snapshot.breakouts.iter().map(format::breakout_message).collect();
        if self.send_market_summary {
            messages.push(format::market_summary(snapshot, self.top_n));
        }
        messages
    }

    /// Deliver every message for `snapshot`, one after another.
    pub async fn dispatch(&self, snapshot: &ScanSnapshot) -> DispatchStats {
        let mut stats = DispatchStats::default();

        for text in self.messages_for(snapshot) {
            match self.sink.deliver(&text).await {
                Ok(()) => stats.delivered += 1,
                Err(e) => {
                    warn!(sink = self.sink.name(), error = %e, "Alert delivery failed");
                    stats.failed += 1;
                }
            }
        }

        info!(
            cycle = snapshot.cycle_number,
            delivered = stats.delivered,
            failed = stats.failed,
            "Alerts dispatched"
        );
        stats
    }

    /// Run `dispatch` on a background task so the scan loop never waits
    /// on a messenger.
    pub fn spawn(self: &Arc<Self>, snapshot: Arc<ScanSnapshot>) -> JoinHandle<DispatchStats> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.dispatch(&snapshot).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
