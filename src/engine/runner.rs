//! Timer-driven cycle loop with graceful shutdown.
//!
//! A started cycle always runs to completion. Shutdown is checked before
//! every tick, so once it has fired no further cycle starts, even when the
//! next tick is already overdue.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// One unit of periodic work.
#[async_trait]
pub trait Cycle: Send {
    async fn run_once(&mut self);
}

/// Run `cycle` every `every` until `shutdown` resolves. Returns the number
/// of cycles started.
pub async fn run_until_shutdown<C, S>(cycle: &mut C, every: Duration, shutdown: S) -> u64
where
    C: Cycle + ?Sized,
    S: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut started = 0u64;
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
            _ = interval.tick() => {
                started += 1;
                cycle.run_once().await;
            }
        }
    }
    started
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
