//! Periodic status refresh
//!
//! The engine never retries on its own; commands lost to a watchdog reset
//! are re-issued by polling the projector's status.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{ProtocolEngine, Transport};

/// Call [`ProtocolEngine::update_status`] every `period`.
///
/// Polls are skipped while the engine is busy so a slow projector does not
/// pile up duplicate queries. The task ends when the engine is dropped.
///
/// Only a watchdog reset makes the engine idle again. If the oldest pending
/// command received a reply that did not match it, the watchdog is already
/// disarmed and the head of the queue is never recovered, so every later
/// poll is skipped.
pub fn spawn_status_poller<T: Transport + 'static>(
    engine: &Arc<ProtocolEngine<T>>,
    period: Duration,
) -> JoinHandle<()> {
    let engine: Weak<ProtocolEngine<T>> = Arc::downgrade(engine);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(engine) = engine.upgrade() else {
                tracing::debug!("Engine dropped, stopping status poller");
                break;
            };
            if !engine.is_idle() {
                tracing::debug!("Engine busy, skipping status poll");
                continue;
            }
            if let Err(e) = engine.update_status() {
                tracing::warn!("Status poll failed: {}", e);
            }
        }
    })
}

impl<T: Transport + 'static> ProtocolEngine<T> {
    /// Start the poller configured by `status_poll_interval_ms`, if any
    pub fn start_status_poller(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        self.config()
            .status_poll_interval()
            .map(|period| spawn_status_poller(self, period))
    }
}
