//! Response watchdog
//!
//! A single-shot deadline armed whenever a command goes on the wire. Arming
//! restarts the deadline from zero; disarming cancels it. The expiry callback
//! runs while the watchdog's lock is held, so an expiry and a concurrent
//! disarm are strictly ordered: whichever takes the lock first wins.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::ProtocolError;

#[derive(Debug, Default)]
struct Slot {
    /// Bumped on every arm/disarm; a sleeping task only fires if its
    /// generation is still current.
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Cancellable single-shot timer driven by a tokio runtime
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    runtime: Handle,
    slot: Arc<Mutex<Slot>>,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Watchdog {
    /// Create a watchdog that spawns its timer on `runtime`
    pub fn new(timeout: Duration, runtime: Handle) -> Self {
        Self {
            timeout,
            runtime,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Create a watchdog on the runtime of the calling context
    pub fn on_current_runtime(timeout: Duration) -> Result<Self, ProtocolError> {
        let runtime = Handle::try_current().map_err(|_| ProtocolError::NoRuntime)?;
        Ok(Self::new(timeout, runtime))
    }

    /// Configured deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start (or restart) the deadline. `on_expire` runs once if the deadline
    /// passes without another `arm` or `disarm`.
    pub fn arm<F>(&self, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(task) = slot.task.take() {
            task.abort();
        }

        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);
        let timeout = self.timeout;
        slot.task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut slot = lock(&shared);
            if slot.generation != generation {
                return;
            }
            slot.task = None;
            on_expire();
        }));
    }

    /// Cancel the deadline. Safe to call when not armed.
    ///
    /// Returns `true` if a deadline was pending.
    pub fn disarm(&self) -> bool {
        let mut slot = lock(&self.slot);
        slot.generation = slot.generation.wrapping_add(1);
        match slot.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Check if a deadline is pending
    pub fn is_armed(&self) -> bool {
        lock(&self.slot).task.is_some()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
