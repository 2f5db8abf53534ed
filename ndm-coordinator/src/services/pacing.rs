//! Pacing gate for remote calls
//!
//! Enforces a minimum delay between the starts of consecutive remote calls,
//! whichever manager they go to. No burst allowance: every call after the
//! first waits until `delay` has passed since the previous one started.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PacingGate {
    delay: Duration,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl PacingGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    fn remaining(&self, last_call: Option<Instant>) -> Option<Duration> {
        let elapsed = last_call?.elapsed();
        (elapsed < self.delay).then(|| self.delay - elapsed)
    }

    /// Wait until a call would be allowed, without claiming the slot
    ///
    /// Returns false when `cancel` fires first.
    pub async fn ready(&self, cancel: &CancellationToken) -> bool {
        let remaining = self.remaining(*self.last_call.lock().await);

        if let Some(remaining) = remaining {
            debug!(sleep_ms = remaining.as_millis() as u64, "Pacing before remote call");
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = sleep(remaining) => {}
            }
        }

        !cancel.is_cancelled()
    }

    /// Claim the next call slot, sleeping out whatever delay is left
    ///
    /// Call immediately before the remote request.
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;

        if let Some(remaining) = self.remaining(*last_call) {
            sleep(remaining).await;
        }

        *last_call = Some(Instant::now());
    }
}
