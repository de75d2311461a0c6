//! Timeout tracking for pending commands

use super::dispatcher::{CommandDispatcher, PendingCommand};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::warn;

/// Monitors pending commands and reports those whose reply never came
pub struct TimeoutTracker {
    dispatcher: Arc<CommandDispatcher>,
    check_interval: Duration,
}

impl TimeoutTracker {
    /// Create a new timeout tracker
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            dispatcher,
            check_interval: Duration::from_millis(250),
        }
    }

    /// Start the timeout monitoring loop. Ends when `expired_tx` is closed.
    pub async fn run(&self, expired_tx: mpsc::Sender<PendingCommand>) {
        let mut ticker = interval(self.check_interval);

        loop {
            ticker.tick().await;

            for cmd in self.dispatcher.cleanup_timed_out().await {
                warn!(
                    "Command {} to {} timed out after {}ms (token={})",
                    cmd.verb, cmd.device_id, cmd.timeout_ms, cmd.token
                );
                if expired_tx.send(cmd).await.is_err() {
                    return;
                }
            }
        }
    }
}
