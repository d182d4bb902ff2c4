//! Background poll loop
//!
//! Polls once immediately, then on every interval tick. A stop request is only
//! observed between cycles: the cycle in flight always runs to completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::accumulator::Accumulator;

/// Handle to a running poll loop.
///
/// Dropping the handle also stops the loop after its current cycle.
pub struct PollHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Ask the loop to exit and wait until it has.
    pub async fn stop(self) {
        // The receiver is gone only if the loop already exited.
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "poll task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the poll loop for `accumulator`.
///
/// A cycle that overruns the interval delays the next one rather than
/// triggering a burst of catch-up polls.
pub fn spawn_poll_task(accumulator: Arc<Accumulator>, interval: Duration) -> PollHandle {
    let (stop, mut stopped) = oneshot::channel();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "poll loop started");

        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => break,
                _ = ticker.tick() => {}
            }
            accumulator.poll_cycle().await;
        }

        info!("poll loop stopped");
    });
    PollHandle { stop, task }
}
