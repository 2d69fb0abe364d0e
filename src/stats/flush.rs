use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sink::GaugeSink;

use super::StatsQueue;

/// Drives periodic drains of a `StatsQueue`.
///
/// Drains once per interval and once more on cancellation so entries queued
/// since the last tick reach the sink before shutdown.
pub struct Flusher<S: GaugeSink> {
    queue: Arc<StatsQueue<S>>,
    interval: Duration,
    run_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<S: GaugeSink> Flusher<S> {
    pub fn new(queue: Arc<StatsQueue<S>>, interval: Duration) -> Self {
        Self {
            queue,
            interval,
            run_task: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawns the flush loop. A second call is ignored.
    pub async fn start(&self, ctx: CancellationToken) {
        let mut run_task = self.run_task.lock().await;
        if run_task.is_some() {
            warn!("flusher already started");
            return;
        }

        let queue = Arc::clone(&self.queue);
        let interval = self.interval;

        *run_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Consume the immediate first tick.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        let report = queue.drain().await;
                        info!(
                            emitted = report.emitted,
                            failed = report.failed,
                            "final flush"
                        );
                        return;
                    }

                    _ = ticker.tick() => {
                        let report = queue.drain().await;
                        if report.total() > 0 {
                            debug!(
                                emitted = report.emitted,
                                failed = report.failed,
                                "stats flushed"
                            );
                        }
                    }
                }
            }
        }));

        info!(interval = ?self.interval, "stats flusher started");
    }

    /// Waits for the flush loop to exit after cancellation.
    pub async fn wait_for_shutdown(&self) {
        if let Some(handle) = self.run_task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "stats flusher task join failed");
            }
        }
    }
}
