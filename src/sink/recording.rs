use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::watch;

use super::{GaugeSink, SinkError};

/// One gauge observation captured by `RecordingSink`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedGauge {
    pub metric: String,
    pub value: f64,
    pub tags: Vec<String>,
}

/// In-memory sink that keeps every observation.
///
/// Used for injection in tests and benches. A gated sink holds every call
/// until `open_gate` is invoked, which lets callers act while a drain is
/// in flight.
pub struct RecordingSink {
    recorded: parking_lot::Mutex<Vec<RecordedGauge>>,
    fail: AtomicBool,
    entered: AtomicUsize,
    gate: Option<(watch::Sender<bool>, watch::Receiver<bool>)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            recorded: parking_lot::Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            entered: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// A sink that rejects every call.
    pub fn failing() -> Self {
        let sink = Self::new();
        sink.fail.store(true, Ordering::Relaxed);
        sink
    }

    /// A sink whose calls block until `open_gate` is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(watch::channel(false)),
            ..Self::new()
        }
    }

    /// Releases all calls waiting on the gate.
    pub fn open_gate(&self) {
        if let Some((tx, _)) = &self.gate {
            let _ = tx.send(true);
        }
    }

    /// Number of `gauge` calls that have started, including blocked ones.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Returns a copy of everything recorded so far.
    pub fn recorded(&self) -> Vec<RecordedGauge> {
        self.recorded.lock().clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<RecordedGauge> {
        std::mem::take(&mut *self.recorded.lock())
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl GaugeSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn gauge(&self, metric: &str, value: f64, tags: &[String]) -> Result<(), SinkError> {
        self.entered.fetch_add(1, Ordering::SeqCst);

        if let Some((_, rx)) = &self.gate {
            let mut rx = rx.clone();
            loop {
                let open = *rx.borrow_and_update();
                if open {
                    break;
                }
                // Sender lives in self, so the channel cannot close here.
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }

        if self.fail.load(Ordering::Relaxed) {
            return Err(SinkError::Rejected(metric.to_string()));
        }

        self.recorded.lock().push(RecordedGauge {
            metric: metric.to_string(),
            value,
            tags: tags.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_observations() {
        let sink = RecordingSink::new();
        sink.gauge("a", 1.0, &["x:y".to_string()])
            .await
            .expect("recorded");

        let rec = sink.recorded();
        assert_eq!(rec.len(), 1);
        assert_eq!(rec[0].metric, "a");
        assert_eq!(rec[0].tags, vec!["x:y".to_string()]);
        assert_eq!(sink.entered(), 1);
    }

    #[tokio::test]
    async fn test_failing_sink_rejects() {
        let sink = RecordingSink::failing();
        assert!(sink.gauge("a", 1.0, &[]).await.is_err());
        assert!(sink.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_gate_blocks_until_opened() {
        let sink = std::sync::Arc::new(RecordingSink::gated());
        let task = {
            let sink = std::sync::Arc::clone(&sink);
            tokio::spawn(async move { sink.gauge("a", 1.0, &[]).await })
        };

        while sink.entered() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(sink.recorded().is_empty());

        sink.open_gate();
        task.await.expect("join").expect("recorded");
        assert_eq!(sink.take().len(), 1);
        assert!(sink.recorded().is_empty());
    }
}
