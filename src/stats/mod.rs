pub mod event;
pub mod flush;
pub mod queue;

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::StatsConfig;
use crate::export::health::HealthMetrics;
use crate::sink::{GaugeSink, SinkError, StatsdSink};

use self::atomic_queue::AtomicQueue;
use self::event::{EntityId, EventKind, QueueEntry, StatEvent};
use self::queue::Queue;

/// Result of a single `push` call. Callers are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The event now occupies its (kind, entity) slot.
    Admitted,
    /// A newer entry is already queued for the pair.
    Superseded,
    /// Stats are switched off.
    Disabled,
    /// The kind name is not part of the taxonomy.
    UnknownKind,
}

impl PushOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::Superseded => "superseded",
            Self::Disabled => "disabled",
            Self::UnknownKind => "unknown_kind",
        }
    }
}

/// Summary of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub emitted: usize,
    pub failed: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.emitted + self.failed
    }
}

/// Coalescing stats queue.
///
/// `push` keeps the newest event per (kind, entity). `drain` emits every
/// queued entry to the sink as a gauge named `prefix + kind`, then replaces
/// the whole queue with an empty one.
///
/// Drain takes a reference to the current queue rather than swapping it out
/// up front. A push that lands in that queue after the snapshot and before
/// the replacement is discarded with it, not carried into the next cycle.
pub struct StatsQueue<S: GaugeSink = StatsdSink> {
    enabled: bool,
    prefix: Arc<str>,
    sink: Arc<S>,
    current: AtomicQueue,
    health: Option<Arc<HealthMetrics>>,
}

impl StatsQueue<StatsdSink> {
    /// Creates a queue emitting to a StatsD sink built from `cfg`.
    pub fn new(cfg: &StatsConfig) -> Self {
        Self::with_sink(cfg, StatsdSink::new(cfg))
    }
}

impl<S: GaugeSink> StatsQueue<S> {
    /// Creates a queue emitting to a pre-built sink.
    pub fn with_sink(cfg: &StatsConfig, sink: S) -> Self {
        Self {
            enabled: cfg.enabled,
            prefix: Arc::from(cfg.prefix.as_str()),
            sink: Arc::new(sink),
            current: AtomicQueue::new(),
            health: None,
        }
    }

    /// Attaches self-metrics recorded on every push and drain.
    pub fn with_health(mut self, health: Arc<HealthMetrics>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Pushes an event by wire kind name. Unknown kinds are dropped.
    pub fn push(
        &self,
        kind: &str,
        timestamp: u64,
        entity: impl Into<EntityId>,
        value: f64,
    ) -> PushOutcome {
        if !self.enabled {
            return self.observe_push(PushOutcome::Disabled);
        }

        let Some(kind) = EventKind::from_str(kind) else {
            debug!(kind, "dropping unknown stats event kind");
            return self.observe_push(PushOutcome::UnknownKind);
        };

        self.push_event(StatEvent::new(kind, timestamp, entity, value))
    }

    /// Pushes a typed event.
    ///
    /// Admitted iff nothing is queued for its (kind, entity) or the queued
    /// timestamp is less than or equal to the incoming one.
    pub fn push_event(&self, event: StatEvent) -> PushOutcome {
        if !self.enabled {
            return self.observe_push(PushOutcome::Disabled);
        }

        let queue = self.current.load();
        let outcome = if queue.admit(event) {
            PushOutcome::Admitted
        } else {
            PushOutcome::Superseded
        };

        if outcome == PushOutcome::Admitted {
            if let Some(health) = &self.health {
                health.queue_entries.set(queue.len() as f64);
            }
        }
        self.observe_push(outcome)
    }

    /// Emits every queued entry and resets the queue.
    ///
    /// Emissions run concurrently. Their failures are logged and counted but
    /// never stop the reset.
    pub async fn drain(&self) -> DrainReport {
        let started = Instant::now();

        let queue = self.current.load();
        let entries = queue.snapshot();
        let snapshot_len = entries.len();

        let mut tasks = JoinSet::new();
        for entry in entries {
            let sink = Arc::clone(&self.sink);
            let metric = format!("{}{}", self.prefix, entry.kind.as_str());
            tasks.spawn(async move { emit(sink.as_ref(), &metric, &entry).await });
        }

        let mut report = DrainReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => report.emitted += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(sink = self.sink.name(), error = %e, "gauge emission failed");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(sink = self.sink.name(), error = %e, "gauge emission task failed");
                }
            }
        }

        let queue_age = queue.age();
        drop(queue);
        self.current.reset();

        if let Some(health) = &self.health {
            health.queue_entries.set(0.0);
            health.drains.inc();
            health.emissions.inc_by(report.emitted as f64);
            health.emission_errors.inc_by(report.failed as f64);
            health.drain_entries.set(snapshot_len as f64);
            health
                .drain_duration
                .observe(started.elapsed().as_secs_f64());
        }

        debug!(
            emitted = report.emitted,
            failed = report.failed,
            queue_age = ?queue_age,
            elapsed = ?started.elapsed(),
            "stats queue drained"
        );

        report
    }

    /// Returns a copy of the entry queued for (kind, entity), if any.
    pub fn get(&self, kind: EventKind, entity: &EntityId) -> Option<QueueEntry> {
        self.current.load().get(kind, entity)
    }

    /// Number of entries currently queued.
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Copies the current queue contents, in unspecified order.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.current.load().snapshot()
    }

    fn observe_push(&self, outcome: PushOutcome) -> PushOutcome {
        if let Some(health) = &self.health {
            health.pushes.with_label_values(&[outcome.as_str()]).inc();
        }
        outcome
    }
}

/// Records one entry as a gauge tagged with its entity.
async fn emit<S: GaugeSink>(sink: &S, metric: &str, entry: &QueueEntry) -> Result<(), SinkError> {
    let tags = [format!("tunnelNum:{}", entry.entity)];
    debug!(
        metric,
        value = entry.value,
        tags = ?tags,
        timestamp = entry.timestamp,
        "emitting gauge"
    );
    sink.gauge(metric, entry.value, &tags).await
}

/// Current-queue holder with lock-free load and replace.
mod atomic_queue {
    use arc_swap::ArcSwap;
    use std::sync::Arc;

    use super::Queue;

    pub struct AtomicQueue {
        inner: ArcSwap<Queue>,
    }

    impl AtomicQueue {
        pub fn new() -> Self {
            Self {
                inner: ArcSwap::from_pointee(Queue::new()),
            }
        }

        /// Loads the current queue, returning a clone of the Arc.
        pub fn load(&self) -> Arc<Queue> {
            self.inner.load_full()
        }

        /// Replaces the current queue with a freshly built empty one.
        pub fn reset(&self) {
            self.inner.store(Arc::new(Queue::new()));
        }
    }
}
