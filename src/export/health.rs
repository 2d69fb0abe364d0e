use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Prometheus metrics describing the stats queue itself.
///
/// All metrics use the "tunnelstats" namespace.
pub struct HealthMetrics {
    registry: Registry,
    addr: String,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,

    /// Push calls by outcome (admitted/superseded/disabled/unknown_kind).
    pub pushes: CounterVec,
    /// Completed drains.
    pub drains: Counter,
    /// Gauge observations handed to the sink successfully.
    pub emissions: Counter,
    /// Gauge observations the sink failed to record.
    pub emission_errors: Counter,
    /// Entries in the most recent drain snapshot.
    pub drain_entries: Gauge,
    /// Entries in the live queue. Set on admission, zeroed on reset.
    pub queue_entries: Gauge,
    /// Drain wall time (1ms-10s buckets).
    pub drain_duration: Histogram,
}

impl HealthMetrics {
    /// Creates a new health metrics instance with all metrics registered.
    pub fn new(addr: &str) -> Result<Self> {
        let registry = Registry::new();

        let pushes = CounterVec::new(
            Opts::new("pushes_total", "Push calls by outcome").namespace("tunnelstats"),
            &["outcome"],
        )?;
        let drains = Counter::with_opts(
            Opts::new("drains_total", "Completed queue drains").namespace("tunnelstats"),
        )?;
        let emissions = Counter::with_opts(
            Opts::new("emissions_total", "Gauges recorded by the sink").namespace("tunnelstats"),
        )?;
        let emission_errors = Counter::with_opts(
            Opts::new("emission_errors_total", "Gauges the sink failed to record")
                .namespace("tunnelstats"),
        )?;
        let drain_entries = Gauge::with_opts(
            Opts::new("drain_entries", "Entries in the most recent drain snapshot")
                .namespace("tunnelstats"),
        )?;
        let queue_entries = Gauge::with_opts(
            Opts::new("queue_entries", "Entries currently held by the stats queue")
                .namespace("tunnelstats"),
        )?;
        let drain_duration = Histogram::with_opts(
            HistogramOpts::new("drain_duration_seconds", "Queue drain duration")
                .namespace("tunnelstats")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        )?;

        registry.register(Box::new(pushes.clone()))?;
        registry.register(Box::new(drains.clone()))?;
        registry.register(Box::new(emissions.clone()))?;
        registry.register(Box::new(emission_errors.clone()))?;
        registry.register(Box::new(drain_entries.clone()))?;
        registry.register(Box::new(queue_entries.clone()))?;
        registry.register(Box::new(drain_duration.clone()))?;

        Ok(Self {
            registry,
            addr: addr.to_string(),
            shutdown: parking_lot::Mutex::new(None),
            pushes,
            drains,
            emissions,
            emission_errors,
            drain_entries,
            queue_entries,
            drain_duration,
        })
    }

    /// Renders the registry in Prometheus text format.
    pub fn render(&self) -> Result<String> {
        encode_registry(&self.registry)
    }

    /// Starts the HTTP server serving /metrics and /healthz.
    pub async fn start(&self) -> Result<()> {
        let addr = if self.addr.is_empty() {
            ":9090"
        } else {
            &self.addr
        };

        // Parse address, handling ":port" shorthand.
        let bind_addr = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        };

        let app_state = Arc::new(AppState {
            registry: self.registry.clone(),
        });

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(app_state);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "health metrics server started");

            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
            })
            .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "health metrics server error");
            }
        });

        Ok(())
    }

    /// Gracefully shuts down the health metrics server.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

fn encode_registry(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .context("encoding metrics")?;
    String::from_utf8(buffer).context("converting metrics to string")
}

/// Shared state for axum handlers.
struct AppState {
    registry: Registry,
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match encode_registry(&state.registry) {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "encoding metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error".to_string(),
            )
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}
