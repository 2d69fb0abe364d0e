pub mod recording;
pub mod statsd;

use std::future::Future;

use thiserror::Error;

pub use self::recording::{RecordedGauge, RecordingSink};
pub use self::statsd::StatsdSink;

/// Errors a sink can report for a single gauge observation.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("resolving {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no socket address found for {0}")]
    NoAddress(String),

    #[error("non-finite gauge value {value} for {metric}")]
    InvalidValue { metric: String, value: f64 },

    #[error("sending metric: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink rejected {0}")]
    Rejected(String),
}

/// GaugeSink records named gauge observations in a metrics backend.
pub trait GaugeSink: Send + Sync + 'static {
    /// Returns the sink's name for logging.
    fn name(&self) -> &str;

    /// Record `value` for `metric` with the given `key:value` style tags.
    fn gauge(
        &self,
        metric: &str,
        value: f64,
        tags: &[String],
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}
