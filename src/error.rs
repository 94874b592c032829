//! Errors raised around the correlation core.
//!
//! The core itself never fails a request: malformed headers fall back to
//! fresh identifiers and a missing telemetry client disables
//! instrumentation. What can fail is installing the telemetry pipelines and
//! the dependency calls this crate wraps.

use http::StatusCode;
use opentelemetry::{logs::LogError, metrics::MetricsError, trace::TraceError};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to install trace pipeline: {0}")]
    Trace(#[from] TraceError),

    #[error("failed to install metrics pipeline: {0}")]
    Metrics(#[from] MetricsError),

    #[error("failed to install log pipeline: {0}")]
    Logs(#[from] LogError),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),

    #[error("dependency call to {url} failed: {source}")]
    Dependency {
        url: String,
        #[source]
        source: BoxError,
    },
}

/// An HTTP problem reported by an API, ours or a downstream one.
#[derive(Debug, Clone, Error)]
#[error("{title} ({status})")]
pub struct ApiError {
    pub status: StatusCode,
    pub title: String,
    pub error_type: String,
    pub additional_information: Option<String>,
    /// Set when the problem was returned by a service we called.
    pub downstream: bool,
}

impl ApiError {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            title: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_ascii_uppercase(),
            error_type: format!("https://httpstatuses.com/{}", status.as_u16()),
            additional_information: None,
            downstream: false,
        }
    }

    pub fn bad_request(additional_information: impl Into<String>) -> Self {
        Self {
            additional_information: Some(additional_information.into()),
            ..Self::new(StatusCode::BAD_REQUEST)
        }
    }

    #[must_use]
    pub fn downstream(mut self) -> Self {
        self.downstream = true;
        self
    }
}
