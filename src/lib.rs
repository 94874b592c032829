//! # Trace Correlation
//! This crate correlates inbound requests and the outbound calls they make
//! into one distributed trace, speaking both W3C Trace Context
//! (`traceparent`/`tracestate`) and the older hierarchical `Request-Id`
//! scheme.
//!
//! ## Setup
//! Tracing, metrics and logs can be set up using [`setup::setup`]. This should
//! be the first call of any server binary. [`setup::create_client`] does the
//! same and hands back the [`telemetry::TelemetryClient`] the rest of the
//! crate reports to, or `None` when telemetry is disabled.
//!
//! ## Per-request correlation
//! [`service::InsightsService`] is built once per inbound request. It owns the
//! request's [`context::CorrelationContext`], derives outbound headers for
//! dependency calls and stamps the response with `Request-Id`.
//! [`http_data::TrackedHttpDataService`] and [`logger::InsightsLogger`] report
//! dependency calls, errors and metrics against it.
//!
//! When using [`tower`] based http frameworks like [`axum`](https://docs.rs/axum/latest/axum), the middleware [`middleware::tower::TraceLayer`] can
//! be used to build the service for every request and join handler spans to
//! the caller's trace.
//!
//! Generally, the middleware should be used on every http route, this usually
//! means that it can be registered globally and in the last position, to be the
//! first to run.

pub mod config;
pub mod context;
pub mod error;
pub mod http_data;
pub mod http_injector;
pub mod logger;
pub mod middleware;
pub mod properties;
pub mod request_parser;
pub mod service;
pub mod setup;
pub mod telemetry;
pub mod timer;
pub mod traceparent;
pub mod tracestate;

pub use config::TelemetryConfig;
pub use context::{CorrelationContext, CorrelationContextManager};
pub use error::{ApiError, Error};
pub use service::InsightsService;
pub use telemetry::TelemetryClient;
pub use traceparent::TraceParent;
pub use tracestate::TraceState;
