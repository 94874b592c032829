//! Middleware attaching an [`InsightsService`] to every inbound request.
//!
//! Each request gets exactly one service, stored in the request extensions
//! as `Arc<InsightsService>`. Handlers read it from there to build loggers
//! and tracked HTTP clients. If the hosting platform already placed a
//! [`PlatformTraceContext`](crate::request_parser::PlatformTraceContext) in
//! the extensions, it takes precedence over the request headers.

use opentelemetry::trace::TraceContextExt;
use tracing::{field, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::service::InsightsService;

#[cfg(feature = "actix")]
pub mod actix;
#[cfg(feature = "tower")]
pub mod tower;

/// Span the request's handler runs in, joined to the request's trace.
pub(crate) fn request_span(insights: &InsightsService) -> Span {
    let span = tracing::info_span!(
        "request",
        operation_id = field::Empty,
        operation_name = field::Empty,
    );

    let Some(context) = insights.correlation_context() else {
        return span;
    };
    let operation = context.operation();
    span.record("operation_id", operation.id());
    span.record("operation_name", operation.name());

    if let Some(traceparent) = operation.traceparent() {
        let parent = opentelemetry::Context::new()
            .with_remote_span_context(traceparent.to_span_context(operation.tracestate()));
        span.set_parent(parent);
    }

    span
}
