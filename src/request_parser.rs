//! Derives the identity of the operation an inbound request represents.

use std::collections::HashMap;

use http::Uri;
use opentelemetry::propagation::Extractor;

use crate::{
    http_injector::{
        CORRELATION_CONTEXT_HEADER, REQUEST_ID_HEADER, TRACEPARENT_HEADER, TRACESTATE_HEADER,
    },
    traceparent::TraceParent,
    tracestate::TraceState,
};

/// Trace context handed over by the hosting platform for one invocation.
///
/// The platform has already recorded this identity, so it wins over anything
/// found in the request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformTraceContext {
    pub traceparent: Option<String>,
    pub tracestate: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl PlatformTraceContext {
    pub fn new(traceparent: impl Into<String>) -> Self {
        Self {
            traceparent: Some(traceparent.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tracestate(mut self, tracestate: impl Into<String>) -> Self {
        self.tracestate = Some(tracestate.into());
        self
    }
}

/// An inbound HTTP request as seen by the request parser.
pub trait InboundRequest: Extractor {
    fn method(&self) -> &str;

    fn url(&self) -> String;
}

/// Where the request's trace identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceSource {
    Platform,
    TraceparentHeader,
    LegacyRequestId,
    Generated,
}

/// The identity of one inbound operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationIdentity {
    pub operation_id: String,
    pub operation_name: String,
    /// Legacy id of the immediate caller, if there was one.
    pub operation_parent_id: Option<String>,
    /// Legacy id of this request's own span.
    pub request_id: String,
}

/// Reads trace identity out of an inbound request.
///
/// Sources are tried in a fixed order: platform context, `traceparent`
/// header, legacy `Request-Id` header, and finally a freshly generated
/// trace. A malformed value never fails the request; the next source is used.
#[derive(Debug, Clone)]
pub struct RequestParser {
    method: String,
    url: String,
    traceparent: TraceParent,
    tracestate: Option<TraceState>,
    parent_id: Option<String>,
    correlation_context_header: Option<String>,
    source: TraceSource,
}

impl RequestParser {
    pub fn new<R>(request: &R, platform: Option<&PlatformTraceContext>) -> Self
    where
        R: InboundRequest + ?Sized,
    {
        let correlation_context_header = request
            .get(CORRELATION_CONTEXT_HEADER)
            .map(str::to_owned);

        let (traceparent, tracestate, parent_id, source) = resolve(request, platform);

        Self {
            method: request.method().to_owned(),
            url: request.url(),
            traceparent,
            tracestate,
            parent_id,
            correlation_context_header,
            source,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn operation_id(&self) -> String {
        self.traceparent.trace_id()
    }

    /// `"<METHOD> <path>"` with the query string removed.
    pub fn operation_name(&self) -> String {
        format!("{} {}", self.method, path_of(&self.url))
    }

    pub fn operation_parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn request_id(&self) -> String {
        self.traceparent.back_compat_request_id()
    }

    /// The traceparent identifying this request's own span.
    pub fn traceparent(&self) -> TraceParent {
        self.traceparent
    }

    pub fn tracestate(&self) -> Option<&TraceState> {
        self.tracestate.as_ref()
    }

    pub fn correlation_context_header(&self) -> Option<&str> {
        self.correlation_context_header.as_deref()
    }

    pub fn source(&self) -> TraceSource {
        self.source
    }

    pub fn identity(&self) -> OperationIdentity {
        OperationIdentity {
            operation_id: self.operation_id(),
            operation_name: self.operation_name(),
            operation_parent_id: self.parent_id.clone(),
            request_id: self.request_id(),
        }
    }
}

type Resolved = (TraceParent, Option<TraceState>, Option<String>, TraceSource);

fn resolve<R>(request: &R, platform: Option<&PlatformTraceContext>) -> Resolved
where
    R: InboundRequest + ?Sized,
{
    if let Some(header) = platform.and_then(|p| p.traceparent.as_deref()) {
        match TraceParent::parse(header) {
            Some(traceparent) => {
                let tracestate = platform
                    .and_then(|p| p.tracestate.as_deref())
                    .map(|s| TraceState::parse(Some(s)));
                return (
                    traceparent,
                    tracestate,
                    Some(traceparent.back_compat_request_id()),
                    TraceSource::Platform,
                );
            }
            None => tracing::debug!(%header, "ignoring malformed platform traceparent"),
        }
    }

    if let Some(header) = request.get(TRACEPARENT_HEADER) {
        match TraceParent::parse(header) {
            Some(inbound) => {
                let tracestate = request
                    .get(TRACESTATE_HEADER)
                    .map(|s| TraceState::parse(Some(s)));
                return (
                    inbound.update_span_id(),
                    tracestate,
                    Some(inbound.back_compat_request_id()),
                    TraceSource::TraceparentHeader,
                );
            }
            None => tracing::debug!(%header, "ignoring malformed traceparent header"),
        }
    }

    if let Some(request_id) = request.get(REQUEST_ID_HEADER).filter(|s| !s.is_empty()) {
        let traceparent = TraceParent::with_trace_id(legacy_root_id(request_id))
            .unwrap_or_else(TraceParent::generate);
        return (
            traceparent,
            None,
            Some(request_id.to_owned()),
            TraceSource::LegacyRequestId,
        );
    }

    (TraceParent::generate(), None, None, TraceSource::Generated)
}

/// Root of a hierarchical id: `|<root>.<span>.` yields `<root>`.
fn legacy_root_id(request_id: &str) -> &str {
    let id = request_id.strip_prefix('|').unwrap_or(request_id);
    id.split('.').next().unwrap_or(id)
}

fn path_of(url: &str) -> String {
    match url.parse::<Uri>() {
        Ok(uri) => uri.path().to_owned(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_owned(),
    }
}
