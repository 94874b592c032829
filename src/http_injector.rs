use std::collections::HashMap;

use http::{HeaderMap, HeaderName, HeaderValue, Request};
use opentelemetry::propagation::{Extractor, Injector};

use crate::{
    context::CorrelationContext, request_parser::InboundRequest, traceparent::TraceParent,
};

// "traceparent" / "tracestate" => https://www.w3.org/TR/trace-context/#trace-context-http-headers-format
pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";
// Pre-W3C hierarchical correlation.
pub const REQUEST_ID_HEADER: &str = "Request-Id";
pub const PARENT_ID_HEADER: &str = "Parent-Id";
pub const ROOT_ID_HEADER: &str = "Root-Id";
pub const CORRELATION_CONTEXT_HEADER: &str = "Correlation-Context";

/// Correlation headers for one outbound dependency call.
///
/// Only the headers below are ever produced, names cased as sent:
/// `Request-Id`, `Parent-Id`, `Root-Id`, `traceparent`, and, when there is
/// something to forward, `tracestate` and `Correlation-Context`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyHeaders {
    headers: Vec<(&'static str, String)>,
}

impl DependencyHeaders {
    /// Derives the headers for a new outbound call from `context`.
    ///
    /// The call becomes a child span of the context's traceparent. A context
    /// without a traceparent starts a fresh trace for the call instead. The
    /// context itself is left untouched. No context means no headers.
    pub fn build(context: Option<&CorrelationContext>) -> Self {
        let Some(context) = context else {
            return Self::default();
        };
        let operation = context.operation();

        let traceparent = match operation.traceparent() {
            Some(traceparent) => traceparent.update_span_id(),
            None => TraceParent::generate(),
        };
        let unique_request_id = traceparent.back_compat_request_id();

        let mut headers = vec![
            (REQUEST_ID_HEADER, unique_request_id.clone()),
            (PARENT_ID_HEADER, operation.id().to_owned()),
            (ROOT_ID_HEADER, unique_request_id),
            (TRACEPARENT_HEADER, traceparent.to_string()),
        ];

        if let Some(tracestate) = operation.tracestate().filter(|s| !s.is_empty()) {
            headers.push((TRACESTATE_HEADER, tracestate.to_string()));
        }

        let correlation_context = context.serialize_to_header();
        if !correlation_context.is_empty() {
            headers.push((CORRELATION_CONTEXT_HEADER, correlation_context));
        }

        Self { headers }
    }

    /// Header value by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.headers.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Writes every header into `injector`, replacing same-named values.
    pub fn inject(&self, injector: &mut dyn Injector) {
        for (key, value) in self.iter() {
            injector.set(key, value.to_owned());
        }
    }
}

/// Adds correlation headers for a dependency call to an outgoing
/// [`Request`]. Headers the caller already set under the same names are
/// replaced, since they must describe where the call really sits in the
/// trace.
pub fn inject_dependency_headers_into_request<'r, T>(
    context: Option<&CorrelationContext>,
    request: &'r mut Request<T>,
) -> &'r mut Request<T> {
    DependencyHeaders::build(context).inject(&mut RequestInjector::new(request));

    request
}

/// Writes `Request-Id` into a response so callers can see which invocation
/// served them. The value is `traceparent` when given and otherwise the
/// context's own traceparent; nothing is written when neither exists.
pub fn inject_request_id_into_response(
    traceparent: Option<&TraceParent>,
    context: Option<&CorrelationContext>,
    injector: &mut dyn Injector,
) {
    let Some(traceparent) = traceparent
        .or_else(|| context.and_then(|ctx| ctx.operation().traceparent()))
    else {
        return;
    };

    injector.set(REQUEST_ID_HEADER, traceparent.to_string());
}

/// Injector used to insert correlation header values into an outgoing
/// [`Request`].
pub struct RequestInjector<'a, T> {
    request: &'a mut Request<T>,
}

impl<'a, T> RequestInjector<'a, T> {
    pub fn new(request: &'a mut Request<T>) -> Self {
        RequestInjector { request }
    }
}

impl<'a, T> Injector for RequestInjector<'a, T> {
    fn set(&mut self, key: &str, value: String) {
        HeaderMapInjector(self.request.headers_mut()).set(key, value);
    }
}

/// Injector over a bare [`HeaderMap`], e.g. the headers of a response.
pub struct HeaderMapInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderMapInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let Ok(key) = key.parse::<HeaderName>() else {
            tracing::debug!(%key, "failed to parse header name");
            return;
        };
        let Ok(value) = value.parse::<HeaderValue>() else {
            tracing::debug!(%value, "failed to parse header value");
            return;
        };
        self.0.insert(key, value);
    }
}

/// Read side of an inbound [`Request`], used by the request parser.
pub struct RequestExtractor<'a, T> {
    request: &'a Request<T>,
    repeated: HashMap<String, String>,
}

impl<'a, T> RequestExtractor<'a, T> {
    pub fn new(request: &'a Request<T>) -> Self {
        let repeated = join_repeated(
            request
                .headers()
                .iter()
                .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
        );
        RequestExtractor { request, repeated }
    }
}

impl<'a, T> Extractor for RequestExtractor<'a, T> {
    /// Headers sent on several lines read as one comma-joined value.
    fn get(&self, key: &str) -> Option<&str> {
        if let Some(joined) = self.repeated.get(key.to_ascii_lowercase().as_str()) {
            return Some(joined.as_str());
        }
        self.request
            .headers()
            .get(key)
            .and_then(|h| h.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.request.headers().keys().map(|s| s.as_str()).collect()
    }
}

impl<'a, T> InboundRequest for RequestExtractor<'a, T> {
    fn method(&self) -> &str {
        self.request.method().as_str()
    }

    fn url(&self) -> String {
        self.request.uri().to_string()
    }
}

/// Values of headers that arrived on more than one line, joined with `,` as
/// RFC 9110 allows for list-valued fields.
pub(crate) fn join_repeated<'h>(
    headers: impl Iterator<Item = (&'h str, &'h str)>,
) -> HashMap<String, String> {
    let mut values: HashMap<String, Vec<&str>> = HashMap::new();
    for (name, value) in headers {
        values
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value);
    }

    values
        .into_iter()
        .filter(|(_, lines)| lines.len() > 1)
        .map(|(name, lines)| (name, lines.join(",")))
        .collect()
}
