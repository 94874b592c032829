//! Per-request correlation context.
//!
//! A [`CorrelationContext`] is built once per inbound request by the
//! [`CorrelationContextManager`] and then shared for the rest of the
//! request's lifetime. Its operation fields never change; the custom
//! properties are the only mutable part.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    properties::CorrelationProperties,
    request_parser::{InboundRequest, PlatformTraceContext, RequestParser},
    telemetry::TelemetryClient,
    traceparent::TraceParent,
    tracestate::TraceState,
};

/// Identity of the operation a request performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    id: String,
    name: String,
    parent_id: String,
    traceparent: Option<TraceParent>,
    tracestate: Option<TraceState>,
}

impl Operation {
    /// Trace id shared by every span of this operation.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Legacy id that children of this operation name as their parent.
    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn traceparent(&self) -> Option<&TraceParent> {
        self.traceparent.as_ref()
    }

    pub fn tracestate(&self) -> Option<&TraceState> {
        self.tracestate.as_ref()
    }
}

/// Everything needed to correlate telemetry of one inbound request.
#[derive(Debug)]
pub struct CorrelationContext {
    operation: Operation,
    custom_properties: Mutex<CorrelationProperties>,
}

impl CorrelationContext {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Snapshot of the request's custom properties.
    pub fn custom_properties(&self) -> CorrelationProperties {
        self.properties().clone()
    }

    /// Value of a custom property, or an empty string.
    pub fn get_property(&self, key: &str) -> String {
        self.properties().get_property(key).to_owned()
    }

    /// Sets a custom property for every reader of this context. Keys and
    /// values containing `,` or `=` are dropped.
    pub fn set_property(&self, key: &str, value: &str) {
        self.properties().set_property(key, value);
    }

    /// Custom properties as a `Correlation-Context` header value.
    pub fn serialize_to_header(&self) -> String {
        self.properties().serialize_to_header()
    }

    // The guard must never leave this type.
    fn properties(&self) -> MutexGuard<'_, CorrelationProperties> {
        self.custom_properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds correlation contexts.
///
/// Without a telemetry client every request gets no context at all, which
/// consumers read as "instrumentation disabled".
#[derive(Clone, Default)]
pub struct CorrelationContextManager {
    client: Option<Arc<dyn TelemetryClient>>,
}

impl CorrelationContextManager {
    pub fn new(client: Option<Arc<dyn TelemetryClient>>) -> Self {
        Self { client }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<&Arc<dyn TelemetryClient>> {
        self.client.as_ref()
    }

    /// Assembles a context from already resolved parts.
    ///
    /// `request_id` becomes the operation's parent id, falling back to the
    /// operation id.
    pub fn generate_context_object(
        &self,
        operation_id: &str,
        request_id: Option<&str>,
        operation_name: &str,
        correlation_header: Option<&str>,
        traceparent: Option<TraceParent>,
        tracestate: Option<TraceState>,
    ) -> Option<Arc<CorrelationContext>> {
        if !self.is_enabled() {
            return None;
        }

        Some(Arc::new(CorrelationContext {
            operation: Operation {
                id: operation_id.to_owned(),
                name: operation_name.to_owned(),
                parent_id: request_id.unwrap_or(operation_id).to_owned(),
                traceparent,
                tracestate,
            },
            custom_properties: Mutex::new(CorrelationProperties::new(correlation_header)),
        }))
    }

    /// Parses `request` and builds its context. Call once per request.
    pub fn context_for_request<R>(
        &self,
        request: &R,
        platform: Option<&PlatformTraceContext>,
    ) -> Option<Arc<CorrelationContext>>
    where
        R: InboundRequest + ?Sized,
    {
        if !self.is_enabled() {
            return None;
        }

        let parser = RequestParser::new(request, platform);
        let context = self.generate_context_object(
            &parser.operation_id(),
            Some(&parser.request_id()),
            &parser.operation_name(),
            parser.correlation_context_header(),
            Some(parser.traceparent()),
            parser.tracestate().cloned(),
        );

        tracing::debug!(
            operation_id = %parser.operation_id(),
            operation_name = %parser.operation_name(),
            source = ?parser.source(),
            "created correlation context"
        );

        context
    }
}

impl fmt::Debug for CorrelationContextManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationContextManager")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::*;
    use crate::{http_injector::RequestExtractor, telemetry::TracingTelemetryClient};

    const SAMPLE: &str = "00-5ea03e1018974a28b38e042939aa150c-0a223745ca844f3a-01";

    fn enabled() -> CorrelationContextManager {
        CorrelationContextManager::new(Some(Arc::new(TracingTelemetryClient)))
    }

    #[test]
    fn disabled_manager_yields_no_context() {
        let manager = CorrelationContextManager::default();
        assert!(!manager.is_enabled());
        assert!(manager
            .generate_context_object("id", None, "GET /", None, None, None)
            .is_none());

        let req = Request::get("https://api.com/Jane").body(()).unwrap();
        assert!(manager
            .context_for_request(&RequestExtractor::new(&req), None)
            .is_none());
    }

    #[test]
    fn seeds_properties_from_header() {
        let ctx = enabled()
            .generate_context_object("op", Some("|op.1."), "GET /", Some("k1=v1, k2=v2"), None, None)
            .unwrap();

        assert_eq!(ctx.operation().id(), "op");
        assert_eq!(ctx.operation().parent_id(), "|op.1.");
        assert_eq!(ctx.get_property("k2"), "v2");
        assert_eq!(ctx.custom_properties().len(), 2);
    }

    #[test]
    fn parent_id_falls_back_to_operation_id() {
        let ctx = enabled()
            .generate_context_object("op", None, "GET /", None, None, None)
            .unwrap();
        assert_eq!(ctx.operation().parent_id(), "op");
    }

    #[test]
    fn properties_are_shared_between_readers() {
        let ctx = enabled()
            .generate_context_object("op", None, "GET /", None, None, None)
            .unwrap();
        let reader = Arc::clone(&ctx);

        ctx.set_property("tenant", "contoso");
        assert_eq!(reader.get_property("tenant"), "contoso");
    }

    #[test]
    fn builds_context_for_request() {
        let req = Request::get("https://api.com/Jane?name=Smith")
            .header("traceparent", SAMPLE)
            .header("Correlation-Context", "k=v")
            .body(())
            .unwrap();
        let ctx = enabled()
            .context_for_request(&RequestExtractor::new(&req), None)
            .unwrap();

        let operation = ctx.operation();
        assert_eq!(operation.id(), "5ea03e1018974a28b38e042939aa150c");
        assert_eq!(operation.name(), "GET /Jane");
        let traceparent = operation.traceparent().unwrap();
        assert_eq!(operation.parent_id(), traceparent.back_compat_request_id());
        assert_eq!(ctx.serialize_to_header(), "k=v");
    }

    #[test]
    fn snapshot_does_not_block_writers() {
        let ctx = enabled()
            .generate_context_object("op", None, "GET /", Some("k=v"), None, None)
            .unwrap();

        let snapshot = ctx.custom_properties();
        ctx.set_property("tenant", "contoso");

        assert_eq!(snapshot.serialize_to_header(), "k=v");
        assert_eq!(ctx.serialize_to_header(), "k=v, tenant=contoso");
    }
}
