use std::{fmt, sync::Arc};

use http::HeaderMap;
use opentelemetry::propagation::Injector;

use crate::{
    context::{CorrelationContext, CorrelationContextManager},
    http_injector::{inject_request_id_into_response, DependencyHeaders, HeaderMapInjector},
    request_parser::{InboundRequest, PlatformTraceContext},
    telemetry::{TelemetryClient, Tags, OPERATION_ID_TAG},
    traceparent::TraceParent,
    tracestate::TraceState,
};

/// Telemetry state of one inbound request.
///
/// Built once when the request arrives; everything instrumenting the
/// request (logger, dependency calls, response hook) reads from it.
pub struct InsightsService {
    client: Option<Arc<dyn TelemetryClient>>,
    platform: Option<PlatformTraceContext>,
    context: Option<Arc<CorrelationContext>>,
}

impl InsightsService {
    pub fn new<R>(
        client: Option<Arc<dyn TelemetryClient>>,
        platform: Option<PlatformTraceContext>,
        request: &R,
    ) -> Self
    where
        R: InboundRequest + ?Sized,
    {
        let manager = CorrelationContextManager::new(client);
        let context = manager.context_for_request(request, platform.as_ref());

        Self {
            client: manager.client().cloned(),
            platform,
            context,
        }
    }

    pub fn client(&self) -> Option<&Arc<dyn TelemetryClient>> {
        self.client.as_ref()
    }

    /// `None` when telemetry is disabled.
    pub fn correlation_context(&self) -> Option<&Arc<CorrelationContext>> {
        self.context.as_ref()
    }

    pub fn platform_context(&self) -> Option<&PlatformTraceContext> {
        self.platform.as_ref()
    }

    pub fn platform_traceparent(&self) -> Option<TraceParent> {
        self.platform
            .as_ref()?
            .traceparent
            .as_deref()
            .and_then(TraceParent::parse)
    }

    pub fn platform_tracestate(&self) -> Option<TraceState> {
        let tracestate = self.platform.as_ref()?.tracestate.as_deref()?;
        Some(TraceState::parse(Some(tracestate)))
    }

    /// Tags correlating custom telemetry with this request's operation.
    pub fn tag_overrides(&self) -> Option<Tags> {
        let context = self.context.as_ref()?;
        Some(Tags::from([(
            OPERATION_ID_TAG.to_owned(),
            context.operation().id().to_owned(),
        )]))
    }

    pub fn headers_for_dependency_request(&self) -> DependencyHeaders {
        DependencyHeaders::build(self.context.as_deref())
    }

    /// Tells the caller which invocation served it through `Request-Id`.
    pub fn add_headers_to_response(&self, headers: &mut HeaderMap) {
        self.inject_response_headers(&mut HeaderMapInjector(headers));
    }

    /// [`add_headers_to_response`](Self::add_headers_to_response) for
    /// responses that are not an [`http::Response`].
    pub fn inject_response_headers(&self, injector: &mut dyn Injector) {
        inject_request_id_into_response(
            self.platform_traceparent().as_ref(),
            self.context.as_deref(),
            injector,
        );
    }
}

impl fmt::Debug for InsightsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsightsService")
            .field("enabled", &self.client.is_some())
            .field("platform", &self.platform)
            .field("context", &self.context)
            .finish()
    }
}
