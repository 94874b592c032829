#![cfg(feature = "tower")]

mod common;

use std::{convert::Infallible, sync::Arc};

use common::{client, SAMPLE_TRACEPARENT, SAMPLE_TRACE_ID};
use http::{Request, Response};
use tower::{service_fn, Layer, ServiceExt};
use trace_correlation::{
    middleware::tower::TraceLayer, request_parser::PlatformTraceContext, InsightsService,
    TraceParent,
};

/// Echoes the operation id the handler sees.
async fn handler(request: Request<()>) -> Result<Response<String>, Infallible> {
    let operation_id = request
        .extensions()
        .get::<Arc<InsightsService>>()
        .and_then(|insights| insights.correlation_context().cloned())
        .map(|context| context.operation().id().to_owned())
        .unwrap_or_default();
    Ok(Response::new(operation_id))
}

#[tokio::test]
async fn attaches_context_from_traceparent() {
    let (_, client) = client();
    let service = TraceLayer::new(Some(client)).layer(service_fn(handler));

    let request = Request::get("https://api.com/Jane?name=Smith")
        .header("traceparent", SAMPLE_TRACEPARENT)
        .body(())
        .unwrap();
    let response = service.oneshot(request).await.unwrap();

    assert_eq!(response.body(), SAMPLE_TRACE_ID);
    let request_id = response.headers()["request-id"].to_str().unwrap();
    let served = TraceParent::parse(request_id).unwrap();
    assert_eq!(served.trace_id(), SAMPLE_TRACE_ID);
    assert_ne!(served.span_id(), "0a223745ca844f3a");
}

#[tokio::test]
async fn prefers_platform_context() {
    let (_, client) = client();
    let service = TraceLayer::new(Some(client)).layer(service_fn(handler));

    let mut request = Request::get("https://api.com/Jane")
        .header(
            "traceparent",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
        )
        .body(())
        .unwrap();
    request
        .extensions_mut()
        .insert(PlatformTraceContext::new(SAMPLE_TRACEPARENT));
    let response = service.oneshot(request).await.unwrap();

    assert_eq!(response.body(), SAMPLE_TRACE_ID);
    assert_eq!(response.headers()["request-id"], SAMPLE_TRACEPARENT);
}

#[tokio::test]
async fn reuses_attached_service() {
    let (_, client) = client();
    let service = TraceLayer::new(Some(client.clone())).layer(service_fn(handler));

    let mut request = Request::get("https://api.com/Jane").body(()).unwrap();
    let attached = Arc::new(InsightsService::new(
        Some(client),
        Some(PlatformTraceContext::new(SAMPLE_TRACEPARENT)),
        &trace_correlation::http_injector::RequestExtractor::new(&request),
    ));
    request.extensions_mut().insert(attached);
    let response = service.oneshot(request).await.unwrap();

    assert_eq!(response.body(), SAMPLE_TRACE_ID);
}

#[tokio::test]
async fn passes_through_when_disabled() {
    let service = TraceLayer::new(None).layer(service_fn(handler));

    let request = Request::get("https://api.com/Jane")
        .header("traceparent", SAMPLE_TRACEPARENT)
        .body(())
        .unwrap();
    let response = service.oneshot(request).await.unwrap();

    assert_eq!(response.body(), "");
    assert!(response.headers().get("request-id").is_none());
}
