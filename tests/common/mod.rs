#![allow(dead_code)]

use std::sync::Arc;

use http::Request;
use trace_correlation::{
    http_injector::RequestExtractor,
    request_parser::PlatformTraceContext,
    telemetry::{RecordingClient, TelemetryClient},
    InsightsService,
};

pub const SAMPLE_TRACEPARENT: &str = "00-5ea03e1018974a28b38e042939aa150c-0a223745ca844f3a-01";
pub const SAMPLE_TRACE_ID: &str = "5ea03e1018974a28b38e042939aa150c";

pub fn client() -> (Arc<RecordingClient>, Arc<dyn TelemetryClient>) {
    let recording = Arc::new(RecordingClient::default());
    let client: Arc<dyn TelemetryClient> = recording.clone();
    (recording, client)
}

pub fn jane_request() -> Request<()> {
    Request::get("https://api.com/Jane?name=Smith")
        .header("Authorization", "Bearer abc123")
        .body(())
        .unwrap()
}

pub fn insights(
    client: Option<Arc<dyn TelemetryClient>>,
    platform: Option<PlatformTraceContext>,
    request: &Request<()>,
) -> Arc<InsightsService> {
    Arc::new(InsightsService::new(
        client,
        platform,
        &RequestExtractor::new(request),
    ))
}
