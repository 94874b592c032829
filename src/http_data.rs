//! Outbound HTTP calls tracked as dependencies of the current operation.

use std::{future::Future, sync::Arc, time::SystemTime};

use http::{Request, Response, StatusCode};

use crate::{
    error::{BoxError, Error},
    http_injector::RequestInjector,
    service::InsightsService,
    telemetry::DependencyTelemetry,
    timer::Timer,
};

const DEPENDENCY_TYPE: &str = "HTTP";

/// Anything able to send an HTTP request: a pooled client, a test double, or
/// another decorator.
pub trait HttpDataService {
    type Body;

    fn send<B>(
        &self,
        request: Request<B>,
    ) -> impl Future<Output = Result<Response<Self::Body>, BoxError>>;
}

/// Wraps an [`HttpDataService`] so every call carries the correlation
/// headers of the current request and is reported as a dependency.
pub struct TrackedHttpDataService<S> {
    inner: S,
    insights: Arc<InsightsService>,
}

impl<S> TrackedHttpDataService<S>
where
    S: HttpDataService,
{
    pub fn new(inner: S, insights: Arc<InsightsService>) -> Self {
        Self { inner, insights }
    }

    /// Sends `request`, recording duration and outcome.
    ///
    /// A failing call is recorded as a 500 and handed back as
    /// [`Error::Dependency`].
    pub async fn call<B>(&self, mut request: Request<B>) -> Result<Response<S::Body>, Error> {
        let url = request.uri().to_string();
        self.insights
            .headers_for_dependency_request()
            .inject(&mut RequestInjector::new(&mut request));

        let mut timer = Timer::new();
        let result = self.inner.send(request).await;
        timer.stop();

        let status = match &result {
            Ok(response) => response.status(),
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        self.track(&url, status, &timer);

        result.map_err(|source| Error::Dependency { url, source })
    }

    fn track(&self, url: &str, status: StatusCode, timer: &Timer) {
        let Some(client) = self.insights.client() else {
            return;
        };

        client.track_dependency(DependencyTelemetry {
            name: url.to_owned(),
            data: url.to_owned(),
            dependency_type_name: DEPENDENCY_TYPE.to_owned(),
            duration: timer.duration().unwrap_or_default(),
            result_code: status.as_u16(),
            success: is_success(status),
            time: timer.end_time().unwrap_or_else(SystemTime::now),
            context: self.insights.correlation_context().cloned(),
            tag_overrides: self.insights.tag_overrides(),
        });
    }
}

impl<S> HttpDataService for TrackedHttpDataService<S>
where
    S: HttpDataService,
{
    type Body = S::Body;

    async fn send<B>(&self, request: Request<B>) -> Result<Response<Self::Body>, BoxError> {
        self.call(request).await.map_err(Into::into)
    }
}

/// 2xx and 3xx count as success.
fn is_success(status: StatusCode) -> bool {
    (StatusCode::OK.as_u16()..StatusCode::BAD_REQUEST.as_u16()).contains(&status.as_u16())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::HeaderMap;

    use super::*;
    use crate::{
        http_injector::RequestExtractor,
        request_parser::PlatformTraceContext,
        telemetry::{RecordingClient, TelemetryClient, OPERATION_ID_TAG},
        traceparent::TraceParent,
    };

    const SAMPLE: &str = "00-5ea03e1018974a28b38e042939aa150c-0a223745ca844f3a-01";

    /// Answers every request with a fixed status and remembers the headers
    /// it saw.
    #[derive(Default)]
    struct StubService {
        status: Option<StatusCode>,
        seen: Mutex<Vec<HeaderMap>>,
    }

    impl HttpDataService for StubService {
        type Body = &'static str;

        async fn send<B>(&self, request: Request<B>) -> Result<Response<Self::Body>, BoxError> {
            self.seen.lock().unwrap().push(request.headers().clone());
            let status = self.status.ok_or("Not Implemented")?;
            Ok(Response::builder().status(status).body("{}")?)
        }
    }

    fn insights(client: &Arc<RecordingClient>) -> Arc<InsightsService> {
        let inbound = Request::get("https://api.com/Jane?name=Smith").body(()).unwrap();
        let client: Arc<dyn TelemetryClient> = client.clone();
        Arc::new(InsightsService::new(
            Some(client),
            Some(PlatformTraceContext::new(SAMPLE)),
            &RequestExtractor::new(&inbound),
        ))
    }

    fn stub(status: Option<StatusCode>) -> StubService {
        StubService {
            status,
            ..StubService::default()
        }
    }

    #[tokio::test]
    async fn tracks_successful_call() {
        let client = Arc::new(RecordingClient::default());
        let http = TrackedHttpDataService::new(stub(Some(StatusCode::OK)), insights(&client));

        let response = http
            .call(Request::get("/version").body(()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*response.body(), "{}");

        let dependencies = client.dependencies();
        let telemetry = &dependencies[0];
        assert_eq!(telemetry.data, "/version");
        assert_eq!(telemetry.name, "/version");
        assert_eq!(telemetry.dependency_type_name, "HTTP");
        assert_eq!(telemetry.result_code, 200);
        assert!(telemetry.success);
        assert_eq!(
            telemetry.tag_overrides.as_ref().unwrap()[OPERATION_ID_TAG],
            "5ea03e1018974a28b38e042939aa150c"
        );
    }

    #[tokio::test]
    async fn tracks_failed_status() {
        let client = Arc::new(RecordingClient::default());
        let http =
            TrackedHttpDataService::new(stub(Some(StatusCode::UNAUTHORIZED)), insights(&client));

        let response = http
            .call(Request::post("/version").body(()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let dependencies = client.dependencies();
        assert_eq!(dependencies[0].result_code, 401);
        assert!(!dependencies[0].success);
    }

    #[tokio::test]
    async fn tracks_transport_failure() {
        let client = Arc::new(RecordingClient::default());
        let http = TrackedHttpDataService::new(stub(None), insights(&client));

        let error = http
            .call(Request::put("/version").body(()).unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "dependency call to /version failed: Not Implemented"
        );

        let dependencies = client.dependencies();
        assert_eq!(dependencies[0].result_code, 500);
        assert!(!dependencies[0].success);
    }

    #[tokio::test]
    async fn sends_correlation_headers() {
        let client = Arc::new(RecordingClient::default());
        let http = TrackedHttpDataService::new(stub(Some(StatusCode::OK)), insights(&client));

        let request = Request::get("/version")
            .header("traceparent", "caller-supplied")
            .header("x-api-key", "secret")
            .body(())
            .unwrap();
        http.call(request).await.unwrap();

        let seen = http.inner.seen.lock().unwrap();
        let headers = &seen[0];
        assert_eq!(headers["x-api-key"], "secret");
        assert_eq!(headers["parent-id"], "5ea03e1018974a28b38e042939aa150c");

        let traceparent = TraceParent::parse(headers["traceparent"].to_str().unwrap()).unwrap();
        assert_eq!(traceparent.trace_id(), "5ea03e1018974a28b38e042939aa150c");
        assert_eq!(headers["request-id"], traceparent.back_compat_request_id().as_str());
    }

    #[test]
    fn success_range() {
        assert!(is_success(StatusCode::OK));
        assert!(is_success(StatusCode::PERMANENT_REDIRECT));
        assert!(!is_success(StatusCode::BAD_REQUEST));
        assert!(!is_success(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
