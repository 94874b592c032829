use std::{
    collections::HashMap,
    future::{self, Future, Ready},
    pin::Pin,
    sync::Arc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    Error, HttpMessage, HttpRequest,
};
use opentelemetry::propagation::{Extractor, Injector};
use tracing::Instrument;

use crate::{
    http_injector::join_repeated,
    middleware::request_span,
    request_parser::{InboundRequest, PlatformTraceContext},
    service::InsightsService,
    telemetry::TelemetryClient,
};

/// Correlates route handlers with the distributed trace they belong to.
///
/// Generally, the middleware should be used on every http route, this usually
/// means that it can be registered globally and in the last position, to be the
/// first to run, even before general logging layers.
///
/// Handlers read the request's `Arc<InsightsService>` through
/// `web::ReqData<Arc<InsightsService>>`, and responses get a `Request-Id`
/// header.
///
/// ```ignore
/// let client = setup::create_client(&TelemetryConfig::from_env());
/// let app = App::new()
///     .wrap(TraceLayer::new(client))
///     .route("/foo", web::get().to(foo));
/// ```
#[derive(Clone, Default)]
pub struct TraceLayer {
    client: Option<Arc<dyn TelemetryClient>>,
}

impl TraceLayer {
    pub fn new(client: Option<Arc<dyn TelemetryClient>>) -> Self {
        Self { client }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TraceLayer
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = TraceService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        future::ready(Ok(TraceService {
            service,
            client: self.client.clone(),
        }))
    }
}

/// This service implements the Trace behavior
pub struct TraceService<S> {
    service: S,
    client: Option<Arc<dyn TelemetryClient>>,
}

impl<S, Body> Service<ServiceRequest> for TraceService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<Body>, Error = Error>,
    S::Future: 'static,
    Body: 'static,
{
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    type Response = ServiceResponse<Body>;

    // This service is ready when its next service is ready
    forward_ready!(service);

    fn call(&self, request: ServiceRequest) -> Self::Future {
        let existing = request.extensions().get::<Arc<InsightsService>>().cloned();
        let insights = match existing {
            Some(insights) => insights,
            None => {
                let platform = request.extensions().get::<PlatformTraceContext>().cloned();
                let insights = Arc::new(InsightsService::new(
                    self.client.clone(),
                    platform,
                    &ActixRequest::new(request.request()),
                ));
                request.extensions_mut().insert(Arc::clone(&insights));
                insights
            }
        };

        let span = request_span(&insights);
        let future = self.service.call(request);

        Box::pin(
            async move {
                let mut response = future.await?;
                insights.inject_response_headers(&mut ActixHeaders(response.headers_mut()));
                Ok(response)
            }
            .instrument(span),
        )
    }
}

struct ActixRequest<'a> {
    request: &'a HttpRequest,
    repeated: HashMap<String, String>,
}

impl<'a> ActixRequest<'a> {
    fn new(request: &'a HttpRequest) -> Self {
        let repeated = join_repeated(
            request
                .headers()
                .iter()
                .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
        );
        Self { request, repeated }
    }
}

impl Extractor for ActixRequest<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        if let Some(joined) = self.repeated.get(key.to_ascii_lowercase().as_str()) {
            return Some(joined.as_str());
        }
        self.request.headers().get(key).and_then(|x| x.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.request.headers().keys().map(|x| x.as_str()).collect()
    }
}

impl InboundRequest for ActixRequest<'_> {
    fn method(&self) -> &str {
        self.request.method().as_str()
    }

    fn url(&self) -> String {
        self.request.full_url().to_string()
    }
}

struct ActixHeaders<'a>(&'a mut HeaderMap);

impl Injector for ActixHeaders<'_> {
    fn set(&mut self, key: &str, value: String) {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            tracing::debug!(key, "dropping response header that is not valid http");
            return;
        };
        self.0.insert(name, value);
    }
}
