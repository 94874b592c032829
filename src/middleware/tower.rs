use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use http::{Request, Response};
use tower::Service;
use tower_layer::Layer;
use tracing::Instrument;

use crate::{
    http_injector::RequestExtractor, middleware::request_span, request_parser::PlatformTraceContext,
    service::InsightsService, telemetry::TelemetryClient,
};

/// Correlates route handlers with the distributed trace they belong to.
///
/// Generally, the middleware should be used on every http route, this usually
/// means that it can be registered globally and in the last position, to be the
/// first to run, even before general logging layers.
///
/// Handlers find the request's `Arc<InsightsService>` in the request
/// extensions, and responses get a `Request-Id` header. Without a client,
/// requests pass through uninstrumented.
///
/// ```ignore
/// let client = setup::create_client(&TelemetryConfig::from_env());
/// let app = Router::new()
///     .route("/foo", get(|| async {}))
///     .route("/bar", get(|| async {}))
///     .layer(TraceLayer::new(client));
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

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, service: S) -> Self::Service {
        TraceService {
            service,
            client: self.client.clone(),
        }
    }
}

/// This service implements the Trace behavior
#[derive(Clone)]
pub struct TraceService<S> {
    service: S,
    client: Option<Arc<dyn TelemetryClient>>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TraceService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: 'static,
    ResBody: 'static,
{
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;
    type Response = Response<ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let insights = match request.extensions().get::<Arc<InsightsService>>() {
            Some(insights) => Arc::clone(insights),
            None => {
                let platform = request.extensions().get::<PlatformTraceContext>().cloned();
                let insights = Arc::new(InsightsService::new(
                    self.client.clone(),
                    platform,
                    &RequestExtractor::new(&request),
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
                insights.add_headers_to_response(response.headers_mut());
                Ok(response)
            }
            .instrument(span),
        )
    }
}
