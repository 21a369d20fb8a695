//! Request instrumentation for axum.
//!
//! One `RequestInstrumentor` is built at startup and shared by every request.
//! It can be attached to a whole router (`InstrumentedRouter`) or wrap a
//! single `SinkHandler` (`RequestInstrumentor::wrap`). Either way each request
//! produces exactly one counter increment and one latency observation, after
//! the downstream handler has produced its response.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    Router,
};

use reqmetrics_core::error::{MetricsError, Result};
use reqmetrics_core::instrument::{Instrumented, Recorder, SinkHandler};
use reqmetrics_core::labels::{LabelSchema, RequestMeta};

use crate::config::MetricsConfig;
use crate::obs::{Emitter, MetricsRegistry, RequestSeries};

#[derive(Clone)]
pub struct RequestInstrumentor {
    inner: Arc<InstrumentorInner>,
}

struct InstrumentorInner {
    schema: Arc<LabelSchema>,
    series: Arc<RequestSeries>,
    emitter: Arc<Emitter>,
}

/// Builder; the registry is mandatory.
#[derive(Default)]
pub struct InstrumentorBuilder {
    config: MetricsConfig,
    registry: Option<MetricsRegistry>,
}

impl InstrumentorBuilder {
    pub fn config(mut self, config: MetricsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: MetricsRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validate the config and register both series.
    pub fn build(self) -> Result<RequestInstrumentor> {
        let registry = self
            .registry
            .ok_or_else(|| MetricsError::Config("metrics registry is required".into()))?;
        self.config.validate()?;

        let schema = Arc::new(self.config.label_schema()?);
        let series = Arc::new(RequestSeries::register(&registry, &self.config, &schema)?);
        let emitter = Arc::new(Emitter::new(series.clone(), &self.config.emission)?);

        tracing::debug!(
            labels = ?schema.label_names(),
            path_label = ?schema.path_label(),
            emission = ?self.config.emission.mode,
            "request instrumentor ready"
        );

        Ok(RequestInstrumentor {
            inner: Arc::new(InstrumentorInner {
                schema,
                series,
                emitter,
            }),
        })
    }
}

impl RequestInstrumentor {
    pub fn builder() -> InstrumentorBuilder {
        InstrumentorBuilder::default()
    }

    pub fn new(config: MetricsConfig, registry: MetricsRegistry) -> Result<Self> {
        Self::builder().config(config).registry(registry).build()
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.inner.schema
    }

    pub fn series(&self) -> &RequestSeries {
        &self.inner.series
    }

    /// The recorder every observation goes through.
    pub fn recorder(&self) -> Arc<dyn Recorder> {
        self.inner.emitter.clone()
    }

    /// Attach request metrics to a sink-style handler.
    pub fn wrap<H: SinkHandler>(&self, handler: H) -> Instrumented<H> {
        Instrumented::new(handler, self.recorder(), self.inner.schema.clone())
    }

    /// Wait for queued observations (async emission). No-op in sync mode.
    pub async fn flush(&self) {
        self.inner.emitter.flush().await
    }

    pub fn dropped_emissions(&self) -> u64 {
        self.inner.emitter.dropped()
    }

    fn observe(&self, meta: &RequestMeta, status: u16, begin: Instant) {
        let labels = self.inner.schema.derive(meta, Some(status));
        self.inner.emitter.record(labels, begin.elapsed());
    }
}

/// Request facts used for labelling, read before the request is consumed.
pub fn request_meta(request: &Request) -> RequestMeta {
    let uri = request.uri();
    RequestMeta {
        method: request.method().as_str().to_owned(),
        path: uri.path().to_owned(),
        route: request
            .extensions()
            .get::<MatchedPath>()
            .map(|mp| mp.as_str().to_owned()),
        query: uri.query().map(str::to_owned),
    }
}

/// axum middleware: time the downstream service and record its outcome.
///
/// axum responses always carry an explicit status, which is what gets
/// recorded. The response is returned untouched.
pub async fn track_requests(
    State(instrumentor): State<RequestInstrumentor>,
    request: Request,
    next: Next,
) -> Response {
    let meta = request_meta(&request);
    let begin = Instant::now();

    let response = next.run(request).await;

    instrumentor.observe(&meta, response.status().as_u16(), begin);
    response
}

/// Attach request metrics to every route of a router.
///
/// Routes see their template (`MatchedPath`) as the path label; the fallback
/// has no template and is labelled with the literal path.
pub trait InstrumentedRouter {
    fn with_request_metrics(self, instrumentor: RequestInstrumentor) -> Self;
}

impl<S> InstrumentedRouter for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_request_metrics(self, instrumentor: RequestInstrumentor) -> Self {
        self.layer(middleware::from_fn_with_state(instrumentor, track_requests))
    }
}
