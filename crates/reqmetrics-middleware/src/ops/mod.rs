//! Operational HTTP endpoints.
//!
//! - `/healthz` : liveness
//! - `/metrics` : text exposition of every series in the registry

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::obs::{MetricsRegistry, TEXT_CONTENT_TYPE};

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Scrape handler. Needs `MetricsRegistry: FromRef<S>` for the router state.
pub async fn metrics(State(registry): State<MetricsRegistry>) -> Response {
    match registry.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "metrics exposition failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

/// Ready-made `/metrics` router for a registry, mergeable into any app.
pub fn metrics_router<S>(registry: MetricsRegistry) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/metrics", get(metrics))
        .with_state(registry)
}
