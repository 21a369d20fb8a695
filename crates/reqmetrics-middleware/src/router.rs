//! Axum router wiring for the demo server.
//!
//! Every route, including `/metrics`, goes through the request metrics layer,
//! except `/hello/observed`: that sink handler is wrapped by the instrumentor
//! itself and is mounted after the layer so it is counted once.

use axum::{routing::get, Router};

use crate::{app_state::AppState, handlers, instrumentor::InstrumentedRouter, ops, sink};

pub fn build_router(state: AppState) -> Router {
    let observed = state.instrumentor().wrap(handlers::hello);
    Router::new()
        .route("/", get(handlers::index))
        .route("/items/:id", get(handlers::get_item))
        .route("/hello", get(sink::into_handler(handlers::hello)))
        .route("/healthz", get(ops::healthz))
        .route("/metrics", get(ops::metrics))
        .with_request_metrics(state.instrumentor())
        .route("/hello/observed", get(sink::into_handler(observed)))
        .with_state(state)
}
