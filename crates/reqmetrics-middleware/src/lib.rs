//! reqmetrics middleware library entry.
//!
//! This crate wires the core instrumentation into axum and the prometheus
//! client: the injected registry, the request series, emission dispatch, the
//! router layer and the `/metrics` endpoint. It is consumed by the demo
//! binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod handlers;
pub mod instrumentor;
pub mod obs;
pub mod ops;
pub mod router;
pub mod sink;

pub use instrumentor::{track_requests, InstrumentedRouter, InstrumentorBuilder, RequestInstrumentor};
pub use obs::MetricsRegistry;
