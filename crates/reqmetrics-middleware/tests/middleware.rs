//! End-to-end tests: axum router + request metrics layer + /metrics.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Router,
};
use tower::ServiceExt;

use reqmetrics_core::labels::{LabelName, LabelSchema, RequestMeta};
use reqmetrics_core::observer::{BufferedSink, ResponseSink};
use reqmetrics_core::{ErrorKind, SinkHandler};
use reqmetrics_middleware::config::{EmissionConfig, EmissionMode, MetricsConfig, OnConflict};
use reqmetrics_middleware::ops;
use reqmetrics_middleware::{InstrumentedRouter, MetricsRegistry, RequestInstrumentor};

async fn hello() -> impl IntoResponse {
    (StatusCode::OK, "ok\n")
}

async fn item() -> impl IntoResponse {
    (StatusCode::CREATED, [("x-item", "1")], "item\n")
}

async fn method_echo(method: Method) -> String {
    method.to_string()
}

fn routes() -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/items/:id", get(item))
        .route("/echo", any(method_echo))
}

fn instrumented(cfg: MetricsConfig) -> (Router, RequestInstrumentor, MetricsRegistry) {
    let registry = MetricsRegistry::new();
    let inst = RequestInstrumentor::new(cfg, registry.clone()).unwrap();
    let app = routes()
        .merge(ops::metrics_router(registry.clone()))
        .with_request_metrics(inst.clone());
    (app, inst, registry)
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn count(inst: &RequestInstrumentor, values: &[&str]) -> u64 {
    inst.series().requests().with_label_values(values).get()
}

fn counter_total(registry: &MetricsRegistry, name: &str) -> f64 {
    registry
        .gather()
        .iter()
        .filter(|mf| mf.get_name() == name)
        .flat_map(|mf| mf.get_metric().iter())
        .map(|m| m.get_counter().get_value())
        .sum()
}

#[tokio::test]
async fn scrape_after_root_request() {
    let (app, _inst, _registry) = instrumented(MetricsConfig::default());

    let (status, body) = call(&app, "GET", "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok\n");

    let (status, body) = call(&app, "GET", "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("http_requests_total"), "{text}");
    assert!(text.contains("http_request_duration_seconds"), "{text}");
    assert!(
        text.contains(r#"http_requests_total{method="get",path="/",status="200"} 1"#),
        "{text}"
    );
    assert!(text.contains(r#"le="0.3""#), "{text}");
}

#[tokio::test]
async fn response_is_unchanged_by_instrumentation() {
    let (app, _inst, _registry) = instrumented(MetricsConfig::default());
    let plain = routes();

    for uri in ["/", "/items/7", "/nope"] {
        let req = || Request::builder().uri(uri).body(Body::empty()).unwrap();
        let a = plain.clone().oneshot(req()).await.unwrap();
        let b = app.clone().oneshot(req()).await.unwrap();

        assert_eq!(a.status(), b.status(), "uri={uri}");
        assert_eq!(a.headers(), b.headers(), "uri={uri}");
        let a = to_bytes(a.into_body(), usize::MAX).await.unwrap();
        let b = to_bytes(b.into_body(), usize::MAX).await.unwrap();
        assert_eq!(a, b, "uri={uri}");
    }
}

#[tokio::test]
async fn route_template_bounds_path_label() {
    let (app, inst, _registry) = instrumented(MetricsConfig::default());

    call(&app, "GET", "/items/42").await;
    call(&app, "GET", "/items/99").await;

    assert_eq!(count(&inst, &["201", "get", "/items/:id"]), 2);
    assert_eq!(count(&inst, &["201", "get", "/items/42"]), 0);
}

#[tokio::test]
async fn raw_path_label_keeps_literal_path() {
    let cfg = MetricsConfig {
        path_label: reqmetrics_core::PathLabel::Raw,
        ..MetricsConfig::default()
    };
    let (app, inst, _registry) = instrumented(cfg);

    call(&app, "GET", "/items/42").await;
    assert_eq!(count(&inst, &["201", "get", "/items/42"]), 1);
}

#[tokio::test]
async fn unmatched_path_uses_literal_path() {
    let (app, inst, _registry) = instrumented(MetricsConfig::default());

    let (status, _) = call(&app, "GET", "/missing/5").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(count(&inst, &["404", "get", "/missing/5"]), 1);
}

#[tokio::test]
async fn method_is_lowercase() {
    let (app, inst, _registry) = instrumented(MetricsConfig::default());

    let (_, body) = call(&app, "PATCH", "/echo").await;
    assert_eq!(body, b"PATCH");
    call(&app, "DELETE", "/echo").await;

    assert_eq!(count(&inst, &["200", "patch", "/echo"]), 1);
    assert_eq!(count(&inst, &["200", "delete", "/echo"]), 1);
}

#[tokio::test]
async fn version_label_from_query() {
    let cfg = MetricsConfig {
        labels: vec![LabelName::Status, LabelName::Method, LabelName::Path, LabelName::Version],
        ..MetricsConfig::default()
    };
    let (app, inst, _registry) = instrumented(cfg);

    call(&app, "GET", "/?version=1.4.2").await;
    call(&app, "GET", "/?version=").await;
    call(&app, "GET", "/").await;

    assert_eq!(count(&inst, &["200", "get", "/", "1.4.2"]), 1);
    assert_eq!(count(&inst, &["200", "get", "/", "0.0.0"]), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_each_count_once() {
    const N: usize = 128;
    let (app, _inst, registry) = instrumented(MetricsConfig::default());

    let mut tasks = Vec::with_capacity(N);
    for i in 0..N {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            let uri = if i % 2 == 0 { "/".to_string() } else { format!("/items/{i}") };
            call(&app, "GET", &uri).await
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    assert_eq!(counter_total(&registry, "http_requests_total"), N as f64);
}

#[tokio::test]
async fn async_emission_applies_after_flush() {
    let cfg = MetricsConfig {
        emission: EmissionConfig {
            mode: EmissionMode::Async,
            queue_capacity: 256,
        },
        ..MetricsConfig::default()
    };
    let (app, inst, registry) = instrumented(cfg);

    for _ in 0..10 {
        call(&app, "GET", "/").await;
    }
    inst.flush().await;

    assert_eq!(inst.dropped_emissions(), 0);
    assert_eq!(count(&inst, &["200", "get", "/"]), 10);
    assert_eq!(counter_total(&registry, "http_requests_total"), 10.0);
}

#[tokio::test]
async fn full_queue_drops_and_counts() {
    let cfg = MetricsConfig {
        emission: EmissionConfig {
            mode: EmissionMode::Async,
            queue_capacity: 1,
        },
        ..MetricsConfig::default()
    };
    let (_app, inst, registry) = instrumented(cfg);
    let recorder = inst.recorder();
    let meta = RequestMeta::new("GET", "/");

    // No await in between: the worker cannot drain the queue.
    for _ in 0..10 {
        recorder.record(inst.schema().derive(&meta, Some(200)), Duration::from_millis(1));
    }
    inst.flush().await;

    let dropped = inst.dropped_emissions();
    let applied = counter_total(&registry, "http_requests_total") as u64;
    assert!(dropped > 0);
    assert_eq!(applied + dropped, 10);
}

#[test]
fn wrong_label_arity_is_an_emission_error() {
    let inst = RequestInstrumentor::new(MetricsConfig::default(), MetricsRegistry::new()).unwrap();
    let narrow = LabelSchema::new(&[LabelName::Method]).unwrap();
    let labels = narrow.derive(&RequestMeta::new("GET", "/"), Some(200));

    let err = inst
        .series()
        .apply(&labels, Duration::from_millis(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Emission);

    // Through the recorder the error is logged and the request is not counted.
    inst.recorder().record(labels, Duration::from_millis(1));
    let latency = inst.series().latency().with_label_values(&["200", "get", "/"]);
    assert_eq!(latency.get_sample_count(), 0);
    assert_eq!(count(&inst, &["200", "get", "/"]), 0);
}

#[test]
fn failed_build_leaves_registry_untouched() {
    let raw = prometheus::Registry::new();
    let taken = prometheus::Histogram::with_opts(prometheus::HistogramOpts::new(
        "http_request_duration_seconds",
        "registered elsewhere",
    ))
    .unwrap();
    raw.register(Box::new(taken)).unwrap();
    let registry = MetricsRegistry::from_registry(raw);

    let err = RequestInstrumentor::new(MetricsConfig::default(), registry.clone())
        .err()
        .expect("must fail");
    assert_eq!(err.kind().as_str(), "REGISTRATION_CONFLICT");
    assert!(err.to_string().contains("http_request_duration_seconds"), "{err}");
    assert!(!registry.contains("http_requests_total"));

    // Same outcome on a second attempt: the counter did not stay behind.
    let again = RequestInstrumentor::new(MetricsConfig::default(), registry)
        .err()
        .expect("must fail");
    assert!(again.to_string().contains("http_request_duration_seconds"), "{again}");
}

#[test]
fn build_can_be_retried_after_a_conflict() {
    let raw = prometheus::Registry::new();
    let taken = prometheus::Histogram::with_opts(prometheus::HistogramOpts::new(
        "http_request_duration_seconds",
        "registered elsewhere",
    ))
    .unwrap();
    raw.register(Box::new(taken)).unwrap();
    let registry = MetricsRegistry::from_registry(raw);

    assert!(RequestInstrumentor::new(MetricsConfig::default(), registry.clone()).is_err());

    let cfg = MetricsConfig {
        histogram_name: "http_request_latency_seconds".into(),
        ..MetricsConfig::default()
    };
    RequestInstrumentor::new(cfg, registry.clone()).unwrap();
    assert!(registry.contains("http_requests_total"));
    assert!(registry.contains("http_request_latency_seconds"));
}

#[test]
fn async_emission_needs_runtime() {
    let cfg = MetricsConfig {
        emission: EmissionConfig {
            mode: EmissionMode::Async,
            queue_capacity: 8,
        },
        ..MetricsConfig::default()
    };
    let err = RequestInstrumentor::new(cfg, MetricsRegistry::new())
        .err()
        .expect("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[test]
fn registry_is_required() {
    let err = RequestInstrumentor::builder()
        .config(MetricsConfig::default())
        .build()
        .err()
        .expect("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[test]
fn duplicate_registration_fails_by_default() {
    let registry = MetricsRegistry::new();
    RequestInstrumentor::new(MetricsConfig::default(), registry.clone()).unwrap();

    let err = RequestInstrumentor::new(MetricsConfig::default(), registry)
        .err()
        .expect("must fail");
    assert_eq!(err.kind().as_str(), "REGISTRATION_CONFLICT");
}

#[tokio::test]
async fn duplicate_registration_reuses_when_configured() {
    let cfg = MetricsConfig {
        on_conflict: OnConflict::Reuse,
        ..MetricsConfig::default()
    };
    let registry = MetricsRegistry::new();
    let first = RequestInstrumentor::new(cfg.clone(), registry.clone()).unwrap();
    let second = RequestInstrumentor::new(cfg, registry.clone()).unwrap();

    let app_a = routes().with_request_metrics(first.clone());
    let app_b = routes().with_request_metrics(second);
    call(&app_a, "GET", "/").await;
    call(&app_b, "GET", "/").await;

    assert_eq!(count(&first, &["200", "get", "/"]), 2);
    assert_eq!(counter_total(&registry, "http_requests_total"), 2.0);
}

#[tokio::test]
async fn conflicting_shape_degrades_without_failing_traffic() {
    let registry = MetricsRegistry::new();
    RequestInstrumentor::new(MetricsConfig::default(), registry.clone()).unwrap();

    let cfg = MetricsConfig {
        labels: vec![LabelName::Method],
        on_conflict: OnConflict::Reuse,
        ..MetricsConfig::default()
    };
    let detached = RequestInstrumentor::new(cfg, registry.clone()).unwrap();
    let app = routes().with_request_metrics(detached.clone());

    let (status, body) = call(&app, "GET", "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok\n");
    assert_eq!(count(&detached, &["get"]), 1);
    assert_eq!(counter_total(&registry, "http_requests_total"), 0.0);
}

#[tokio::test]
async fn namespace_prefixes_series_names() {
    let cfg = MetricsConfig {
        namespace: Some("shop".into()),
        ..MetricsConfig::default()
    };
    let (app, _inst, _registry) = instrumented(cfg);

    call(&app, "GET", "/").await;
    let (_, body) = call(&app, "GET", "/metrics").await;
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("shop_http_requests_total"), "{text}");
    assert!(text.contains("shop_http_request_duration_seconds"), "{text}");
}

#[tokio::test]
async fn histogram_observes_each_request() {
    let (app, inst, _registry) = instrumented(MetricsConfig::default());

    for _ in 0..3 {
        call(&app, "GET", "/").await;
    }
    let h = inst.series().latency().with_label_values(&["200", "get", "/"]);
    assert_eq!(h.get_sample_count(), 3);
    assert!(h.get_sample_sum() >= 0.0);
}

#[test]
fn wrapped_sink_handler_records_observer_status() {
    let inst = RequestInstrumentor::new(MetricsConfig::default(), MetricsRegistry::new()).unwrap();

    let teapot = inst.wrap(|_req: &RequestMeta, sink: &mut dyn ResponseSink| -> io::Result<()> {
        sink.set_status(418);
        sink.set_status(200);
        sink.write_all(b"short and stout")
    });
    let silent = inst.wrap(|_req: &RequestMeta, _sink: &mut dyn ResponseSink| -> io::Result<()> { Ok(()) });
    let implicit = inst.wrap(|_req: &RequestMeta, sink: &mut dyn ResponseSink| -> io::Result<()> {
        sink.write_all(b"fine")
    });

    let mut out = BufferedSink::new();
    teapot.serve(&RequestMeta::new("GET", "/tea"), &mut out).unwrap();
    assert_eq!(out.status(), Some(418));
    assert_eq!(out.body(), b"short and stout");

    silent.serve(&RequestMeta::new("GET", "/quiet"), &mut BufferedSink::new()).unwrap();
    implicit.serve(&RequestMeta::new("GET", "/fine"), &mut BufferedSink::new()).unwrap();

    assert_eq!(count(&inst, &["418", "get", "/tea"]), 1);
    assert_eq!(count(&inst, &["unknown", "get", "/quiet"]), 1);
    assert_eq!(count(&inst, &["200", "get", "/fine"]), 1);
}

#[tokio::test]
async fn demo_router_serves_and_scrapes() {
    use reqmetrics_middleware::{app_state::AppState, config, router};

    let cfg = config::load_from_str("version: 1\n").unwrap();
    let state = AppState::new(cfg).unwrap();
    let app = router::build_router(state.clone());

    let (status, body) = call(&app, "GET", "/hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"hello from /hello\n");

    let (status, _) = call(&app, "GET", "/items/0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "GET", "/hello/observed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"hello from /hello/observed\n");

    let (_, body) = call(&app, "GET", "/metrics").await;
    let text = String::from_utf8(body).unwrap();
    assert!(
        text.contains(r#"http_requests_total{method="get",path="/hello",status="200"} 1"#),
        "{text}"
    );
    assert!(
        text.contains(r#"http_requests_total{method="get",path="/items/:id",status="404"} 1"#),
        "{text}"
    );
    assert!(
        text.contains(r#"http_requests_total{method="get",path="/hello/observed",status="200"} 1"#),
        "{text}"
    );
}
