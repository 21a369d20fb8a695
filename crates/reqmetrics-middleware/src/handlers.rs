//! Demo handlers served by the bundled binary.

use std::io;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
};

use reqmetrics_core::labels::RequestMeta;
use reqmetrics_core::observer::ResponseSink;

pub async fn index() -> impl IntoResponse {
    (StatusCode::OK, "ok\n")
}

pub async fn get_item(Path(id): Path<u64>) -> impl IntoResponse {
    if id == 0 {
        return (StatusCode::NOT_FOUND, "no such item\n".to_string());
    }
    (StatusCode::OK, format!("item {id}\n"))
}

/// Sink-style handler: writes the body without setting a status.
pub fn hello(req: &RequestMeta, sink: &mut dyn ResponseSink) -> io::Result<()> {
    sink.set_header("content-type", "text/plain; charset=utf-8");
    sink.write_all(format!("hello from {}\n", req.path).as_bytes())
}
