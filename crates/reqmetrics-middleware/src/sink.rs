//! Mount sink-style handlers on an axum router.
//!
//! The handler writes into a `BufferedSink`; the buffered status, headers and
//! body become the axum response. A status that was never set is sent as 200,
//! matching what an HTTP server does for a handler that returns silently.

use std::future::{ready, Ready};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use reqmetrics_core::instrument::SinkHandler;
use reqmetrics_core::observer::BufferedSink;

use crate::instrumentor::request_meta;

/// Turn a `SinkHandler` into an axum handler.
pub fn into_handler<H>(handler: H) -> impl Fn(Request) -> Ready<Response> + Clone + Send + Sync + 'static
where
    H: SinkHandler + 'static,
{
    let handler = Arc::new(handler);
    move |request: Request| ready(serve(handler.as_ref(), request))
}

fn serve<H: SinkHandler + ?Sized>(handler: &H, request: Request) -> Response {
    let meta = request_meta(&request);
    let mut sink = BufferedSink::new();

    if let Err(e) = handler.serve(&meta, &mut sink) {
        tracing::warn!(error = %e, path = %meta.path, "sink handler failed");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    into_response(sink)
}

fn into_response(sink: BufferedSink) -> Response {
    let (status, headers, body) = sink.into_parts();

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::OK);

    for (name, value) in headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(n), Ok(v)) => {
                response.headers_mut().append(n, v);
            }
            _ => tracing::warn!(header = %name, "invalid response header dropped"),
        }
    }
    response
}
