//! reqmetrics core: transport-agnostic request instrumentation.
//!
//! This crate defines the response-capture decorator, the label derivation
//! rules and the handler/recorder seams shared by the middleware. It carries
//! no HTTP framework or metrics client dependency.
//!
//! Panics, `unwrap`, and `expect` are compile-denied here. Metric paths must
//! never take down the response path, so every fallible step surfaces as
//! `MetricsError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod instrument;
pub mod labels;
pub mod observer;

pub use error::{ErrorKind, MetricsError};
/// Shared result type.
pub use error::Result;
pub use instrument::{Instrumented, Recorder, SinkHandler};
pub use labels::{LabelName, LabelSchema, LabelValues, PathLabel, RequestMeta};
pub use observer::{BufferedSink, CapturedResponse, ResponseObserver, ResponseSink};
