//! Request metrics backed by the prometheus client.
//!
//! `MetricsRegistry` is the injected registry handle, `RequestSeries` the
//! counter/histogram pair, and `Emitter` decides how updates reach them.

pub mod emitter;
pub mod registry;
pub mod series;

pub use emitter::Emitter;
pub use registry::{MetricsRegistry, TEXT_CONTENT_TYPE};
pub use series::RequestSeries;
