//! Handler instrumentation.
//!
//! `Instrumented<H>` wraps a `SinkHandler` so that every call records one
//! counter increment and one latency observation through a `Recorder`.
//! The response path is untouched: the handler writes through a
//! `ResponseObserver` and its result is returned as-is.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::labels::{LabelSchema, LabelValues, RequestMeta};
use crate::observer::{ResponseObserver, ResponseSink};

/// Emission seam. Implementations must be safe to call concurrently and
/// must not fail the caller: errors are reported and dropped.
pub trait Recorder: Send + Sync {
    fn record(&self, labels: LabelValues, elapsed: Duration);
}

/// A downstream handler: reads the request, writes the response to a sink.
pub trait SinkHandler: Send + Sync {
    fn serve(&self, req: &RequestMeta, sink: &mut dyn ResponseSink) -> io::Result<()>;
}

impl<F> SinkHandler for F
where
    F: Fn(&RequestMeta, &mut dyn ResponseSink) -> io::Result<()> + Send + Sync,
{
    fn serve(&self, req: &RequestMeta, sink: &mut dyn ResponseSink) -> io::Result<()> {
        self(req, sink)
    }
}

/// A `SinkHandler` with request metrics attached.
pub struct Instrumented<H> {
    inner: H,
    recorder: Arc<dyn Recorder>,
    schema: Arc<LabelSchema>,
}

impl<H> Instrumented<H> {
    pub fn new(inner: H, recorder: Arc<dyn Recorder>, schema: Arc<LabelSchema>) -> Self {
        Self {
            inner,
            recorder,
            schema,
        }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: SinkHandler> SinkHandler for Instrumented<H> {
    fn serve(&self, req: &RequestMeta, sink: &mut dyn ResponseSink) -> io::Result<()> {
        let begin = Instant::now();
        let mut observer = ResponseObserver::new(sink);

        let res = self.inner.serve(req, &mut observer);

        let elapsed = begin.elapsed();
        if let Err(e) = &res {
            tracing::debug!(error = %e, bytes = observer.bytes_written(), "downstream write failed");
        }
        // Recorded even when the handler failed: status is whatever was
        // captured before the error.
        let labels = self.schema.derive(req, observer.status());
        self.recorder.record(labels, elapsed);

        res
    }
}
