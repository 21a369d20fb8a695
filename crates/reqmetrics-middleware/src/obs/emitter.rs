//! Emission dispatch.
//!
//! - `Sync`: the series are updated inline after the handler returned.
//! - `Async`: observations go through a bounded queue to one worker task.
//!   `try_send` never waits; a full queue drops the observation and bumps
//!   the `dropped` counter.
//!
//! Emission errors are logged and dropped in both modes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use reqmetrics_core::error::{MetricsError, Result};
use reqmetrics_core::instrument::Recorder;
use reqmetrics_core::labels::LabelValues;

use super::series::RequestSeries;
use crate::config::{EmissionConfig, EmissionMode};

enum Job {
    Observe(LabelValues, Duration),
    Flush(oneshot::Sender<()>),
}

enum Dispatch {
    Sync(Arc<RequestSeries>),
    Async(mpsc::Sender<Job>),
}

pub struct Emitter {
    dispatch: Dispatch,
    dropped: AtomicU64,
}

impl Emitter {
    /// Build the emitter. Async mode spawns its worker on the current tokio
    /// runtime and fails if there is none.
    pub fn new(series: Arc<RequestSeries>, cfg: &EmissionConfig) -> Result<Self> {
        let dispatch = match cfg.mode {
            EmissionMode::Sync => Dispatch::Sync(series),
            EmissionMode::Async => {
                let handle = tokio::runtime::Handle::try_current().map_err(|_| {
                    MetricsError::Config("async emission requires a tokio runtime".into())
                })?;
                let (tx, rx) = mpsc::channel(cfg.queue_capacity);
                handle.spawn(run_worker(series, rx));
                Dispatch::Async(tx)
            }
        };
        Ok(Self {
            dispatch,
            dropped: AtomicU64::new(0),
        })
    }

    /// Observations dropped because the queue was full or the worker gone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait until every observation queued so far has been applied.
    pub async fn flush(&self) {
        if let Dispatch::Async(tx) = &self.dispatch {
            let (ack, done) = oneshot::channel();
            if tx.send(Job::Flush(ack)).await.is_ok() {
                let _ = done.await;
            }
        }
    }
}

impl Recorder for Emitter {
    fn record(&self, labels: LabelValues, elapsed: Duration) {
        match &self.dispatch {
            Dispatch::Sync(series) => apply(series, &labels, elapsed),
            Dispatch::Async(tx) => match tx.try_send(Job::Observe(labels, elapsed)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("emission queue full; observation dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("emission worker stopped; observation dropped");
                }
            },
        }
    }
}

fn apply(series: &RequestSeries, labels: &LabelValues, elapsed: Duration) {
    if let Err(e) = series.apply(labels, elapsed) {
        tracing::warn!(error = %e, kind = e.kind().as_str(), "request metrics dropped");
    }
}

async fn run_worker(series: Arc<RequestSeries>, mut rx: mpsc::Receiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Observe(labels, elapsed) => apply(&series, &labels, elapsed),
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("emission worker finished");
}
