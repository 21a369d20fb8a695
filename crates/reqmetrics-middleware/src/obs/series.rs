//! The request series pair: one counter, one latency histogram.

use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

use reqmetrics_core::error::{MetricsError, Result};
use reqmetrics_core::labels::{LabelSchema, LabelValues};

use super::registry::MetricsRegistry;
use crate::config::MetricsConfig;

const REQUESTS_HELP: &str =
    "How many HTTP requests processed, partitioned by status code, method and HTTP path.";
const LATENCY_HELP: &str =
    "How long it took to process the request, partitioned by status code, method and HTTP path.";

pub struct RequestSeries {
    requests: IntCounterVec,
    latency: HistogramVec,
}

impl RequestSeries {
    /// Register both series under `schema`'s label names.
    pub fn register(
        registry: &MetricsRegistry,
        cfg: &MetricsConfig,
        schema: &LabelSchema,
    ) -> Result<Self> {
        let labels = schema.label_names();

        let mut counter_opts = Opts::new(cfg.counter_name.clone(), REQUESTS_HELP);
        let mut latency_opts = HistogramOpts::new(cfg.histogram_name.clone(), LATENCY_HELP)
            .buckets(cfg.effective_buckets());
        if let Some(ns) = &cfg.namespace {
            counter_opts = counter_opts.namespace(ns.clone());
            latency_opts = latency_opts.namespace(ns.clone());
        }

        let counter_name = counter_opts.fq_name();
        let fresh = !registry.contains(&counter_name);
        let requests = registry.counter_vec(counter_opts, &labels, cfg.on_conflict)?;
        let latency = match registry.histogram_vec(latency_opts, &labels, cfg.on_conflict) {
            Ok(latency) => latency,
            Err(e) => {
                // Leave the registry as it was before this call.
                if fresh {
                    registry.unregister(&counter_name);
                }
                return Err(e);
            }
        };

        Ok(Self { requests, latency })
    }

    /// Apply one observation: counter +1, histogram observes seconds.
    pub fn apply(&self, labels: &LabelValues, elapsed: Duration) -> Result<()> {
        let values = labels.as_strs();
        self.requests
            .get_metric_with_label_values(&values)
            .map_err(|e| MetricsError::Emission(format!("requests counter: {e}")))?
            .inc();
        self.latency
            .get_metric_with_label_values(&values)
            .map_err(|e| MetricsError::Emission(format!("latency histogram: {e}")))?
            .observe(elapsed.as_secs_f64());
        Ok(())
    }

    pub fn requests(&self) -> &IntCounterVec {
        &self.requests
    }

    pub fn latency(&self) -> &HistogramVec {
        &self.latency
    }
}
