//! Injected metrics registry.
//!
//! Wraps a `prometheus::Registry` and remembers the series registered through
//! it, so a second registration of the same name can either fail or reuse the
//! existing series (`OnConflict`). Nothing here is process-global: every
//! middleware gets its registry handle passed in.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use reqmetrics_core::error::{MetricsError, Result};

use crate::config::OnConflict;

/// Content type of the text exposition format.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
enum Series {
    Counter(IntCounterVec),
    Histogram(HistogramVec),
}

impl Series {
    fn kind(&self) -> &'static str {
        match self {
            Series::Counter(_) => "counter",
            Series::Histogram(_) => "histogram",
        }
    }

    fn collector(&self) -> Box<dyn Collector> {
        match self {
            Series::Counter(v) => Box::new(v.clone()),
            Series::Histogram(v) => Box::new(v.clone()),
        }
    }
}

/// Shape of a registered series, compared before reuse.
struct Registered {
    labels: Vec<String>,
    buckets: Vec<f64>,
    series: Series,
}

impl Registered {
    fn matches(&self, series: &Series, labels: &[&str], buckets: &[f64]) -> bool {
        self.series.kind() == series.kind() && self.labels == labels && self.buckets == buckets
    }
}

#[derive(Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    registry: Registry,
    series: DashMap<String, Registered>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing registry that other code may also register into.
    pub fn from_registry(registry: Registry) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                registry,
                series: DashMap::new(),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Register (or resolve) a labelled counter.
    pub fn counter_vec(
        &self,
        opts: Opts,
        labels: &[&str],
        on_conflict: OnConflict,
    ) -> Result<IntCounterVec> {
        let name = opts.fq_name();
        let vec = IntCounterVec::new(opts, labels)
            .map_err(|e| MetricsError::Config(format!("counter {name}: {e}")))?;
        match self.register(name, labels, &[], Series::Counter(vec), on_conflict)? {
            Series::Counter(v) => Ok(v),
            Series::Histogram(_) => Err(MetricsError::Internal("series kind mismatch".into())),
        }
    }

    /// Register (or resolve) a labelled histogram.
    pub fn histogram_vec(
        &self,
        opts: HistogramOpts,
        labels: &[&str],
        on_conflict: OnConflict,
    ) -> Result<HistogramVec> {
        let name = opts.common_opts.fq_name();
        let buckets = opts.buckets.clone();
        let vec = HistogramVec::new(opts, labels)
            .map_err(|e| MetricsError::Config(format!("histogram {name}: {e}")))?;
        match self.register(name, labels, &buckets, Series::Histogram(vec), on_conflict)? {
            Series::Histogram(v) => Ok(v),
            Series::Counter(_) => Err(MetricsError::Internal("series kind mismatch".into())),
        }
    }

    fn register(
        &self,
        name: String,
        labels: &[&str],
        buckets: &[f64],
        series: Series,
        on_conflict: OnConflict,
    ) -> Result<Series> {
        match self.inner.series.entry(name) {
            Entry::Occupied(e) => {
                let existing = e.get();
                let reusable = existing
                    .matches(&series, labels, buckets)
                    .then(|| existing.series.clone());
                resolve_conflict(e.key(), on_conflict, reusable, series)
            }
            Entry::Vacant(slot) => match self.inner.registry.register(series.collector()) {
                Ok(()) => {
                    slot.insert(Registered {
                        labels: labels.iter().map(|l| l.to_string()).collect(),
                        buckets: buckets.to_vec(),
                        series: series.clone(),
                    });
                    Ok(series)
                }
                // Registered by someone else directly on the prometheus registry.
                Err(e) if is_name_conflict(&e) => {
                    resolve_conflict(slot.key(), on_conflict, None, series)
                }
                Err(e) => Err(MetricsError::Config(format!(
                    "register {} failed: {e}",
                    slot.key()
                ))),
            },
        }
    }

    /// Whether `name` was registered through this handle.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.series.contains_key(name)
    }

    /// Remove a series registered through this handle. Unknown names are
    /// ignored.
    pub fn unregister(&self, name: &str) {
        let Some((_, registered)) = self.inner.series.remove(name) else {
            return;
        };
        if let Err(e) = self.inner.registry.unregister(registered.series.collector()) {
            tracing::warn!(series = %name, error = %e, "unregister failed");
        }
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.inner.registry.gather()
    }

    /// Encode every registered series in the text exposition format.
    pub fn render(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.gather())
            .map_err(|e| MetricsError::Internal(format!("encode metrics failed: {e}")))
    }
}

// prometheus 0.13 reports a same-name, different-shape registration as
// `Msg("a previously registered descriptor with the same fully-qualified name
// as ... has different label names or a different help string")` and an
// identical descriptor as `Msg("descriptor ... already exists with the same
// fully-qualified name and const label values")`.
fn is_name_conflict(e: &prometheus::Error) -> bool {
    match e {
        prometheus::Error::AlreadyReg => true,
        prometheus::Error::Msg(m) => {
            m.contains("previously registered") || m.contains("already exists")
        }
        _ => false,
    }
}

fn resolve_conflict(
    name: &str,
    on_conflict: OnConflict,
    existing: Option<Series>,
    fresh: Series,
) -> Result<Series> {
    match on_conflict {
        OnConflict::Fail => Err(MetricsError::RegistrationConflict(name.to_string())),
        OnConflict::Reuse => match existing {
            Some(s) => {
                tracing::warn!(series = %name, kind = s.kind(), "series already registered; reusing it");
                Ok(s)
            }
            None => {
                tracing::warn!(
                    series = %name,
                    kind = fresh.kind(),
                    "series already registered with a different shape; recording into a detached series that is not exported"
                );
                Ok(fresh)
            }
        },
    }
}
