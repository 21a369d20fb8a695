use std::net::SocketAddr;

use serde::Deserialize;

use reqmetrics_core::error::{MetricsError, Result};
use reqmetrics_core::labels::{
    LabelName, LabelSchema, PathLabel, DEFAULT_VERSION, DEFAULT_VERSION_PARAM,
};

/// Latency buckets (seconds) used when none are configured.
pub const DEFAULT_BUCKETS: [f64; 4] = [0.3, 1.0, 2.5, 5.0];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MetricsError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.server.validate()?;
        self.metrics.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            MetricsError::Config(format!("server.listen must be a valid SocketAddr: {e}"))
        })
    }
}

/// What to do when a request series name is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnConflict {
    /// Construction fails with a registration conflict.
    #[default]
    Fail,
    /// Log a warning and keep going with the existing series when possible.
    Reuse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmissionMode {
    /// Update the series inline once the handler returned.
    #[default]
    Sync,
    /// Hand updates to a worker through a bounded queue; drop when full.
    Async,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmissionConfig {
    #[serde(default)]
    pub mode: EmissionMode,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            mode: EmissionMode::default(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Request metrics settings. Immutable once the instrumentor is built.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default = "default_counter_name")]
    pub counter_name: String,

    #[serde(default = "default_histogram_name")]
    pub histogram_name: String,

    /// Histogram upper bounds in seconds. Empty selects `DEFAULT_BUCKETS`.
    #[serde(default)]
    pub buckets: Vec<f64>,

    /// Label names in series order. Empty selects status, method, path.
    #[serde(default)]
    pub labels: Vec<LabelName>,

    #[serde(default)]
    pub path_label: PathLabel,

    #[serde(default = "default_version_param")]
    pub version_param: String,

    #[serde(default = "default_version")]
    pub default_version: String,

    #[serde(default)]
    pub on_conflict: OnConflict,

    #[serde(default)]
    pub emission: EmissionConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            counter_name: default_counter_name(),
            histogram_name: default_histogram_name(),
            buckets: Vec::new(),
            labels: Vec::new(),
            path_label: PathLabel::default(),
            version_param: default_version_param(),
            default_version: default_version(),
            on_conflict: OnConflict::default(),
            emission: EmissionConfig::default(),
        }
    }
}

impl MetricsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.counter_name.is_empty() || self.histogram_name.is_empty() {
            return Err(MetricsError::Config(
                "metrics.counter_name and metrics.histogram_name must not be empty".into(),
            ));
        }
        if self.counter_name == self.histogram_name {
            return Err(MetricsError::Config(
                "metrics.counter_name and metrics.histogram_name must differ".into(),
            ));
        }

        validate_buckets(&self.buckets)?;
        let schema = self.label_schema()?;

        if schema.names().contains(&LabelName::Version) {
            if self.version_param.is_empty() {
                return Err(MetricsError::Config(
                    "metrics.version_param must not be empty".into(),
                ));
            }
            if self.default_version.is_empty() {
                return Err(MetricsError::Config(
                    "metrics.default_version must not be empty".into(),
                ));
            }
        }

        if self.emission.mode == EmissionMode::Async && self.emission.queue_capacity == 0 {
            return Err(MetricsError::Config(
                "metrics.emission.queue_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Configured buckets, or `DEFAULT_BUCKETS` when none are set.
    pub fn effective_buckets(&self) -> Vec<f64> {
        if self.buckets.is_empty() {
            DEFAULT_BUCKETS.to_vec()
        } else {
            self.buckets.clone()
        }
    }

    pub fn label_schema(&self) -> Result<LabelSchema> {
        Ok(LabelSchema::new(&self.labels)?
            .with_path_label(self.path_label)
            .with_version_param(self.version_param.clone())
            .with_default_version(self.default_version.clone()))
    }
}

fn validate_buckets(buckets: &[f64]) -> Result<()> {
    if let Some(b) = buckets.iter().find(|b| !b.is_finite() || **b <= 0.0) {
        return Err(MetricsError::Config(format!(
            "metrics.buckets must be positive and finite, got {b}"
        )));
    }
    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        return Err(MetricsError::Config(
            "metrics.buckets must be strictly increasing".into(),
        ));
    }
    Ok(())
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_counter_name() -> String {
    "http_requests_total".into()
}
fn default_histogram_name() -> String {
    "http_request_duration_seconds".into()
}
fn default_version_param() -> String {
    DEFAULT_VERSION_PARAM.into()
}
fn default_version() -> String {
    DEFAULT_VERSION.into()
}
fn default_queue_capacity() -> usize {
    1024
}
