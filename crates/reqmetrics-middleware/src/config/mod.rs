//! Config loader (strict parsing).

pub mod schema;

use std::fs;

use reqmetrics_core::error::{MetricsError, Result};

pub use schema::{
    AppConfig, EmissionConfig, EmissionMode, MetricsConfig, OnConflict, ServerSection,
    DEFAULT_BUCKETS,
};

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MetricsError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<AppConfig> {
    let cfg: AppConfig = serde_yaml::from_str(s)
        .map_err(|e| MetricsError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
