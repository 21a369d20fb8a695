//! Shared application state for the demo server.
//!
//! The registry is created here and injected into the instrumentor; nothing
//! is registered globally.

use std::sync::Arc;

use axum::extract::FromRef;

use reqmetrics_core::error::Result;

use crate::config::AppConfig;
use crate::instrumentor::RequestInstrumentor;
use crate::obs::MetricsRegistry;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: AppConfig,
    registry: MetricsRegistry,
    instrumentor: RequestInstrumentor,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can report config errors instead of panicking.
    pub fn new(cfg: AppConfig) -> Result<Self> {
        Self::with_registry(cfg, MetricsRegistry::new())
    }

    pub fn with_registry(cfg: AppConfig, registry: MetricsRegistry) -> Result<Self> {
        let instrumentor = RequestInstrumentor::builder()
            .config(cfg.metrics.clone())
            .registry(registry.clone())
            .build()?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                registry,
                instrumentor,
            }),
        })
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> MetricsRegistry {
        self.inner.registry.clone()
    }

    pub fn instrumentor(&self) -> RequestInstrumentor {
        self.inner.instrumentor.clone()
    }
}

impl FromRef<AppState> for MetricsRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.registry()
    }
}
