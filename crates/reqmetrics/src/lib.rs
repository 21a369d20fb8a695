//! Top-level facade crate for reqmetrics.
//!
//! Re-exports the core types and the axum middleware so users can depend on a single crate.

pub mod core {
    pub use reqmetrics_core::*;
}

pub mod middleware {
    pub use reqmetrics_middleware::*;
}
