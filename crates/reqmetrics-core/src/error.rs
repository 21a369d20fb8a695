//! Shared error type across reqmetrics crates.

use thiserror::Error;

/// Stable error kinds (used in log fields and tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid configuration at construction time.
    Config,
    /// A series with the same name is already registered.
    RegistrationConflict,
    /// A counter/histogram update could not be applied.
    Emission,
    /// Anything else (I/O, encoder failures).
    Internal,
}

impl ErrorKind {
    /// String representation used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "CONFIG",
            ErrorKind::RegistrationConflict => "REGISTRATION_CONFLICT",
            ErrorKind::Emission => "EMISSION",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Unified error type used by core and middleware.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("configuration: {0}")]
    Config(String),
    #[error("series already registered: {0}")]
    RegistrationConflict(String),
    #[error("emission failed: {0}")]
    Emission(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl MetricsError {
    /// Map the error to its stable kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetricsError::Config(_) => ErrorKind::Config,
            MetricsError::RegistrationConflict(_) => ErrorKind::RegistrationConflict,
            MetricsError::Emission(_) => ErrorKind::Emission,
            MetricsError::Internal(_) => ErrorKind::Internal,
        }
    }
}
