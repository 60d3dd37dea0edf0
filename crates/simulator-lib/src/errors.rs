//! Error kinds surfaced by the template synthesizer
//!
//! Expected outcomes (not-implemented templates, unschedulable daemon pods,
//! blocked drains) are not represented here; they live next to the
//! component that produces them.

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of an [`AutoscalerError`], used for metrics labels
/// and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CloudProviderError,
    InternalError,
    ApiCallError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CloudProviderError => "cloud_provider_error",
            ErrorKind::InternalError => "internal_error",
            ErrorKind::ApiCallError => "api_call_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned to callers of the synthesis pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutoscalerError {
    /// A cloud provider call failed
    #[error("cloud provider error: {0}")]
    CloudProvider(String),
    /// Bookkeeping inside the core failed
    #[error("internal error: {0}")]
    Internal(String),
    /// An external listing call failed
    #[error("api call error: {0}")]
    ApiCall(String),
}

impl AutoscalerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AutoscalerError::CloudProvider(_) => ErrorKind::CloudProviderError,
            AutoscalerError::Internal(_) => ErrorKind::InternalError,
            AutoscalerError::ApiCall(_) => ErrorKind::ApiCallError,
        }
    }

    pub fn cloud_provider(err: impl std::fmt::Display) -> Self {
        AutoscalerError::CloudProvider(err.to_string())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        AutoscalerError::Internal(err.to_string())
    }

    pub fn api_call(err: impl std::fmt::Display) -> Self {
        AutoscalerError::ApiCall(err.to_string())
    }
}
