//! Error types for preview decoding

use thiserror::Error;

/// Errors that can occur while resolving settings or decoding previews
#[derive(Debug, Error)]
pub enum PreviewError {
    /// Option value outside its declared domain
    #[error("Invalid config value for '{key}': {reason}")]
    Config { key: &'static str, reason: String },

    /// Decoder descriptor is unusable
    #[error("Malformed decoder descriptor: {0}")]
    Planner(String),

    /// Decode failed for a reason other than memory
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Decode device ran out of memory
    #[error("Out of memory on {device}: {message}")]
    OutOfMemory { device: String, message: String },

    /// Generation interrupted mid-step
    #[error("Preview cancelled")]
    Cancelled,

    /// Raw option mapping could not be parsed
    #[error("Option mapping error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PreviewError {
    /// Create a config error for `key`.
    pub fn config(key: &'static str, reason: impl Into<String>) -> Self {
        PreviewError::Config {
            key,
            reason: reason.into(),
        }
    }

    /// Create an out-of-memory error.
    pub fn out_of_memory(device: impl Into<String>, message: impl Into<String>) -> Self {
        PreviewError::OutOfMemory {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Whether the fallback policy applies to this error
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, PreviewError::OutOfMemory { .. })
    }

    /// Whether this error should halt startup rather than skip one cycle
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PreviewError::Config { .. } | PreviewError::Planner(_) | PreviewError::Json(_)
        )
    }
}

/// Result type for preview operations
pub type Result<T> = std::result::Result<T, PreviewError>;
