//! Core error types for `ccalloc`.

use thiserror::Error;

/// Core error type for `ccalloc` operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A tag selector expression could not be parsed.
    #[error("Malformed selector '{selector}' at position {position}: {message}")]
    MalformedSelector {
        /// The selector text as written.
        selector: String,
        /// Byte offset where parsing failed.
        position: usize,
        /// What the parser expected.
        message: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid input data.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a malformed selector error.
    pub fn malformed_selector(
        selector: impl Into<String>,
        position: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedSelector {
            selector: selector.into(),
            position,
            message: message.into(),
        }
    }

    /// Returns true if the error was caused by the configuration rather than the data.
    pub fn is_config_error(&self) -> bool {
        matches!(self, CoreError::InvalidConfig(_))
    }
}
