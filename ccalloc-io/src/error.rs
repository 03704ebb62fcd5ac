//! I/O error types.

use ccalloc_core::CoreError;
use thiserror::Error;

/// Errors that can occur while reading inputs or writing reports.
#[derive(Debug, Error)]
pub enum DataError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML configuration could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required column is missing from a CSV header.
    #[error("Missing column '{column}'")]
    MissingColumn {
        /// Column name.
        column: String,
    },

    /// A row cannot be read.
    #[error("Invalid row {line}: {message}")]
    InvalidRow {
        /// Line number, 1-based, including the header.
        line: u64,
        /// What is wrong with the row.
        message: String,
    },

    /// Core error (malformed selector, invalid configuration).
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl DataError {
    /// Creates an invalid row error.
    pub fn invalid_row(line: u64, message: impl Into<String>) -> Self {
        Self::InvalidRow {
            line,
            message: message.into(),
        }
    }

    /// Returns true if the error was caused by the configuration file.
    pub fn is_config_error(&self) -> bool {
        match self {
            DataError::Toml(_) => true,
            DataError::Core(err) => err.is_config_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors() {
        let err = DataError::Core(CoreError::InvalidConfig("bad".to_string()));
        assert!(err.is_config_error());
        assert!(!DataError::invalid_row(3, "bad date").is_config_error());
        assert_eq!(
            DataError::invalid_row(3, "bad date").to_string(),
            "Invalid row 3: bad date"
        );
    }
}
