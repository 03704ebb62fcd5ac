//! Configuration file loading.
//!
//! Configurations are TOML files; files with a `.json` extension are read
//! as JSON with the same layout.

use ccalloc_core::config::DEFAULT_DATE_FORMAT;
use ccalloc_core::AllocationConfig;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::DataError;

/// Format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (default).
    Toml,
    /// JSON.
    Json,
}

impl ConfigFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Loads, normalizes, and validates a configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the
/// configuration is invalid.
pub fn load_config(path: &Path) -> Result<AllocationConfig, DataError> {
    debug!(path = %path.display(), "Reading configuration");
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content, ConfigFormat::from_path(path))?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Parses, normalizes, and validates configuration text.
///
/// # Errors
///
/// Returns an error if the text cannot be parsed or the configuration is
/// invalid.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<AllocationConfig, DataError> {
    let config: AllocationConfig = match format {
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };

    if config.general.date_format.is_none() {
        warn!(default = DEFAULT_DATE_FORMAT, "No date format configured, using default");
    }

    let config = config.normalized();
    config.validate()?;
    Ok(config)
}
