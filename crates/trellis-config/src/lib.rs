#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Host configuration for the Trellis plugin host.
//!
//! A single [`HostConfig`] covers logging, the message router and the
//! permission policy. Every field has a default, so an absent or empty
//! file is a valid configuration.
//!
//! # Usage
//!
//! ```rust,no_run
//! use trellis_config::HostConfig;
//!
//! // Explicit file, or the platform default location, or built-in defaults.
//! let config = HostConfig::load(None).unwrap();
//! println!("log level: {}", config.logging.level);
//! ```
//!
//! # Design
//!
//! This crate depends only on `trellis-core` (for capability names).
//! Conversion into runtime types happens in the consuming crates behind
//! their `config` features.

/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_FILE_NAME, default_config_path};
pub use types::*;

impl HostConfig {
    /// Load from `path`, or from the default location, or fall back to
    /// defaults. See [`loader::load`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is unreadable, malformed or
    /// fails validation.
    pub fn load(path: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(path)
    }

    /// Load and validate one file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is unreadable, malformed or
    /// fails validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the text is malformed or fails
    /// validation.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        loader::parse(content, "<string>")
    }

    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::ValidationError`] found.
    pub fn validate(&self) -> ConfigResult<()> {
        validate::validate(self)
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::ValidationError`] if serialization fails.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError {
            field: "<root>".to_owned(),
            message: e.to_string(),
        })
    }
}
