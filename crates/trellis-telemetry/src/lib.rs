//! Trellis Telemetry - logging setup for the plugin host.
//!
//! This crate provides:
//! - [`LogConfig`] with level, format, target and per-crate directives
//! - [`setup_logging`], which installs a global `tracing` subscriber
//!   writing to stdout, stderr or a daily rolling file
//!
//! With the `config` feature a [`LogConfig`] can be built from the
//! `[logging]` section of a `trellis_config::HostConfig`.
//!
//! # Example
//!
//! ```rust,no_run
//! use trellis_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), trellis_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("trellis_events=debug");
//! setup_logging(&config)?;
//!
//! tracing::info!("host started");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
