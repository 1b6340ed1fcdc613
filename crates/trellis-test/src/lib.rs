//! Trellis Test - shared test utilities for the plugin host.
//!
//! This crate provides mock implementations of every external
//! collaborator (network, presentation, clipboard, system notifications,
//! storage backend), recording message handlers, and a [`TestHost`] that
//! wires them into a [`PluginRegistry`](trellis_plugins::PluginRegistry).
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! trellis-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! use trellis_test::{TestHost, manifest};
//!
//! #[tokio::test]
//! async fn loads() {
//!     let host = TestHost::new();
//!     let id = host.registry.register(&manifest("A", "1.0.0")).unwrap();
//!     host.registry.load(&id).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
