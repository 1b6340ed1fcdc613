//! Prelude module - commonly used test utilities.
//!
//! Use `use trellis_test::prelude::*;` in test modules.

pub use crate::{
    FailingHandler, FlakyKvStore, MockClipboard, MockNetworkService, MockNotificationService,
    MockPresentationService, RecordingHandler, TestHost, init_test_logging, manifest, plugin_id,
};
