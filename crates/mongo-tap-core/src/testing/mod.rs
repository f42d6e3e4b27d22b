//! Test utilities for integration testing.
//!
//! This module is only available when compiling tests or when the
//! `testing` feature is enabled.

pub mod frames;
pub mod mock_upstream;
pub mod sink;

pub use mock_upstream::MockUpstream;
pub use sink::{RecordedEvent, RecordingSink};
