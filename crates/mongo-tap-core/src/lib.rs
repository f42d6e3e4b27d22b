//! mongo-tap Core Library
//!
//! This library provides the core functionality for a transparent MongoDB
//! wire-protocol interception proxy. It forwards bytes between clients and
//! a real MongoDB server unmodified while decoding each direction's wire
//! traffic out-of-band into structured events.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Domain-specific error types
//! - [`wire`] - MongoDB wire codec: frames, opcodes, BSON-bearing bodies
//! - [`sniff`] - Per-direction stream parsers and the event sink contract
//! - [`proxy`] - TCP listener and per-connection duplex pipes
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mongo_tap_core::config::ProxyConfig;
//! use mongo_tap_core::proxy::ProxyListener;
//! use mongo_tap_core::sniff::TracingSink;
//!
//! let config = ProxyConfig::default();
//! let listener = ProxyListener::new(config, Arc::new(TracingSink));
//! // listener.run().await?;
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod proxy;
pub mod sniff;
pub mod wire;

/// Test utilities for integration testing.
///
/// This module is only available when compiling tests or when the `testing`
/// feature is enabled.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::ProxyConfig;
pub use error::{ConfigError, DecodeError, ProxyError, Result};
pub use proxy::{DuplexPipe, ProxyListener};
pub use sniff::{Direction, EventSink, TracingSink, WireParser};
pub use wire::{decode_frame, DecodedMessage, MongoCodec, MsgHeader, OpCode, RawFrame, Section};
