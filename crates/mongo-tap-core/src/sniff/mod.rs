//! Out-of-band wire sniffing.
//!
//! This module provides:
//! - The event sink contract and the default tracing-backed sink
//! - Event construction for every decoded frame
//! - The per-direction parser task and its lossy ingestion handle

pub mod event;
pub mod parser;

pub use event::{build_event, EventSink, JsonMap, TracingSink};
pub use parser::{Direction, ParserHandle, WireParser};
