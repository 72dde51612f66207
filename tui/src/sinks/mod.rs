//! Console sinks
//!
//! - [`line`]: timestamped lines with an animated status spinner
//! - [`jsonl`]: one JSON record per event for downstream tooling
//!
//! The full-screen sink lives in [`crate::live`] since it owns its own
//! render loop.

pub mod jsonl;
pub mod line;

pub use jsonl::{EventRecord, JsonLinesSink};
pub use line::{format_event, spawn_spinner, summary_line, Console, LineSink, SharedConsole};
