//! flowwatch - follow a flow execution from the terminal
//!
//! This crate is the terminal surface over `flowwatch-core`. The core owns
//! decoding, reconnects and the session state machine; everything here only
//! presents what the dispatcher delivers.
//!
//! # Architecture
//!
//! - **Sinks**: line log with spinner, JSON lines, full-screen live view
//! - **Theme**: palette handed to each sink at construction
//! - **Watch**: builds the pipeline from configuration and runs one sink

pub mod live;
pub mod sinks;
pub mod spinner;
pub mod theme;
pub mod watch;

pub use watch::{watch, OutputMode, WatchContext, WatchRequest};
