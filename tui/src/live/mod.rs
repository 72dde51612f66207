//! Full-screen sink: alternate-screen view fed through the queued hand-off

mod app;
mod view;

pub use app::run_live;
pub use view::{KeyAction, LiveView};
