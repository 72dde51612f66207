//! Spinner
//!
//! Braille progress indicator shared by the line and full-screen sinks.

use std::time::Duration;

/// Animation frames
pub const FRAMES: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Time between frames
pub const FRAME_INTERVAL: Duration = Duration::from_millis(80);

/// Current spinner phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Spinner {
    phase: usize,
}

impl Spinner {
    /// Spinner at its first frame
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one frame
    pub fn tick(&mut self) {
        self.phase = (self.phase + 1) % FRAMES.len();
    }

    /// Glyph for the current phase
    #[must_use]
    pub fn frame(&self) -> char {
        FRAMES[self.phase % FRAMES.len()]
    }
}
