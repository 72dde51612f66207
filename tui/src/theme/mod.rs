//! Theme and Colors
//!
//! The palette is plain constants; which of them a sink actually uses is
//! decided by a [`Theme`] value built once from configuration and handed to
//! each sink. With color disabled every style is the terminal default.

use flowwatch_core::{AgentIdentity, Outcome, Tone};
use ratatui::style::{Color, Modifier, Style};

// ============================================================================
// Palette
// ============================================================================

/// Signature magenta (titles, accents)
pub const ACCENT_MAGENTA: Color = Color::Magenta;

/// Ordinary progress - soft blue
pub const INFO_BLUE: Color = Color::Rgb(150, 180, 255);

/// System/dim text
pub const DIM_GRAY: Color = Color::Rgb(100, 100, 100);

/// Error red
pub const ERROR_RED: Color = Color::Rgb(255, 80, 80);

/// Success green
pub const SUCCESS_GREEN: Color = Color::Rgb(120, 230, 120);

/// Warning - warm yellow
pub const WARNING_YELLOW: Color = Color::Rgb(255, 223, 128);

/// Agent name fallback
pub const AGENT_CYAN: Color = Color::Cyan;

/// Body text under an event line
pub const BODY_WHITE: Color = Color::Rgb(210, 210, 210);

// ============================================================================
// Theme
// ============================================================================

/// Colors handed to a sink at construction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Theme {
    /// Whether any color is emitted
    pub color: bool,
    /// Titles and accents
    pub accent: Color,
    /// Info tone
    pub info: Color,
    /// Success tone
    pub success: Color,
    /// Failure tone
    pub failure: Color,
    /// Warning tone
    pub warning: Color,
    /// Muted tone, timestamps and chrome
    pub muted: Color,
    /// Body text
    pub body: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Theme {
    /// Standard palette, optionally without color
    #[must_use]
    pub fn new(color: bool) -> Self {
        Self {
            color,
            accent: ACCENT_MAGENTA,
            info: INFO_BLUE,
            success: SUCCESS_GREEN,
            failure: ERROR_RED,
            warning: WARNING_YELLOW,
            muted: DIM_GRAY,
            body: BODY_WHITE,
        }
    }

    /// Color for a tone
    #[must_use]
    pub fn tone(&self, tone: Tone) -> Color {
        match tone {
            Tone::Info => self.info,
            Tone::Success => self.success,
            Tone::Failure => self.failure,
            Tone::Warning => self.warning,
            Tone::Muted => self.muted,
        }
    }

    /// Color for an outcome
    #[must_use]
    pub fn outcome(&self, outcome: Outcome) -> Color {
        match outcome {
            Outcome::Success => self.success,
            Outcome::Failure => self.failure,
            Outcome::Cancelled => self.warning,
        }
    }

    /// Color for a resolved agent
    #[must_use]
    pub fn agent(&self, identity: &AgentIdentity) -> Color {
        parse_color(&identity.color).unwrap_or(AGENT_CYAN)
    }

    /// Foreground style, or the default style with color off
    #[must_use]
    pub fn fg(&self, color: Color) -> Style {
        if self.color {
            Style::default().fg(color)
        } else {
            Style::default()
        }
    }

    /// Bold foreground style (bold is kept with color off)
    #[must_use]
    pub fn bold(&self, color: Color) -> Style {
        self.fg(color).add_modifier(Modifier::BOLD)
    }
}

/// Parse a color name (`"magenta"`, `"gray"`) or `#rrggbb`
#[must_use]
pub fn parse_color(name: &str) -> Option<Color> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    name.to_ascii_lowercase().parse::<Color>().ok()
}

/// Convert to a crossterm color for line-mode output
#[must_use]
pub fn to_crossterm(color: Color) -> crossterm::style::Color {
    use crossterm::style::Color as C;
    match color {
        Color::Reset => C::Reset,
        Color::Black => C::Black,
        Color::Red => C::DarkRed,
        Color::Green => C::DarkGreen,
        Color::Yellow => C::DarkYellow,
        Color::Blue => C::DarkBlue,
        Color::Magenta => C::DarkMagenta,
        Color::Cyan => C::DarkCyan,
        Color::Gray => C::Grey,
        Color::DarkGray => C::DarkGrey,
        Color::LightRed => C::Red,
        Color::LightGreen => C::Green,
        Color::LightYellow => C::Yellow,
        Color::LightBlue => C::Blue,
        Color::LightMagenta => C::Magenta,
        Color::LightCyan => C::Cyan,
        Color::White => C::White,
        Color::Rgb(r, g, b) => C::Rgb { r, g, b },
        Color::Indexed(i) => C::AnsiValue(i),
    }
}
