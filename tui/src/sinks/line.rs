//! Line Sink
//!
//! Prints one timestamped, color-tagged line per event, with multi-line
//! bodies indented underneath. A spinner animates the live status on the
//! line below the log when stdout is a terminal.
//!
//! The spinner and the event writer share one [`Console`] behind a lock. The
//! spinner's line is cleared before any event line is written, so the two
//! never interleave.

use std::io::{self, Write};
use std::sync::Arc;

use chrono::Local;
use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::{style, Print, Stylize};
use crossterm::terminal::{Clear, ClearType};
use flowwatch_core::{
    truncate_field, AgentDirectory, CompletionResult, Event, EventSink, EventType, EventView,
    Outcome, SessionHandle, Tone,
};
use parking_lot::Mutex;
use ratatui::style::Color;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::spinner::{Spinner, FRAME_INTERVAL};
use crate::theme::{to_crossterm, Theme};

/// Indent for body lines
const BODY_INDENT: &str = "    │ ";

/// Indent for tool arguments
const ARGS_INDENT: &str = "    ↳ ";

// ============================================================================
// Console
// ============================================================================

/// Output shared by the event writer and the spinner
#[derive(Debug)]
pub struct Console<W> {
    out: W,
    spinner_visible: bool,
    finished: bool,
}

/// Console behind a lock
pub type SharedConsole<W> = Arc<Mutex<Console<W>>>;

impl<W: Write> Console<W> {
    /// Wrap an output
    pub fn new(out: W) -> Self {
        Self {
            out,
            spinner_visible: false,
            finished: false,
        }
    }

    /// The underlying output
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Whether the summary has been written
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Erase the spinner line if it is showing
    pub fn clear_spinner(&mut self) -> io::Result<()> {
        if self.spinner_visible {
            queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
            self.out.flush()?;
            self.spinner_visible = false;
        }
        Ok(())
    }

    /// Write whole lines, clearing the spinner first
    pub fn write_lines(&mut self, lines: &[String]) -> io::Result<()> {
        self.clear_spinner()?;
        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()
    }

    /// Redraw the spinner line in place
    pub fn draw_spinner(&mut self, text: &str) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(text)
        )?;
        self.out.flush()?;
        self.spinner_visible = true;
        Ok(())
    }

    fn finish(&mut self, lines: &[String]) -> io::Result<()> {
        self.write_lines(lines)?;
        self.finished = true;
        Ok(())
    }
}

// ============================================================================
// Formatting
// ============================================================================

fn paint(theme: &Theme, text: &str, color: Color) -> String {
    if theme.color {
        style(text).with(to_crossterm(color)).to_string()
    } else {
        text.to_string()
    }
}

fn marker(tone: Tone) -> &'static str {
    match tone {
        Tone::Info => "•",
        Tone::Success => "✔",
        Tone::Failure => "✖",
        Tone::Warning => "!",
        Tone::Muted => "·",
    }
}

/// Render one event as console lines
#[must_use]
pub fn format_event(view: &EventView, theme: &Theme, max_field_len: usize) -> Vec<String> {
    let tone_color = theme.tone(view.tone);

    let mut header = format!(
        "{} {} {}",
        paint(
            theme,
            &view.timestamp.with_timezone(&Local).format("%H:%M:%S").to_string(),
            theme.muted
        ),
        paint(theme, marker(view.tone), tone_color),
        paint(theme, &format!("{:<10}", view.label()), tone_color),
    );

    if let Some(agent) = &view.agent {
        header.push(' ');
        header.push_str(&paint(theme, &format!("[{}]", agent.name), theme.agent(agent)));
    }

    header.push(' ');
    header.push_str(&view.headline);

    if let Some(tool) = &view.tool_name {
        if !view.headline.contains(tool.as_str()) {
            header.push_str(&paint(theme, &format!(" ({tool})"), theme.accent));
        }
    }
    if let Some(ms) = view.duration_ms {
        header.push_str(&paint(theme, &format!(" {ms}ms"), theme.muted));
    }

    let mut lines = vec![header];

    if let Some(args) = &view.tool_args {
        let args = truncate_field(&args.replace('\n', " "), max_field_len);
        lines.push(paint(theme, &format!("{ARGS_INDENT}{args}"), theme.muted));
    }

    if let Some(content) = &view.content {
        let text = match view.event_type {
            EventType::LlmResponse => content.clone(),
            _ => truncate_field(content, max_field_len),
        };
        let color = match view.tone {
            Tone::Failure => theme.failure,
            _ => theme.body,
        };
        for body_line in text.lines() {
            lines.push(paint(theme, &format!("{BODY_INDENT}{body_line}"), color));
        }
    }

    lines
}

/// One-line end-of-stream summary
#[must_use]
pub fn summary_line(theme: &Theme, result: &CompletionResult) -> String {
    let (glyph, label) = match result.outcome {
        Outcome::Success => ("✔", "Execution completed"),
        Outcome::Failure => ("✖", "Execution failed"),
        Outcome::Cancelled => ("⊘", "Cancelled"),
    };
    let text = match &result.message {
        Some(message) if !message.is_empty() => format!("{glyph} {label}: {message}"),
        _ => format!("{glyph} {label}"),
    };
    paint(theme, &text, theme.outcome(result.outcome))
}

// ============================================================================
// Sink
// ============================================================================

/// Line-by-line console sink
pub struct LineSink<W> {
    console: SharedConsole<W>,
    theme: Theme,
    directory: Arc<AgentDirectory>,
    max_field_len: usize,
}

impl<W: Write + Send> LineSink<W> {
    /// Create a sink writing to `out`
    pub fn new(out: W, theme: Theme, directory: Arc<AgentDirectory>, max_field_len: usize) -> Self {
        Self {
            console: Arc::new(Mutex::new(Console::new(out))),
            theme,
            directory,
            max_field_len,
        }
    }

    /// Shared console, for the spinner
    pub fn console(&self) -> SharedConsole<W> {
        Arc::clone(&self.console)
    }
}

impl<W: Write + Send> EventSink for LineSink<W> {
    fn on_event(&mut self, event: &Event) {
        let view = EventView::build(event, &self.directory);
        let lines = format_event(&view, &self.theme, self.max_field_len);
        if let Err(err) = self.console.lock().write_lines(&lines) {
            tracing::warn!(error = %err, "failed to write event line");
        }
    }

    fn on_finish(&mut self, result: &CompletionResult) {
        let line = summary_line(&self.theme, result);
        if let Err(err) = self.console.lock().finish(&[line]) {
            tracing::warn!(error = %err, "failed to write summary");
        }
    }
}

/// Animate the session status on the console until `stop` fires or the
/// session ends
pub fn spawn_spinner<W>(
    console: SharedConsole<W>,
    session: SessionHandle,
    theme: Theme,
    stop: CancellationToken,
) -> JoinHandle<()>
where
    W: Write + Send + 'static,
{
    tokio::spawn(async move {
        let mut spinner = Spinner::new();
        let mut interval = tokio::time::interval(FRAME_INTERVAL);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = interval.tick() => {}
            }

            let status = {
                let session = session.lock();
                if session.state().is_terminal() {
                    break;
                }
                session.status().to_string()
            };

            let text = format!(
                "{} {}",
                paint(&theme, &spinner.frame().to_string(), theme.accent),
                paint(&theme, &status, theme.muted)
            );

            let mut out = console.lock();
            if out.is_finished() {
                break;
            }
            if let Err(err) = out.draw_spinner(&text) {
                tracing::debug!(error = %err, "spinner stopped");
                break;
            }
            spinner.tick();
        }

        if let Err(err) = console.lock().clear_spinner() {
            tracing::debug!(error = %err, "failed to clear spinner");
        }
    })
}
