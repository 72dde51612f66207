//! Full-Screen View State
//!
//! Sink-local render state for the live view: the bounded list of rendered
//! events, spinner phase and the scroll position. Events arrive through the
//! queued hand-off; the session handle is read on every redraw for the
//! status line, which the network worker updates concurrently.
//!
//! Scrolling is measured in lines from the bottom. While following (the
//! default) new events keep the newest line in view; once the user scrolls
//! up the viewport stays put until `End` is pressed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use flowwatch_core::{
    truncate_field, AgentDirectory, BoundedLog, CompletionResult, Event, EventSink, EventType,
    EventView, Outcome, SessionHandle, Tone,
};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::Color;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::spinner::Spinner;
use crate::theme::Theme;

/// Prefix for body lines under an event
const BODY_PREFIX: &str = "  │ ";

/// Keybinding help
const FOOTER: &str = " q quit · ↑↓ scroll · PgUp/PgDn page · End follow";

/// What a key press asks the loop to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    /// Nothing beyond a redraw
    None,
    /// Stop watching
    Quit,
}

/// One rendered event
#[derive(Clone, Debug)]
struct Entry {
    time: String,
    label: String,
    tone: Tone,
    agent: Option<(String, Color)>,
    headline: String,
    body: Vec<String>,
}

impl Entry {
    fn header(&self, theme: &Theme) -> Line<'static> {
        let mut spans = vec![
            Span::styled(format!("{} ", self.time), theme.fg(theme.muted)),
            Span::styled(format!("{:<10} ", self.label), theme.fg(theme.tone(self.tone))),
        ];
        if let Some((name, color)) = &self.agent {
            spans.push(Span::styled(format!("[{name}] "), theme.bold(*color)));
        }
        spans.push(Span::raw(self.headline.clone()));
        Line::from(spans)
    }

    fn body_lines(&self, width: usize) -> Vec<String> {
        let width = width.saturating_sub(BODY_PREFIX.chars().count()).max(8);
        self.body
            .iter()
            .flat_map(|line| {
                if line.is_empty() {
                    vec![String::new()]
                } else {
                    textwrap::wrap(line, width)
                        .into_iter()
                        .map(|part| part.into_owned())
                        .collect()
                }
            })
            .collect()
    }

    fn line_count(&self, width: usize) -> usize {
        1 + self.body_lines(width).len()
    }
}

/// Full-screen live view
pub struct LiveView {
    entries: BoundedLog<Entry>,
    theme: Theme,
    directory: Arc<AgentDirectory>,
    session: SessionHandle,
    max_field_len: usize,
    spinner: Spinner,
    scroll: usize,
    follow: bool,
    page: usize,
    width: usize,
    finished: Option<CompletionResult>,
}

impl LiveView {
    /// Create a view over `session`
    pub fn new(
        session: SessionHandle,
        theme: Theme,
        directory: Arc<AgentDirectory>,
        capacity: usize,
        max_field_len: usize,
    ) -> Self {
        Self {
            entries: BoundedLog::new(capacity),
            theme,
            directory,
            session,
            max_field_len,
            spinner: Spinner::new(),
            scroll: 0,
            follow: true,
            page: 10,
            width: 80,
            finished: None,
        }
    }

    /// Number of events held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no event has been shown yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the view is pinned to the newest line
    pub fn is_following(&self) -> bool {
        self.follow
    }

    /// Lines scrolled up from the bottom
    pub fn scroll_offset(&self) -> usize {
        self.scroll
    }

    /// The completion, once received
    pub fn finished(&self) -> Option<&CompletionResult> {
        self.finished.as_ref()
    }

    /// Advance the spinner
    pub fn tick(&mut self) {
        self.spinner.tick();
    }

    /// Apply a key press
    pub fn handle_key(&mut self, key: KeyEvent) -> KeyAction {
        if key.kind != KeyEventKind::Press {
            return KeyAction::None;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return KeyAction::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return KeyAction::Quit
            }
            KeyCode::Up => self.scroll_up(1),
            KeyCode::Down => self.scroll_down(1),
            KeyCode::PageUp => self.scroll_up(self.page),
            KeyCode::PageDown => self.scroll_down(self.page),
            KeyCode::End => {
                self.scroll = 0;
                self.follow = true;
            }
            _ => {}
        }
        KeyAction::None
    }

    fn scroll_up(&mut self, lines: usize) {
        self.scroll = self.scroll.saturating_add(lines);
        self.follow = false;
    }

    fn scroll_down(&mut self, lines: usize) {
        self.scroll = self.scroll.saturating_sub(lines);
        if self.scroll == 0 {
            self.follow = true;
        }
    }

    fn entry_for(&self, event: &Event) -> Entry {
        let view = EventView::build(event, &self.directory);

        let mut body = Vec::new();
        if let Some(args) = &view.tool_args {
            body.push(format!(
                "args: {}",
                truncate_field(&args.replace('\n', " "), self.max_field_len)
            ));
        }
        if let Some(content) = &view.content {
            let text = match view.event_type {
                EventType::LlmResponse => content.clone(),
                _ => truncate_field(content, self.max_field_len),
            };
            body.extend(text.lines().map(str::to_string));
        }

        let mut headline = view.headline.clone();
        if let Some(ms) = view.duration_ms {
            headline.push_str(&format!(" ({ms}ms)"));
        }

        Entry {
            time: view
                .timestamp
                .with_timezone(&Local)
                .format("%H:%M:%S")
                .to_string(),
            label: view.label(),
            tone: view.tone,
            agent: view
                .agent
                .as_ref()
                .map(|agent| (agent.name.clone(), self.theme.agent(agent))),
            headline,
            body,
        }
    }

    /// Draw the whole screen
    pub fn draw(&mut self, frame: &mut Frame) {
        let [title, log, status, footer] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        frame.render_widget(self.title_line(), title);
        self.draw_log(frame, log);
        frame.render_widget(self.status_line(), status);
        frame.render_widget(self.footer_line(), footer);
    }

    fn title_line(&self) -> Paragraph<'static> {
        let (execution_id, flow_name) = {
            let session = self.session.lock();
            (session.execution_id.clone(), session.flow_name.clone())
        };
        let mut spans = vec![Span::styled(" flowwatch ", self.theme.bold(self.theme.accent))];
        if let Some(flow) = flow_name {
            spans.push(Span::styled(format!("{flow} "), self.theme.bold(self.theme.body)));
        }
        spans.push(Span::styled(
            format!("({execution_id})"),
            self.theme.fg(self.theme.muted),
        ));
        Paragraph::new(Line::from(spans))
    }

    fn draw_log(&mut self, frame: &mut Frame, area: Rect) {
        let width = usize::from(area.width);
        let height = usize::from(area.height);
        self.width = width;
        self.page = height.saturating_sub(1).max(1);

        let body_style = self.theme.fg(self.theme.body);
        let mut lines: Vec<Line<'static>> = Vec::new();
        for entry in self.entries.iter() {
            lines.push(entry.header(&self.theme));
            let style = match entry.tone {
                Tone::Failure => self.theme.fg(self.theme.failure),
                _ => body_style,
            };
            for body in entry.body_lines(width) {
                lines.push(Line::styled(format!("{BODY_PREFIX}{body}"), style));
            }
        }

        if lines.is_empty() {
            let waiting = Paragraph::new(Line::styled(
                " waiting for events…",
                self.theme.fg(self.theme.muted),
            ));
            frame.render_widget(waiting, area);
            return;
        }

        let max_scroll = lines.len().saturating_sub(height);
        if self.follow {
            self.scroll = 0;
        }
        self.scroll = self.scroll.min(max_scroll);

        let end = lines.len() - self.scroll;
        let start = end.saturating_sub(height);
        let visible: Vec<Line<'static>> = lines.drain(start..end).collect();
        frame.render_widget(Paragraph::new(visible), area);
    }

    fn status_line(&self) -> Paragraph<'static> {
        if let Some(result) = &self.finished {
            let (glyph, label) = match result.outcome {
                Outcome::Success => ("✔", "Completed"),
                Outcome::Failure => ("✖", "Failed"),
                Outcome::Cancelled => ("⊘", "Cancelled"),
            };
            let text = match &result.message {
                Some(message) if !message.is_empty() => format!(" {glyph} {label}: {message}"),
                _ => format!(" {glyph} {label}"),
            };
            return Paragraph::new(Line::styled(
                text,
                self.theme.bold(self.theme.outcome(result.outcome)),
            ));
        }

        let (status, events, elapsed) = {
            let session = self.session.lock();
            (
                session.status().to_string(),
                session.events_delivered(),
                session.elapsed(),
            )
        };
        Paragraph::new(Line::from(vec![
            Span::styled(format!(" {} ", self.spinner.frame()), self.theme.fg(self.theme.accent)),
            Span::styled(status, self.theme.fg(self.theme.info)),
            Span::styled(
                format!("  · {events} events · {}", format_elapsed(elapsed)),
                self.theme.fg(self.theme.muted),
            ),
        ]))
    }

    fn footer_line(&self) -> Paragraph<'static> {
        let mut text = FOOTER.to_string();
        if !self.follow && self.scroll > 0 {
            text.push_str(&format!(" [↑{} lines]", self.scroll));
        }
        Paragraph::new(Line::styled(text, self.theme.fg(self.theme.muted)))
    }
}

impl EventSink for LiveView {
    fn on_event(&mut self, event: &Event) {
        let entry = self.entry_for(event);
        if !self.follow {
            self.scroll = self.scroll.saturating_add(entry.line_count(self.width));
        }
        self.entries.push(entry);
    }

    fn on_finish(&mut self, result: &CompletionResult) {
        if self.finished.is_none() {
            self.finished = Some(result.clone());
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else {
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowwatch_core::ExecutionSession;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use serde_json::json;

    fn view(capacity: usize) -> LiveView {
        let session = ExecutionSession::new("exec-42", 50)
            .with_flow_name("Nightly report")
            .into_handle();
        LiveView::new(
            session,
            Theme::new(false),
            Arc::new(AgentDirectory::empty()),
            capacity,
            40,
        )
    }

    fn render(view: &mut LiveView, width: u16, height: u16) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|frame| view.draw(frame)).unwrap();
        let buffer = terminal.backend().buffer();
        (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| buffer[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect()
    }

    fn step(n: usize) -> Event {
        Event::new(EventType::StepStarted, format!("step number {n}")).with_data(
            json!({"agent_name": "JAX"}).as_object().cloned().unwrap(),
        )
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_layout_has_title_log_status_footer() {
        let mut view = view(50);
        view.session.lock().record_connect_attempt(1);
        view.on_event(&step(1));

        let rows = render(&mut view, 70, 8);
        assert!(rows[0].contains("flowwatch Nightly report (exec-42)"));
        assert!(rows[1].contains("[JAX] step number 1"));
        assert!(rows[6].contains("Connecting"));
        assert!(rows[7].contains("q quit"));
    }

    #[test]
    fn test_log_is_bounded() {
        let mut view = view(3);
        for n in 0..5 {
            view.on_event(&step(n));
        }
        assert_eq!(view.len(), 3);

        let rows = render(&mut view, 70, 8).join("\n");
        assert!(!rows.contains("step number 1"));
        assert!(rows.contains("step number 4"));
    }

    #[test]
    fn test_follow_shows_newest_and_scroll_pins_viewport() {
        let mut view = view(50);
        for n in 0..10 {
            view.on_event(&step(n));
        }
        // 4 rows of log
        let rows = render(&mut view, 70, 7);
        assert!(rows[4].contains("step number 9"));

        view.handle_key(key(KeyCode::Up));
        view.handle_key(key(KeyCode::Up));
        assert!(!view.is_following());
        let rows = render(&mut view, 70, 7);
        assert!(rows[4].contains("step number 7"));
        assert!(rows[6].contains("[↑2 lines]"));

        view.on_event(&step(10));
        let rows = render(&mut view, 70, 7);
        assert!(rows[4].contains("step number 7"), "viewport stays put");

        view.handle_key(key(KeyCode::End));
        let rows = render(&mut view, 70, 7);
        assert!(view.is_following());
        assert!(rows[4].contains("step number 10"));
    }

    #[test]
    fn test_quit_keys() {
        let mut view = view(5);
        assert_eq!(view.handle_key(key(KeyCode::Char('q'))), KeyAction::Quit);
        assert_eq!(view.handle_key(key(KeyCode::Esc)), KeyAction::Quit);
        assert_eq!(
            view.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            KeyAction::Quit
        );
        assert_eq!(view.handle_key(key(KeyCode::Char('c'))), KeyAction::None);
    }

    #[test]
    fn test_tool_result_wrapped_under_header() {
        let mut view = view(5);
        view.on_event(
            &Event::new(EventType::ToolCallCompleted, "").with_data(
                json!({"tool_name": "fetch", "result": "first\nsecond"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
        );
        let rows = render(&mut view, 60, 8);
        assert!(rows[1].contains("fetch returned"));
        assert!(rows[2].starts_with("  │ first"));
        assert!(rows[3].starts_with("  │ second"));
    }

    #[test]
    fn test_finished_status_replaces_spinner() {
        let mut view = view(5);
        view.on_finish(&CompletionResult::local(Outcome::Cancelled, "watch cancelled"));
        let rows = render(&mut view, 60, 5);
        assert!(rows[1].contains("waiting for events"));
        assert!(rows[3].contains("⊘ Cancelled: watch cancelled"));
    }

    #[test]
    fn test_elapsed_format() {
        assert_eq!(format_elapsed(Duration::from_secs(65)), "01:05");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "1:02:05");
    }
}
