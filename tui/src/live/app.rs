//! Full-Screen Render Loop
//!
//! Runs on the main task while the network worker streams elsewhere. Each
//! turn waits for the first of: terminal input, a queued event, or the
//! spinner tick, then redraws. The loop ends after the completion message
//! has been drawn, or when the queue closes.

use std::io;

use crossterm::event::Event as TermEvent;
use flowwatch_core::{EventSink, SinkMessage};
use futures::{Stream, StreamExt};
use ratatui::backend::Backend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::view::{KeyAction, LiveView};
use crate::spinner::FRAME_INTERVAL;

/// Drive the live view until the session finishes
///
/// A quit key fires `cancel`; the loop keeps drawing until the resulting
/// completion arrives so the final state is shown.
///
/// # Errors
///
/// Returns an error if drawing to the terminal fails.
pub async fn run_live<B, I>(
    terminal: &mut Terminal<B>,
    view: &mut LiveView,
    mut rx: mpsc::UnboundedReceiver<SinkMessage>,
    mut input: I,
    cancel: &CancellationToken,
) -> io::Result<()>
where
    B: Backend,
    I: Stream<Item = io::Result<TermEvent>> + Unpin,
{
    let mut tick = tokio::time::interval(FRAME_INTERVAL);
    let mut input_open = true;

    terminal.draw(|frame| view.draw(frame))?;

    loop {
        tokio::select! {
            biased;

            maybe_event = input.next(), if input_open => match maybe_event {
                Some(Ok(TermEvent::Key(key))) => {
                    if view.handle_key(key) == KeyAction::Quit && !cancel.is_cancelled() {
                        tracing::info!("stop requested from keyboard");
                        cancel.cancel();
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "terminal input failed");
                    input_open = false;
                }
                None => input_open = false,
            },

            message = rx.recv() => match message {
                Some(SinkMessage::Event(event)) => view.on_event(&event),
                Some(SinkMessage::Finished(result)) => {
                    view.on_finish(&result);
                    terminal.draw(|frame| view.draw(frame))?;
                    return Ok(());
                }
                None => {
                    tracing::debug!("event queue closed before completion");
                    terminal.draw(|frame| view.draw(frame))?;
                    return Ok(());
                }
            },

            _ = tick.tick() => view.tick(),
        }

        terminal.draw(|frame| view.draw(frame))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use flowwatch_core::{
        AgentDirectory, CompletionResult, Event, EventType, ExecutionSession, Outcome,
    };
    use ratatui::backend::TestBackend;

    use crate::theme::Theme;

    fn view() -> LiveView {
        LiveView::new(
            ExecutionSession::new("exec-7", 50).into_handle(),
            Theme::new(false),
            Arc::new(AgentDirectory::empty()),
            50,
            80,
        )
    }

    #[tokio::test]
    async fn test_loop_drains_queue_and_stops_on_finish() {
        let mut terminal = Terminal::new(TestBackend::new(60, 8)).unwrap();
        let mut view = view();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(SinkMessage::Event(Event::new(EventType::ExecutionStarted, "go")))
            .unwrap();
        tx.send(SinkMessage::Finished(CompletionResult::local(
            Outcome::Success,
            "all good",
        )))
        .unwrap();

        let cancel = CancellationToken::new();
        run_live(
            &mut terminal,
            &mut view,
            rx,
            futures::stream::pending::<io::Result<TermEvent>>(),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(view.len(), 1);
        assert_eq!(view.finished().map(|r| r.outcome), Some(Outcome::Success));
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_quit_key_cancels_and_waits_for_completion() {
        let mut terminal = Terminal::new(TestBackend::new(60, 8)).unwrap();
        let mut view = view();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let producer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                let _ = tx.send(SinkMessage::Finished(CompletionResult::local(
                    Outcome::Cancelled,
                    "watch cancelled",
                )));
            })
        };

        let keys = futures::stream::iter(vec![Ok::<_, io::Error>(TermEvent::Key(KeyEvent::new(
            KeyCode::Char('q'),
            KeyModifiers::NONE,
        )))]);
        run_live(&mut terminal, &mut view, rx, keys, &cancel)
            .await
            .unwrap();
        producer.await.unwrap();

        assert!(cancel.is_cancelled());
        assert_eq!(
            view.finished().map(|r| r.outcome),
            Some(Outcome::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_closed_queue_ends_loop() {
        let mut terminal = Terminal::new(TestBackend::new(60, 8)).unwrap();
        let mut view = view();
        let (tx, rx) = mpsc::unbounded_channel::<SinkMessage>();
        drop(tx);

        run_live(
            &mut terminal,
            &mut view,
            rx,
            futures::stream::pending::<io::Result<TermEvent>>(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(view.finished().is_none());
    }
}
