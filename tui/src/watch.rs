//! Session Runner
//!
//! Builds the pipeline for one execution from configuration and runs it
//! with the selected output:
//!
//! - `line`: [`LineSink`] on stdout, spinner when stdout is a terminal
//! - `json`: [`JsonLinesSink`] on stdout
//! - `live`: alternate-screen [`LiveView`]; the network read runs on its own
//!   task and always hands events over through the queue
//!
//! The agent directory is fetched once up front and never fails the watch.

use std::io::{self, IsTerminal, Write};
use std::panic;
use std::sync::Arc;

use anyhow::Context;
use crossterm::event::EventStream;
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use flowwatch_core::{
    run_pipeline, stream_into, AgentDirectory, CompletionResult, DirectoryClient, DispatchMode,
    EventTransport, ExecutionSession, HttpTransport, QueuedSink, SessionHandle, StreamConnector,
    WatchConfig,
};
use futures::Stream;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::Terminal;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::live::{run_live, LiveView};
use crate::sinks::{spawn_spinner, summary_line, JsonLinesSink, LineSink};
use crate::theme::Theme;

/// How events are presented
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputMode {
    /// One line per event
    #[default]
    Line,
    /// Full-screen view
    Live,
    /// JSON lines for tooling
    Json,
}

/// What to watch
#[derive(Clone, Debug)]
pub struct WatchRequest {
    /// Execution to follow
    pub execution_id: String,
    /// Flow name for the title, if known
    pub flow_name: Option<String>,
    /// Presentation
    pub output: OutputMode,
}

/// Everything a sink-specific run needs
pub struct WatchContext<T> {
    /// Stream connector
    pub connector: StreamConnector<T>,
    /// Event stream URL
    pub endpoint: String,
    /// Shared session state
    pub session: SessionHandle,
    /// Agent lookup for display names
    pub directory: Arc<AgentDirectory>,
    /// Colors
    pub theme: Theme,
    /// Dispatch discipline for the line and json sinks
    pub dispatch: DispatchMode,
    /// Live view scroll-back
    pub log_capacity: usize,
    /// Truncation length for tool fields
    pub max_field_len: usize,
}

impl<T: EventTransport + 'static> WatchContext<T> {
    /// Assemble a context from configuration
    pub fn new(
        connector: StreamConnector<T>,
        config: &WatchConfig,
        request: &WatchRequest,
        directory: AgentDirectory,
    ) -> Self {
        let mut session = ExecutionSession::new(&request.execution_id, config.log_capacity);
        if let Some(flow) = &request.flow_name {
            session = session.with_flow_name(flow);
        }
        Self {
            connector,
            endpoint: config.stream_url(&request.execution_id),
            session: session.into_handle(),
            directory: Arc::new(directory),
            theme: Theme::new(config.color),
            dispatch: config.dispatch,
            log_capacity: config.log_capacity,
            max_field_len: config.max_field_len,
        }
    }

    /// Run with the line sink on `out`
    ///
    /// # Errors
    ///
    /// Returns the [`JoinError`] if the queued sink worker panicked.
    pub async fn lines<W>(
        &self,
        out: W,
        spinner: bool,
        cancel: &CancellationToken,
    ) -> Result<(CompletionResult, LineSink<W>), JoinError>
    where
        W: Write + Send + 'static,
    {
        let sink = LineSink::new(
            out,
            self.theme,
            Arc::clone(&self.directory),
            self.max_field_len,
        );

        let stop = CancellationToken::new();
        let animation = spinner.then(|| {
            spawn_spinner(sink.console(), self.session.clone(), self.theme, stop.clone())
        });

        let result = run_pipeline(
            &self.connector,
            &self.endpoint,
            cancel,
            self.session.clone(),
            sink,
            self.dispatch,
        )
        .await;

        stop.cancel();
        if let Some(animation) = animation {
            if let Err(err) = animation.await {
                tracing::debug!(error = %err, "spinner task ended abnormally");
            }
        }
        result
    }

    /// Run with the JSON-lines sink on `out`
    ///
    /// # Errors
    ///
    /// Returns the [`JoinError`] if the queued sink worker panicked.
    pub async fn json<W>(
        &self,
        out: W,
        cancel: &CancellationToken,
    ) -> Result<(CompletionResult, JsonLinesSink<W>), JoinError>
    where
        W: Write + Send + 'static,
    {
        let sink = JsonLinesSink::new(out, Arc::clone(&self.directory));
        run_pipeline(
            &self.connector,
            &self.endpoint,
            cancel,
            self.session.clone(),
            sink,
            self.dispatch,
        )
        .await
    }

    /// Run the full-screen view on `terminal`
    ///
    /// The network read runs on its own task feeding the queue; this task
    /// owns drawing and input.
    ///
    /// # Errors
    ///
    /// Returns an error if drawing fails or the network task panicked.
    pub async fn live<B, I>(
        self,
        terminal: &mut Terminal<B>,
        input: I,
        cancel: &CancellationToken,
    ) -> anyhow::Result<CompletionResult>
    where
        B: Backend,
        I: Stream<Item = io::Result<crossterm::event::Event>> + Unpin,
    {
        let (queue, rx) = QueuedSink::channel();
        let mut view = LiveView::new(
            self.session.clone(),
            self.theme,
            Arc::clone(&self.directory),
            self.log_capacity,
            self.max_field_len,
        );

        let worker = {
            let Self {
                connector,
                endpoint,
                session,
                ..
            } = self;
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let (completion, _queue) =
                    stream_into(&connector, &endpoint, &cancel, session, queue).await;
                completion
            })
        };

        let drawn = run_live(terminal, &mut view, rx, input, cancel).await;
        if drawn.is_err() {
            cancel.cancel();
        }
        let completion = worker.await.context("network task failed")?;
        drawn.context("failed to draw live view")?;
        Ok(completion)
    }
}

/// Watch one execution until it ends, is cancelled, or the stream gives up
///
/// # Errors
///
/// Returns an error for invalid configuration, an unusable HTTP client, or
/// terminal failures. Stream failures are not errors; they are reported in
/// the returned [`CompletionResult`].
pub async fn watch(
    config: &WatchConfig,
    request: WatchRequest,
    cancel: CancellationToken,
) -> anyhow::Result<CompletionResult> {
    config.validate()?;

    let transport = HttpTransport::new(config.token.clone(), config.connect_timeout)?;
    let connector = StreamConnector::new(transport, config.connector_config());
    let directory = DirectoryClient::new(config.agents_url(), config.token.clone())?
        .fetch_or_empty()
        .await;

    tracing::info!(
        execution_id = %request.execution_id,
        output = ?request.output,
        dispatch = config.dispatch.as_str(),
        config_source = ?config.source(),
        "watching execution"
    );

    let ctx = WatchContext::new(connector, config, &request, directory);

    match request.output {
        OutputMode::Line => {
            let stdout = io::stdout();
            let spinner = stdout.is_terminal();
            let (completion, _) = ctx.lines(stdout, spinner, &cancel).await?;
            Ok(completion)
        }
        OutputMode::Json => {
            let (completion, _) = ctx.json(io::stdout(), &cancel).await?;
            Ok(completion)
        }
        OutputMode::Live => run_fullscreen(ctx, &cancel).await,
    }
}

/// Alternate-screen setup and teardown around [`WatchContext::live`]
async fn run_fullscreen<T: EventTransport + 'static>(
    ctx: WatchContext<T>,
    cancel: &CancellationToken,
) -> anyhow::Result<CompletionResult> {
    if !io::stdout().is_terminal() {
        anyhow::bail!("live output needs a terminal; use --output line or --output json");
    }

    let theme = ctx.theme;

    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;

    let result = ctx.live(&mut terminal, EventStream::new(), cancel).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let completion = result?;
    println!("{}", summary_line(&theme, &completion));
    Ok(completion)
}
