//! flowwatch - follow a flow execution's event stream
//!
//! # Usage
//!
//! ```bash
//! # Line-by-line log
//! flowwatch 6650b1f0c2a4e9d1f3a2b7c8
//!
//! # Full-screen live view
//! flowwatch 6650b1f0c2a4e9d1f3a2b7c8 --output live
//!
//! # JSON lines for scripts
//! flowwatch 6650b1f0c2a4e9d1f3a2b7c8 --output json | jq .type
//!
//! # Verbose logging
//! RUST_LOG=debug flowwatch 6650b1f0c2a4e9d1f3a2b7c8
//! ```
//!
//! # Exit status
//!
//! - `0`: the execution completed
//! - `1`: the execution failed, the stream gave up, or setup failed
//! - `130`: the watch was cancelled

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use flowwatch_core::{load_config_from_path, ConfigOverrides, DispatchMode, Outcome};
use flowwatch_tui::{watch, OutputMode, WatchRequest};
use tokio_util::sync::CancellationToken;

/// Follow a flow execution's progress live
#[derive(Parser, Debug)]
#[command(name = "flowwatch")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Execution to watch
    #[arg(value_name = "EXECUTION_ID")]
    execution_id: String,

    /// Presentation of events
    #[arg(short = 'o', long, value_enum, default_value_t = OutputMode::Line)]
    output: OutputMode,

    /// API base URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Bearer token
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// Flow name shown in the live view title
    #[arg(long, value_name = "NAME")]
    flow_name: Option<String>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Sink dispatch discipline (line and json output)
    #[arg(long, value_name = "MODE")]
    dispatch: Option<DispatchMode>,

    /// Configuration file (default: ~/.config/flowwatch/config.toml)
    #[arg(short = 'c', long, env = "FLOWWATCH_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable colors
    #[arg(long)]
    no_color: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_url: self.api_url.clone(),
            token: self.token.clone(),
            deadline_secs: self.timeout,
            dispatch: self.dispatch,
            no_color: self.no_color,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging("warn", args.output)?;

    let mut config = load_config_from_path(args.config.as_deref())?;
    config.apply_overrides(&args.overrides());
    tracing::debug!(
        api_url = %config.api_url,
        source = ?config.source(),
        "loaded configuration"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                cancel.cancel();
            }
        });
    }

    let request = WatchRequest {
        execution_id: args.execution_id,
        flow_name: args.flow_name,
        output: args.output,
    };
    let completion = watch(&config, request, cancel).await?;

    Ok(match completion.outcome {
        Outcome::Success => ExitCode::SUCCESS,
        Outcome::Failure => ExitCode::FAILURE,
        Outcome::Cancelled => ExitCode::from(130),
    })
}

/// Install the subscriber: stderr normally, a log file under the live view
fn init_logging(level: &str, output: OutputMode) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "flowwatch={level},flowwatch_core={level},flowwatch_tui={level}"
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match output {
        OutputMode::Live => {
            let dir = dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(std::env::temp_dir)
                .join("flowwatch");
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let path = dir.join("flowwatch.log");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        OutputMode::Line | OutputMode::Json => {
            builder.with_writer(std::io::stderr).init();
        }
    }

    Ok(())
}
