//! Configuration
//!
//! Settings for watching an execution, loaded from a TOML file at
//! `$XDG_CONFIG_HOME/flowwatch/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are applied in this order, later layers winning:
//! 1. Default values
//! 2. TOML configuration file
//! 3. Environment variables
//! 4. Command-line overrides ([`ConfigOverrides`])
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "https://flows.example.com/api/v1"
//! token = "..."
//!
//! [stream]
//! retry_delay_ms = 1000
//! deadline_secs = 3600
//! max_attempts = 0
//! connect_timeout_ms = 10000
//! dispatch = "inline"
//!
//! [display]
//! log_capacity = 50
//! max_field_len = 200
//! color = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connector::{ConnectorConfig, DEFAULT_DEADLINE, DEFAULT_RETRY_DELAY};
use crate::dispatcher::DispatchMode;
use crate::error::ConfigError;
use crate::session::DEFAULT_LOG_CAPACITY;

/// API base URL when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";

/// Default connect timeout for the event stream
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default truncation length for long fields
pub const DEFAULT_MAX_FIELD_LEN: usize = 200;

/// Smallest accepted truncation length
pub const MIN_FIELD_LEN: usize = 16;

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Where the configuration's highest-priority value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Structures
// =============================================================================

/// `[api]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// API base URL
    pub base_url: Option<String>,
    /// Bearer credential
    pub token: Option<String>,
}

/// `[stream]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Delay between connect attempts in milliseconds
    pub retry_delay_ms: Option<u64>,
    /// Overall deadline in seconds
    pub deadline_secs: Option<u64>,
    /// Maximum connect attempts (0 = unlimited)
    pub max_attempts: Option<u32>,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Dispatch discipline
    pub dispatch: Option<DispatchMode>,
}

/// `[display]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayToml {
    /// Scroll-back size
    pub log_capacity: Option<usize>,
    /// Truncation length for tool arguments and results
    pub max_field_len: Option<usize>,
    /// Whether to use colors
    pub color: Option<bool>,
}

/// Top-level TOML structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchToml {
    /// API section
    pub api: ApiToml,
    /// Stream section
    pub stream: StreamToml,
    /// Display section
    pub display: DisplayToml,
}

// =============================================================================
// Effective Configuration
// =============================================================================

/// Effective configuration after all layers
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// API base URL
    pub api_url: String,
    /// Bearer credential
    pub token: Option<String>,
    /// Delay between connect attempts
    pub retry_delay: Duration,
    /// Overall deadline
    pub deadline: Duration,
    /// Maximum connect attempts (0 = unlimited)
    pub max_attempts: u32,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Dispatch discipline
    pub dispatch: DispatchMode,
    /// Scroll-back size
    pub log_capacity: usize,
    /// Truncation length for long fields
    pub max_field_len: usize,
    /// Whether to use colors
    pub color: bool,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            retry_delay: DEFAULT_RETRY_DELAY,
            deadline: DEFAULT_DEADLINE,
            max_attempts: 0,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            dispatch: DispatchMode::Inline,
            log_capacity: DEFAULT_LOG_CAPACITY,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
            color: true,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl WatchConfig {
    /// Source of the highest-priority value applied
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Retry policy for the connector
    #[must_use]
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            retry_delay: self.retry_delay,
            deadline: self.deadline,
            max_attempts: self.max_attempts,
        }
    }

    /// Event stream URL for an execution
    #[must_use]
    pub fn stream_url(&self, execution_id: &str) -> String {
        format!("{}/executions/{}/stream", self.base(), execution_id.trim())
    }

    /// Agent directory URL
    #[must_use]
    pub fn agents_url(&self) -> String {
        format!("{}/agents", self.base())
    }

    fn base(&self) -> &str {
        self.api_url.trim().trim_end_matches('/')
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let mut applied = false;
        if let Some(url) = &overrides.api_url {
            self.api_url = url.clone();
            applied = true;
        }
        if let Some(token) = &overrides.token {
            self.token = Some(token.clone());
            applied = true;
        }
        if let Some(secs) = overrides.deadline_secs {
            self.deadline = Duration::from_secs(secs);
            applied = true;
        }
        if let Some(dispatch) = overrides.dispatch {
            self.dispatch = dispatch;
            applied = true;
        }
        if overrides.no_color {
            self.color = false;
            applied = true;
        }
        if applied {
            self.source = ConfigSource::Cli;
        }
    }

    /// Check values are usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api base_url must start with http:// or https://, got {:?}",
                self.api_url
            )));
        }
        if self.retry_delay.is_zero() {
            return Err(ConfigError::Invalid(
                "stream retry_delay_ms must be greater than 0".into(),
            ));
        }
        if self.deadline.is_zero() {
            return Err(ConfigError::Invalid(
                "stream deadline_secs must be greater than 0".into(),
            ));
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::Invalid(
                "display log_capacity must be greater than 0".into(),
            ));
        }
        if self.max_field_len < MIN_FIELD_LEN {
            return Err(ConfigError::Invalid(format!(
                "display max_field_len must be at least {MIN_FIELD_LEN}"
            )));
        }
        Ok(())
    }
}

/// Values supplied on the command line
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// `--api-url`
    pub api_url: Option<String>,
    /// `--token`
    pub token: Option<String>,
    /// `--timeout`
    pub deadline_secs: Option<u64>,
    /// `--dispatch`
    pub dispatch: Option<DispatchMode>,
    /// `--no-color`
    pub no_color: bool,
}

// =============================================================================
// Loading
// =============================================================================

/// Default configuration file path
///
/// `$XDG_CONFIG_HOME/flowwatch/config.toml`, typically
/// `~/.config/flowwatch/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("flowwatch").join("config.toml"))
}

/// Load defaults, the default file and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
/// A missing config file is not an error.
pub fn load_config() -> Result<WatchConfig, ConfigError> {
    load_config_from_path(None)
}

/// Load defaults, a config file and the process environment
///
/// `path` names the file explicitly; without one the default location is
/// read, if it exists.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from_path(path: Option<&Path>) -> Result<WatchConfig, ConfigError> {
    let path = select_config_path(path, default_config_path());
    load_config_with_env(path.as_deref(), |key| std::env::var(key).ok())
}

/// An explicit path wins over the default location
fn select_config_path(explicit: Option<&Path>, default: Option<PathBuf>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or(default)
}

/// Load with an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<&Path>, env: F) -> Result<WatchConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = WatchConfig::default();

    if let Some(config_path) = path {
        if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                    path: config_path.to_path_buf(),
                    source,
                })?;
            let toml: WatchToml = toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: config_path.to_path_buf(),
                source,
            })?;
            apply_toml_config(&mut config, &toml);
            config.config_file_path = Some(config_path.to_path_buf());
            config.source = ConfigSource::File;

            tracing::debug!(path = %config_path.display(), "loaded configuration from file");
        } else {
            tracing::debug!(path = %config_path.display(), "config file not found, using defaults");
        }
    }

    apply_env_config(&mut config, env);

    Ok(config)
}

fn apply_toml_config(config: &mut WatchConfig, toml: &WatchToml) {
    if let Some(url) = &toml.api.base_url {
        config.api_url = url.clone();
    }
    if let Some(token) = &toml.api.token {
        config.token = Some(token.clone());
    }

    if let Some(ms) = toml.stream.retry_delay_ms {
        config.retry_delay = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.stream.deadline_secs {
        config.deadline = Duration::from_secs(secs);
    }
    if let Some(n) = toml.stream.max_attempts {
        config.max_attempts = n;
    }
    if let Some(ms) = toml.stream.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(dispatch) = toml.stream.dispatch {
        config.dispatch = dispatch;
    }

    if let Some(capacity) = toml.display.log_capacity {
        config.log_capacity = capacity;
    }
    if let Some(len) = toml.display.max_field_len {
        config.max_field_len = len;
    }
    if let Some(color) = toml.display.color {
        config.color = color;
    }
}

fn apply_env_config<F>(config: &mut WatchConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("FLOWWATCH_API_URL").filter(|v| !v.trim().is_empty()) {
        config.api_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(token) = env("FLOWWATCH_TOKEN").filter(|v| !v.trim().is_empty()) {
        config.token = Some(token);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env("FLOWWATCH_RETRY_DELAY_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
        config.retry_delay = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env("FLOWWATCH_DEADLINE_SECS").and_then(|v| v.trim().parse::<u64>().ok()) {
        config.deadline = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(n) = env("FLOWWATCH_MAX_ATTEMPTS").and_then(|v| v.trim().parse::<u32>().ok()) {
        config.max_attempts = n;
        config.source = ConfigSource::Env;
    }
    if let Some(raw) = env("FLOWWATCH_DISPATCH") {
        match raw.parse::<DispatchMode>() {
            Ok(dispatch) => {
                config.dispatch = dispatch;
                config.source = ConfigSource::Env;
            }
            Err(err) => tracing::warn!(error = %err, "ignoring FLOWWATCH_DISPATCH"),
        }
    }
    // Any value, even empty, disables color (no-color.org)
    if env("NO_COLOR").is_some() {
        config.color = false;
        config.source = ConfigSource::Env;
    }
}
