//! Agent Directory
//!
//! Read-only lookup table of known agents, loaded once per session. Loading
//! is best-effort: any failure leaves an empty directory and display names
//! degrade to placeholders.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DirectoryError;

/// Timeout for the directory request
pub const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifiers shorter than this never match by substring
const MIN_PARTIAL_LEN: usize = 3;

/// One known agent
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDirectoryEntry {
    /// Display name
    pub name: String,
    /// Role or description
    pub role: Option<String>,
    /// Display color (name or `#rrggbb`)
    pub color: Option<String>,
    /// Surrogate id used by the server
    pub external_id: Option<String>,
}

impl AgentDirectoryEntry {
    /// Entry with just a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style color
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Builder-style external id
    #[must_use]
    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }
}

/// Lookup table keyed by name and by external id
#[derive(Clone, Debug, Default)]
pub struct AgentDirectory {
    entries: Vec<AgentDirectoryEntry>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
}

impl AgentDirectory {
    /// Build from entries (first entry wins on duplicate keys)
    pub fn new(entries: impl IntoIterator<Item = AgentDirectoryEntry>) -> Self {
        let entries: Vec<_> = entries
            .into_iter()
            .filter(|entry| !entry.name.trim().is_empty())
            .collect();

        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            by_name.entry(key(&entry.name)).or_insert(index);
            if let Some(id) = entry.external_id.as_deref().filter(|id| !id.trim().is_empty()) {
                by_id.entry(key(id)).or_insert(index);
            }
        }

        Self {
            entries,
            by_name,
            by_id,
        }
    }

    /// A directory with no entries
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in load order
    #[must_use]
    pub fn entries(&self) -> &[AgentDirectoryEntry] {
        &self.entries
    }

    /// Case-insensitive lookup by display name
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&AgentDirectoryEntry> {
        self.by_name.get(&key(name)).map(|&i| &self.entries[i])
    }

    /// Lookup by external id
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<&AgentDirectoryEntry> {
        self.by_id.get(&key(id)).map(|&i| &self.entries[i])
    }

    /// Exact match against external id, then name
    #[must_use]
    pub fn find_exact(&self, ident: &str) -> Option<&AgentDirectoryEntry> {
        self.by_id(ident).or_else(|| self.by_name(ident))
    }

    /// First entry whose id or name contains `ident`, or is contained in it
    #[must_use]
    pub fn find_partial(&self, ident: &str) -> Option<&AgentDirectoryEntry> {
        let needle = key(ident);
        if needle.chars().count() < MIN_PARTIAL_LEN {
            return None;
        }

        self.entries.iter().find(|entry| {
            std::iter::once(entry.name.as_str())
                .chain(entry.external_id.as_deref())
                .map(key)
                .filter(|candidate| candidate.chars().count() >= MIN_PARTIAL_LEN)
                .any(|candidate| candidate.contains(&needle) || needle.contains(&candidate))
        })
    }
}

fn key(text: &str) -> String {
    text.trim().to_lowercase()
}

// ============================================================================
// Loading
// ============================================================================

/// Entry as served; field names vary between server versions
#[derive(Debug, Deserialize)]
struct WireEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    external_id: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
}

impl WireEntry {
    fn into_entry(self) -> Option<AgentDirectoryEntry> {
        let name = self.name.filter(|n| !n.trim().is_empty())?;
        let external_id = self
            .external_id
            .as_ref()
            .and_then(id_text)
            .or_else(|| self.id.as_ref().and_then(id_text));
        Some(AgentDirectoryEntry {
            name,
            role: self.role.or(self.description).filter(|r| !r.trim().is_empty()),
            color: self.color.filter(|c| !c.trim().is_empty()),
            external_id,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireList {
    Bare(Vec<WireEntry>),
    Agents { agents: Vec<WireEntry> },
    Data { data: Vec<WireEntry> },
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a directory response body
///
/// Accepts a bare array or an object wrapping it in `agents` or `data`.
/// Entries without a name are skipped.
///
/// # Errors
///
/// Returns [`DirectoryError::Decode`] if the body is not an agent list.
pub fn parse_directory(body: &str) -> Result<AgentDirectory, DirectoryError> {
    let list: WireList =
        serde_json::from_str(body).map_err(|e| DirectoryError::Decode(e.to_string()))?;
    let wire = match list {
        WireList::Bare(entries) | WireList::Agents { agents: entries } | WireList::Data { data: entries } => {
            entries
        }
    };
    Ok(AgentDirectory::new(
        wire.into_iter().filter_map(WireEntry::into_entry),
    ))
}

/// Fetches the agent directory from the API
#[derive(Clone, Debug)]
pub struct DirectoryClient {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl DirectoryClient {
    /// Create a client for `url`
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Request`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, token: Option<String>) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(DIRECTORY_TIMEOUT)
            .build()
            .map_err(|e| DirectoryError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Fetch the directory
    ///
    /// # Errors
    ///
    /// Any request, status or decode failure.
    pub async fn fetch(&self) -> Result<AgentDirectory, DirectoryError> {
        let mut request = self.client.get(&self.url).header(ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;
        parse_directory(&body)
    }

    /// Fetch the directory, falling back to an empty one on any failure
    pub async fn fetch_or_empty(&self) -> AgentDirectory {
        match self.fetch().await {
            Ok(directory) => {
                tracing::debug!(agents = directory.len(), "loaded agent directory");
                directory
            }
            Err(err) => {
                tracing::warn!(error = %err, "agent directory unavailable, using placeholders");
                AgentDirectory::empty()
            }
        }
    }
}
