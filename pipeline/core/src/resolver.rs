//! Agent Identity Resolver
//!
//! Maps whatever agent reference an event carries to a display name and a
//! color. Pure: the result depends only on the directory and the event data,
//! and the directory is never modified.
//!
//! Resolution order, first match wins:
//!
//! 1. `agent_name`
//! 2. `step_agent_name`
//! 3. an identifier field (see [`ID_FIELDS`]): exact directory match by id
//!    or name, then substring match, then a short placeholder for 24-hex
//!    surrogate ids, then the raw identifier
//! 4. a generic placeholder in the system color

use serde::Serialize;

use crate::directory::{AgentDirectory, AgentDirectoryEntry};
use crate::events::EventData;

/// Color when the directory has none for a named agent
pub const DEFAULT_AGENT_COLOR: &str = "cyan";

/// Color for the generic placeholder
pub const SYSTEM_COLOR: &str = "gray";

/// Name used when nothing identifies the agent
pub const PLACEHOLDER_NAME: &str = "Agent";

/// Direct display-name field
pub const NAME_FIELD: &str = "agent_name";

/// Step-level display-name field
pub const STEP_NAME_FIELD: &str = "step_agent_name";

/// Identifier fields, in priority order
pub const ID_FIELDS: &[&str] = &[
    "agent_id",
    "step_agent_id",
    "assigned_agent_id",
    "external_id",
    "agent",
];

/// Length of a surrogate object id
const SURROGATE_ID_LEN: usize = 24;

/// Hex digits kept in the shortened placeholder
const SHORT_ID_LEN: usize = 8;

/// Resolved display identity
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct AgentIdentity {
    /// Display name
    pub name: String,
    /// Color name or `#rrggbb`
    pub color: String,
}

impl AgentIdentity {
    fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }

    fn from_entry(entry: &AgentDirectoryEntry) -> Self {
        Self::new(entry.name.clone(), color_of(entry))
    }

    /// The generic placeholder identity
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_NAME, SYSTEM_COLOR)
    }

    /// Whether this is the generic placeholder
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.name == PLACEHOLDER_NAME && self.color == SYSTEM_COLOR
    }
}

/// Whether the data carries any agent reference at all
#[must_use]
pub fn has_agent_reference(data: &EventData) -> bool {
    data.str(NAME_FIELD).is_some()
        || data.str(STEP_NAME_FIELD).is_some()
        || ID_FIELDS.iter().any(|field| data.text(field).is_some())
}

/// Resolve the agent an event refers to
#[must_use]
pub fn resolve(directory: &AgentDirectory, data: &EventData) -> AgentIdentity {
    for field in [NAME_FIELD, STEP_NAME_FIELD] {
        if let Some(name) = data.str(field) {
            return resolve_name(directory, name.trim());
        }
    }

    for field in ID_FIELDS {
        if let Some(ident) = data.text(field) {
            return resolve_id(directory, ident.trim());
        }
    }

    AgentIdentity::placeholder()
}

/// Display-name reference: keep the name, borrow the color if known
fn resolve_name(directory: &AgentDirectory, name: &str) -> AgentIdentity {
    let color = directory
        .by_name(name)
        .map(color_of)
        .unwrap_or(DEFAULT_AGENT_COLOR);
    AgentIdentity::new(name, color)
}

/// Identifier reference
fn resolve_id(directory: &AgentDirectory, ident: &str) -> AgentIdentity {
    if let Some(entry) = directory.find_exact(ident) {
        return AgentIdentity::from_entry(entry);
    }
    if let Some(entry) = directory.find_partial(ident) {
        return AgentIdentity::from_entry(entry);
    }
    if is_surrogate_id(ident) {
        return AgentIdentity::new(
            format!("Agent-{}", &ident[..SHORT_ID_LEN]),
            DEFAULT_AGENT_COLOR,
        );
    }
    AgentIdentity::new(ident, DEFAULT_AGENT_COLOR)
}

/// 24 hex characters, as opaque server-side object ids are
#[must_use]
pub fn is_surrogate_id(ident: &str) -> bool {
    ident.len() == SURROGATE_ID_LEN && ident.bytes().all(|b| b.is_ascii_hexdigit())
}

fn color_of(entry: &AgentDirectoryEntry) -> &str {
    entry
        .color
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(DEFAULT_AGENT_COLOR)
}
