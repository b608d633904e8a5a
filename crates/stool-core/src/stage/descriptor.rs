//! Stage descriptor as seen by the locking and port core.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::ports::{CONTROL_LABEL, PortAssignment, PortRequest};

const MAX_NAME_LEN: usize = 63;

/// Lifecycle state recorded for a stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    #[default]
    Down,
    Up,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageState::Down => f.write_str("down"),
            StageState::Up => f.write_str("up"),
        }
    }
}

impl FromStr for StageState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "down" => Ok(StageState::Down),
            "up" => Ok(StageState::Up),
            other => Err(format!("Invalid stage state: '{other}'. Use 'down' or 'up'")),
        }
    }
}

/// One managed deployment, persisted as `stages/<name>/stage.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Unique name; also the lock resource of the stage.
    pub name: String,

    /// User who created the stage.
    pub owner: String,

    #[serde(default)]
    pub state: StageState,

    /// Published application vhosts; each gets an HTTP/HTTPS pair.
    #[serde(default)]
    pub apps: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Operator-requested ports by label.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pinned: BTreeMap<String, u16>,

    /// Current allocation; empty until first allocated.
    #[serde(default, skip_serializing_if = "PortAssignment::is_empty")]
    pub ports: PortAssignment,
}

impl Stage {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, apps: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            owner: owner.into(),
            state: StageState::Down,
            apps,
            created_at: now,
            updated_at: now,
            pinned: BTreeMap::new(),
            ports: PortAssignment::new(),
        }
    }

    /// Pin `label` to `port` on the next allocation.
    pub fn with_pinned(mut self, label: impl Into<String>, port: u16) -> Self {
        self.pinned.insert(label.into(), port);
        self
    }

    /// Resource name the stage is locked under.
    pub fn lock_name(&self) -> &str {
        &self.name
    }

    /// Labels this stage needs ports for: the control pair, then one per app.
    pub fn port_requests(&self) -> Vec<PortRequest> {
        std::iter::once(CONTROL_LABEL)
            .chain(self.apps.iter().map(String::as_str))
            .map(|label| match self.pinned.get(label) {
                Some(port) => PortRequest::fixed(label, *port),
                None => PortRequest::label(label),
            })
            .collect()
    }

    pub fn is_up(&self) -> bool {
        self.state == StageState::Up
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Stage names are lowercase identifiers, so they never collide with the
/// reserved `@` resources.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(invalid("name is empty"));
    };
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 63 characters"));
    }
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return Err(invalid("name must start with a lowercase letter or digit"));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
    {
        return Err(invalid(
            "only lowercase letters, digits, '.', '_' and '-' are allowed",
        ));
    }
    Ok(())
}
