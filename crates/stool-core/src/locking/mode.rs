use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Coordination level requested for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// No coordination; never conflicts and never touches the store.
    None,
    /// Read-like; any number of owners may hold it together.
    Shared,
    /// Write-like; excludes every other owner.
    Exclusive,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::None => "none",
            Mode::Shared => "shared",
            Mode::Exclusive => "exclusive",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Mode::None),
            "shared" => Ok(Mode::Shared),
            "exclusive" => Ok(Mode::Exclusive),
            other => Err(format!(
                "Invalid lock mode: '{other}'. Use 'none', 'shared' or 'exclusive'"
            )),
        }
    }
}
