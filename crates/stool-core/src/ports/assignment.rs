use serde::{Deserialize, Serialize};

/// Label of the control/debug pair every stage gets.
pub const CONTROL_LABEL: &str = "control";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEntry {
    pub label: String,
    /// Even port; `port + 1` is reserved with it.
    pub port: u16,
}

/// A stage's durable, ordered label to port mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortAssignment {
    entries: Vec<PortEntry>,
}

impl PortAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, label: &str) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.port)
    }

    /// Both ports of the pair reserved for `label`.
    pub fn pair(&self, label: &str) -> Option<(u16, u16)> {
        self.get(label).map(|even| (even, even.saturating_add(1)))
    }

    /// Set or replace the port of `label`, keeping its position.
    pub fn set(&mut self, label: impl Into<String>, port: u16) {
        let label = label.into();
        match self.entries.iter_mut().find(|e| e.label == label) {
            Some(entry) => entry.port = port,
            None => self.entries.push(PortEntry { label, port }),
        }
    }

    pub fn remove(&mut self, label: &str) -> Option<u16> {
        let idx = self.entries.iter().position(|e| e.label == label)?;
        Some(self.entries.remove(idx).port)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortEntry> {
        self.entries.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<'a> IntoIterator for &'a PortAssignment {
    type Item = &'a PortEntry;
    type IntoIter = std::slice::Iter<'a, PortEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
