//! Resolution of a command's working set of stages.

use std::collections::HashSet;
use std::fmt;

use crate::stage::{Stage, StageState, StageStore, StoreError};

/// Exactly one selection criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Explicit names, in operator order.
    Names(Vec<String>),
    All,
    Owner(String),
    State(StageState),
}

/// Raw selection flags as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct SelectionArgs {
    pub names: Vec<String>,
    pub all: bool,
    pub owner: Option<String>,
    pub state: Option<StageState>,
}

impl SelectionArgs {
    /// Number of criteria that were given.
    pub fn count(&self) -> usize {
        usize::from(!self.names.is_empty())
            + usize::from(self.all)
            + usize::from(self.owner.is_some())
            + usize::from(self.state.is_some())
    }

    /// The single criterion, or a usage error when zero or several are set.
    pub fn to_selection(&self) -> Result<Selection, SelectionError> {
        match self.count() {
            0 => Err(SelectionError::Missing),
            1 => Ok(if self.all {
                Selection::All
            } else if let Some(owner) = &self.owner {
                Selection::Owner(owner.clone())
            } else if let Some(state) = self.state {
                Selection::State(state)
            } else {
                Selection::Names(self.names.clone())
            }),
            _ => Err(SelectionError::TooMany),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("too many select options")]
    TooMany,

    #[error("no stage selected - run 'stool select <name>' or pass --stage")]
    Missing,

    #[error("empty stage name list")]
    EmptyNames,
}

/// One criterion that failed to resolve to a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationFailure {
    /// Stage name (or directory) concerned.
    pub name: String,
    pub reason: String,
}

/// Failures collected while resolving a selection; never aborts resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerationFailures {
    failures: Vec<EnumerationFailure>,
}

impl EnumerationFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(EnumerationFailure {
            name: name.into(),
            reason: reason.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnumerationFailure> {
        self.failures.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.name.as_str()).collect()
    }
}

impl fmt::Display for EnumerationFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, failure) in self.failures.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}: {}", failure.name, failure.reason)?;
        }
        Ok(())
    }
}

/// Resolved working set plus what could not be resolved.
#[derive(Debug, Clone, Default)]
pub struct Selected {
    pub stages: Vec<Stage>,
    pub failures: EnumerationFailures,
}

impl Selected {
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Resolves [`Selection`]s against a [`StageStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Selector;

impl Selector {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `selection`.
    ///
    /// Names keep their order and duplicates are kept once; unknown or
    /// unreadable stages become enumeration failures. Only errors listing
    /// the store itself are returned as `Err`.
    pub fn select(
        &self,
        store: &StageStore,
        selection: &Selection,
    ) -> Result<Selected, SelectError> {
        let mut selected = Selected::default();
        match selection {
            Selection::Names(names) => {
                if names.iter().all(|n| n.trim().is_empty()) {
                    return Err(SelectError::Usage(SelectionError::EmptyNames));
                }
                let mut seen = HashSet::new();
                for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
                    if !seen.insert(name.to_string()) {
                        continue;
                    }
                    match store.load(name) {
                        Ok(stage) => selected.stages.push(stage),
                        Err(StoreError::NotFound { .. }) => {
                            selected.failures.add(name, "no such stage")
                        }
                        Err(err) => selected.failures.add(name, err.to_string()),
                    }
                }
            }
            Selection::All | Selection::Owner(_) | Selection::State(_) => {
                for name in store.names()? {
                    match store.load(&name) {
                        Ok(stage) if matches(selection, &stage) => selected.stages.push(stage),
                        Ok(_) => {}
                        Err(err) => selected.failures.add(&name, err.to_string()),
                    }
                }
            }
        }
        tracing::debug!(
            stages = ?selected.names(),
            failures = selected.failures.len(),
            "resolved selection"
        );
        Ok(selected)
    }
}

fn matches(selection: &Selection, stage: &Stage) -> bool {
    match selection {
        Selection::All => true,
        Selection::Owner(owner) => &stage.owner == owner,
        Selection::State(state) => &stage.state == state,
        Selection::Names(names) => names.iter().any(|n| n == &stage.name),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error(transparent)]
    Usage(#[from] SelectionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
