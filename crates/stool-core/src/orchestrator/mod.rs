//! Multi-stage command execution.
//!
//! Runs a per-stage operation over a resolved selection, one stage at a
//! time, under that stage's lock, and applies the fail policy to stages the
//! selection could not resolve.

mod invocation;

pub use invocation::Invocation;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::console::Console;
use crate::locking::{LockError, LockManager, Mode};
use crate::select::{EnumerationFailures, Selected, SelectionError};
use crate::stage::{Stage, StageStore, StoreError};

/// What to do with stages that could not be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailPolicy {
    /// Abort before any stage is touched.
    #[default]
    Before,
    /// Run every resolvable stage, then fail.
    After,
    /// Run every resolvable stage and only warn.
    Never,
}

impl fmt::Display for FailPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailPolicy::Before => f.write_str("before"),
            FailPolicy::After => f.write_str("after"),
            FailPolicy::Never => f.write_str("never"),
        }
    }
}

impl FromStr for FailPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "before" => Ok(FailPolicy::Before),
            "after" => Ok(FailPolicy::After),
            "never" => Ok(FailPolicy::Never),
            other => Err(format!(
                "Invalid fail policy: '{other}'. Use 'before', 'after' or 'never'"
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Usage(#[from] SelectionError),

    #[error("{0}")]
    Enumeration(EnumerationFailures),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("stage '{stage}' failed")]
    Stage {
        stage: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Stages the operation completed on, in order.
    pub processed: Vec<String>,
    /// Enumeration failures tolerated under [`FailPolicy::Never`].
    pub warnings: EnumerationFailures,
}

pub struct Orchestrator<'a> {
    locks: &'a LockManager,
    store: &'a StageStore,
    console: &'a Console,
    invocation: &'a Invocation,
    policy: FailPolicy,
    mode: Mode,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        locks: &'a LockManager,
        store: &'a StageStore,
        console: &'a Console,
        invocation: &'a Invocation,
    ) -> Self {
        Self {
            locks,
            store,
            console,
            invocation,
            policy: FailPolicy::default(),
            mode: Mode::Exclusive,
        }
    }

    pub fn with_policy(mut self, policy: FailPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Lock mode taken on every stage; exclusive unless the operation only reads.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Run `op` on every stage of `selected`.
    ///
    /// The first failing stage stops the run: its error is printed as
    /// `<stage>: <error>` and returned, even when releasing the stage lock
    /// fails afterwards. The stage lock is released on every path.
    pub fn run<F>(&self, selected: Selected, mut op: F) -> Result<RunReport, RunError>
    where
        F: FnMut(&Stage, &Console) -> anyhow::Result<()>,
    {
        let Selected {
            stages,
            mut failures,
        } = selected;
        if !failures.is_empty() && self.policy == FailPolicy::Before {
            return Err(RunError::Enumeration(failures));
        }

        let width = stages.iter().map(|s| s.name.len()).max().unwrap_or(0) + 5;
        let with_prefix = stages.len() != 1;
        let mut report = RunReport::default();

        for stage in &stages {
            let span = tracing::info_span!(
                "stage",
                stage = %stage.name,
                invocation = %self.invocation.id,
                command = %self.invocation.command,
            );
            let _entered = span.enter();

            let lock = self
                .locks
                .acquire(stage.lock_name(), self.mode, self.console)?;
            // the record may have changed, or vanished, while we waited
            let Some(current) = self.store.load_opt(&stage.name)? else {
                failures.add(&stage.name, "removed concurrently");
                lock.release()?;
                continue;
            };

            let result = {
                let _prefix = with_prefix.then(|| {
                    self.console
                        .scoped_prefix(format!("{:>width$}", format!("{{{}}} ", stage.name)))
                });
                tracing::debug!("running stage operation");
                op(&current, self.console)
            };
            let released = lock.release();

            if let Err(source) = result {
                self.console.error(format!("{}: {source:#}", stage.name));
                if let Err(err) = released {
                    tracing::error!(error = %err, "failed to release stage lock");
                    self.console.error(format!("{}: {err}", stage.name));
                }
                return Err(RunError::Stage {
                    stage: stage.name.clone(),
                    source,
                });
            }
            released?;
            report.processed.push(stage.name.clone());
        }

        if failures.is_empty() {
            return Ok(report);
        }
        match self.policy {
            // failures found only during the run cannot abort up front
            FailPolicy::Before | FailPolicy::After => Err(RunError::Enumeration(failures)),
            FailPolicy::Never => {
                self.console.info(format!("WARNING: {failures}"));
                report.warnings = failures;
                Ok(report)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fail_policy() {
        assert_eq!("AFTER".parse::<FailPolicy>(), Ok(FailPolicy::After));
        assert_eq!(FailPolicy::default(), FailPolicy::Before);
        assert!("normal".parse::<FailPolicy>().is_err());
    }
}
