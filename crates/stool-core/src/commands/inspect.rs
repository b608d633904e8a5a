//! Read-only commands and lock maintenance.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::StageService;
use crate::locking::{INSTALL_RESOURCE, LockError, Mode, Owner, PORTS_RESOURCE};
use crate::orchestrator::{FailPolicy, RunError};
use crate::ports::{Pool, PortAssignment};
use crate::select::{EnumerationFailures, SelectionArgs};
use crate::stage::StageState;

#[derive(Debug, Clone, Serialize)]
pub struct StageStatus {
    pub name: String,
    pub owner: String,
    pub state: StageState,
    pub apps: Vec<String>,
    pub ports: PortAssignment,
    pub updated_at: DateTime<Utc>,
    /// Lock holders other than this invocation, as `mode owner`.
    pub locked_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub stage: String,
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortUsage {
    pub port: u16,
    pub stage: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortsReport {
    pub used: Vec<PortUsage>,
    /// Even port the next allocation would take, if any is left
    pub next_free: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LockEntry {
    pub resource: String,
    pub mode: Mode,
    pub owner: String,
    pub operation: String,
    pub depth: u32,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocksReport {
    pub locks: Vec<LockEntry>,
    /// Owners on this host whose process is gone
    pub stale: Vec<String>,
    /// Whether stale holds were dropped
    pub repaired: bool,
}

impl StageService {
    /// Status of every selected stage, read under a shared lock.
    pub fn status(
        &self,
        args: &SelectionArgs,
        policy: Option<FailPolicy>,
    ) -> Result<(Vec<StageStatus>, EnumerationFailures), RunError> {
        let selected = self.resolve(args)?;
        let mut result = Vec::new();
        let report = self
            .orchestrator(policy, Mode::Shared)
            .run(selected, |stage, _| {
                let locked_by = match self.locks.holders(&stage.name)? {
                    Some(record) => record
                        .holders()
                        .filter(|(_, h)| !h.owner.is(self.locks.owner()))
                        .map(|(mode, h)| format!("{mode} {}", h.owner))
                        .collect(),
                    None => Vec::new(),
                };
                result.push(StageStatus {
                    name: stage.name.clone(),
                    owner: stage.owner.clone(),
                    state: stage.state,
                    apps: stage.apps.clone(),
                    ports: stage.ports.clone(),
                    updated_at: stage.updated_at,
                    locked_by,
                });
                Ok(())
            })?;
        Ok((result, report.warnings))
    }

    /// Ask the engine about every selected stage.
    pub fn validate(
        &self,
        args: &SelectionArgs,
        policy: Option<FailPolicy>,
    ) -> Result<Vec<ValidationReport>, RunError> {
        let selected = self.resolve(args)?;
        let mut result = Vec::new();
        self.orchestrator(policy, Mode::Shared)
            .run(selected, |stage, console| {
                let problems = self.engine.validate(stage)?;
                if problems.is_empty() {
                    console.info("ok");
                }
                for problem in &problems {
                    console.info(format!("problem: {problem}"));
                }
                result.push(ValidationReport {
                    stage: stage.name.clone(),
                    problems,
                });
                Ok(())
            })?;
        Ok(result)
    }

    /// Every reserved even port of the installation, in port order.
    pub fn ports(&self) -> anyhow::Result<PortsReport> {
        let guard = self
            .locks
            .acquire(PORTS_RESOURCE, Mode::Shared, &self.console)?;
        let range = self.config.ports.range()?;
        let pool = Pool::load(range, &self.store)?;
        let used = pool
            .used()
            .into_iter()
            .filter(|port| port % 2 == 0)
            .filter_map(|port| {
                pool.owner_of(port).map(|(stage, label)| PortUsage {
                    port,
                    stage: stage.to_string(),
                    label: label.to_string(),
                })
            })
            .collect();
        let next_free = pool.temp().ok();
        guard.release()?;
        Ok(PortsReport { used, next_free })
    }

    /// List held locks and stale owners; drop stale holds when `repair` is set.
    pub fn locks_report(&self, repair: bool) -> anyhow::Result<LocksReport> {
        let guard = if repair {
            Some(
                self.locks
                    .acquire(INSTALL_RESOURCE, Mode::Exclusive, &self.console)?,
            )
        } else {
            None
        };
        let stale: Vec<Owner> = self.locks.validate(repair)?;
        for owner in &stale {
            let verb = if repair { "released" } else { "stale" };
            self.console.info(format!("{verb}: {owner}"));
        }
        let table = self.locks.store().read()?;
        let mut locks = Vec::new();
        for (resource, record) in &table.locks {
            for (mode, holder) in record.holders() {
                // our own maintenance lock is not interesting
                if resource == INSTALL_RESOURCE && holder.owner.is(self.locks.owner()) {
                    continue;
                }
                locks.push(LockEntry {
                    resource: resource.clone(),
                    mode,
                    owner: holder.owner.to_string(),
                    operation: holder.owner.operation.clone(),
                    depth: holder.depth,
                    since: holder.since,
                });
            }
        }
        if let Some(guard) = guard {
            guard.release()?;
        }
        Ok(LocksReport {
            locks,
            stale: stale.iter().map(ToString::to_string).collect(),
            repaired: repair,
        })
    }

    /// True iff nobody holds a lock in this installation.
    pub fn is_idle(&self) -> Result<bool, LockError> {
        self.locks.is_idle()
    }
}
