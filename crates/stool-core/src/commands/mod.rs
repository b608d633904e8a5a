//! Stage commands built on the locking, port and orchestration core.
//!
//! [`StageService`] is what frontends call. Every mutation of a stage runs
//! under that stage's lock; every port allocation additionally runs under
//! the installation-wide `@ports` lock.

mod create;
mod inspect;
mod lifecycle;

pub use create::CreateOptions;
pub use inspect::{LockEntry, LocksReport, PortUsage, PortsReport, StageStatus, ValidationReport};

use std::sync::Arc;

use crate::config::StoolConfig;
use crate::console::Console;
use crate::locking::{LockManager, Mode, PORTS_RESOURCE};
use crate::orchestrator::{FailPolicy, Invocation, Orchestrator, RunError};
use crate::ports::Pool;
use crate::select::{SelectError, Selected, Selection, SelectionArgs, SelectionError, Selector};
use crate::stage::{Stage, StageEngine, StageStore};

pub struct StageService {
    store: StageStore,
    locks: Arc<LockManager>,
    engine: Arc<dyn StageEngine>,
    config: StoolConfig,
    console: Console,
    invocation: Invocation,
}

impl std::fmt::Debug for StageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageService")
            .field("store", &self.store)
            .field("engine", &self.engine.name())
            .field("invocation", &self.invocation)
            .finish_non_exhaustive()
    }
}

impl StageService {
    pub fn new(
        store: StageStore,
        locks: Arc<LockManager>,
        engine: Arc<dyn StageEngine>,
        config: StoolConfig,
        console: Console,
        invocation: Invocation,
    ) -> Self {
        Self {
            store,
            locks,
            engine,
            config,
            console,
            invocation,
        }
    }

    pub fn store(&self) -> &StageStore {
        &self.store
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn config(&self) -> &StoolConfig {
        &self.config
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Resolve the working set, falling back to the operator's selected
    /// stage when no criterion is given.
    pub fn resolve(&self, args: &SelectionArgs) -> Result<Selected, RunError> {
        let selection = if args.count() == 0 {
            match self.store.selected()? {
                Some(name) => Selection::Names(vec![name]),
                None => return Err(RunError::Usage(SelectionError::Missing)),
            }
        } else {
            args.to_selection()?
        };
        Selector::new()
            .select(&self.store, &selection)
            .map_err(|err| match err {
                SelectError::Usage(usage) => RunError::Usage(usage),
                SelectError::Store(store) => RunError::Store(store),
            })
    }

    /// Remember `name` as the default target of stage commands.
    pub fn select(&self, name: &str) -> anyhow::Result<()> {
        self.store.select(name)?;
        self.console.info(format!("selected {name}"));
        Ok(())
    }

    fn orchestrator(&self, policy: Option<FailPolicy>, mode: Mode) -> Orchestrator<'_> {
        Orchestrator::new(&self.locks, &self.store, &self.console, &self.invocation)
            .with_policy(policy.unwrap_or(self.config.fail))
            .with_mode(mode)
    }

    /// Refresh the port assignment of `stage` and persist it.
    ///
    /// Runs under `@ports` and rebuilds the pool from the records on disk
    /// after that lock is held.
    fn allocate_ports(&self, stage: &mut Stage) -> anyhow::Result<()> {
        let guard = self
            .locks
            .acquire(PORTS_RESOURCE, Mode::Exclusive, &self.console)?;
        let range = self.config.ports.range()?;
        let mut pool = Pool::load(range, &self.store)?.with_probe(self.config.ports.probe);
        let previous = stage.ports.clone();
        stage.ports = pool.assign(&stage.name, &stage.port_requests(), Some(&previous))?;
        if stage.ports != previous {
            stage.touch();
            tracing::info!(stage = %stage.name, ports = ?stage.ports, "ports assigned");
        }
        self.store.save(stage)?;
        guard.release()?;
        Ok(())
    }
}
