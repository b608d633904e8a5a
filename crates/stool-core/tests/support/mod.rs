#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stool_core::commands::StageService;
use stool_core::config::StoolConfig;
use stool_core::console::{Captured, Console};
use stool_core::context::AppContext;
use stool_core::locking::{LockManager, LockOptions, LockStore, Owner};
use stool_core::orchestrator::Invocation;
use stool_core::stage::{Stage, StageEngine, StageStore};

/// Options that keep blocked tests short.
pub fn fast_options() -> LockOptions {
    LockOptions {
        timeout: Duration::from_millis(400),
        poll_interval: Duration::from_millis(20),
        progress_interval: Duration::from_millis(100),
        reclaim_stale: true,
    }
}

pub fn manager(lock_file: &Path, owner: Owner) -> LockManager {
    LockManager::new(LockStore::new(lock_file.to_path_buf()), owner, fast_options())
}

/// An owner on a host that cannot be probed, so it is never considered stale.
pub fn remote_owner(pid: u32) -> Owner {
    Owner::new(pid, "other-host.test", "stool remote")
}

/// Pid of a process that has already exited.
pub fn dead_pid() -> u32 {
    let mut child = std::process::Command::new("true")
        .spawn()
        .expect("Failed to spawn child");
    let pid = child.id();
    child.wait().expect("Failed to wait for child");
    pid
}

pub fn save_stage(store: &StageStore, name: &str, owner: &str) -> Stage {
    let stage = Stage::new(name, owner, vec![]);
    store.create(&stage).expect("Failed to create stage");
    stage
}

/// Service over a fresh installation in `home` with a small port range.
pub fn service(
    home: &Path,
    first: u16,
    last: u16,
    engine: Option<Arc<dyn StageEngine>>,
) -> (StageService, Captured) {
    let ctx = AppContext::new(home.to_path_buf());
    let mut config = StoolConfig::new();
    config.ports.first = first;
    config.ports.last = last;
    config.ports.probe = false;
    let engine = engine.unwrap_or_else(|| Arc::new(ctx.local_engine()));
    let (console, captured) = Console::buffered();
    let locks = Arc::new(LockManager::new(
        ctx.lock_store(),
        Owner::current("stool test"),
        fast_options(),
    ));
    let service = StageService::new(
        ctx.stage_store(),
        locks,
        engine,
        config,
        console,
        Invocation::with_user("stool test", "alice"),
    );
    (service, captured)
}
