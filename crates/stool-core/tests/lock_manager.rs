//! Lock manager behaviour against a real lock file.

mod support;

use stool_core::console::Console;
use stool_core::locking::owner::local_host;
use stool_core::locking::{LockError, Mode, Owner};
use tempfile::TempDir;

use support::{dead_pid, manager, remote_owner};

const MODES: [Mode; 3] = [Mode::None, Mode::Shared, Mode::Exclusive];

/// Acquire `modes` recursively on one resource, then unwind.
fn acquire_nested(
    locks: &stool_core::locking::LockManager,
    resource: &str,
    modes: &[Mode],
    console: &Console,
) {
    let Some((first, rest)) = modes.split_first() else {
        return;
    };
    let lock = locks
        .acquire(resource, *first, console)
        .unwrap_or_else(|e| panic!("{first} after outer levels: {e}"));
    acquire_nested(locks, resource, rest, console);
    lock.release().unwrap();
}

#[test]
fn recursive_mode_grid_leaves_store_empty() {
    let temp = TempDir::new().unwrap();
    let locks = manager(&temp.path().join("locks.json"), Owner::current("grid"));
    let console = Console::null();

    for a in MODES {
        for b in MODES {
            for c in MODES {
                acquire_nested(&locks, "stage", &[a, b, c], &console);
                assert!(locks.empty("stage").unwrap(), "{a} {b} {c}");
            }
        }
    }
    assert!(locks.is_idle().unwrap());
}

#[test]
fn exclusive_blocks_other_owner_until_released() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("locks.json");
    let a = manager(&file, Owner::current("stool start"));
    let b = manager(&file, remote_owner(4242));

    let lock = a.acquire("first", Mode::Exclusive, &Console::null()).unwrap();

    assert!(b.acquire_opt("first", Mode::Exclusive).unwrap().is_none());
    assert!(b.acquire_opt("first", Mode::Shared).unwrap().is_none());

    lock.release().unwrap();

    let again = b.acquire_opt("first", Mode::Exclusive).unwrap();
    assert!(again.is_some());
    drop(again);
    assert!(a.empty("first").unwrap());
}

#[test]
fn shared_holders_are_compatible() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("locks.json");
    let a = manager(&file, Owner::current("stool status"));
    let b = manager(&file, remote_owner(4242));

    let shared_a = a.acquire_opt("stage", Mode::Shared).unwrap().unwrap();
    let shared_b = b.acquire_opt("stage", Mode::Shared).unwrap().unwrap();

    assert!(a.acquire_opt("stage", Mode::Exclusive).unwrap().is_none());
    assert!(!a.has_exclusive(&["stage"]).unwrap());

    let record = a.holders("stage").unwrap().unwrap();
    assert_eq!(record.shared.len(), 2);

    drop(shared_a);
    drop(shared_b);
    assert!(a.is_idle().unwrap());
}

#[test]
fn reentrant_levels_release_one_at_a_time() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("locks.json");
    let a = manager(&file, Owner::current("stool start"));
    let b = manager(&file, remote_owner(4242));
    let console = Console::null();

    let outer = a.acquire("stage", Mode::Exclusive, &console).unwrap();
    let inner = a.acquire("stage", Mode::Exclusive, &console).unwrap();
    assert_eq!(a.holders("stage").unwrap().unwrap().exclusive.unwrap().depth, 2);

    inner.release().unwrap();
    assert!(b.acquire_opt("stage", Mode::Shared).unwrap().is_none());

    outer.release().unwrap();
    assert!(b.acquire_opt("stage", Mode::Shared).unwrap().is_some());
}

#[test]
fn timeout_names_holder_and_reports_progress() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("locks.json");
    let holder = manager(&file, remote_owner(4242));
    let waiter = manager(&file, Owner::current("stool stop"));
    let (console, captured) = Console::buffered();

    let _held = holder.acquire("stage", Mode::Exclusive, &console).unwrap();
    let err = waiter
        .acquire("stage", Mode::Shared, &console)
        .unwrap_err();

    match err {
        LockError::Timeout {
            resource,
            mode,
            holder,
            operation,
            ..
        } => {
            assert_eq!(resource, "stage");
            assert_eq!(mode, Mode::Shared);
            assert_eq!(holder, "pid 4242@other-host.test");
            assert_eq!(operation, "stool remote");
        }
        other => panic!("expected timeout, got {other}"),
    }
    let output = captured.contents();
    assert!(
        output.contains("waiting for pid 4242@other-host.test running 'stool remote'"),
        "{output}"
    );
    assert!(!waiter.holders("stage").unwrap().unwrap().contains(waiter.owner()));
}

#[test]
fn dead_local_holder_is_reclaimed() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("locks.json");
    let dead = manager(&file, Owner::new(dead_pid(), local_host(), "stool crashed"));
    let live = manager(&file, Owner::current("stool start"));

    std::mem::forget(dead.acquire("stage", Mode::Exclusive, &Console::null()).unwrap());

    let lock = live.acquire_opt("stage", Mode::Exclusive).unwrap();

    assert!(lock.is_some());
}

#[test]
fn validate_lists_and_repairs_stale_owners() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("locks.json");
    let dead_owner = Owner::new(dead_pid(), local_host(), "stool crashed");
    let dead = manager(&file, dead_owner.clone());
    let live = manager(&file, Owner::current("stool locks"));

    std::mem::forget(dead.acquire("a", Mode::Shared, &Console::null()).unwrap());
    std::mem::forget(dead.acquire("b", Mode::Exclusive, &Console::null()).unwrap());

    assert_eq!(live.validate(false).unwrap(), vec![dead_owner.clone()]);
    assert!(!live.is_idle().unwrap());

    assert_eq!(live.validate(true).unwrap(), vec![dead_owner]);
    assert!(live.is_idle().unwrap());
}

#[test]
fn release_active_drops_forgotten_guards() {
    let temp = TempDir::new().unwrap();
    let locks = manager(&temp.path().join("locks.json"), Owner::current("stool start"));
    let console = Console::null();

    std::mem::forget(locks.acquire("a", Mode::Exclusive, &console).unwrap());
    std::mem::forget(locks.acquire("a", Mode::Shared, &console).unwrap());
    std::mem::forget(locks.acquire("@ports", Mode::Exclusive, &console).unwrap());

    assert_eq!(locks.release_active().unwrap(), 3);
    assert!(locks.is_idle().unwrap());
    assert_eq!(locks.release_active().unwrap(), 0);
}

#[test]
fn none_mode_never_touches_the_store() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("locks.json");
    let locks = manager(&file, Owner::current("stool status"));

    let lock = locks.acquire("stage", Mode::None, &Console::null()).unwrap();

    assert!(!file.exists());
    lock.release().unwrap();
}

#[test]
fn lock_table_is_readable_json() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("locks.json");
    let locks = manager(&file, Owner::current("stool start --stage a"));

    let _lock = locks.acquire("a", Mode::Exclusive, &Console::null()).unwrap();

    let content = std::fs::read_to_string(&file).unwrap();
    let json: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(
        json["locks"]["a"]["exclusive"]["owner"]["operation"],
        "stool start --stage a"
    );
    assert_eq!(json["locks"]["a"]["exclusive"]["depth"], 1);
}
