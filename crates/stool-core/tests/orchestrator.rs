//! Selection and multi-stage execution.

mod support;

use stool_core::console::Console;
use stool_core::locking::{LockManager, Mode, Owner};
use stool_core::orchestrator::{FailPolicy, Invocation, Orchestrator, RunError};
use stool_core::select::{Selection, SelectionArgs, SelectionError, Selector};
use stool_core::stage::{StageState, StageStore};
use tempfile::TempDir;

use support::{manager, save_stage};

struct Fixture {
    temp: TempDir,
    store: StageStore,
    locks: LockManager,
    invocation: Invocation,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let store = StageStore::new(temp.path().join("stages"));
    save_stage(&store, "a", "alice");
    save_stage(&store, "b", "bob");
    let locks = manager(&temp.path().join("locks.json"), Owner::current("stool test"));
    Fixture {
        temp,
        store,
        locks,
        invocation: Invocation::with_user("stool test", "alice"),
    }
}

fn names(list: &[&str]) -> Selection {
    Selection::Names(list.iter().map(|s| s.to_string()).collect())
}

impl Fixture {
    fn run(
        &self,
        policy: FailPolicy,
        selection: Selection,
        console: &Console,
    ) -> (Result<Vec<String>, RunError>, Vec<String>) {
        let selected = Selector::new().select(&self.store, &selection).unwrap();
        let mut visited = Vec::new();
        let result = Orchestrator::new(&self.locks, &self.store, console, &self.invocation)
            .with_policy(policy)
            .run(selected, |stage, _| {
                visited.push(stage.name.clone());
                Ok(())
            })
            .map(|report| report.processed);
        (result, visited)
    }
}

#[test]
fn fail_before_touches_nothing() {
    let f = fixture();
    let (console, _) = Console::buffered();

    let (result, visited) = f.run(FailPolicy::Before, names(&["a", "missing", "b"]), &console);

    match result {
        Err(RunError::Enumeration(failures)) => assert_eq!(failures.names(), vec!["missing"]),
        other => panic!("expected enumeration failure, got {other:?}"),
    }
    assert!(visited.is_empty());
}

#[test]
fn fail_never_warns_after_running_all() {
    let f = fixture();
    let (console, captured) = Console::buffered();

    let (result, visited) = f.run(FailPolicy::Never, names(&["a", "missing", "b"]), &console);

    assert_eq!(result.unwrap(), vec!["a", "b"]);
    assert_eq!(visited, vec!["a", "b"]);
    assert!(
        captured
            .contents()
            .contains("WARNING: missing: no such stage")
    );
}

#[test]
fn fail_after_runs_all_then_raises() {
    let f = fixture();
    let (console, _) = Console::buffered();

    let (result, visited) = f.run(FailPolicy::After, names(&["a", "missing", "b"]), &console);

    assert!(matches!(result, Err(RunError::Enumeration(_))));
    assert_eq!(visited, vec!["a", "b"]);
}

#[test]
fn names_keep_order_and_run_once() {
    let f = fixture();
    let (console, _) = Console::buffered();

    let (result, _) = f.run(FailPolicy::Before, names(&["b", "a", "b"]), &console);

    assert_eq!(result.unwrap(), vec!["b", "a"]);
}

#[test]
fn filters_by_owner_and_state() {
    let f = fixture();
    let mut b = f.store.load("b").unwrap();
    b.state = StageState::Up;
    f.store.save(&b).unwrap();
    let selector = Selector::new();

    let by_owner = selector
        .select(&f.store, &Selection::Owner("alice".to_string()))
        .unwrap();
    let by_state = selector
        .select(&f.store, &Selection::State(StageState::Up))
        .unwrap();
    let all = selector.select(&f.store, &Selection::All).unwrap();

    assert_eq!(by_owner.names(), vec!["a"]);
    assert_eq!(by_state.names(), vec!["b"]);
    assert_eq!(all.names(), vec!["a", "b"]);
}

#[test]
fn two_criteria_are_a_usage_error() {
    let args = SelectionArgs {
        names: vec!["a".to_string()],
        all: true,
        ..Default::default()
    };

    assert_eq!(args.to_selection(), Err(SelectionError::TooMany));
}

#[test]
fn stage_error_stops_run_and_releases_lock() {
    let f = fixture();
    let (console, captured) = Console::buffered();
    let selected = Selector::new().select(&f.store, &Selection::All).unwrap();
    let mut visited = Vec::new();

    let result = Orchestrator::new(&f.locks, &f.store, &console, &f.invocation).run(
        selected,
        |stage, _| {
            visited.push(stage.name.clone());
            anyhow::bail!("boom")
        },
    );

    match result {
        Err(RunError::Stage { stage, source }) => {
            assert_eq!(stage, "a");
            assert_eq!(source.to_string(), "boom");
        }
        other => panic!("expected stage failure, got {other:?}"),
    }
    assert_eq!(visited, vec!["a"]);
    assert!(captured.contents().contains("a: boom"));
    assert!(f.locks.is_idle().unwrap());
}

#[test]
fn stage_error_survives_a_failed_lock_release() {
    let f = fixture();
    let (console, captured) = Console::buffered();
    let selected = Selector::new().select(&f.store, &names(&["a"])).unwrap();
    let lock_file = f.temp.path().join("locks.json");

    let result = Orchestrator::new(&f.locks, &f.store, &console, &f.invocation).run(
        selected,
        |_, _| {
            std::fs::write(&lock_file, "{ not json").unwrap();
            anyhow::bail!("boom")
        },
    );

    match result {
        Err(RunError::Stage { stage, source }) => {
            assert_eq!(stage, "a");
            assert_eq!(source.to_string(), "boom");
        }
        other => panic!("expected stage failure, got {other:?}"),
    }
    let output = captured.contents();
    assert!(output.contains("a: boom"), "{output}");
    assert!(output.contains("failed to parse lock table"), "{output}");
}

#[test]
fn operation_runs_under_stage_lock() {
    let f = fixture();
    let console = Console::null();
    let selected = Selector::new().select(&f.store, &names(&["a"])).unwrap();

    Orchestrator::new(&f.locks, &f.store, &console, &f.invocation)
        .with_mode(Mode::Exclusive)
        .run(selected, |stage, _| {
            assert!(f.locks.has_exclusive(&[stage.lock_name()])?);
            Ok(())
        })
        .unwrap();

    assert!(f.locks.empty("a").unwrap());
}

#[test]
fn output_is_prefixed_when_several_stages_run() {
    let f = fixture();
    let (console, captured) = Console::buffered();
    let selected = Selector::new().select(&f.store, &Selection::All).unwrap();

    Orchestrator::new(&f.locks, &f.store, &console, &f.invocation)
        .run(selected, |stage, console| {
            console.info(format!("hello from {}", stage.name));
            Ok(())
        })
        .unwrap();

    // width = longest name (1) + 5
    assert_eq!(
        captured.contents(),
        "  {a} hello from a\n  {b} hello from b\n"
    );
}

#[test]
fn single_stage_output_is_not_prefixed() {
    let f = fixture();
    let (console, captured) = Console::buffered();
    let selected = Selector::new().select(&f.store, &names(&["a"])).unwrap();

    Orchestrator::new(&f.locks, &f.store, &console, &f.invocation)
        .run(selected, |_, console| {
            console.info("plain");
            Ok(())
        })
        .unwrap();

    assert_eq!(captured.contents(), "plain\n");
}

#[test]
fn stage_removed_after_selection_is_an_enumeration_failure() {
    let f = fixture();
    let (console, _) = Console::buffered();
    let selected = Selector::new().select(&f.store, &Selection::All).unwrap();
    f.store.remove("b").unwrap();

    let result = Orchestrator::new(&f.locks, &f.store, &console, &f.invocation)
        .with_policy(FailPolicy::Never)
        .run(selected, |_, _| Ok(()))
        .unwrap();

    assert_eq!(result.processed, vec!["a"]);
    assert_eq!(result.warnings.names(), vec!["b"]);
}
