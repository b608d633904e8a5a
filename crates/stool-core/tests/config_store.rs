use stool_core::config::{ConfigStore, StoolConfig};
use stool_core::context::AppContext;
use stool_core::orchestrator::FailPolicy;
use tempfile::TempDir;

#[test]
fn missing_config_yields_defaults() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("stool.toml"));

    let config = store.load().unwrap();

    assert_eq!(config, StoolConfig::new());
    assert_eq!(config.ports.range().unwrap().first(), 9000);
}

#[test]
fn save_then_load_preserves_values() {
    let temp = TempDir::new().unwrap();
    let ctx = AppContext::new(temp.path().join("home"));
    let store = ctx.config_store();
    let mut config = StoolConfig::new();
    config.ports.first = 8000;
    config.ports.last = 8199;
    config.locks.timeout_secs = 30;
    config.fail = FailPolicy::After;

    store.save(&config).unwrap();
    let loaded = store.load().unwrap();

    assert_eq!(loaded, config);
    assert_eq!(loaded.locks.options().timeout.as_secs(), 30);
    assert!(ctx.config_path().exists());
}

#[test]
fn invalid_config_names_the_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("stool.toml");
    std::fs::write(&path, "[ports]\nfirst = 9001\n").unwrap();

    let err = ConfigStore::new(path.clone()).load().unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("stool.toml"), "{message}");
    assert!(message.contains("first port must be even"), "{message}");
}

#[test]
fn save_rejects_invalid_config() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::new(temp.path().join("stool.toml"));
    let mut config = StoolConfig::new();
    config.locks.poll_interval_ms = 0;

    assert!(store.save(&config).is_err());
    assert!(!store.config_path().exists());
}

#[test]
fn context_lays_out_installation() {
    let temp = TempDir::new().unwrap();
    let ctx = AppContext::new(temp.path().to_path_buf());

    assert_eq!(ctx.lock_file(), temp.path().join("locks.json"));
    assert_eq!(ctx.stages_dir(), temp.path().join("stages"));
    assert_eq!(ctx.stage_store().dir(), temp.path().join("stages"));

    let explicit = AppContext::discover(Some(temp.path().join("x"))).unwrap();
    assert_eq!(explicit.home_dir(), temp.path().join("x"));
}
