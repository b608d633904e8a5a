//! Lifecycle engine seam.
//!
//! The core does not know how a stage's workload is run. Commands call an
//! injected [`StageEngine`] while holding the stage lock.

use std::path::PathBuf;

use anyhow::Context;

use super::Stage;
use crate::console::Console;
use crate::fs::write_atomic;

const RUN_MARKER: &str = "running";

/// Starts, stops and checks the workload behind a stage.
pub trait StageEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Bring the workload up on the ports recorded in `stage`.
    fn start(&self, stage: &Stage, console: &Console) -> anyhow::Result<()>;

    fn stop(&self, stage: &Stage, console: &Console) -> anyhow::Result<()>;

    /// Problems found with the stage; empty when healthy.
    fn validate(&self, stage: &Stage) -> anyhow::Result<Vec<String>>;
}

/// Engine that records the running workload as a marker file in the stage
/// directory, listing the published port pairs.
#[derive(Debug, Clone)]
pub struct LocalEngine {
    stages_dir: PathBuf,
}

impl LocalEngine {
    pub fn new(stages_dir: impl Into<PathBuf>) -> Self {
        Self {
            stages_dir: stages_dir.into(),
        }
    }

    fn marker(&self, stage: &Stage) -> PathBuf {
        self.stages_dir.join(&stage.name).join(RUN_MARKER)
    }
}

impl StageEngine for LocalEngine {
    fn name(&self) -> &'static str {
        "local"
    }

    fn start(&self, stage: &Stage, console: &Console) -> anyhow::Result<()> {
        let mut content = String::new();
        for entry in &stage.ports {
            content.push_str(&format!(
                "{} {} {}\n",
                entry.label,
                entry.port,
                entry.port.saturating_add(1)
            ));
            console.info(format!(
                "{}: {}/{}",
                entry.label,
                entry.port,
                entry.port.saturating_add(1)
            ));
        }
        let marker = self.marker(stage);
        write_atomic(&marker, content.as_bytes())
            .with_context(|| format!("Failed to start stage '{}'", stage.name))?;
        tracing::info!(stage = %stage.name, "workload started");
        Ok(())
    }

    fn stop(&self, stage: &Stage, console: &Console) -> anyhow::Result<()> {
        let marker = self.marker(stage);
        match std::fs::remove_file(&marker) {
            Ok(()) => {
                tracing::info!(stage = %stage.name, "workload stopped");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                console.info("not running");
                Ok(())
            }
            Err(err) => Err(err)
                .with_context(|| format!("Failed to remove run marker: {}", marker.display())),
        }
    }

    fn validate(&self, stage: &Stage) -> anyhow::Result<Vec<String>> {
        let mut problems = Vec::new();
        let running = self.marker(stage).is_file();
        if stage.is_up() && !running {
            problems.push("stage is recorded up but its workload is not running".to_string());
        }
        if !stage.is_up() && running {
            problems.push("stage is recorded down but its workload is running".to_string());
        }
        for request in stage.port_requests() {
            if stage.ports.get(&request.label).is_none() && stage.is_up() {
                problems.push(format!("no port assigned for '{}'", request.label));
            }
        }
        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageState;

    #[test]
    fn start_then_stop_removes_marker() {
        let temp = tempfile::TempDir::new().unwrap();
        let engine = LocalEngine::new(temp.path());
        let mut stage = Stage::new("a", "alice", vec![]);
        stage.ports.set("control", 9000);
        let (console, captured) = Console::buffered();

        engine.start(&stage, &console).unwrap();
        assert!(temp.path().join("a").join(RUN_MARKER).is_file());
        assert!(captured.contents().contains("control: 9000/9001"));

        engine.stop(&stage, &console).unwrap();
        assert!(!temp.path().join("a").join(RUN_MARKER).exists());
    }

    #[test]
    fn validate_reports_state_mismatch() {
        let temp = tempfile::TempDir::new().unwrap();
        let engine = LocalEngine::new(temp.path());
        let mut stage = Stage::new("a", "alice", vec![]);
        stage.state = StageState::Up;

        let problems = engine.validate(&stage).unwrap();

        assert_eq!(problems.len(), 2);
    }
}
