//! start, stop, restart and remove.

use super::StageService;
use crate::console::Console;
use crate::locking::Mode;
use crate::orchestrator::{FailPolicy, RunError, RunReport};
use crate::select::SelectionArgs;
use crate::stage::{Stage, StageState};

impl StageService {
    /// Allocate ports and bring every selected stage up.
    pub fn start(
        &self,
        args: &SelectionArgs,
        policy: Option<FailPolicy>,
    ) -> Result<RunReport, RunError> {
        let selected = self.resolve(args)?;
        self.orchestrator(policy, Mode::Exclusive)
            .run(selected, |stage, console| self.start_one(stage, console))
    }

    pub fn stop(
        &self,
        args: &SelectionArgs,
        policy: Option<FailPolicy>,
    ) -> Result<RunReport, RunError> {
        let selected = self.resolve(args)?;
        self.orchestrator(policy, Mode::Exclusive)
            .run(selected, |stage, console| self.stop_one(stage, console).map(|_| ()))
    }

    /// Stop and start again; the stage keeps every port it had.
    pub fn restart(
        &self,
        args: &SelectionArgs,
        policy: Option<FailPolicy>,
    ) -> Result<RunReport, RunError> {
        let selected = self.resolve(args)?;
        self.orchestrator(policy, Mode::Exclusive)
            .run(selected, |stage, console| {
                let stopped = self.stop_one(stage, console)?;
                self.start_one(&stopped, console)
            })
    }

    /// Stop if needed and delete the stage record. Its ports become free.
    pub fn remove(
        &self,
        args: &SelectionArgs,
        policy: Option<FailPolicy>,
    ) -> Result<RunReport, RunError> {
        let selected = self.resolve(args)?;
        self.orchestrator(policy, Mode::Exclusive)
            .run(selected, |stage, console| {
                if stage.is_up() {
                    self.stop_one(stage, console)?;
                }
                self.store.remove(&stage.name)?;
                tracing::info!(stage = %stage.name, "stage removed");
                console.info(format!("removed {}", stage.name));
                Ok(())
            })
    }

    fn start_one(&self, stage: &Stage, console: &Console) -> anyhow::Result<()> {
        if stage.is_up() {
            anyhow::bail!("stage is already up");
        }
        let mut stage = stage.clone();
        self.allocate_ports(&mut stage)?;
        self.engine.start(&stage, console)?;
        stage.state = StageState::Up;
        stage.touch();
        self.store.save(&stage)?;
        console.info(format!("started {}", stage.name));
        Ok(())
    }

    fn stop_one(&self, stage: &Stage, console: &Console) -> anyhow::Result<Stage> {
        let mut stage = stage.clone();
        if !stage.is_up() {
            console.info(format!("{} is already down", stage.name));
            return Ok(stage);
        }
        self.engine.stop(&stage, console)?;
        stage.state = StageState::Down;
        stage.touch();
        self.store.save(&stage)?;
        console.info(format!("stopped {}", stage.name));
        Ok(stage)
    }
}
