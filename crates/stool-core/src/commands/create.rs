use std::collections::BTreeMap;

use anyhow::Context;

use super::StageService;
use crate::locking::Mode;
use crate::stage::{Stage, validate_name};

/// Options for `stool create`
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub name: String,
    /// Application vhosts, one port pair each
    pub apps: Vec<String>,
    /// Operator-requested ports by label
    pub pinned: BTreeMap<String, u16>,
    /// Make the new stage the selected one
    pub select: bool,
}

impl CreateOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            select: true,
            ..Default::default()
        }
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.apps.push(app.into());
        self
    }

    pub fn with_pinned(mut self, label: impl Into<String>, port: u16) -> Self {
        self.pinned.insert(label.into(), port);
        self
    }
}

impl StageService {
    /// Create a stage and allocate its ports.
    ///
    /// The new name is locked exclusively before the existence check, so two
    /// concurrent creates of one name cannot both succeed.
    pub fn create(&self, options: CreateOptions) -> anyhow::Result<Stage> {
        validate_name(&options.name)?;
        let guard = self
            .locks
            .acquire(&options.name, Mode::Exclusive, &self.console)?;
        if self.store.exists(&options.name) {
            anyhow::bail!("stage already exists: {}", options.name);
        }

        let mut stage = Stage::new(&options.name, &self.invocation.user, options.apps);
        stage.pinned = options.pinned;
        self.store.create(&stage)?;
        if let Err(err) = self.allocate_ports(&mut stage) {
            // leave no half-created stage holding nothing
            self.store
                .remove(&stage.name)
                .with_context(|| format!("Failed to clean up stage '{}'", stage.name))?;
            return Err(err.context(format!("Failed to create stage '{}'", stage.name)));
        }
        if options.select {
            self.store.select(&stage.name)?;
        }
        guard.release()?;

        tracing::info!(stage = %stage.name, owner = %stage.owner, "stage created");
        self.console.info(format!("created {}", stage.name));
        Ok(stage)
    }
}
