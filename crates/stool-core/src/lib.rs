//! Stool Core Library
//!
//! Provides the stage concurrency and resource-allocation core: a
//! cross-process lock manager, a port pool derived from the stages' own
//! records, and a multi-stage orchestrator with selectable fail policies.

pub mod commands;
pub mod config;
pub mod console;
pub mod context;
pub mod fs;
pub mod locking;
pub mod orchestrator;
pub mod ports;
pub mod select;
pub mod stage;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, StoolConfig};

    // Locking
    pub use crate::locking::{Lock, LockError, LockManager, LockOptions, Mode, Owner};

    // Ports
    pub use crate::ports::{Pool, PoolError, PortAssignment, PortRange};

    // Stages
    pub use crate::stage::{LocalEngine, Stage, StageEngine, StageState, StageStore};

    // Selection and orchestration
    pub use crate::orchestrator::{FailPolicy, Invocation, Orchestrator, RunError, RunReport};
    pub use crate::select::{Selection, SelectionArgs, Selector};

    // Output
    pub use crate::console::Console;
    pub use crate::context::AppContext;
}
