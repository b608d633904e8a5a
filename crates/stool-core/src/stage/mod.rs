//! Stage descriptors, their persistence, and the lifecycle engine seam.

pub mod descriptor;
pub mod engine;
pub mod error;
pub mod store;

pub use descriptor::{Stage, StageState, validate_name};
pub use engine::{LocalEngine, StageEngine};
pub use error::StoreError;
pub use store::StageStore;
