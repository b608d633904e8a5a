//! Cross-process advisory locking.
//!
//! Locks are taken on named resources (a stage name, or a reserved
//! installation-wide name starting with `@`). All processes sharing one
//! installation directory see the same lock table through [`LockStore`].

pub mod error;
pub mod manager;
pub mod mode;
pub mod owner;
pub mod record;
pub mod store;

pub use error::LockError;
pub use manager::{Lock, LockManager, LockOptions};
pub use mode::Mode;
pub use owner::Owner;
pub use record::{Holder, LockRecord, LockTable};
pub use store::LockStore;

/// Resource guarding port allocation across all stages.
pub const PORTS_RESOURCE: &str = "@ports";

/// Resource guarding installation-wide maintenance.
pub const INSTALL_RESOURCE: &str = "@install";
