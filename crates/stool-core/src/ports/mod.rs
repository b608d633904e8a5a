//! Port allocation for stages.
//!
//! Every allocation is an even port `p` reserving the pair `p`/`p + 1`
//! (control/debug, or HTTP/HTTPS). The [`Pool`] keeps no ledger of its own:
//! availability is derived from the [`PortAssignment`] each stage recorded.

pub mod assignment;
pub mod error;
pub mod pool;
pub mod range;

pub use assignment::{CONTROL_LABEL, PortAssignment, PortEntry};
pub use error::PoolError;
pub use pool::{Pool, PortRequest};
pub use range::PortRange;
