//! Installation configuration (`stool.toml`).

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_stool_toml, parse_stool_toml_str, to_toml};
pub use schema::{CONFIG_VERSION, LocksConfig, PortsConfig, StoolConfig};
pub use store::ConfigStore;
