//! Filesystem primitives shared across features.

pub mod atomic;

pub use atomic::write_atomic;
