//! Filesystem primitives for durable state.

mod atomic;

pub use atomic::{atomic_write, atomic_write_file};
