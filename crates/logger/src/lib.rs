//! Process-wide `tracing` setup shared by Uppe binaries.

mod tracing;

pub use self::tracing::{LogFormat, init, init_with, try_init};
