//! Shared utilities

pub mod fs;
pub mod platform;
pub mod process;

pub use platform::Platform;
pub use process::{Executor, ProcessBuilder, ShellExecutor};
