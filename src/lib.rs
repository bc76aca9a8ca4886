//! Uberenv - bootstrap a project's third-party libraries with Spack or vcpkg
//!
//! This crate provides the core library functionality for uberenv:
//! project settings, the package manager backends and the run that drives
//! them to a published host-config.

pub mod core;
pub mod manager;
pub mod ops;
pub mod util;

/// Test utilities and mocks for uberenv unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scripted process executor and on-disk
/// project fixtures.
#[cfg(test)]
pub mod test_support;

pub use core::{BuildMode, ProjectSettings, Specification, UberenvError, WorkflowOptions};
pub use manager::{ManagerKind, PackageManager};
