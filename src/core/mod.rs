//! Core data structures for uberenv.
//!
//! This module contains the types every step works with:
//! - Errors reported by the workflow
//! - Project settings and run options
//! - Build modes and package specifications

pub mod error;
pub mod options;
pub mod settings;
pub mod spec;

pub use error::UberenvError;
pub use options::WorkflowOptions;
pub use settings::{find_project_config, ProjectSettings};
pub use spec::{BuildMode, Specification};
