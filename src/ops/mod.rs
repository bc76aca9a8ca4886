//! High-level operations.
//!
//! This module contains the implementation of the uberenv run.

pub mod workflow;

pub use workflow::{execute, run, run_on};
