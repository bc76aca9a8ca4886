//! Workflow error types.

use std::path::PathBuf;

use thiserror::Error;

/// A fatal condition detected by one of the workflow steps.
///
/// These abort the run. Non-fatal conditions (a speculative uninstall that
/// fails, a skipped bootstrap) are only logged and never become an error.
#[derive(Debug, Error)]
pub enum UberenvError {
    #[error("no configuration json file found (looked for {path} and `.uberenv_config.json` in {start} and its parents)")]
    ConfigNotFound { path: PathBuf, start: PathBuf },

    #[error("{message}")]
    Config { message: String },

    #[error("'{setting}' must at least be defined in the project settings or on the command line")]
    MissingSetting { setting: String },

    #[error("{step} failed: {message}")]
    AcquireFailed { step: String, message: String },

    #[error("could not patch {path}: {message}")]
    PatchFailed { path: PathBuf, message: String },

    #[error("{step} failed with status {status}")]
    EnvironmentSetupFailed { step: String, status: i32 },

    #[error("failure of {manager} install/dev-build (status {status})")]
    InstallFailed { manager: String, status: i32 },

    #[error("{message}")]
    ArtifactNotFound { message: String },
}

impl UberenvError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        UberenvError::Config {
            message: message.into(),
        }
    }

    /// Shorthand for an acquire failure.
    pub fn acquire(step: impl Into<String>, message: impl Into<String>) -> Self {
        UberenvError::AcquireFailed {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an environment setup failure.
    pub fn environment(step: impl Into<String>, status: i32) -> Self {
        UberenvError::EnvironmentSetupFailed {
            step: step.into(),
            status,
        }
    }
}
