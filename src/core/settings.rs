//! Project settings document.
//!
//! Projects describe what uberenv should build in a JSON file, either given
//! explicitly (`project.json` by default) or found as `.uberenv_config.json`
//! in the invocation directory or one of its parents. Unknown keys are
//! ignored so one document can serve several tool versions.
//!
//! ```json
//! {
//!     "package_name": "demo",
//!     "package_version": "1.0.0",
//!     "spack_commit": "6f0f3e5b1d...",
//!     "spack_packages_path": ["scripts/spack_packages"]
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::error::UberenvError;

/// Settings file looked up through parent directories when no explicit file exists.
pub const CONFIG_MARKER: &str = ".uberenv_config.json";

/// Default settings file name.
pub const DEFAULT_PROJECT_JSON: &str = "project.json";

/// A setting that may be given as a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    /// The values as a list.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }
}

/// Project settings loaded from JSON. Read-only once loaded.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Name of the package to build (required unless given on the command line)
    pub package_name: Option<String>,
    pub package_version: Option<String>,
    /// Build phase after which the manager should stop
    pub package_final_phase: Option<String>,
    /// Package source directory, relative to the settings file
    pub package_source_dir: Option<PathBuf>,

    /// Default build mode (`dev-build`, `uberenv-pkg` or `install`)
    pub spack_build_mode: Option<String>,
    pub spack_url: Option<String>,
    pub spack_branch: Option<String>,
    /// Spack commit the checkout is pinned to
    pub spack_commit: Option<String>,
    pub spack_configs_path: Option<PathBuf>,
    /// Directories of package recipes registered as extra repositories
    pub spack_packages_path: Option<OneOrMany>,
    /// Packages force-uninstalled by `--clean`
    pub spack_clean_packages: Vec<String>,
    pub spack_setup_clingo: Option<bool>,
    pub spack_env_name: Option<String>,
    pub spack_env_file: Option<PathBuf>,
    /// Space separated packages for external discovery
    pub spack_externals: Option<String>,
    /// Space separated paths searched for compilers
    pub spack_compiler_paths: Option<String>,

    /// Mirror used when none is given on the command line
    pub mirror: Option<String>,
    /// Upstream install tree used when none is given on the command line
    pub upstream: Option<PathBuf>,

    pub vcpkg_url: Option<String>,
    pub vcpkg_branch: Option<String>,
    pub vcpkg_commit: Option<String>,
    pub vcpkg_triplet: Option<String>,
    pub vcpkg_ports_path: Option<PathBuf>,

    /// Require `--prefix` on the command line
    pub force_commandline_prefix: bool,
}

impl ProjectSettings {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read project settings: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("failed to parse project settings: {}", path.display()))
    }

    /// Parse settings from a JSON string.
    pub fn parse(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| UberenvError::config(e.to_string()).into())
    }
}

/// Locate the project settings file.
///
/// Uses `given` when it names an existing file (relative paths resolve
/// against `start`); otherwise searches [`CONFIG_MARKER`] from `start`
/// upward to the filesystem root.
pub fn find_project_config(given: &Path, start: &Path) -> Result<PathBuf, UberenvError> {
    let given_abs = if given.is_absolute() {
        given.to_path_buf()
    } else {
        start.join(given)
    };
    if given_abs.is_file() {
        return Ok(given_abs);
    }

    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_MARKER);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !current.pop() {
            return Err(UberenvError::ConfigNotFound {
                path: given_abs,
                start: start.to_path_buf(),
            });
        }
    }
}

/// Pick a setting: the command-line value wins when set, then the settings
/// document. A required setting missing from both is a [`UberenvError::MissingSetting`].
pub fn resolve<T>(
    setting: &str,
    cli: Option<T>,
    json: Option<T>,
    optional: bool,
) -> Result<Option<T>, UberenvError> {
    match cli.or(json) {
        Some(value) => Ok(Some(value)),
        None if optional => Ok(None),
        None => Err(missing(setting)),
    }
}

/// [`resolve`] for a setting that must be present.
pub fn require<T>(setting: &str, cli: Option<T>, json: Option<T>) -> Result<T, UberenvError> {
    resolve(setting, cli, json, false)?.ok_or_else(|| missing(setting))
}

fn missing(setting: &str) -> UberenvError {
    UberenvError::MissingSetting {
        setting: setting.to_string(),
    }
}
