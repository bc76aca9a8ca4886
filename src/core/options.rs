//! Options controlling a single uberenv run.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::error::UberenvError;
use crate::core::settings::DEFAULT_PROJECT_JSON;
use crate::util::fs::{resolve_against, resolve_location};

/// Flat set of run options, normally produced from the command line.
///
/// Path options are made absolute by [`WorkflowOptions::finalize`] before
/// any step runs, since every later step works with explicit directories.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOptions {
    /// Install the package itself, not just its dependencies
    pub install: bool,
    /// Destination directory
    pub prefix: Option<PathBuf>,
    /// Qualifier string (compiler, variants)
    pub spec: Option<String>,
    /// Vcpkg architecture triplet
    pub triplet: Option<String>,
    /// Mirror directory or URL
    pub mirror: Option<String>,
    pub create_mirror: bool,
    /// Install tree of another Spack instance used as upstream
    pub upstream: Option<PathBuf>,
    /// Ask the concretizer to reuse installed packages
    pub reuse: bool,
    pub spack_config_dir: Option<PathBuf>,
    pub vcpkg_ports_path: Option<PathBuf>,
    pub package_name: Option<String>,
    pub build_mode: Option<String>,
    pub spack_debug: bool,
    pub allow_deprecated: bool,
    pub package_final_phase: Option<String>,
    pub package_source_dir: Option<PathBuf>,
    pub project_json: Option<PathBuf>,
    pub build_jobs: Option<u32>,
    pub ignore_ssl_errors: bool,
    pub repo_pull: bool,
    pub force_clean: bool,
    pub run_tests: bool,
    pub macos_sdk_env_setup: bool,

    // Checkpoints
    pub setup_only: bool,
    pub setup_and_env_only: bool,
    pub skip_setup: bool,
    pub skip_setup_and_env: bool,

    pub spack_externals: Vec<String>,
    pub spack_compiler_paths: Vec<String>,
    pub spack_env_name: Option<String>,
    pub spack_env_file: Option<PathBuf>,

    /// Directory the run was started from; relative paths resolve against it
    pub invocation_dir: PathBuf,
}

impl WorkflowOptions {
    /// Make every path option absolute against `invocation_dir` and
    /// validate the ones that must already exist.
    pub fn finalize(mut self, invocation_dir: &Path) -> Result<Self> {
        self.invocation_dir = invocation_dir.to_path_buf();

        let abs = |p: Option<PathBuf>| p.map(|p| resolve_against(invocation_dir, &p));
        self.prefix = abs(self.prefix);
        self.upstream = abs(self.upstream);
        self.spack_env_file = abs(self.spack_env_file);
        self.package_source_dir = abs(self.package_source_dir);
        self.vcpkg_ports_path = abs(self.vcpkg_ports_path);
        self.spack_config_dir = abs(self.spack_config_dir);

        self.mirror = self.mirror.map(|m| resolve_location(invocation_dir, &m));

        if let Some(ref dir) = self.spack_config_dir {
            if !dir.is_dir() {
                return Err(UberenvError::config(format!(
                    "invalid spack config dir: {}",
                    dir.display()
                ))
                .into());
            }
        }

        Ok(self)
    }

    /// The settings file to try first.
    pub fn project_json(&self) -> PathBuf {
        self.project_json
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECT_JSON))
    }
}
