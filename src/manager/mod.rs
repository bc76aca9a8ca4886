//! Package manager backends.
//!
//! A backend drives one external package manager through the uberenv
//! lifecycle:
//!
//! ```text
//! setup_paths_and_dirs -> acquire -> prepare -> clean
//!     -> create_environment -> concretize -> show_info -> install -> publish
//! ```
//!
//! plus the mirror and upstream operations. Steps a backend has no
//! equivalent for keep the default no-op implementation, so the workflow
//! never branches on the backend kind.

pub mod git;
pub mod output;
pub mod patch;
pub mod spack;
pub mod vcpkg;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::core::error::UberenvError;
use crate::core::options::WorkflowOptions;
use crate::core::settings::{require, ProjectSettings};
use crate::util::fs::{ensure_dir, resolve_against, resolve_location};
use crate::util::platform::{detect_macos_sdk_env, Platform};
use crate::util::process::{CommandOutput, Executor, ProcessBuilder};

pub use spack::SpackManager;
pub use vcpkg::VcpkgManager;

/// Prefix used when none is given on the command line.
pub const DEFAULT_PREFIX: &str = "uberenv_libs";

/// Which package manager drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerKind {
    Spack,
    Vcpkg,
}

impl ManagerKind {
    /// Vcpkg on Windows, Spack everywhere else.
    pub fn for_platform(platform: &Platform) -> Self {
        if platform.is_windows() {
            ManagerKind::Vcpkg
        } else {
            ManagerKind::Spack
        }
    }
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerKind::Spack => write!(f, "spack"),
            ManagerKind::Vcpkg => write!(f, "vcpkg"),
        }
    }
}

/// State shared by every backend for the duration of one run.
pub struct ManagerContext {
    pub opts: WorkflowOptions,
    pub settings: ProjectSettings,
    /// Directory of the settings file; relative settings resolve against it
    pub project_dir: PathBuf,
    /// Package name before any build mode adjustment
    pub pkg_name: String,
    /// Destination prefix
    pub dest_dir: PathBuf,
    pub platform: Platform,
    /// Extra environment attached to every manager command
    pub env: BTreeMap<String, String>,
    exec: Arc<dyn Executor>,
}

impl ManagerContext {
    /// Resolve the settings every backend needs.
    ///
    /// Fails when the package name is missing or a prefix is required but
    /// was not given.
    pub fn new(
        opts: WorkflowOptions,
        settings: ProjectSettings,
        settings_path: &Path,
        platform: Platform,
        exec: Arc<dyn Executor>,
    ) -> Result<Self> {
        let project_dir = settings_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| opts.invocation_dir.clone());

        let pkg_name = require(
            "package_name",
            opts.package_name.clone(),
            settings.package_name.clone(),
        )?;

        let dest_dir = match opts.prefix {
            Some(ref prefix) => prefix.clone(),
            None if settings.force_commandline_prefix => {
                return Err(
                    UberenvError::config("--prefix flag for library destination is required")
                        .into(),
                );
            }
            None => opts.invocation_dir.join(DEFAULT_PREFIX),
        };

        let env = if platform.is_darwin() && opts.macos_sdk_env_setup {
            detect_macos_sdk_env(exec.as_ref())?
        } else {
            if platform.is_darwin() {
                tracing::info!("skipping MACOSX env var setup");
            }
            BTreeMap::new()
        };

        Ok(ManagerContext {
            opts,
            settings,
            project_dir,
            pkg_name,
            dest_dir,
            platform,
            env,
            exec,
        })
    }

    /// Run a manager command with the context's extra environment attached.
    pub fn run(&self, cmd: ProcessBuilder, capture: bool, echo: bool) -> Result<CommandOutput> {
        let cmd = cmd.envs(&self.env);
        self.exec.execute(&cmd, capture, echo)
    }

    pub fn executor(&self) -> &dyn Executor {
        self.exec.as_ref()
    }

    /// A settings path made absolute against the settings file's directory.
    pub fn project_path(&self, path: &Path) -> PathBuf {
        resolve_against(&self.project_dir, path)
    }

    /// Create the destination prefix. An existing prefix is left untouched.
    pub fn create_dest_dir(&self) -> Result<()> {
        if self.dest_dir.is_dir() {
            tracing::info!("destination '{}' already exists", self.dest_dir.display());
            Ok(())
        } else {
            ensure_dir(&self.dest_dir)
        }
    }

    /// Mirror location from the command line, else from the settings.
    pub fn mirror(&self) -> Option<String> {
        if let Some(ref mirror) = self.opts.mirror {
            return Some(mirror.clone());
        }
        self.settings
            .mirror
            .as_deref()
            .map(|m| resolve_location(&self.project_dir, m))
    }

    /// Upstream install tree from the command line, else from the settings.
    pub fn upstream(&self) -> Option<PathBuf> {
        self.opts
            .upstream
            .clone()
            .or_else(|| self.settings.upstream.as_deref().map(|p| self.project_path(p)))
    }
}

impl fmt::Debug for ManagerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerContext")
            .field("pkg_name", &self.pkg_name)
            .field("dest_dir", &self.dest_dir)
            .field("project_dir", &self.project_dir)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

/// Lifecycle contract implemented by every backend.
///
/// Each step must be safe to repeat against the state a previous run left
/// on disk.
pub trait PackageManager {
    fn kind(&self) -> ManagerKind;

    fn context(&self) -> &ManagerContext;

    /// Resolve and create the directories the run works in.
    fn setup_paths_and_dirs(&mut self) -> Result<()>;

    /// Clone (or update) the manager checkout.
    fn acquire(&mut self) -> Result<()>;

    /// Adapt the checkout to the project.
    fn prepare(&mut self) -> Result<()>;

    /// Remove caches and, when asked, force-uninstall configured packages.
    fn clean(&mut self) -> Result<()>;

    fn create_environment(&mut self) -> Result<()> {
        Ok(())
    }

    fn concretize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Print what will be built and detect an existing install.
    fn show_info(&mut self) -> Result<()>;

    fn install(&mut self) -> Result<()>;

    /// Make the host-config available in the destination prefix.
    fn publish(&mut self) -> Result<()>;

    /// Create a source mirror. Returns the manager's exit status.
    fn create_mirror(&mut self) -> Result<i32> {
        tracing::info!("{} has no mirror support; nothing to do", self.kind());
        Ok(0)
    }

    fn use_mirror(&mut self) -> Result<()> {
        Ok(())
    }

    fn use_upstream(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Build the backend for the context's platform.
pub fn create(ctx: ManagerContext) -> Result<Box<dyn PackageManager>> {
    let kind = ManagerKind::for_platform(&ctx.platform);
    tracing::info!("using {} for platform {}", kind, ctx.platform);
    Ok(match kind {
        ManagerKind::Spack => Box::new(SpackManager::new(ctx)?),
        ManagerKind::Vcpkg => Box::new(VcpkgManager::new(ctx)),
    })
}
