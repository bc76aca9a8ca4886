//! Vcpkg backend, used on Windows.
//!
//! Vcpkg has no environments, concretizer, mirrors or upstreams; those
//! lifecycle steps keep their no-op defaults. The project's overlay ports
//! are merged into the checkout's `ports` tree instead of being registered.

use std::path::PathBuf;

use anyhow::Result;

use crate::core::error::UberenvError;
use crate::manager::git::{self, CheckoutSpec};
use crate::manager::{ManagerContext, ManagerKind, PackageManager};
use crate::util::fs::{copy_dir_all, copy_file};
use crate::util::platform::hostname;
use crate::util::process::ProcessBuilder;

const DEFAULT_URL: &str = "https://github.com/microsoft/vcpkg";
const DEFAULT_BRANCH: &str = "master";
const DEFAULT_PORTS_DIR: &str = "vcpkg_ports";
const DEFAULT_TRIPLET: &str = "x86-windows";

/// Environment variable vcpkg itself reads for the default triplet.
pub const TRIPLET_VAR: &str = "VCPKG_DEFAULT_TRIPLET";

/// Drives a vcpkg checkout through the uberenv lifecycle.
#[derive(Debug)]
pub struct VcpkgManager {
    ctx: ManagerContext,
    triplet: String,
    dest_vcpkg: PathBuf,
    ports_path: PathBuf,
}

impl VcpkgManager {
    pub fn new(ctx: ManagerContext) -> Self {
        let triplet = resolve_triplet(
            ctx.opts.triplet.clone(),
            ctx.settings.vcpkg_triplet.clone(),
            std::env::var(TRIPLET_VAR).ok(),
        );
        tracing::info!("vcpkg triplet: {}", triplet);

        VcpkgManager {
            dest_vcpkg: ctx.dest_dir.join("vcpkg"),
            ports_path: ctx.project_dir.join(DEFAULT_PORTS_DIR),
            ctx,
            triplet,
        }
    }

    fn vcpkg(&self) -> ProcessBuilder {
        let exe = if self.ctx.platform.is_windows() {
            "vcpkg.exe"
        } else {
            "vcpkg"
        };
        ProcessBuilder::new(self.dest_vcpkg.join(exe)).cwd(&self.dest_vcpkg)
    }

    fn bootstrap(&self) -> Result<()> {
        tracing::info!("bootstrapping vcpkg");
        let cmd = if self.ctx.platform.is_windows() {
            ProcessBuilder::new("cmd").args(["/C", "bootstrap-vcpkg.bat", "-disableMetrics"])
        } else {
            ProcessBuilder::new("./bootstrap-vcpkg.sh").arg("-disableMetrics")
        };
        let out = self.ctx.run(cmd.cwd(&self.dest_vcpkg), false, true)?;
        if !out.success() {
            return Err(UberenvError::acquire(
                "bootstrap",
                format!("bootstrap-vcpkg exited with status {}", out.status),
            )
            .into());
        }
        Ok(())
    }

    /// `installed/<triplet>/include/<package>/hc.cmake` inside the checkout.
    fn host_config_source(&self) -> PathBuf {
        self.dest_vcpkg
            .join("installed")
            .join(&self.triplet)
            .join("include")
            .join(&self.ctx.pkg_name)
            .join("hc.cmake")
    }
}

/// Triplet from the command line, the settings, the environment, then the default.
fn resolve_triplet(cli: Option<String>, json: Option<String>, env: Option<String>) -> String {
    cli.or(json)
        .or(env.filter(|t| !t.is_empty()))
        .unwrap_or_else(|| DEFAULT_TRIPLET.to_string())
}

impl PackageManager for VcpkgManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Vcpkg
    }

    fn context(&self) -> &ManagerContext {
        &self.ctx
    }

    fn setup_paths_and_dirs(&mut self) -> Result<()> {
        self.ctx.create_dest_dir()?;

        let (ports_path, source) = match (
            &self.ctx.opts.vcpkg_ports_path,
            &self.ctx.settings.vcpkg_ports_path,
        ) {
            (Some(path), _) => (path.clone(), "command line option '--vcpkg-ports-path'"),
            (None, Some(path)) => (
                self.ctx.project_path(path),
                "config file option 'vcpkg_ports_path'",
            ),
            (None, None) => (
                self.ctx.project_dir.join(DEFAULT_PORTS_DIR),
                "default 'vcpkg_ports' directory",
            ),
        };
        if !ports_path.is_dir() {
            return Err(UberenvError::config(format!(
                "vcpkg ports directory from {} does not exist: {}",
                source,
                ports_path.display()
            ))
            .into());
        }
        self.ports_path = ports_path;

        tracing::info!("installing to: {}", self.ctx.dest_dir.display());
        if self.dest_vcpkg.is_dir() {
            tracing::info!("destination '{}' already exists", self.dest_vcpkg.display());
        }
        Ok(())
    }

    fn acquire(&mut self) -> Result<()> {
        let settings = &self.ctx.settings;
        let checkout = CheckoutSpec {
            url: settings.vcpkg_url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            branch: settings
                .vcpkg_branch
                .clone()
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            commit: settings.vcpkg_commit.clone(),
            shallow: false,
            insecure: self.ctx.opts.ignore_ssl_errors,
            pull: self.ctx.opts.repo_pull,
        };
        git::acquire(self.ctx.executor(), &self.ctx.dest_dir, &self.dest_vcpkg, &checkout)?;
        self.bootstrap()
    }

    fn prepare(&mut self) -> Result<()> {
        let dest_ports = self.dest_vcpkg.join("ports");
        tracing::info!(
            "copying from {} to {}",
            self.ports_path.display(),
            dest_ports.display()
        );
        copy_dir_all(&self.ports_path, &dest_ports)
    }

    fn clean(&mut self) -> Result<()> {
        Ok(())
    }

    fn show_info(&mut self) -> Result<()> {
        let package = self.ctx.pkg_name.as_str();

        tracing::info!("details for package '{}'", package);
        self.ctx.run(self.vcpkg().args(["search", package]), false, true)?;

        tracing::info!("dependencies for package '{}'", package);
        self.ctx
            .run(self.vcpkg().args(["depend-info", package]), false, true)?;
        Ok(())
    }

    fn install(&mut self) -> Result<()> {
        let target = format!("{}:{}", self.ctx.pkg_name, self.triplet);
        let out = self
            .ctx
            .run(self.vcpkg().arg("install").arg(target), false, true)?;
        if !out.success() {
            return Err(UberenvError::InstallFailed {
                manager: ManagerKind::Vcpkg.to_string(),
                status: out.status,
            }
            .into());
        }
        Ok(())
    }

    fn publish(&mut self) -> Result<()> {
        let source = self.host_config_source();
        if !source.is_file() {
            return Err(UberenvError::ArtifactNotFound {
                message: format!("no host-config file found at {}", source.display()),
            }
            .into());
        }

        let dest = self
            .ctx
            .dest_dir
            .join(format!("{}.{}.cmake", hostname(), self.triplet));
        tracing::info!("copying host config file to {}", dest.display());
        copy_file(&source, &dest)?;
        tracing::info!("install complete!");
        Ok(())
    }
}
