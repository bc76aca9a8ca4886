//! Spack backend.
//!
//! The checkout lives at `<prefix>/spack` and the environment at
//! `<prefix>/<env name>`. Every command after environment creation runs
//! as `spack -D <env dir> ...` with the prefix as working directory.

use std::iter;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::error::UberenvError;
use crate::core::spec::{resolve_build_mode, BuildMode, Specification};
use crate::manager::git::{self, CheckoutSpec};
use crate::manager::output::{self, ConcretizerSupport};
use crate::manager::patch::ensure_config_scopes_disabled;
use crate::manager::{ManagerContext, ManagerKind, PackageManager};
use crate::util::fs::{
    copy_file, ensure_dir, glob_first, remove_dir_all_if_exists, replace_symlink, write_string,
};
use crate::util::platform::have_internet;
use crate::util::process::{CommandOutput, ProcessBuilder};

const DEFAULT_URL: &str = "https://github.com/spack/spack.git";
const DEFAULT_BRANCH: &str = "develop";
const DEFAULT_ENV_NAME: &str = "spack_env";
const DEFAULT_CONFIGS_DIR: &str = "spack_configs";
const DEFAULT_PACKAGES_DIR: &str = "packages";

const ENV_FILE: &str = "spack.yaml";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const UPSTREAMS_FILE: &str = "upstreams.yaml";
const REPO_DESCRIPTOR: &str = "repo.yaml";

/// Host-config inside an install tree.
const HOST_CONFIG_GLOB: &str = "*.cmake";
/// Build directories a dev-build leaves in the source tree.
const DEV_BUILD_DIR_GLOB: &str = "spack-build*";

/// Drives a Spack checkout through the uberenv lifecycle.
#[derive(Debug)]
pub struct SpackManager {
    ctx: ManagerContext,
    build_mode: BuildMode,
    spec: Specification,
    dest_spack: PathBuf,
    env_dir: PathBuf,
    pkg_src_dir: PathBuf,
    config_dir: Option<PathBuf>,
    /// `config.yaml` staged in the prefix for the defaults scope
    default_config: Option<PathBuf>,
    packages_paths: Vec<PathBuf>,
    /// Environment description; `None` means one is generated
    env_file: Option<PathBuf>,
    spec_hash: Option<String>,
    use_install: bool,
}

impl SpackManager {
    pub fn new(ctx: ManagerContext) -> Result<Self> {
        let requested_mode = ctx
            .opts
            .build_mode
            .as_deref()
            .or(ctx.settings.spack_build_mode.as_deref());
        let build_mode = resolve_build_mode(ctx.opts.install, requested_mode)?;

        let pkg_name = match build_mode {
            BuildMode::UberenvPkg => format!("uberenv-{}", ctx.pkg_name),
            _ => ctx.pkg_name.clone(),
        };
        let spec = Specification::new(
            pkg_name,
            ctx.settings.package_version.as_deref(),
            ctx.opts.spec.as_deref(),
            ctx.platform.default_compiler(),
        );
        tracing::info!("spack build mode: {}", build_mode);
        tracing::info!("spack spec: {}", spec);

        let env_name = ctx
            .opts
            .spack_env_name
            .clone()
            .or_else(|| ctx.settings.spack_env_name.clone())
            .unwrap_or_else(|| DEFAULT_ENV_NAME.to_string());

        Ok(SpackManager {
            dest_spack: ctx.dest_dir.join("spack"),
            env_dir: ctx.dest_dir.join(env_name),
            pkg_src_dir: ctx.project_dir.clone(),
            ctx,
            build_mode,
            spec,
            config_dir: None,
            default_config: None,
            packages_paths: Vec::new(),
            env_file: None,
            spec_hash: None,
            use_install: false,
        })
    }

    pub fn build_mode(&self) -> BuildMode {
        self.build_mode
    }

    pub fn spec(&self) -> &Specification {
        &self.spec
    }

    /// Hash of the concretized spec, once `show_info` found it.
    pub fn spec_hash(&self) -> Option<&str> {
        self.spec_hash.as_deref()
    }

    /// Whether an existing install will be reused instead of building.
    pub fn use_install(&self) -> bool {
        self.use_install
    }

    pub fn env_file(&self) -> Option<&Path> {
        self.env_file.as_deref()
    }

    fn spack(&self) -> ProcessBuilder {
        ProcessBuilder::new(self.dest_spack.join("bin").join("spack")).cwd(&self.ctx.dest_dir)
    }

    fn spack_env(&self) -> ProcessBuilder {
        self.spack().arg("-D").arg(&self.env_dir)
    }

    fn configs_root(&self) -> Result<PathBuf> {
        match self.ctx.settings.spack_configs_path {
            Some(ref path) => {
                let path = self.ctx.project_path(path);
                if !path.is_dir() {
                    return Err(UberenvError::config(format!(
                        "given path in 'spack_configs_path' does not exist: {}",
                        path.display()
                    ))
                    .into());
                }
                Ok(path)
            }
            None => Ok(self.ctx.project_dir.join(DEFAULT_CONFIGS_DIR)),
        }
    }

    fn resolve_packages_paths(&self) -> Result<Vec<PathBuf>> {
        let Some(ref paths) = self.ctx.settings.spack_packages_path else {
            let default = self.ctx.project_dir.join(DEFAULT_PACKAGES_DIR);
            return Ok(if default.is_dir() { vec![default] } else { Vec::new() });
        };

        paths
            .to_vec()
            .iter()
            .map(|p| {
                let path = self.ctx.project_path(Path::new(p));
                if path.exists() {
                    Ok(path)
                } else {
                    Err(UberenvError::config(format!(
                        "given path in 'spack_packages_path' does not exist: {}",
                        path.display()
                    ))
                    .into())
                }
            })
            .collect()
    }

    fn resolve_pkg_src_dir(&self) -> Result<PathBuf> {
        let dir = match self.ctx.opts.package_source_dir {
            Some(ref dir) => dir.clone(),
            None => match self.ctx.settings.package_source_dir {
                Some(ref dir) => self.ctx.project_path(dir),
                None => self.ctx.project_dir.clone(),
            },
        };
        if !dir.is_dir() {
            return Err(UberenvError::config(format!(
                "package_source_dir '{}' does not exist",
                dir.display()
            ))
            .into());
        }
        Ok(dir)
    }

    /// Environment description to create the environment from.
    ///
    /// An explicit file (command line, then settings) must exist. Otherwise
    /// the config directory and then the package source are searched.
    fn find_env_file(&self) -> Result<Option<PathBuf>> {
        let explicit = self.ctx.opts.spack_env_file.clone().or_else(|| {
            self.ctx
                .settings
                .spack_env_file
                .as_deref()
                .map(|p| self.ctx.project_path(p))
        });
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(UberenvError::config(format!(
                    "spack environment file does not exist: {}",
                    path.display()
                ))
                .into());
            }
            return Ok(Some(path));
        }

        Ok(self
            .config_dir
            .iter()
            .map(|dir| dir.join(ENV_FILE))
            .chain(iter::once(self.pkg_src_dir.join(ENV_FILE)))
            .find(|p| p.is_file()))
    }

    /// Copy a `config.yaml` from the config dir (or the configs root) into
    /// the prefix so `prepare` can install it as a default.
    fn stage_default_config(&self, configs_root: &Path) -> Result<Option<PathBuf>> {
        let source = self
            .config_dir
            .iter()
            .map(|dir| dir.join(DEFAULT_CONFIG_FILE))
            .chain(iter::once(configs_root.join(DEFAULT_CONFIG_FILE)))
            .find(|p| p.is_file());

        let Some(source) = source else {
            return Ok(None);
        };
        let staged = self.ctx.dest_dir.join(DEFAULT_CONFIG_FILE);
        tracing::info!("copying {} to {}", source.display(), staged.display());
        copy_file(&source, &staged)?;
        Ok(Some(staged))
    }

    fn defaults_scope(&self) -> PathBuf {
        self.dest_spack.join("etc").join("spack").join("defaults")
    }

    fn log_python_info(&self) -> Result<()> {
        let cmd = self
            .spack()
            .args(["python", "-c", "import sys; print(sys.executable)"]);
        let out = self.ctx.run(cmd, true, false)?;
        if out.success() {
            tracing::info!("spack python: {}", out.text().trim());
        } else {
            tracing::warn!("could not query spack's python interpreter");
        }
        Ok(())
    }

    fn bootstrap_clingo(&self) -> Result<()> {
        if !have_internet() {
            tracing::warn!("no internet connection, skipping clingo bootstrap");
            return Ok(());
        }
        let out = self.ctx.run(self.spack().args(["bootstrap", "now"]), false, true)?;
        if !out.success() {
            tracing::warn!("clingo bootstrap failed with status {}", out.status);
        }
        Ok(())
    }

    fn discover_compilers(&self) -> Result<()> {
        let paths = list_setting(
            &self.ctx.opts.spack_compiler_paths,
            self.ctx.settings.spack_compiler_paths.as_deref(),
        );
        let cmd = self.spack_env().args(["compiler", "find"]).args(&paths);
        require_success("spack compiler find", self.ctx.run(cmd, false, true)?)
    }

    fn discover_externals(&self) -> Result<()> {
        let packages = list_setting(
            &self.ctx.opts.spack_externals,
            self.ctx.settings.spack_externals.as_deref(),
        );
        let cmd = self
            .spack_env()
            .args(["external", "find", "--not-buildable"]);
        let cmd = if packages.is_empty() {
            cmd.arg("--all")
        } else {
            cmd.args(&packages)
        };
        require_success("spack external find", self.ctx.run(cmd, false, true)?)
    }

    fn add_repositories(&self) -> Result<()> {
        for path in &self.packages_paths {
            // Recipes live in `<repo>/packages`; the descriptor sits in `<repo>`
            let repo_root = if path.join(REPO_DESCRIPTOR).is_file() {
                path.as_path()
            } else {
                path.parent().unwrap_or(path)
            };
            if !repo_root.join(REPO_DESCRIPTOR).is_file() {
                return Err(UberenvError::config(format!(
                    "package repository {} has no {}",
                    repo_root.display(),
                    REPO_DESCRIPTOR
                ))
                .into());
            }

            let cmd = self.spack_env().args(["repo", "add"]).arg(repo_root);
            require_success("spack repo add", self.ctx.run(cmd, false, true)?)?;
        }
        Ok(())
    }

    fn add_spec(&self) -> Result<()> {
        let spec = self.spec.to_string();
        if self.build_mode == BuildMode::DevBuild {
            let cmd = self
                .spack_env()
                .args(["develop", "--no-clone"])
                .arg(format!("--path={}", self.pkg_src_dir.display()))
                .arg(&spec);
            require_success("spack develop", self.ctx.run(cmd, false, true)?)
        } else {
            let cmd = self.spack_env().arg("add").arg(&spec);
            require_success("spack add", self.ctx.run(cmd, false, true)?)
        }
    }

    /// Install directory of the spec with `hash`, as reported by `spack find`.
    fn find_install_path(&self, hash: &str) -> Result<Option<PathBuf>> {
        let cmd = self
            .spack_env()
            .args(["find", "-p"])
            .arg(format!("/{}", hash));
        let out = self.ctx.run(cmd, true, false)?;
        Ok(output::parse_find_path(out.text(), self.spec.package()))
    }

    fn final_phase(&self) -> Option<&str> {
        self.ctx
            .opts
            .package_final_phase
            .as_deref()
            .or(self.ctx.settings.package_final_phase.as_deref())
    }

    fn install_command(&self) -> ProcessBuilder {
        let opts = &self.ctx.opts;
        let mut cmd = self.spack();
        if opts.ignore_ssl_errors {
            cmd = cmd.arg("-k");
        }
        if opts.spack_debug {
            cmd = cmd.args(["--debug", "--stacktrace"]);
        }
        cmd = cmd
            .arg("-D")
            .arg(&self.env_dir)
            .args(["install", "--fail-fast"]);
        if opts.allow_deprecated {
            cmd = cmd.arg("--deprecated");
        }
        if let Some(jobs) = opts.build_jobs {
            cmd = cmd.arg("-j").arg(jobs.to_string());
        }

        match self.build_mode {
            BuildMode::Install => {
                if opts.run_tests {
                    cmd = cmd.arg("--test=root");
                }
            }
            BuildMode::DevBuild => cmd = cmd.arg("--keep-stage"),
            BuildMode::UberenvPkg => {}
        }
        if self.build_mode != BuildMode::Install {
            if let Some(phase) = self.final_phase() {
                cmd = cmd.arg("-u").arg(phase);
            }
        }
        cmd
    }

    /// Symlink the host-config (and for installs, the install tree) of the
    /// installed package into the prefix.
    fn publish_installed(&self) -> Result<()> {
        let package = self.spec.package();
        let hash = self.spec_hash.as_deref().ok_or_else(|| UberenvError::ArtifactNotFound {
            message: format!("no concretized hash found for {}", package),
        })?;

        let install_path =
            self.find_install_path(hash)?
                .ok_or_else(|| UberenvError::ArtifactNotFound {
                    message: format!("could not find install of {} with hash {}", package, hash),
                })?;

        let host_config = glob_first(&install_path, HOST_CONFIG_GLOB)?.ok_or_else(|| {
            UberenvError::ArtifactNotFound {
                message: format!("no host-config file found in {}", install_path.display()),
            }
        })?;
        let link = self.ctx.dest_dir.join(file_name(&host_config)?);
        tracing::info!("symlinking host config file to {}", link.display());
        replace_symlink(&host_config, &link)?;

        if self.build_mode == BuildMode::Install {
            let link = self.ctx.dest_dir.join(format!("{}-install", package));
            tracing::info!("symlinking install to {}", link.display());
            replace_symlink(&install_path, &link)?;
            tracing::info!("install complete!");
        }
        Ok(())
    }

    /// Copy the host-config out of the dev-build directory, then remove
    /// that directory.
    fn publish_dev_build(&self) -> Result<()> {
        // CMake writes its own *.cmake files next to the host-config
        let pattern = format!(
            "{}/*{}*.cmake",
            DEV_BUILD_DIR_GLOB,
            glob::Pattern::escape(self.spec.package())
        );
        let Some(host_config) = glob_first(&self.pkg_src_dir, &pattern)? else {
            tracing::info!(
                "no host-config file matching {} under {}",
                pattern,
                self.pkg_src_dir.display()
            );
            return Ok(());
        };

        let dest = self.ctx.dest_dir.join(file_name(&host_config)?);
        tracing::info!("copying host config file to {}", dest.display());
        copy_file(&host_config, &dest)?;

        if let Some(build_dir) = host_config.parent() {
            tracing::info!("removing project build directory {}", build_dir.display());
            remove_dir_all_if_exists(build_dir)?;
        }
        Ok(())
    }

    fn mirror_path(&self) -> Result<String> {
        self.ctx.mirror().ok_or_else(|| {
            UberenvError::config("--create-mirror requires a mirror directory").into()
        })
    }
}

impl PackageManager for SpackManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Spack
    }

    fn context(&self) -> &ManagerContext {
        &self.ctx
    }

    fn setup_paths_and_dirs(&mut self) -> Result<()> {
        self.ctx.create_dest_dir()?;
        tracing::info!("installing to: {}", self.ctx.dest_dir.display());
        if self.dest_spack.is_dir() {
            tracing::info!("destination '{}' already exists", self.dest_spack.display());
        }

        let configs_root = self.configs_root()?;
        self.config_dir = self.ctx.opts.spack_config_dir.clone().or_else(|| {
            self.ctx
                .platform
                .config_subdir()
                .map(|sub| configs_root.join(sub))
        });
        if let Some(ref dir) = self.config_dir {
            tracing::info!("spack config dir: {}", dir.display());
        }

        self.packages_paths = self.resolve_packages_paths()?;
        self.pkg_src_dir = self.resolve_pkg_src_dir()?;

        self.env_file = self.find_env_file()?;
        match self.env_file {
            Some(ref file) => tracing::info!("using spack environment file {}", file.display()),
            None => tracing::info!("no spack environment file found, one will be generated"),
        }

        self.default_config = self.stage_default_config(&configs_root)?;
        Ok(())
    }

    fn acquire(&mut self) -> Result<()> {
        let settings = &self.ctx.settings;
        let checkout = CheckoutSpec {
            url: settings.spack_url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            branch: settings
                .spack_branch
                .clone()
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            commit: settings.spack_commit.clone(),
            shallow: true,
            insecure: self.ctx.opts.ignore_ssl_errors,
            pull: self.ctx.opts.repo_pull,
        };
        git::acquire(self.ctx.executor(), &self.ctx.dest_dir, &self.dest_spack, &checkout)
    }

    fn prepare(&mut self) -> Result<()> {
        self.log_python_info()?;

        let config_py = self
            .dest_spack
            .join("lib")
            .join("spack")
            .join("spack")
            .join("config.py");
        ensure_config_scopes_disabled(&config_py)?;

        if let Some(ref staged) = self.default_config {
            let defaults = self.defaults_scope();
            ensure_dir(&defaults)?;
            tracing::info!("installing {} into {}", staged.display(), defaults.display());
            copy_file(staged, &defaults.join(DEFAULT_CONFIG_FILE))?;
        }

        if self.ctx.settings.spack_setup_clingo.unwrap_or(true) {
            self.bootstrap_clingo()?;
        } else {
            tracing::info!("skipping clingo bootstrap");
        }
        Ok(())
    }

    fn clean(&mut self) -> Result<()> {
        // Stage and cache cleanup is best effort
        self.ctx.run(self.spack().arg("clean"), false, true)?;
        self.ctx.run(self.spack().args(["clean", "--all"]), false, true)?;

        if !self.ctx.opts.force_clean {
            return Ok(());
        }
        for package in &self.ctx.settings.spack_clean_packages {
            let found = self
                .ctx
                .run(self.spack().args(["find", "-p", package.as_str()]), true, false)?;
            if output::parse_find_path(found.text(), package).is_none() {
                tracing::info!("{} is not installed, nothing to uninstall", package);
                continue;
            }

            let uninstall = self
                .spack()
                .args(["uninstall", "-f", "-y", "--all", "--dependents", package.as_str()]);
            let out = self.ctx.run(uninstall, false, true)?;
            if !out.success() {
                tracing::warn!("failed to uninstall {} (status {})", package, out.status);
            }
        }
        Ok(())
    }

    fn create_environment(&mut self) -> Result<()> {
        if self.env_dir.exists() {
            tracing::info!("removing existing spack environment {}", self.env_dir.display());
            remove_dir_all_if_exists(&self.env_dir)?;
        }

        let mut create = self
            .spack()
            .args(["env", "create", "-d"])
            .arg(&self.env_dir);
        if let Some(ref file) = self.env_file {
            create = create.arg(file);
        }
        require_success("spack env create", self.ctx.run(create, false, true)?)?;

        if self.env_file.is_none() {
            self.discover_compilers()?;
            self.discover_externals()?;

            let generated = self.env_dir.join(ENV_FILE);
            if generated.is_file() {
                let saved = self.pkg_src_dir.join(ENV_FILE);
                tracing::info!("saving generated spack environment to {}", saved.display());
                copy_file(&generated, &saved)?;
            }
        }

        self.add_repositories()?;
        self.add_spec()
    }

    fn concretize(&mut self) -> Result<()> {
        let help = self
            .ctx
            .run(self.spack().args(["concretize", "--help"]), true, false)?;
        let support = ConcretizerSupport::from_help(help.text());
        let flag = support.select(self.ctx.opts.reuse);
        tracing::debug!("concretizer support {:?}, using {:?}", support, flag);

        let mut cmd = self.spack_env().arg("concretize");
        if let Some(flag) = flag {
            cmd = cmd.arg(flag);
        }
        require_success("spack concretize", self.ctx.run(cmd, false, true)?)
    }

    fn show_info(&mut self) -> Result<()> {
        let version = self.ctx.run(self.spack().arg("--version"), true, false)?;
        if let Some(version) = output::parse_version(version.text()) {
            tracing::info!("spack version: {}", version);
        }

        let cmd = self
            .spack_env()
            .args(["spec", "--install-status", "--very-long"]);
        let out = self.ctx.run(cmd, true, true)?;
        tracing::info!("{}", out.text().trim_end());
        if !out.success() {
            tracing::warn!("spack spec exited with status {}", out.status);
        }

        let Some(status) = output::parse_install_status(out.text(), self.spec.package()) else {
            tracing::warn!("no install status found for {}", self.spec.package());
            return Ok(());
        };

        if status.installed {
            // The database can list installs whose directory was removed by hand
            match self.find_install_path(&status.hash)? {
                Some(path) if path.is_dir() => {
                    tracing::warn!(
                        "{} has already been installed in {}",
                        self.spec,
                        path.display()
                    );
                    tracing::warn!("uberenv will proceed using this directory");
                    self.use_install = true;
                }
                Some(path) => tracing::warn!(
                    "spack lists {} as installed in {}, which does not exist; reinstalling",
                    self.spec,
                    path.display()
                ),
                None => tracing::warn!(
                    "spack lists {} as installed but no install path was found; reinstalling",
                    self.spec
                ),
            }
        }
        self.spec_hash = Some(status.hash);
        Ok(())
    }

    fn install(&mut self) -> Result<()> {
        if self.use_install {
            tracing::info!("skipping install of {}, reusing existing install", self.spec);
            return Ok(());
        }

        let out = self.ctx.run(self.install_command(), false, true)?;
        if !out.success() {
            return Err(UberenvError::InstallFailed {
                manager: ManagerKind::Spack.to_string(),
                status: out.status,
            }
            .into());
        }
        Ok(())
    }

    fn publish(&mut self) -> Result<()> {
        if self.build_mode.is_install_like() || self.use_install {
            self.publish_installed()
        } else {
            self.publish_dev_build()
        }
    }

    fn create_mirror(&mut self) -> Result<i32> {
        let mirror = self.mirror_path()?;
        let mut cmd = self.spack();
        if self.ctx.opts.ignore_ssl_errors {
            cmd = cmd.arg("-k");
        }
        let cmd = cmd
            .args(["mirror", "create", "-d"])
            .arg(&mirror)
            .arg("--dependencies")
            .arg(self.spec.to_string());
        Ok(self.ctx.run(cmd, false, true)?.status)
    }

    fn use_mirror(&mut self) -> Result<()> {
        let mirror = self.mirror_path()?;
        let name = self.spec.package();

        let listed = self.ctx.run(self.spack().args(["mirror", "list"]), true, false)?;
        let mut existing = output::find_mirror(listed.text(), name);

        if let Some(ref path) = existing {
            if path != output::strip_file_scheme(&mirror) {
                tracing::info!("removing existing spack mirror `{}` @ {}", name, path);
                let remove = self
                    .spack()
                    .args(["mirror", "remove", "--scope=defaults", name]);
                let out = self.ctx.run(remove, false, true)?;
                if !out.success() {
                    tracing::warn!("failed to remove spack mirror `{}`", name);
                }
                existing = None;
            }
        }

        if existing.is_some() {
            tracing::info!("spack mirror `{}` already points at {}", name, mirror);
            return Ok(());
        }

        let add = self
            .spack()
            .args(["mirror", "add", "--scope=defaults", name])
            .arg(&mirror);
        let out = self.ctx.run(add, false, true)?;
        if out.success() {
            tracing::info!("using mirror {}", mirror);
        } else {
            tracing::warn!("failed to add spack mirror `{}` (status {})", name, out.status);
        }
        Ok(())
    }

    fn use_upstream(&mut self) -> Result<()> {
        let Some(upstream) = self.ctx.upstream() else {
            return Err(UberenvError::config("--upstream requires an upstream directory").into());
        };
        let name = self.spec.package();

        let current = self
            .ctx
            .run(self.spack().args(["config", "get", "upstreams"]), true, false)?;
        if output::find_upstream(current.text(), name).as_deref() == Some(upstream.as_path()) {
            tracing::info!("spack upstream `{}` already configured", name);
            return Ok(());
        }

        let file = self.defaults_scope().join(UPSTREAMS_FILE);
        tracing::info!("writing spack upstream configuration {}", file.display());
        write_string(
            &file,
            &format!(
                "upstreams:\n  {}:\n    install_tree: {}\n",
                name,
                upstream.display()
            ),
        )
    }
}

/// Values from the command line when given, else the space separated setting.
fn list_setting(cli: &[String], json: Option<&str>) -> Vec<String> {
    if !cli.is_empty() {
        return cli
            .iter()
            .flat_map(|v| v.split_whitespace())
            .map(String::from)
            .collect();
    }
    json.map(|s| s.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}

fn require_success(step: &str, out: CommandOutput) -> Result<()> {
    if out.success() {
        Ok(())
    } else {
        Err(UberenvError::environment(step, out.status).into())
    }
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name().ok_or_else(|| {
        UberenvError::ArtifactNotFound {
            message: format!("{} has no file name", path.display()),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::WorkflowOptions;
    use crate::test_support::{
        find_output, spec_output, MockExecutor, MockProcessOutput, ProjectFixture, DEMO_HASH,
    };
    use std::sync::Arc;

    fn manager(
        fixture: &ProjectFixture,
        opts: WorkflowOptions,
        exec: &Arc<MockExecutor>,
    ) -> SpackManager {
        SpackManager::new(fixture.context(opts, exec.clone())).unwrap()
    }

    fn mock() -> Arc<MockExecutor> {
        let exec = MockExecutor::new();
        exec.set_default(MockProcessOutput::success(""));
        Arc::new(exec)
    }

    #[test]
    fn test_uberenv_pkg_mode_renames_package() {
        let fixture = ProjectFixture::new();
        let opts = WorkflowOptions {
            build_mode: Some("uberenv-pkg".into()),
            ..fixture.options()
        };
        let mgr = manager(&fixture, opts, &mock());
        assert_eq!(mgr.build_mode(), BuildMode::UberenvPkg);
        assert_eq!(mgr.spec().to_string(), "uberenv-demo@1.0.0%gcc");
    }

    #[test]
    fn test_build_mode_from_settings() {
        let fixture = ProjectFixture::with_settings(
            r#"{"package_name":"demo","package_version":"1.0.0","spack_build_mode":"install"}"#,
        );
        let mgr = manager(&fixture, fixture.options(), &mock());
        assert_eq!(mgr.build_mode(), BuildMode::Install);
    }

    #[test]
    fn test_env_file_search_order() {
        let fixture = ProjectFixture::new();
        let exec = mock();
        std::fs::write(fixture.project_dir().join(ENV_FILE), "spack: {}\n").unwrap();

        let mut mgr = manager(&fixture, fixture.options(), &exec);
        mgr.setup_paths_and_dirs().unwrap();
        assert_eq!(mgr.env_file(), Some(fixture.project_dir().join(ENV_FILE).as_path()));

        let config_dir = fixture.root().join("configs");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(ENV_FILE), "spack: {}\n").unwrap();
        let opts = WorkflowOptions {
            spack_config_dir: Some(config_dir.clone()),
            ..fixture.options()
        };
        let mut mgr = manager(&fixture, opts, &exec);
        mgr.setup_paths_and_dirs().unwrap();
        assert_eq!(mgr.env_file(), Some(config_dir.join(ENV_FILE).as_path()));
    }

    #[test]
    fn test_explicit_env_file_must_exist() {
        let fixture = ProjectFixture::new();
        let opts = WorkflowOptions {
            spack_env_file: Some(fixture.root().join("missing.yaml")),
            ..fixture.options()
        };
        let mut mgr = manager(&fixture, opts, &mock());
        assert!(mgr.setup_paths_and_dirs().is_err());
    }

    #[test]
    fn test_missing_package_source_dir() {
        let fixture = ProjectFixture::with_settings(
            r#"{"package_name":"demo","package_source_dir":"does/not/exist"}"#,
        );
        let mut mgr = manager(&fixture, fixture.options(), &mock());
        let err = mgr.setup_paths_and_dirs().unwrap_err();
        assert!(err.to_string().contains("package_source_dir"));
    }

    #[test]
    fn test_default_config_is_staged_and_installed() {
        let fixture = ProjectFixture::new();
        let configs = fixture.project_dir().join(DEFAULT_CONFIGS_DIR);
        std::fs::create_dir_all(&configs).unwrap();
        std::fs::write(configs.join(DEFAULT_CONFIG_FILE), "config: {}\n").unwrap();

        let exec = mock();
        let mut mgr = manager(&fixture, fixture.options(), &exec);
        mgr.setup_paths_and_dirs().unwrap();
        assert!(fixture.prefix().join(DEFAULT_CONFIG_FILE).is_file());

        mgr.prepare().unwrap();
        let installed = fixture
            .prefix()
            .join("spack/etc/spack/defaults")
            .join(DEFAULT_CONFIG_FILE);
        assert_eq!(std::fs::read_to_string(installed).unwrap(), "config: {}\n");

        let config_py = std::fs::read_to_string(fixture.config_py()).unwrap();
        assert!(config_py.contains("disable_local_config = True"));
        assert!(exec.called_with("python -c"));
        assert!(!exec.called_with("bootstrap now"));
    }

    #[test]
    fn test_force_clean_uninstalls_only_installed_packages() {
        let fixture = ProjectFixture::with_settings(
            r#"{"package_name":"demo","spack_clean_packages":["demo","zlib"]}"#,
        );
        let exec = Arc::new(MockExecutor::new());
        exec.expect_contains(
            "find -p demo",
            MockProcessOutput::success("demo@1.0.0  /opt/spack/demo-1.0.0-abc"),
        );
        exec.expect_contains(
            "find -p zlib",
            MockProcessOutput::success("==> No package matches the query: zlib"),
        );
        exec.set_default(MockProcessOutput::failure(1, ""));

        let opts = WorkflowOptions {
            force_clean: true,
            ..fixture.options()
        };
        let mut mgr = manager(&fixture, opts, &exec);
        mgr.clean().unwrap();

        assert!(exec.called_with("clean --all"));
        assert!(exec.called_with("uninstall -f -y --all --dependents demo"));
        assert!(!exec.called_with("uninstall -f -y --all --dependents zlib"));
    }

    #[test]
    fn test_create_environment_generates_description() {
        let fixture = ProjectFixture::with_settings(
            r#"{"package_name":"demo","package_version":"1.0.0","spack_compiler_paths":"/usr/bin /opt/gcc/bin"}"#,
        );
        let exec = mock();
        let opts = WorkflowOptions {
            spack_externals: vec!["cmake perl".into()],
            ..fixture.options()
        };
        let mut mgr = manager(&fixture, opts, &exec);
        mgr.setup_paths_and_dirs().unwrap();
        mgr.create_environment().unwrap();

        let calls = exec.calls();
        assert!(calls[0].ends_with(&format!(
            "env create -d {}",
            fixture.prefix().join("spack_env").display()
        )));
        assert!(calls[1].ends_with("compiler find /usr/bin /opt/gcc/bin"));
        assert!(calls[2].ends_with("external find --not-buildable cmake perl"));
        assert!(calls[3].ends_with(&format!(
            "develop --no-clone --path={} demo@1.0.0%gcc",
            fixture.project_dir().display()
        )));
    }

    #[test]
    fn test_create_environment_full_external_scan() {
        let fixture = ProjectFixture::new();
        let exec = mock();
        let opts = WorkflowOptions {
            install: true,
            ..fixture.options()
        };
        let mut mgr = manager(&fixture, opts, &exec);
        mgr.setup_paths_and_dirs().unwrap();
        mgr.create_environment().unwrap();

        assert!(exec.called_with("external find --not-buildable --all"));
        assert!(exec.calls().last().unwrap().ends_with("add demo@1.0.0%gcc"));
    }

    #[test]
    fn test_create_environment_removes_stale_env() {
        let fixture = ProjectFixture::new();
        let env_dir = fixture.prefix().join("spack_env");
        std::fs::create_dir_all(&env_dir).unwrap();
        std::fs::write(env_dir.join("spack.lock"), "{}").unwrap();

        let mut mgr = manager(&fixture, fixture.options(), &mock());
        mgr.setup_paths_and_dirs().unwrap();
        mgr.create_environment().unwrap();
        assert!(!env_dir.exists());
    }

    #[test]
    fn test_env_create_failure_is_fatal() {
        let fixture = ProjectFixture::new();
        let exec = Arc::new(MockExecutor::new());
        exec.expect_contains("env create", MockProcessOutput::failure(2, ""));

        let mut mgr = manager(&fixture, fixture.options(), &exec);
        mgr.setup_paths_and_dirs().unwrap();
        let err = mgr.create_environment().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UberenvError>(),
            Some(UberenvError::EnvironmentSetupFailed { status: 2, .. })
        ));
    }

    #[test]
    fn test_repository_without_descriptor_is_fatal() {
        let fixture = ProjectFixture::with_settings(
            r#"{"package_name":"demo","spack_packages_path":"spack/packages"}"#,
        );
        std::fs::create_dir_all(fixture.project_dir().join("spack/packages")).unwrap();
        std::fs::write(fixture.project_dir().join(ENV_FILE), "spack: {}\n").unwrap();
        let exec = mock();

        let mut mgr = manager(&fixture, fixture.options(), &exec);
        mgr.setup_paths_and_dirs().unwrap();
        let err = mgr.create_environment().unwrap_err();
        assert!(err.to_string().contains(REPO_DESCRIPTOR));

        let descriptor = fixture.project_dir().join("spack").join(REPO_DESCRIPTOR);
        std::fs::write(descriptor, "repo:\n").unwrap();
        mgr.create_environment().unwrap();
        assert!(exec.called_with(&format!(
            "repo add {}",
            fixture.project_dir().join("spack").display()
        )));
    }

    #[test]
    fn test_concretize_falls_back_to_fresh() {
        let fixture = ProjectFixture::new();
        let exec = Arc::new(MockExecutor::new());
        exec.expect_contains(
            "concretize --help",
            MockProcessOutput::success("options:\n  -f, --force\n  --fresh  do not reuse"),
        );
        exec.set_default(MockProcessOutput::success(""));

        let opts = WorkflowOptions {
            reuse: true,
            ..fixture.options()
        };
        let mut mgr = manager(&fixture, opts, &exec);
        mgr.concretize().unwrap();
        assert!(exec.calls().last().unwrap().ends_with("concretize --fresh"));
    }

    #[test]
    fn test_show_info_detects_existing_install() {
        let fixture = ProjectFixture::new();
        let install = fixture.installed_package("demo", "host-demo.cmake");
        let exec = Arc::new(MockExecutor::new());
        exec.expect_contains(
            "spec --install-status",
            MockProcessOutput::success(spec_output(true)),
        );
        exec.expect_contains("find -p /", MockProcessOutput::success(find_output(&install)));
        exec.set_default(MockProcessOutput::success("0.21.0"));

        let mut mgr = manager(&fixture, fixture.options(), &exec);
        mgr.show_info().unwrap();
        assert_eq!(mgr.spec_hash(), Some(DEMO_HASH));
        assert!(mgr.use_install());
    }

    #[test]
    fn test_show_info_pending_install() {
        let fixture = ProjectFixture::new();
        let exec = Arc::new(MockExecutor::new());
        exec.expect_contains(
            "spec --install-status",
            MockProcessOutput::success(spec_output(false)),
        );
        exec.set_default(MockProcessOutput::success("0.21.0"));

        let mut mgr = manager(&fixture, fixture.options(), &exec);
        mgr.show_info().unwrap();
        assert_eq!(mgr.spec_hash(), Some(DEMO_HASH));
        assert!(!mgr.use_install());
        assert!(!exec.called_with("find -p"));
    }

    #[test]
    fn test_install_command_flags() {
        let fixture = ProjectFixture::new();
        let opts = WorkflowOptions {
            install: true,
            run_tests: true,
            allow_deprecated: true,
            build_jobs: Some(4),
            ignore_ssl_errors: true,
            spack_debug: true,
            package_final_phase: Some("initconfig".into()),
            ..fixture.options()
        };
        let mgr = manager(&fixture, opts, &mock());
        let cmd = mgr.install_command().display_command();
        assert!(cmd.contains(" -k --debug --stacktrace -D "));
        assert!(cmd.ends_with("install --fail-fast --deprecated -j 4 --test=root"));

        let opts = WorkflowOptions {
            package_final_phase: Some("initconfig".into()),
            ..fixture.options()
        };
        let mgr = manager(&fixture, opts, &mock());
        let cmd = mgr.install_command().display_command();
        assert!(cmd.ends_with("install --fail-fast --keep-stage -u initconfig"));
    }

    #[test]
    fn test_install_failure() {
        let fixture = ProjectFixture::new();
        let exec = Arc::new(MockExecutor::new());
        exec.set_default(MockProcessOutput::failure(1, ""));

        let mut mgr = manager(&fixture, fixture.options(), &exec);
        let err = mgr.install().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UberenvError>(),
            Some(UberenvError::InstallFailed { status: 1, .. })
        ));
    }

    #[test]
    fn test_publish_install_replaces_links() {
        let fixture = ProjectFixture::new();
        let install = fixture.installed_package("demo", "host-demo.cmake");
        let exec = Arc::new(MockExecutor::new());
        exec.expect_contains(
            "spec --install-status",
            MockProcessOutput::success(spec_output(false)),
        );
        exec.expect_contains("find -p /", MockProcessOutput::success(find_output(&install)));
        exec.set_default(MockProcessOutput::success(""));

        let opts = WorkflowOptions {
            install: true,
            ..fixture.options()
        };
        let mut mgr = manager(&fixture, opts, &exec);
        mgr.setup_paths_and_dirs().unwrap();
        mgr.show_info().unwrap();

        // Stale same-named entries from an earlier run
        std::fs::write(fixture.prefix().join("host-demo.cmake"), "old").unwrap();
        crate::util::fs::symlink(fixture.root(), &fixture.prefix().join("demo-install")).unwrap();

        mgr.publish().unwrap();
        let link = fixture.prefix().join("host-demo.cmake");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&link).unwrap(), install.join("host-demo.cmake"));
        assert_eq!(
            std::fs::read_link(fixture.prefix().join("demo-install")).unwrap(),
            install
        );
    }

    #[test]
    fn test_publish_install_without_hash() {
        let fixture = ProjectFixture::new();
        let opts = WorkflowOptions {
            install: true,
            ..fixture.options()
        };
        let mut mgr = manager(&fixture, opts, &mock());
        let err = mgr.publish().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UberenvError>(),
            Some(UberenvError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn test_publish_dev_build_copies_and_removes_build_dir() {
        let fixture = ProjectFixture::new();
        let host_config = fixture.dev_build_output("spack-build-abc1234", "host-demo.cmake");
        let mut mgr = manager(&fixture, fixture.options(), &mock());
        mgr.setup_paths_and_dirs().unwrap();
        mgr.publish().unwrap();

        let copied = fixture.prefix().join("host-demo.cmake");
        assert!(std::fs::symlink_metadata(&copied).unwrap().is_file());
        assert!(!host_config.parent().unwrap().exists());
    }

    #[test]
    fn test_publish_dev_build_ignores_cmake_generated_files() {
        let fixture = ProjectFixture::new();
        let host_name = "myhost-linux-gcc@11-demo-abc1234.cmake";
        let host_config = fixture.dev_build_output("spack-build-abc1234", host_name);
        let build_dir = host_config.parent().unwrap().to_path_buf();
        std::fs::write(build_dir.join("CTestTestfile.cmake"), "# ctest\n").unwrap();
        std::fs::write(build_dir.join("cmake_install.cmake"), "# install\n").unwrap();

        let mut mgr = manager(&fixture, fixture.options(), &mock());
        mgr.setup_paths_and_dirs().unwrap();
        mgr.publish().unwrap();

        let published = fixture.prefix().join(host_name);
        assert_eq!(std::fs::read_to_string(published).unwrap(), "# host-config\n");
        assert!(!fixture.prefix().join("CTestTestfile.cmake").exists());
        assert!(!fixture.prefix().join("cmake_install.cmake").exists());
        assert!(!build_dir.exists());
    }

    #[test]
    fn test_publish_dev_build_without_output_is_tolerated() {
        let fixture = ProjectFixture::new();
        let mut mgr = manager(&fixture, fixture.options(), &mock());
        mgr.setup_paths_and_dirs().unwrap();
        mgr.publish().unwrap();
    }

    #[test]
    fn test_create_mirror_returns_status() {
        let fixture = ProjectFixture::new();
        let exec = Arc::new(MockExecutor::new());
        exec.expect_contains("mirror create", MockProcessOutput::failure(3, ""));

        let mut mgr = manager(&fixture, fixture.options(), &exec);
        let err = mgr.create_mirror().unwrap_err();
        assert!(err.to_string().contains("requires a mirror directory"));

        let opts = WorkflowOptions {
            mirror: Some("/srv/mirror".into()),
            ..fixture.options()
        };
        let mut mgr = manager(&fixture, opts, &exec);
        assert_eq!(mgr.create_mirror().unwrap(), 3);
        assert!(exec
            .calls()
            .last()
            .unwrap()
            .ends_with("mirror create -d /srv/mirror --dependencies demo@1.0.0%gcc"));
    }

    #[test]
    fn test_use_mirror_replaces_changed_path() {
        let fixture = ProjectFixture::new();
        let exec = Arc::new(MockExecutor::new());
        exec.expect_contains(
            "mirror list",
            MockProcessOutput::success("demo  [sb] file:///old/mirror\n"),
        );
        exec.set_default(MockProcessOutput::success(""));

        let opts = WorkflowOptions {
            mirror: Some("/srv/mirror".into()),
            ..fixture.options()
        };
        let mut mgr = manager(&fixture, opts, &exec);
        mgr.use_mirror().unwrap();
        assert!(exec.called_with("mirror remove --scope=defaults demo"));
        assert!(exec.called_with("mirror add --scope=defaults demo /srv/mirror"));
    }

    #[test]
    fn test_use_mirror_keeps_matching_registration() {
        let fixture = ProjectFixture::new();
        let exec = Arc::new(MockExecutor::new());
        exec.expect_contains(
            "mirror list",
            MockProcessOutput::success("demo  [sb] file:///srv/mirror\n"),
        );

        let opts = WorkflowOptions {
            mirror: Some("/srv/mirror".into()),
            ..fixture.options()
        };
        let mut mgr = manager(&fixture, opts, &exec);
        mgr.use_mirror().unwrap();
        assert_eq!(exec.calls().len(), 1);
    }

    #[test]
    fn test_use_upstream_writes_defaults_scope() {
        let fixture = ProjectFixture::new();
        let opts = WorkflowOptions {
            upstream: Some(PathBuf::from("/opt/upstream/opt/spack")),
            ..fixture.options()
        };
        let exec = mock();
        let mut mgr = manager(&fixture, opts, &exec);
        mgr.use_upstream().unwrap();

        let file = fixture
            .prefix()
            .join("spack/etc/spack/defaults")
            .join(UPSTREAMS_FILE);
        assert_eq!(
            std::fs::read_to_string(file).unwrap(),
            "upstreams:\n  demo:\n    install_tree: /opt/upstream/opt/spack\n"
        );
        assert!(exec.called_with("config get upstreams"));
    }

    #[test]
    fn test_list_setting() {
        assert_eq!(list_setting(&[], Some("cmake  perl")), vec!["cmake", "perl"]);
        assert_eq!(list_setting(&["zlib".into()], Some("cmake")), vec!["zlib"]);
        assert!(list_setting(&[], None).is_empty());
    }
}
