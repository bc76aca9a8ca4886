//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;

use uberenv::WorkflowOptions;

/// Uberenv - build a project's third-party libraries with Spack or vcpkg
#[derive(Parser, Debug)]
#[command(name = "uberenv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Install the package itself instead of only its dependencies
    #[arg(long)]
    pub install: bool,

    /// Destination directory [default: uberenv_libs]
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// Spec qualifiers (compiler, variants), e.g. "%gcc@12+mpi"
    #[arg(long)]
    pub spec: Option<String>,

    /// Vcpkg architecture triplet
    #[arg(long)]
    pub triplet: Option<String>,

    /// Mirror location (directory or URL)
    #[arg(long)]
    pub mirror: Option<String>,

    /// Create a mirror of the package sources instead of building
    #[arg(long)]
    pub create_mirror: bool,

    /// Install tree of another Spack instance to use as upstream
    #[arg(long)]
    pub upstream: Option<PathBuf>,

    /// Ask the concretizer to reuse installed packages when supported
    #[arg(long)]
    pub reuse: bool,

    /// Directory with Spack configuration (overrides platform detection)
    #[arg(long)]
    pub spack_config_dir: Option<PathBuf>,

    /// Directory with vcpkg ports
    #[arg(long)]
    pub vcpkg_ports_path: Option<PathBuf>,

    /// Override the package name from the project settings
    #[arg(long)]
    pub package_name: Option<String>,

    /// Build mode: dev-build, uberenv-pkg or install
    #[arg(long)]
    pub spack_build_mode: Option<String>,

    /// Run Spack with --debug --stacktrace
    #[arg(long)]
    pub spack_debug: bool,

    /// Allow Spack to build deprecated packages
    #[arg(long)]
    pub spack_allow_deprecated: bool,

    /// Phase after which the package build stops
    #[arg(long)]
    pub package_final_phase: Option<String>,

    /// Package source directory
    #[arg(long)]
    pub package_source_dir: Option<PathBuf>,

    /// Project settings file [default: project.json]
    #[arg(long)]
    pub project_json: Option<PathBuf>,

    /// Number of parallel build jobs
    #[arg(short = 'j', long = "build-jobs")]
    pub build_jobs: Option<u32>,

    /// Ignore SSL certificate errors
    #[arg(short = 'k', long = "ignore-ssl-errors")]
    pub ignore_ssl_errors: bool,

    /// Pull the latest changes into an existing manager checkout
    #[arg(long = "pull")]
    pub repo_pull: bool,

    /// Force uninstall of the packages listed in `spack_clean_packages`
    #[arg(long = "clean")]
    pub force_clean: bool,

    /// Run the package's tests during an install
    #[arg(long = "run_tests")]
    pub run_tests: bool,

    /// Set up MACOSX_DEPLOYMENT_TARGET and SDKROOT for the installed SDK
    #[arg(long)]
    pub macos_sdk_env_setup: bool,

    /// Stop once the manager is acquired and prepared
    #[arg(long)]
    pub setup_only: bool,

    /// Stop once the environment is created
    #[arg(long)]
    pub setup_and_env_only: bool,

    /// Assume the manager is already acquired and prepared
    #[arg(long)]
    pub skip_setup: bool,

    /// Assume the manager and the environment are already set up
    #[arg(long)]
    pub skip_setup_and_env: bool,

    /// Packages for external discovery (default: all)
    #[arg(long, num_args = 1..)]
    pub spack_externals: Vec<String>,

    /// Paths searched for compilers
    #[arg(long, num_args = 1..)]
    pub spack_compiler_paths: Vec<String>,

    /// Name of the Spack environment directory [default: spack_env]
    #[arg(long)]
    pub spack_env_name: Option<String>,

    /// Spack environment file (spack.yaml)
    #[arg(long)]
    pub spack_env_file: Option<PathBuf>,
}

impl Cli {
    /// Library options before path resolution.
    pub fn into_options(self) -> WorkflowOptions {
        WorkflowOptions {
            install: self.install,
            prefix: self.prefix,
            spec: self.spec,
            triplet: self.triplet,
            mirror: self.mirror,
            create_mirror: self.create_mirror,
            upstream: self.upstream,
            reuse: self.reuse,
            spack_config_dir: self.spack_config_dir,
            vcpkg_ports_path: self.vcpkg_ports_path,
            package_name: self.package_name,
            build_mode: self.spack_build_mode,
            spack_debug: self.spack_debug,
            allow_deprecated: self.spack_allow_deprecated,
            package_final_phase: self.package_final_phase,
            package_source_dir: self.package_source_dir,
            project_json: self.project_json,
            build_jobs: self.build_jobs,
            ignore_ssl_errors: self.ignore_ssl_errors,
            repo_pull: self.repo_pull,
            force_clean: self.force_clean,
            run_tests: self.run_tests,
            macos_sdk_env_setup: self.macos_sdk_env_setup,
            setup_only: self.setup_only,
            setup_and_env_only: self.setup_and_env_only,
            skip_setup: self.skip_setup,
            skip_setup_and_env: self.skip_setup_and_env,
            spack_externals: self.spack_externals,
            spack_compiler_paths: self.spack_compiler_paths,
            spack_env_name: self.spack_env_name,
            spack_env_file: self.spack_env_file,
            invocation_dir: PathBuf::new(),
        }
    }
}
