//! Test fixtures for common test scenarios.
//!
//! A [`ProjectFixture`] lays out a throwaway project the way uberenv finds
//! them on disk: a settings file in the project directory and a
//! destination prefix that already holds a Spack checkout, so no test ever
//! clones anything.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::core::options::WorkflowOptions;
use crate::core::settings::ProjectSettings;
use crate::manager::ManagerContext;
use crate::util::platform::Platform;
use crate::util::process::Executor;

/// Settings used by most tests. Clingo bootstrap is disabled so no test
/// touches the network.
pub const DEMO_SETTINGS: &str =
    r#"{"package_name":"demo","package_version":"1.0.0","spack_setup_clingo":false}"#;

/// `config.py` contents in the layout newer Spack versions ship.
pub const CONFIG_PY: &str = "import os\n\n\
def config_paths():\n    \
    disable_local_config = \"SPACK_DISABLE_LOCAL_CONFIG\" in os.environ\n";

/// A project directory plus a prefix holding a pre-acquired Spack checkout.
#[derive(Debug)]
pub struct ProjectFixture {
    root: TempDir,
}

impl ProjectFixture {
    /// Create a fixture with [`DEMO_SETTINGS`].
    pub fn new() -> Self {
        Self::with_settings(DEMO_SETTINGS)
    }

    /// Create a fixture with the given settings document.
    pub fn with_settings(settings: &str) -> Self {
        let root = TempDir::new().unwrap();
        let fixture = ProjectFixture { root };

        std::fs::create_dir_all(fixture.project_dir()).unwrap();
        std::fs::write(fixture.settings_path(), settings).unwrap();

        let config_py = fixture.config_py();
        std::fs::create_dir_all(config_py.parent().unwrap()).unwrap();
        std::fs::write(&config_py, CONFIG_PY).unwrap();
        fixture
    }

    /// Scratch directory outside the project and the prefix.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root.path().join("project")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.project_dir().join("project.json")
    }

    pub fn prefix(&self) -> PathBuf {
        self.root.path().join("libs")
    }

    pub fn config_py(&self) -> PathBuf {
        self.prefix()
            .join("spack")
            .join("lib")
            .join("spack")
            .join("spack")
            .join("config.py")
    }

    /// Options as the command line would produce them for this project.
    pub fn options(&self) -> WorkflowOptions {
        WorkflowOptions {
            prefix: Some(self.prefix()),
            project_json: Some(self.settings_path()),
            invocation_dir: self.project_dir(),
            ..Default::default()
        }
    }

    /// A generic Unix context over `opts`.
    pub fn context(&self, opts: WorkflowOptions, exec: Arc<dyn Executor>) -> ManagerContext {
        self.context_on(opts, exec, Platform::GenericUnix)
    }

    pub fn context_on(
        &self,
        opts: WorkflowOptions,
        exec: Arc<dyn Executor>,
        platform: Platform,
    ) -> ManagerContext {
        let settings = ProjectSettings::load(&self.settings_path()).unwrap();
        ManagerContext::new(opts, settings, &self.settings_path(), platform, exec).unwrap()
    }

    /// Create a fake install tree for `name` holding one host-config file.
    /// Returns the install directory.
    pub fn installed_package(&self, name: &str, host_config: &str) -> PathBuf {
        let dir = self.root.path().join("opt").join(format!("{}-1.0.0-hash", name));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(host_config), "# host-config\n").unwrap();
        dir
    }

    /// Simulate the build directory a dev-build leaves in the source tree.
    /// Returns the host-config path.
    pub fn dev_build_output(&self, build_dir: &str, host_config: &str) -> PathBuf {
        let dir = self.project_dir().join(build_dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(host_config);
        std::fs::write(&path, "# host-config\n").unwrap();
        path
    }
}

impl Default for ProjectFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash used by the canned `spack spec` outputs.
pub const DEMO_HASH: &str = "hf3cubkgl74ryc3qwen73kl4yfh2ijgd";

/// Canned `spack spec --install-status --very-long` output for `demo`.
pub fn spec_output(installed: bool) -> String {
    let marker = if installed { "[+]" } else { " - " };
    format!(
        "Input spec\n--------------------------------\n -   demo@1.0.0%gcc\n\n\
         Concretized\n--------------------------------\n\
         {marker}  {DEMO_HASH}  demo@1.0.0%gcc@11.4.0 arch=linux-ubuntu22.04-x86_64\n\
         [+]  abcdefghijklmnopqrstuvwxyz012345      ^cmake@3.27.7%gcc@11.4.0 arch=linux-ubuntu22.04-x86_64\n"
    )
}

/// Canned `spack find -p` output locating `demo` at `path`.
pub fn find_output(path: &Path) -> String {
    format!(
        "-- linux-ubuntu22.04-x86_64 / gcc@11.4.0 ------------------------\n\
         demo@1.0.0  {}\n",
        path.display()
    )
}
