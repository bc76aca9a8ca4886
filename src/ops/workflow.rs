//! The uberenv run: load the project, pick a backend, walk the lifecycle.

use std::sync::Arc;

use anyhow::Result;

use crate::core::options::WorkflowOptions;
use crate::core::settings::{find_project_config, ProjectSettings};
use crate::manager::{self, ManagerContext, PackageManager};
use crate::util::platform::Platform;
use crate::util::process::Executor;

/// Run uberenv for the host platform.
///
/// Returns the process exit status: 0 on success, or the manager's own
/// status for a mirror-create run. Fatal conditions are errors.
pub fn run(opts: WorkflowOptions, exec: Arc<dyn Executor>) -> Result<i32> {
    run_on(opts, exec, Platform::detect())
}

/// [`run`] with an explicit platform.
pub fn run_on(opts: WorkflowOptions, exec: Arc<dyn Executor>, platform: Platform) -> Result<i32> {
    let settings_path = find_project_config(&opts.project_json(), &opts.invocation_dir)?;
    tracing::info!("project settings: {}", settings_path.display());

    let settings = ProjectSettings::load(&settings_path)?;
    tracing::debug!("{:#?}", settings);
    tracing::debug!("{:#?}", opts);

    let ctx = ManagerContext::new(opts, settings, &settings_path, platform, exec)?;
    let mut manager = manager::create(ctx)?;
    execute(manager.as_mut())
}

/// Walk the lifecycle on `manager`, honoring the checkpoint options.
pub fn execute(manager: &mut dyn PackageManager) -> Result<i32> {
    let opts = manager.context().opts.clone();

    manager.setup_paths_and_dirs()?;

    if opts.skip_setup || opts.skip_setup_and_env {
        tracing::info!("skipping {} setup", manager.kind());
    } else {
        manager.acquire()?;
        manager.prepare()?;
        if opts.setup_only {
            tracing::info!("{} setup complete", manager.kind());
            return Ok(0);
        }
        manager.clean()?;
    }

    if opts.skip_setup_and_env {
        tracing::info!("skipping environment creation");
    } else {
        manager.create_environment()?;
        if opts.setup_and_env_only {
            tracing::info!("{} setup and environment creation complete", manager.kind());
            return Ok(0);
        }
    }

    if opts.create_mirror {
        return manager.create_mirror();
    }

    if manager.context().mirror().is_some() {
        manager.use_mirror()?;
    }
    if manager.context().upstream().is_some() {
        manager.use_upstream()?;
    }

    manager.concretize()?;
    manager.show_info()?;
    manager.install()?;
    manager.publish()?;
    Ok(0)
}
