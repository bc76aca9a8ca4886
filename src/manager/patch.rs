//! In-place patching of the acquired Spack checkout.
//!
//! Uberenv forces Spack to read only its `defaults` configuration scope so
//! that a user's `~/.spack` or a site configuration cannot leak into the
//! build. Spack has no switch for this, so its `config.py` is rewritten.
//! Two layouts are recognised, tried in order; a file matching neither is
//! an error rather than a silent no-op, because it means Spack's internals
//! moved and the isolation would be lost.

use std::path::Path;

use anyhow::Result;

use crate::core::error::UberenvError;
use crate::util::fs::{read_to_string, write_string};

/// Environment-driven switch found in newer Spack versions.
const DISABLE_LOCAL_CONFIG: &str =
    "disable_local_config = \"SPACK_DISABLE_LOCAL_CONFIG\" in os.environ";
const DISABLE_LOCAL_CONFIG_PATCHED: &str = "disable_local_config = True";

/// Scope registrations found in older Spack versions.
const SCOPE_STATEMENTS: [&str; 3] = [
    "('system', os.path.join(spack.paths.system_etc_path, 'spack')),",
    "('site', os.path.join(spack.paths.etc_path, 'spack')),",
    "('user', spack.paths.user_config_path)",
];
const DISABLED_MARKER: &str = "#DISABLED BY UBERENV: ";

/// Outcome of applying the config scope patch to a file's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The text was changed; the new contents are attached.
    Applied(String),
    /// The patch is already present; nothing to write.
    AlreadyApplied,
    /// Neither known layout was found.
    Unrecognized,
}

/// Disable every configuration scope except `defaults` in Spack's `config.py` text.
pub fn disable_config_scopes(text: &str) -> PatchOutcome {
    if text.contains(DISABLE_LOCAL_CONFIG) {
        return PatchOutcome::Applied(
            text.replace(DISABLE_LOCAL_CONFIG, DISABLE_LOCAL_CONFIG_PATCHED),
        );
    }
    if text.contains(DISABLE_LOCAL_CONFIG_PATCHED) {
        return PatchOutcome::AlreadyApplied;
    }

    let mut patched = text.to_string();
    let mut changed = false;
    let mut seen = false;
    for stmt in SCOPE_STATEMENTS {
        let disabled = format!("{}{}", DISABLED_MARKER, stmt);
        if patched.contains(&disabled) {
            seen = true;
        } else if patched.contains(stmt) {
            patched = patched.replace(stmt, &disabled);
            seen = true;
            changed = true;
        }
    }

    match (seen, changed) {
        (_, true) => PatchOutcome::Applied(patched),
        (true, false) => PatchOutcome::AlreadyApplied,
        (false, false) => PatchOutcome::Unrecognized,
    }
}

/// Ensure the scope patch is applied to the `config.py` at `path`.
pub fn ensure_config_scopes_disabled(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(UberenvError::PatchFailed {
            path: path.to_path_buf(),
            message: "file does not exist".to_string(),
        }
        .into());
    }

    let text = read_to_string(path)?;
    match disable_config_scopes(&text) {
        PatchOutcome::Applied(patched) => {
            tracing::info!("disabling config scopes (except defaults) in {}", path.display());
            write_string(path, &patched)
        }
        PatchOutcome::AlreadyApplied => {
            tracing::info!("config scopes already disabled in {}", path.display());
            Ok(())
        }
        PatchOutcome::Unrecognized => Err(UberenvError::PatchFailed {
            path: path.to_path_buf(),
            message: "no known config scope layout found; this Spack version is not supported"
                .to_string(),
        }
        .into()),
    }
}
