//! Host platform detection.
//!
//! The detected platform only picks which configuration subdirectory of
//! `spack_configs` applies and which backend runs; it never changes the
//! shape of the workflow.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::core::error::UberenvError;
use crate::util::process::{Executor, ProcessBuilder};

/// Environment variable naming the cluster system type.
pub const SYS_TYPE_VAR: &str = "SYS_TYPE";

/// Directory holding the installed macOS SDKs.
pub const MACOS_SDK_DIR: &str =
    "/Applications/Xcode.app/Contents/Developer/Platforms/MacOSX.platform/Developer/SDKs";

/// Host classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    /// macOS.
    Darwin,
    /// A Unix-like host tagged with a cluster system type (lowercased).
    SysType(String),
    /// A Unix-like host with no further tag.
    GenericUnix,
    /// Windows.
    Windows,
}

impl Platform {
    /// Detect the platform of the running host.
    pub fn detect() -> Self {
        Self::from_parts(std::env::consts::OS, std::env::var(SYS_TYPE_VAR).ok())
    }

    /// Classify an OS name plus an optional `SYS_TYPE` value.
    pub fn from_parts(os: &str, sys_type: Option<String>) -> Self {
        let os = os.to_lowercase();
        if os.contains("windows") {
            Platform::Windows
        } else if os.contains("macos") || os.contains("darwin") {
            Platform::Darwin
        } else {
            match sys_type {
                Some(tag) if !tag.trim().is_empty() => Platform::SysType(tag.trim().to_lowercase()),
                _ => Platform::GenericUnix,
            }
        }
    }

    /// Name of the configuration subdirectory for this platform, if any.
    pub fn config_subdir(&self) -> Option<&str> {
        match self {
            Platform::Darwin => Some("darwin"),
            Platform::SysType(tag) => Some(tag),
            Platform::GenericUnix | Platform::Windows => None,
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }

    pub fn is_darwin(&self) -> bool {
        matches!(self, Platform::Darwin)
    }

    /// Compiler qualifier used when the caller gives no spec.
    pub fn default_compiler(&self) -> &'static str {
        if self.is_darwin() {
            "%clang"
        } else {
            "%gcc"
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Darwin => write!(f, "darwin"),
            Platform::SysType(tag) => write!(f, "{}", tag),
            Platform::GenericUnix => write!(f, "unix"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}

/// Host name used in published artifact names.
pub fn hostname() -> String {
    whoami::fallible::hostname().unwrap_or_else(|e| {
        tracing::warn!("could not read host name: {}", e);
        "localhost".to_string()
    })
}

/// Quick connectivity probe: a TCP connect to a public DNS resolver.
///
/// Any failure (timeout, refusal, no route) counts as "no internet".
pub fn have_internet() -> bool {
    let addr = SocketAddr::from(([8, 8, 8, 8], 53));
    TcpStream::connect_timeout(&addr, Duration::from_secs(3)).is_ok()
}

/// Installed macOS SDKs keyed by their short version (e.g. `14.2`).
pub fn find_macos_sdks(sdk_dir: &Path) -> BTreeMap<String, PathBuf> {
    let mut sdks = BTreeMap::new();
    let Ok(entries) = std::fs::read_dir(sdk_dir) else {
        return sdks;
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(version) = name
            .strip_prefix("MacOSX")
            .and_then(|rest| rest.strip_suffix(".sdk"))
        {
            if !version.is_empty() {
                sdks.insert(version.to_string(), entry.path());
            }
        }
    }
    sdks
}

/// Drop the last component of a dotted version (`10.11.6` -> `10.11`).
fn short_version(version: &str) -> &str {
    match version.rfind('.') {
        Some(idx) if version[..idx].contains('.') => &version[..idx],
        _ => version,
    }
}

/// Pick the SDK for `os_version` and return the environment that selects it.
///
/// Prefers the SDK matching the running OS; otherwise falls back to the
/// first SDK found.
pub fn macos_sdk_env(
    os_version: &str,
    sdks: &BTreeMap<String, PathBuf>,
) -> Result<BTreeMap<String, String>> {
    let os_version = os_version.trim();
    let short = short_version(os_version);

    let (target, root) = match sdks.get(short) {
        Some(root) => (os_version.to_string(), root),
        None => match sdks.iter().next() {
            Some((version, root)) => (version.clone(), root),
            None => {
                return Err(UberenvError::Config {
                    message: format!("could not find a macOS SDK in {}", MACOS_SDK_DIR),
                }
                .into())
            }
        },
    };

    let mut env = BTreeMap::new();
    env.insert("MACOSX_DEPLOYMENT_TARGET".to_string(), target);
    env.insert("SDKROOT".to_string(), root.display().to_string());
    Ok(env)
}

/// Detect the SDK settings of the running macOS host.
pub fn detect_macos_sdk_env(exec: &dyn Executor) -> Result<BTreeMap<String, String>> {
    let out = exec.execute(
        &ProcessBuilder::new("sw_vers").arg("-productVersion"),
        true,
        false,
    )?;
    let env = macos_sdk_env(out.text(), &find_macos_sdks(Path::new(MACOS_SDK_DIR)))?;
    for (key, value) in &env {
        tracing::info!("setting {} to {}", key, value);
    }
    Ok(env)
}
