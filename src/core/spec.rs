//! Build modes and package specifications.

use std::fmt;
use std::str::FromStr;

use crate::core::error::UberenvError;

/// How the manager is asked to build the target package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Build only the dependencies; the package itself is built from its
    /// local source tree (registered with the manager as a develop path).
    #[default]
    DevBuild,
    /// Install a stand-in `uberenv-<name>` package that pulls in the deps.
    UberenvPkg,
    /// Install the package itself.
    Install,
}

impl BuildMode {
    /// Modes that leave an installed package to publish from.
    pub fn is_install_like(self) -> bool {
        matches!(self, BuildMode::Install | BuildMode::UberenvPkg)
    }
}

impl FromStr for BuildMode {
    type Err = UberenvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev-build" => Ok(BuildMode::DevBuild),
            "uberenv-pkg" => Ok(BuildMode::UberenvPkg),
            "install" => Ok(BuildMode::Install),
            _ => Err(UberenvError::config(format!(
                "unsupported build mode '{}'; expected 'dev-build', 'uberenv-pkg', or 'install'",
                s
            ))),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildMode::DevBuild => "dev-build",
            BuildMode::UberenvPkg => "uberenv-pkg",
            BuildMode::Install => "install",
        };
        write!(f, "{}", s)
    }
}

/// Resolve the effective build mode. `--install` always wins.
pub fn resolve_build_mode(
    install_flag: bool,
    requested: Option<&str>,
) -> Result<BuildMode, UberenvError> {
    if install_flag {
        return Ok(BuildMode::Install);
    }
    match requested {
        Some(s) => s.parse(),
        None => Ok(BuildMode::DevBuild),
    }
}

/// A package name plus its version/compiler/variant qualifiers,
/// e.g. `demo` + `@1.0.0%gcc+mpi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specification {
    package: String,
    qualifiers: String,
}

impl Specification {
    /// Build a specification from the package name, its version, and the
    /// caller's qualifier string.
    ///
    /// Without a qualifier string the platform's default compiler tag is
    /// used. Qualifiers are prefixed with `@<version>` unless they already
    /// start with `@`.
    pub fn new(
        package: impl Into<String>,
        version: Option<&str>,
        user_spec: Option<&str>,
        default_compiler: &str,
    ) -> Self {
        let version_prefix = version.map(|v| format!("@{}", v)).unwrap_or_default();
        let qualifiers = match user_spec.map(str::trim).filter(|s| !s.is_empty()) {
            None => format!("{}{}", version_prefix, default_compiler),
            Some(s) if s.starts_with('@') => s.to_string(),
            Some(s) => format!("{}{}", version_prefix, s),
        };

        Specification {
            package: package.into(),
            qualifiers,
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Qualifiers only, always starting with `@` when a version is known.
    pub fn qualifiers(&self) -> &str {
        &self.qualifiers
    }
}

impl fmt::Display for Specification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.package, self.qualifiers)
    }
}
