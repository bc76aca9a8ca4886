//! Interpreters for the package manager's textual output.
//!
//! The managers expose no structured API for the answers the workflow
//! needs, so each expected output shape gets one pure function here. Each
//! documents the grammar it accepts and returns `None` (or an empty value)
//! when the text does not match.

use std::path::PathBuf;

use regex::Regex;

/// Install status of the target package as reported by `spack spec --install-status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStatus {
    /// 32 character hash of the concretized spec.
    pub hash: String,
    /// Whether the manager database marks the spec as installed (`[+]`).
    pub installed: bool,
}

/// Find the status line of `package` in `spack spec --install-status --very-long` output.
///
/// Grammar, per line (leading/trailing whitespace ignored):
///
/// ```text
/// <marker>  <hash>  <package>[@%~+^ ...]
/// marker := "[+]" (installed) | "-" (not installed)
/// hash   := 32 chars of [a-z0-9]
/// ```
///
/// For example
/// `[+]  hf3cubkgl74ryc3qwen73kl4yfh2ijgd  serac@develop%clang@10.0.0 arch=darwin-mojave-x86_64`.
/// Dependency lines (`^name`) never match. The first matching line wins.
pub fn parse_install_status(text: &str, package: &str) -> Option<InstallStatus> {
    let pattern = format!(
        r"^(\[\+\]|-)\s+([a-z0-9]{{32}})\s+{}(?:[@%~+\s]|$)",
        regex::escape(package)
    );
    let re = Regex::new(&pattern).ok()?;

    text.lines().find_map(|line| {
        let caps = re.captures(line.trim())?;
        Some(InstallStatus {
            hash: caps[2].to_string(),
            installed: &caps[1] == "[+]",
        })
    })
}

/// Install path of `package` in `spack find -p` output.
///
/// Grammar: section headers (`-- linux-... / gcc@9 ---`) are skipped; a
/// package line is `<package>[@...]  <install path>` and the path is its
/// last whitespace-separated token. The first matching line wins.
pub fn parse_find_path(text: &str, package: &str) -> Option<PathBuf> {
    text.lines().map(str::trim).find_map(|line| {
        let rest = line.strip_prefix(package)?;
        if !(rest.starts_with('@') || rest.starts_with(char::is_whitespace)) {
            return None;
        }
        let mut tokens = line.split_whitespace();
        tokens.next()?;
        tokens.last().map(PathBuf::from)
    })
}

/// One entry of `spack mirror list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub name: String,
    pub url: String,
}

/// Parse `spack mirror list` output.
///
/// Grammar, per non-empty line: `<name> [<flags>] <url>`, where the
/// optional flags column (e.g. `[sb]`) appears in newer manager versions.
/// The URL is the last token.
pub fn parse_mirror_list(text: &str) -> Vec<MirrorEntry> {
    text.lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            Some(MirrorEntry {
                name: tokens[0].to_string(),
                url: tokens[tokens.len() - 1].to_string(),
            })
        })
        .collect()
}

/// Location of the mirror registered as `name`, with any `file://` scheme removed.
pub fn find_mirror(text: &str, name: &str) -> Option<String> {
    parse_mirror_list(text)
        .into_iter()
        .rev()
        .find(|m| m.name == name)
        .map(|m| strip_file_scheme(&m.url).to_string())
}

/// `file:///a/b` -> `/a/b`; anything else is returned unchanged.
pub fn strip_file_scheme(url: &str) -> &str {
    url.strip_prefix("file://").unwrap_or(url)
}

/// Install tree of the upstream registered as `name` in `spack config get upstreams`.
///
/// The lookup this replaces only parsed the output when it was both empty
/// and contained `upstreams:`, which cannot happen, so it never found a
/// registration. That observable behavior is kept: the result is always
/// `None` and callers rewrite the upstreams file unconditionally.
pub fn find_upstream(_text: &str, _name: &str) -> Option<PathBuf> {
    None
}

/// Concretizer flags the installed manager understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConcretizerSupport {
    pub reuse: bool,
    pub fresh: bool,
}

impl ConcretizerSupport {
    /// Read support from the manager's help text for `concretize`.
    pub fn from_help(text: &str) -> Self {
        let has_flag = |flag: &str| {
            text.split(|c: char| c.is_whitespace() || c == ',' || c == '[' || c == ']')
                .any(|token| token == flag)
        };
        ConcretizerSupport {
            reuse: has_flag("--reuse"),
            fresh: has_flag("--fresh"),
        }
    }

    /// The flag to pass for a given reuse preference.
    ///
    /// `--reuse` only when asked for and supported; otherwise `--fresh`
    /// when supported; otherwise nothing.
    pub fn select(self, reuse_requested: bool) -> Option<&'static str> {
        if reuse_requested && self.reuse {
            Some("--reuse")
        } else if self.fresh {
            Some("--fresh")
        } else {
            None
        }
    }
}

/// First non-empty line of `--version` output.
pub fn parse_version(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
}
