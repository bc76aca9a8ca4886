//! Acquiring the package manager checkout with git.

use std::path::Path;

use anyhow::Result;
use git2::Repository;

use crate::core::error::UberenvError;
use crate::util::process::{find_executable, Executor, ProcessBuilder};

/// Where and how to clone a manager repository.
#[derive(Debug, Clone)]
pub struct CheckoutSpec {
    pub url: String,
    pub branch: String,
    /// Commit the checkout is pinned to
    pub commit: Option<String>,
    /// Clone only the tip of the branch
    pub shallow: bool,
    /// Disable TLS certificate verification
    pub insecure: bool,
    /// Stash and pull after the checkout is in place
    pub pull: bool,
}

/// Current HEAD commit of the repository at `path`, if it can be read.
pub fn head_commit(path: &Path) -> Option<String> {
    let repo = Repository::open(path).ok()?;
    let commit = repo.head().ok()?.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}

fn git(insecure: bool) -> ProcessBuilder {
    let cmd = ProcessBuilder::new("git");
    if insecure {
        cmd.args(["-c", "http.sslVerify=false"])
    } else {
        cmd
    }
}

/// Make `dest` a checkout of `spec`, cloning into `parent` when absent.
///
/// Clone, checkout and pull failures are fatal. Stash results are ignored:
/// there may be nothing to stash.
pub fn acquire(exec: &dyn Executor, parent: &Path, dest: &Path, spec: &CheckoutSpec) -> Result<()> {
    if !dest.is_dir() {
        if find_executable("git").is_none() {
            return Err(UberenvError::acquire("clone", "`git` was not found in PATH").into());
        }

        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkout".to_string());
        tracing::info!(
            "cloning {} branch '{}' into {}",
            spec.url,
            spec.branch,
            dest.display()
        );

        let mut clone = git(spec.insecure).args(["clone", "--single-branch"]);
        if spec.shallow {
            clone = clone.arg("--depth=1");
        }
        let clone = clone
            .args(["-b", &spec.branch, &spec.url, &name])
            .cwd(parent);
        let out = exec.execute(&clone, false, true)?;
        if !out.success() {
            return Err(UberenvError::acquire(
                "clone",
                format!("git exited with status {} cloning {}", out.status, spec.url),
            )
            .into());
        }
    }

    if let Some(ref sha) = spec.commit {
        pin_commit(exec, dest, sha, spec.insecure)?;
    }

    if spec.pull {
        pull(exec, dest)?;
    }

    Ok(())
}

/// Check out `sha` unless HEAD already points at it.
fn pin_commit(exec: &dyn Executor, repo: &Path, sha: &str, insecure: bool) -> Result<()> {
    if head_commit(repo).as_deref() == Some(sha) {
        tracing::info!("checkout already at commit {}", sha);
        return Ok(());
    }

    tracing::info!("using commit {}", sha);
    exec.execute(&git(false).arg("stash").cwd(repo), false, true)?;
    exec.execute(
        &git(insecure)
            .args(["fetch", "--depth=1", "origin", sha])
            .cwd(repo),
        false,
        true,
    )?;
    let out = exec.execute(&git(false).args(["checkout", sha]).cwd(repo), false, true)?;
    if !out.success() {
        // Usually untracked files that would be overwritten
        return Err(UberenvError::acquire(
            "checkout",
            format!("git failed to checkout {} in {}", sha, repo.display()),
        )
        .into());
    }
    Ok(())
}

fn pull(exec: &dyn Executor, repo: &Path) -> Result<()> {
    exec.execute(&git(false).arg("stash").cwd(repo), false, true)?;
    let out = exec.execute(&git(false).arg("pull").cwd(repo), false, true)?;
    if !out.success() {
        return Err(UberenvError::acquire(
            "pull",
            format!(
                "git failed to pull in {} (local modifications may conflict)",
                repo.display()
            ),
        )
        .into());
    }
    Ok(())
}
