//! Subprocess execution utilities.
//!
//! Every external command (the package manager, git, bootstrap scripts) is
//! described by a [`ProcessBuilder`] and run through an [`Executor`]. Each
//! builder carries its own working directory, so no step ever changes the
//! working directory of the uberenv process itself.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set several environment variables.
    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the working directory, if one was set.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Get the extra environment variables.
    pub fn get_envs(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Run the command with output streaming to the terminal.
    pub fn status(&self) -> Result<i32> {
        let mut cmd = self.build_command();
        let status = cmd
            .status()
            .with_context(|| format!("failed to execute `{}`", self.display_command()))?;
        Ok(status.code().unwrap_or(-1))
    }

    /// Run the command with stdout and stderr merged into one captured text.
    pub fn exec_merged(&self) -> Result<(i32, String)> {
        let (mut reader, writer) = std::io::pipe().context("failed to create output pipe")?;

        let mut child = {
            let mut cmd = self.build_command();
            cmd.stdin(Stdio::null());
            cmd.stdout(writer.try_clone().context("failed to clone output pipe")?);
            cmd.stderr(writer);
            cmd.spawn()
                .with_context(|| format!("failed to spawn `{}`", self.display_command()))?
            // `cmd` drops here, closing the parent's copies of the write end
        };

        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read output of `{}`", self.display_command()))?;

        let status = child
            .wait()
            .with_context(|| format!("failed to wait for `{}`", self.display_command()))?;

        Ok((
            status.code().unwrap_or(-1),
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    }

    /// Display the command for logs and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Result of running a command through an [`Executor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code; non-zero means failure.
    pub status: i32,
    /// Merged stdout/stderr, present only when output was captured.
    pub text: Option<String>,
}

impl CommandOutput {
    /// Whether the command exited with status zero.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Captured text, or the empty string when nothing was captured.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Runs external commands on behalf of the workflow.
///
/// No retry happens at this layer; callers decide whether a non-zero
/// status is fatal.
pub trait Executor: Send + Sync {
    /// Run `cmd`. When `capture` is set, stdout and stderr are merged and
    /// returned as text; otherwise they stream to the terminal. When `echo`
    /// is set, the command line is logged before it runs.
    fn execute(&self, cmd: &ProcessBuilder, capture: bool, echo: bool) -> Result<CommandOutput>;
}

/// Executor that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

impl Executor for ShellExecutor {
    fn execute(&self, cmd: &ProcessBuilder, capture: bool, echo: bool) -> Result<CommandOutput> {
        if echo {
            tracing::info!("[exe: {}]", cmd.display_command());
        }

        if capture {
            let (status, text) = cmd.exec_merged()?;
            Ok(CommandOutput {
                status,
                text: Some(text),
            })
        } else {
            Ok(CommandOutput {
                status: cmd.status()?,
                text: None,
            })
        }
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("spack").args(["-D", "/tmp/env", "concretize", "--fresh"]);

        assert_eq!(pb.display_command(), "spack -D /tmp/env concretize --fresh");
    }

    #[test]
    fn test_builder_records_cwd_and_env() {
        let pb = ProcessBuilder::new("git")
            .arg("pull")
            .cwd("/opt/spack")
            .env("SDKROOT", "/sdk");

        assert_eq!(pb.get_cwd(), Some(Path::new("/opt/spack")));
        assert_eq!(pb.get_envs().get("SDKROOT").map(String::as_str), Some("/sdk"));
        assert_eq!(pb.get_args(), ["pull"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_merges_stdout_and_stderr() {
        let pb = ProcessBuilder::new("sh").args(["-c", "echo to-out; echo to-err 1>&2; exit 3"]);
        let out = ShellExecutor.execute(&pb, true, false).unwrap();

        assert_eq!(out.status, 3);
        assert!(out.text().contains("to-out"));
        assert!(out.text().contains("to-err"));
    }

    #[cfg(unix)]
    #[test]
    fn test_uncaptured_returns_status_only() {
        let pb = ProcessBuilder::new("sh").args(["-c", "exit 0"]);
        let out = ShellExecutor.execute(&pb, false, false).unwrap();

        assert!(out.success());
        assert!(out.text.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_runs_in_given_cwd() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pb = ProcessBuilder::new("pwd").cwd(tmp.path());
        let out = ShellExecutor.execute(&pb, true, false).unwrap();

        let expected = tmp.path().canonicalize().unwrap();
        let reported = PathBuf::from(out.text().trim()).canonicalize().unwrap();
        assert_eq!(reported, expected);
    }
}
