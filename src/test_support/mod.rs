//! Test utilities and mocks for uberenv unit tests.
//!
//! The workflow only talks to the outside world through [`Executor`], so a
//! scripted executor plus a temporary directory is enough to drive every
//! lifecycle step.
//!
//! # Example
//!
//! ```rust,ignore
//! use uberenv::test_support::{MockExecutor, MockProcessOutput};
//!
//! let exec = MockExecutor::new();
//! exec.expect_contains("spack --version", MockProcessOutput::success("0.21.0"));
//! exec.set_default(MockProcessOutput::success(""));
//! ```

pub mod fixtures;

use std::sync::Mutex;

use anyhow::{bail, Result};

use crate::util::process::{CommandOutput, Executor, ProcessBuilder};

pub use fixtures::*;

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success).
    pub status: i32,
    /// Merged stdout/stderr text.
    pub text: String,
}

impl MockProcessOutput {
    /// Create a successful output with the given text.
    pub fn success(text: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            text: text.into(),
        }
    }

    /// Create a failure output with the given text and status code.
    pub fn failure(status: i32, text: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            text: text.into(),
        }
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

/// Pattern for matching commands in MockExecutor.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command contains substring.
    Contains(String),
}

impl CommandPattern {
    /// Check if this pattern matches the given command.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::Contains(s) => cmd.contains(s),
        }
    }
}

#[derive(Debug)]
struct Expectation {
    pattern: CommandPattern,
    output: MockProcessOutput,
}

#[derive(Debug, Default)]
struct MockState {
    expectations: Vec<Expectation>,
    calls: Vec<String>,
    default_output: Option<MockProcessOutput>,
}

/// Mock process executor for testing command execution.
///
/// Commands are matched by their display form (`program arg1 arg2 ...`);
/// the first matching expectation wins. Every executed command is recorded.
#[derive(Debug, Default)]
pub struct MockExecutor {
    state: Mutex<MockState>,
}

impl MockExecutor {
    /// Create a new mock executor.
    pub fn new() -> Self {
        MockExecutor::default()
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&self, cmd: &str, output: MockProcessOutput) -> &Self {
        self.push(CommandPattern::Exact(cmd.to_string()), output)
    }

    /// Add an expectation for a command containing a substring.
    pub fn expect_contains(&self, substring: &str, output: MockProcessOutput) -> &Self {
        self.push(CommandPattern::Contains(substring.to_string()), output)
    }

    /// Set a default output for commands that don't match any expectation.
    pub fn set_default(&self, output: MockProcessOutput) -> &Self {
        self.lock().default_output = Some(output);
        self
    }

    /// Get all commands that were called.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Whether any recorded command contains `substring`.
    pub fn called_with(&self, substring: &str) -> bool {
        self.lock().calls.iter().any(|c| c.contains(substring))
    }

    fn push(&self, pattern: CommandPattern, output: MockProcessOutput) -> &Self {
        self.lock().expectations.push(Expectation { pattern, output });
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test poisons the lock; the recorded state is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Executor for MockExecutor {
    fn execute(&self, cmd: &ProcessBuilder, capture: bool, _echo: bool) -> Result<CommandOutput> {
        let full_cmd = cmd.display_command();
        let mut state = self.lock();
        state.calls.push(full_cmd.clone());

        let output = state
            .expectations
            .iter()
            .find(|e| e.pattern.matches(&full_cmd))
            .map(|e| e.output.clone())
            .or_else(|| state.default_output.clone());

        match output {
            Some(out) => Ok(CommandOutput {
                status: out.status,
                text: capture.then_some(out.text),
            }),
            None => bail!("unexpected command: {}", full_cmd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_matches_first_expectation() {
        let exec = MockExecutor::new();
        exec.expect_contains("spack spec", MockProcessOutput::success("first"));
        exec.expect_contains("spec", MockProcessOutput::success("second"));

        let out = exec
            .execute(&ProcessBuilder::new("spack").arg("spec"), true, false)
            .unwrap();
        assert_eq!(out.text(), "first");
    }

    #[test]
    fn test_mock_without_capture_returns_no_text() {
        let exec = MockExecutor::new();
        exec.set_default(MockProcessOutput::failure(2, "boom"));

        let out = exec
            .execute(&ProcessBuilder::new("spack").arg("install"), false, true)
            .unwrap();
        assert_eq!(out.status, 2);
        assert!(out.text.is_none());
        assert!(exec.called_with("spack install"));
    }

    #[test]
    fn test_mock_rejects_unexpected_command() {
        let exec = MockExecutor::new();
        assert!(exec
            .execute(&ProcessBuilder::new("rm").arg("-rf"), false, false)
            .is_err());
    }
}
