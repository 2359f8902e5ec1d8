//! Test utilities and mocks for coverscope unit tests.
//!
//! The external toolchain is reached only through [`ProcessRunner`], so
//! tests script its behaviour with [`MockRunner`] instead of requiring a Go
//! installation.
//!
//! # Example
//!
//! ```rust,ignore
//! use coverscope::test_support::{MockRunner, MockProcessOutput};
//!
//! #[test]
//! fn test_example() {
//!     let runner = MockRunner::new();
//!     runner.expect_contains("go list", MockProcessOutput::success("{}"));
//!
//!     // Pass `&runner` wherever a `&dyn ProcessRunner` is expected...
//! }
//! ```

pub mod fixtures;

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};

use crate::util::process::{ProcessBuilder, ProcessOutput, ProcessRunner};

pub use fixtures::*;

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success).
    pub status: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Create a failure output with the given stderr and status code.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

impl From<MockProcessOutput> for ProcessOutput {
    fn from(mock: MockProcessOutput) -> Self {
        ProcessOutput {
            code: Some(mock.status),
            stdout: mock.stdout.into_bytes(),
            stderr: mock.stderr.into_bytes(),
        }
    }
}

/// Pattern for matching commands in [`MockRunner`].
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on the displayed command.
    Exact(String),
    /// Match if the command starts with a prefix.
    StartsWith(String),
    /// Match if the command contains a substring.
    Contains(String),
    /// Match using a regex pattern.
    Regex(String),
}

impl CommandPattern {
    /// Check if this pattern matches the given command.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
            CommandPattern::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(cmd))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone)]
struct Expectation {
    pattern: CommandPattern,
    output: MockProcessOutput,
    times: Option<usize>,
    used: usize,
}

impl Expectation {
    fn available(&self) -> bool {
        self.times.map_or(true, |n| self.used < n)
    }
}

#[derive(Debug, Default)]
struct RunnerState {
    expectations: Vec<Expectation>,
    calls: Vec<ProcessBuilder>,
}

/// Scripted [`ProcessRunner`].
///
/// Matches each command's displayed form against the registered
/// expectations in order and records every call for later inspection.
#[derive(Debug, Default)]
pub struct MockRunner {
    state: Mutex<RunnerState>,
}

impl MockRunner {
    /// Create a runner with no expectations.
    pub fn new() -> Self {
        MockRunner::default()
    }

    fn state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, pattern: CommandPattern, output: MockProcessOutput, times: Option<usize>) {
        self.state().expectations.push(Expectation {
            pattern,
            output,
            times,
            used: 0,
        });
    }

    /// Expect an exact command.
    pub fn expect(&self, cmd: &str, output: MockProcessOutput) -> &Self {
        self.push(CommandPattern::Exact(cmd.to_string()), output, None);
        self
    }

    /// Expect a command starting with `prefix`.
    pub fn expect_prefix(&self, prefix: &str, output: MockProcessOutput) -> &Self {
        self.push(CommandPattern::StartsWith(prefix.to_string()), output, None);
        self
    }

    /// Expect a command containing `substring`.
    pub fn expect_contains(&self, substring: &str, output: MockProcessOutput) -> &Self {
        self.push(CommandPattern::Contains(substring.to_string()), output, None);
        self
    }

    /// Expect a command matching `pattern` at most `times` times.
    pub fn expect_times(&self, pattern: CommandPattern, output: MockProcessOutput, times: usize) -> &Self {
        self.push(pattern, output, Some(times));
        self
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<ProcessBuilder> {
        self.state().calls.clone()
    }

    /// Verify that every counted expectation was used exactly its count.
    pub fn verify(&self) -> Result<()> {
        for (i, exp) in self.state().expectations.iter().enumerate() {
            if let Some(expected) = exp.times {
                if exp.used != expected {
                    bail!(
                        "expectation {} was used {} times, expected {}",
                        i,
                        exp.used,
                        expected
                    );
                }
            }
        }
        Ok(())
    }
}

impl ProcessRunner for MockRunner {
    fn run(&self, cmd: &ProcessBuilder) -> Result<ProcessOutput> {
        let line = cmd.display_command();
        let mut state = self.state();
        state.calls.push(cmd.clone());

        for exp in &mut state.expectations {
            if exp.available() && exp.pattern.matches(&line) {
                exp.used += 1;
                return Ok(exp.output.clone().into());
            }
        }

        bail!("unexpected command: {}", line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_runner_matches_in_order() {
        let runner = MockRunner::new();
        runner
            .expect_times(
                CommandPattern::StartsWith("/bin/bash -c go list".into()),
                MockProcessOutput::failure(1, "first"),
                1,
            )
            .expect_contains("go list", MockProcessOutput::success("second"));

        let cmd = ProcessBuilder::shell("go list -json ./...");
        let first = runner.run(&cmd).unwrap();
        let second = runner.run(&cmd).unwrap();

        assert_eq!(first.code, Some(1));
        assert_eq!(second.stdout, b"second");
        assert_eq!(runner.calls().len(), 2);
        runner.verify().unwrap();
    }

    #[test]
    fn test_mock_runner_unexpected_command() {
        let runner = MockRunner::new();
        runner.expect("go version", MockProcessOutput::success("go1.22"));

        let err = runner.run(&ProcessBuilder::new("gcc")).unwrap_err();
        assert!(err.to_string().contains("unexpected command: gcc"));
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_regex_pattern() {
        let pattern = CommandPattern::Regex(r"^coverscope-annotate -mode \w+".into());
        assert!(pattern.matches("coverscope-annotate -mode count -var X a.go"));
        assert!(!pattern.matches("go build"));
    }
}
