//! Command execution probe.
//!
//! Runs a command and compares its exit code against the expected one
//! (default 0). Useful for gating on anything a script can express —
//! `pg_isready`, `curl`, a smoke test binary. Output is discarded; only
//! the exit code matters.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use holdup_core::{CheckError, Checker, ExpectedError};

/// Default per-attempt execution timeout.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Exec checker for one command line.
#[derive(Clone, Debug)]
pub struct ExecChecker {
    command: String,
    args: Vec<String>,
    expect_exit_code: i32,
    timeout: Duration,
}

impl ExecChecker {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            expect_exit_code: 0,
            timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    /// Command arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Exit code that counts as ready.
    pub fn with_expect_exit_code(mut self, code: i32) -> Self {
        self.expect_exit_code = code;
        self
    }

    /// Per-attempt execution timeout; the child is killed on expiry.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Checker for ExecChecker {
    fn kind(&self) -> &'static str {
        "Exec"
    }

    fn identity(&self) -> Result<String, CheckError> {
        if self.args.is_empty() {
            return Ok(self.command.clone());
        }
        Ok(format!("{} {}", self.command, self.args.join(" ")))
    }

    async fn check(&self) -> Result<(), CheckError> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // Dropping the attempt (waiter cancellation, timeout) must
            // reap the child rather than leak it.
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return Err(ExpectedError::new("failed to execute command")
                    .with_cause(err)
                    .with_detail("command", &self.command)
                    .with_detail("args", self.args.join(" "))
                    .into());
            }
        };

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => return Err(CheckError::fatal(err)),
            Err(_elapsed) => {
                return Err(ExpectedError::new("command timed out")
                    .with_detail("command", &self.command)
                    .with_detail("timeout", format!("{:?}", self.timeout))
                    .into());
            }
        };

        // A signal-terminated child has no exit code; report the
        // conventional -1 the way shells report "killed".
        let exit_code = status.code().unwrap_or(-1);
        if exit_code != self.expect_exit_code {
            return Err(ExpectedError::new("command exited with unexpected code")
                .with_detail("command", &self.command)
                .with_detail("args", self.args.join(" "))
                .with_detail("actual", exit_code.to_string())
                .with_detail("expect", self.expect_exit_code.to_string())
                .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected(err: CheckError) -> ExpectedError {
        match err {
            CheckError::Expected(e) => e,
            other => panic!("expected an expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_exit_is_ready() {
        ExecChecker::new("true").check().await.unwrap();
    }

    #[tokio::test]
    async fn nonzero_exit_is_expected_failure() {
        let err = ExecChecker::new("false").check().await.unwrap_err();

        let err = expected(err);
        assert_eq!(err.to_string(), "command exited with unexpected code");
        let details = err.details().to_string();
        assert!(details.contains("actual=1"));
        assert!(details.contains("expect=0"));
    }

    #[tokio::test]
    async fn expected_exit_code_can_be_nonzero() {
        ExecChecker::new("sh")
            .with_args(vec!["-c".to_string(), "exit 3".to_string()])
            .with_expect_exit_code(3)
            .check()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_command_is_expected_failure() {
        let err = ExecChecker::new("holdup-no-such-binary")
            .check()
            .await
            .unwrap_err();

        assert_eq!(expected(err).to_string(), "failed to execute command");
    }

    #[tokio::test]
    async fn long_running_command_times_out() {
        let err = ExecChecker::new("sleep")
            .with_args(vec!["30".to_string()])
            .with_timeout(Duration::from_millis(100))
            .check()
            .await
            .unwrap_err();

        assert_eq!(expected(err).to_string(), "command timed out");
    }

    #[test]
    fn identity_joins_the_command_line() {
        let bare = ExecChecker::new("pg_isready");
        assert_eq!(bare.identity().unwrap(), "pg_isready");

        let with_args = ExecChecker::new("pg_isready")
            .with_args(vec!["-h".to_string(), "db.internal".to_string()]);
        assert_eq!(with_args.identity().unwrap(), "pg_isready -h db.internal");
    }

    #[test]
    fn options_last_write_wins() {
        let checker = ExecChecker::new("true")
            .with_expect_exit_code(1)
            .with_expect_exit_code(2);
        assert_eq!(checker.expect_exit_code, 2);
    }
}
