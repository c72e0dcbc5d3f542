//! Bounded external command execution

use crate::types::{CommandOutput, CommandSpec};
use pgcomply_core::{Error, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Run a command, capturing stdout/stderr/exit status. The timeout is a
/// hard bound: on expiry the child is killed and `Error::ProbeTimeout` is
/// returned, so a wedged command can never hang the run or leak a
/// process handle.
pub async fn run(spec: &CommandSpec) -> Result<CommandOutput> {
    debug!("exec: {} (timeout {:?})", spec.display(), spec.timeout);

    let child = Command::new(&spec.command)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::ProbeFailed(format!("cannot spawn {}: {}", spec.display(), e)))?;

    match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        }),
        Ok(Err(e)) => Err(Error::ProbeFailed(format!(
            "{} failed: {}",
            spec.display(),
            e
        ))),
        // kill_on_drop reaps the child when the output future is dropped
        Err(_) => Err(Error::ProbeTimeout {
            operation: spec.display(),
            timeout_secs: spec.timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec(command: &str, args: &[&str], timeout_secs: u64) -> CommandSpec {
        CommandSpec {
            command: command.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit() {
        let out = run(&spec("echo", &["hostssl"], 5)).await.unwrap();
        assert_eq!(out.stdout.trim(), "hostssl");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        // A failing command is still a completed probe; the assertion
        // layer decides what the exit code means.
        let out = run(&spec("false", &[], 5)).await.unwrap();
        assert_ne!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_timeout_produces_probe_timeout() {
        let err = run(&spec("sleep", &["30"], 1)).await.unwrap_err();
        assert!(matches!(err, Error::ProbeTimeout { timeout_secs: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_probe_failed() {
        let err = run(&spec("definitely-not-a-binary", &[], 5)).await.unwrap_err();
        assert!(matches!(err, Error::ProbeFailed(_)));
    }
}
