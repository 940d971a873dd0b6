//! Blocking execution of external tools.
//!
//! Every external call (gcloud, git, terraform, the generated shell
//! scripts) runs synchronously to completion. A non-zero exit aborts the
//! whole run; there is no retry policy.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::ProcessError;

/// Executes a shell command, streaming output to the parent's stdio.
///
/// `to_null` silences stdout (stderr is always kept for diagnostics).
pub fn execute(command: &str, cwd: Option<&Path>, to_null: bool) -> Result<(), ProcessError> {
    debug!(command, "executing external process");
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    if to_null {
        cmd.stdout(Stdio::null());
    }
    let status = cmd.status().map_err(|source| ProcessError::Spawn {
        command: command.to_string(),
        source,
    })?;
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ProcessError::NonZeroExit {
            command: command.to_string(),
            code,
        }),
        None => Err(ProcessError::Terminated {
            command: command.to_string(),
        }),
    }
}

/// Executes a shell command and captures its stdout as a string.
pub fn execute_with_output(command: &str, cwd: Option<&Path>) -> Result<String, ProcessError> {
    debug!(command, "executing external process (captured)");
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd.output().map_err(|source| ProcessError::Spawn {
        command: command.to_string(),
        source,
    })?;
    if !output.status.success() {
        return match output.status.code() {
            Some(code) => Err(ProcessError::NonZeroExit {
                command: command.to_string(),
                code,
            }),
            None => Err(ProcessError::Terminated {
                command: command.to_string(),
            }),
        };
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_success() {
        execute("true", None, true).expect("true exits zero");
    }

    #[test]
    fn test_execute_nonzero_exit_is_fatal() {
        let err = execute("exit 3", None, true).expect_err("exit 3 must fail");
        match err {
            ProcessError::NonZeroExit { code, .. } => assert_eq!(code, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_execute_with_output_captures_stdout() {
        let out = execute_with_output("echo forge", None).expect("echo succeeds");
        assert_eq!(out.trim(), "forge");
    }
}
