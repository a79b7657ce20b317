//! External command execution
//!
//! Both the video source (`yt-dlp`) and the archive backend (`ia`) are driven
//! as subprocesses. Children are spawned with `kill_on_drop` so a caller that
//! abandons the future on a deadline also terminates the process.

use crate::types::{SourceError, StorageError};
use std::ffi::OsStr;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Subprocess failure
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to run {command}: {message}")]
    Spawn { command: String, message: String },

    #[error("{command} exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Run `program` with `args`, returning captured stdout on success
pub async fn run<I, S>(program: &str, args: I) -> Result<String, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    debug!(command = program, args = ?args, "Running external command");

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ProcessError::Spawn {
            command: program.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ProcessError::Failed {
            command: program.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl From<ProcessError> for SourceError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn { command, message } => SourceError::Spawn { command, message },
            ProcessError::Failed {
                command, stderr, ..
            } => SourceError::CommandFailed { command, stderr },
        }
    }
}

impl From<ProcessError> for StorageError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn { command, message } => StorageError::Spawn { command, message },
            ProcessError::Failed {
                command, stderr, ..
            } => StorageError::CommandFailed { command, stderr },
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = run("sh", ["-c", "printf 'abc\\ndef'"]).await.unwrap();
        assert_eq!(out, "abc\ndef");
    }

    #[tokio::test]
    async fn test_run_reports_failure_with_stderr() {
        let err = run("sh", ["-c", "echo boom >&2; exit 3"]).await.unwrap_err();
        match err {
            ProcessError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let err = run("tubecast-definitely-not-installed", ["--version"])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(matches!(SourceError::from(err), SourceError::Spawn { .. }));
    }
}
