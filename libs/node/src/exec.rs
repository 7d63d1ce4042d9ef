//! Running commands inside a node.
//!
//! One entry point, [`run`], covers both output modes so the failure policy
//! lives in a single place.

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::runtime::{NodeHandle, ProcessIo};
use crate::types::ProcessSpec;
use crate::RuntimeError;

/// Buffer size of each in-memory output pipe in captured mode.
const PIPE_CAPACITY: usize = 64 * 1024;

/// How command output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Collect stdout and stderr into the result.
    Captured,
    /// Forward output live to this process's stdout and stderr.
    Streamed,
}

impl OutputMode {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            OutputMode::Streamed
        } else {
            OutputMode::Captured
        }
    }
}

/// Outcome of one in-node command. Text fields are empty in streamed mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("cannot run an empty command")]
    EmptyCommand,

    #[error("command `{command}` failed with exit code {exit_code}{}", stderr_suffix(.stderr))]
    NonZeroExit {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("failed to read command output: {0}")]
    Output(#[source] std::io::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Run `argv` inside `node` and wait for it to exit.
///
/// A non-zero exit is an error unless `allow_failure` is set, in which case
/// it is returned as a normal result.
pub async fn run<S: AsRef<str>>(
    node: &NodeHandle,
    argv: &[S],
    mode: OutputMode,
    allow_failure: bool,
) -> Result<ExecResult, ExecError> {
    let process = ProcessSpec::from_argv(argv).ok_or(ExecError::EmptyCommand)?;
    let command = process.command_line();
    debug!(node = %node.id(), command = %command, ?mode, "Running in-node command");

    let result = match mode {
        OutputMode::Captured => run_captured(node, &process).await?,
        OutputMode::Streamed => ExecResult {
            exit_code: node.exec(&process, ProcessIo::inherit()).await?,
            ..ExecResult::default()
        },
    };

    if !result.success() {
        if !allow_failure {
            return Err(ExecError::NonZeroExit {
                command,
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }
        warn!(
            node = %node.id(),
            command = %command,
            exit_code = result.exit_code,
            "Command failed, continuing"
        );
    }

    Ok(result)
}

async fn run_captured(node: &NodeHandle, process: &ProcessSpec) -> Result<ExecResult, ExecError> {
    let (stdout_tx, mut stdout_rx) = tokio::io::duplex(PIPE_CAPACITY);
    let (stderr_tx, mut stderr_rx) = tokio::io::duplex(PIPE_CAPACITY);
    let io = ProcessIo::new(Box::new(stdout_tx), Box::new(stderr_tx));

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    // The write halves are owned by the exec future and dropped when it
    // completes, which ends both reads.
    let (exit_code, stdout_read, stderr_read) = tokio::join!(
        node.exec(process, io),
        stdout_rx.read_to_end(&mut stdout),
        stderr_rx.read_to_end(&mut stderr),
    );
    let exit_code = exit_code?;
    stdout_read.map_err(ExecError::Output)?;
    stderr_read.map_err(ExecError::Output)?;

    Ok(ExecResult {
        stdout: decode(stdout, "stdout"),
        stderr: decode(stderr, "stderr"),
        exit_code,
    })
}

fn decode(bytes: Vec<u8>, stream: &str) -> String {
    String::from_utf8(bytes).unwrap_or_else(|err| {
        warn!(stream, error = %err, "Command output is not valid UTF-8, discarding");
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_exit_message() {
        let err = ExecError::NonZeroExit {
            command: "kubeadm init".to_string(),
            exit_code: 1,
            stderr: "preflight failed\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "command `kubeadm init` failed with exit code 1: preflight failed"
        );

        let err = ExecError::NonZeroExit {
            command: "false".to_string(),
            exit_code: 1,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "command `false` failed with exit code 1");
    }

    #[test]
    fn test_output_mode_from_verbosity() {
        assert_eq!(OutputMode::from_verbose(true), OutputMode::Streamed);
        assert_eq!(OutputMode::from_verbose(false), OutputMode::Captured);
    }
}
