//! External process execution.

use std::process::Stdio;

use {async_trait::async_trait, tokio::process::Command, tracing::debug};

/// Exit code reported when the program could not be launched at all.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Best available failure description: stderr, else stdout.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Runs an external program to completion and captures its output.
///
/// Implementations never fail: a program that cannot be started is reported
/// as a non-zero [`CommandOutput`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput;
}

/// [`CommandRunner`] backed by real subprocesses. Stdin is closed and there
/// is no timeout: a hung child blocks the caller until it exits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        debug!(program, ?args, "spawning command");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) => CommandOutput {
                // Killed by a signal: no code to report.
                exit_code: output.status.code().unwrap_or(0),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => {
                debug!(program, error = %e, "failed to launch command");
                CommandOutput {
                    exit_code: LAUNCH_FAILURE_EXIT_CODE,
                    stdout: String::new(),
                    stderr: e.to_string(),
                }
            },
        }
    }
}
