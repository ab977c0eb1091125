//! Process runner
//!
//! Every external tool (build systems, scanners, the `cf` CLI) is invoked
//! through [`CommandRunner`]. The system implementation streams stdout and
//! stderr line by line into the step log as they are produced and keeps a
//! merged copy of the output for the caller.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::log_buffer::StepLog;

/// An external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    /// Shell-like rendering used in logs and error messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout and stderr merged in arrival order
    pub output: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed: `{command}` exited with code {exit_code}")]
    Failed {
        command: String,
        exit_code: i32,
        output: String,
    },
}

/// Runs external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` to completion whatever its exit code
    ///
    /// Each output line is appended to `log` as it arrives.
    async fn execute(&self, command: &Command, log: &StepLog)
    -> Result<CommandOutput, ProcessError>;

    /// Runs `command`, turning a non-zero exit code into [`ProcessError::Failed`]
    async fn run(&self, command: &Command, log: &StepLog) -> Result<CommandOutput, ProcessError> {
        let output = self.execute(command, log).await?;
        if !output.success() {
            return Err(ProcessError::Failed {
                command: command.display(),
                exit_code: output.exit_code,
                output: output.output,
            });
        }
        Ok(output)
    }
}

/// Runs commands as child processes of the worker
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Records one raw output line, replacing bytes that are not UTF-8
    fn capture(captured: &mut String, log: &StepLog, buf: &mut Vec<u8>) {
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        let line = String::from_utf8_lossy(buf).into_owned();
        buf.clear();

        captured.push_str(&line);
        captured.push('\n');
        log.output(line);
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn execute(
        &self,
        command: &Command,
        log: &StepLog,
    ) -> Result<CommandOutput, ProcessError> {
        let command_line = command.display();
        debug!("Running `{}`", command_line);

        let spawn_error = |source: std::io::Error| ProcessError::Spawn {
            command: command_line.clone(),
            source,
        };

        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(spawn_error)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stderr was not captured")))?;

        // Lines are read as bytes: tools print Latin-1 or binary output and
        // a pipe that stops being drained blocks the child forever.
        // read_until keeps partial lines in the buffer when select! drops it.
        let mut stdout = BufReader::new(stdout);
        let mut stderr = BufReader::new(stderr);
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut captured = String::new();

        while stdout_open || stderr_open {
            tokio::select! {
                read = stdout.read_until(b'\n', &mut stdout_buf), if stdout_open => match read {
                    Ok(0) => stdout_open = false,
                    Ok(_) => Self::capture(&mut captured, log, &mut stdout_buf),
                    Err(e) => {
                        warn!("Failed to read stdout of `{}`: {}", command_line, e);
                        stdout_open = false;
                    }
                },
                read = stderr.read_until(b'\n', &mut stderr_buf), if stderr_open => match read {
                    Ok(0) => stderr_open = false,
                    Ok(_) => Self::capture(&mut captured, log, &mut stderr_buf),
                    Err(e) => {
                        warn!("Failed to read stderr of `{}`: {}", command_line, e);
                        stderr_open = false;
                    }
                },
            }
        }

        let status = child.wait().await.map_err(spawn_error)?;
        // killed by a signal
        let exit_code = status.code().unwrap_or(-1);
        debug!("`{}` exited with code {}", command_line, exit_code);

        Ok(CommandOutput {
            output: captured,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display() {
        let cmd = Command::new("cf")
            .args(["push", "shop"])
            .arg("--no-route")
            .env("CF_HOME", "/tmp/cf");
        assert_eq!(cmd.display(), "cf push shop --no-route");
        assert_eq!(cmd.env, vec![("CF_HOME".to_string(), "/tmp/cf".to_string())]);
    }

    #[tokio::test]
    async fn test_system_runner_captures_both_streams() {
        let log = StepLog::new();
        let cmd = Command::new("sh").args(["-c", "echo out; echo err 1>&2"]);

        let output = SystemCommandRunner::new().execute(&cmd, &log).await.unwrap();

        assert_eq!(output.exit_code, 0);
        assert!(output.output.contains("out\n"));
        assert!(output.output.contains("err\n"));
        assert_eq!(log.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_run_rejects_non_zero_exit() {
        let log = StepLog::new();
        let cmd = Command::new("sh").args(["-c", "echo failing; exit 3"]);

        let err = SystemCommandRunner::new().run(&cmd, &log).await.unwrap_err();

        match err {
            ProcessError::Failed {
                exit_code, output, ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(output, "failing\n");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_hide_later_output() {
        let log = StepLog::new();
        let cmd = Command::new("sh").args([
            "-c",
            "printf 'caf\\351\\n'; echo 'FAIL: TestCheckout'; exit 1",
        ]);

        let output = SystemCommandRunner::new().execute(&cmd, &log).await.unwrap();

        assert_eq!(output.exit_code, 1);
        assert_eq!(output.output, "caf\u{FFFD}\nFAIL: TestCheckout\n");
        assert_eq!(log.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_keeps_draining_after_invalid_utf8() {
        let log = StepLog::new();
        let cmd = Command::new("sh").args([
            "-c",
            "printf 'caf\\351\\n'; head -c 262144 /dev/zero | tr '\\0' a; echo; echo done",
        ]);

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            SystemCommandRunner::new().execute(&cmd, &log),
        )
        .await
        .expect("runner stopped draining the pipe")
        .unwrap();

        assert_eq!(output.exit_code, 0);
        assert!(output.output.ends_with("\ndone\n"));
        assert_eq!(output.output.len(), "caf\u{FFFD}\n".len() + 262_144 + "\ndone\n".len());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let log = StepLog::new();
        let cmd = Command::new("cfforge-definitely-not-installed");

        let err = SystemCommandRunner::new().execute(&cmd, &log).await.unwrap_err();

        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let log = StepLog::new();
        let cmd = Command::new("sh")
            .args(["-c", "echo $GREETING; pwd"])
            .env("GREETING", "hello")
            .current_dir(dir.path());

        let output = SystemCommandRunner::new().run(&cmd, &log).await.unwrap();

        assert!(output.output.starts_with("hello\n"));
        let name = dir.path().file_name().unwrap().to_str().unwrap();
        assert!(output.output.contains(name));
    }
}
