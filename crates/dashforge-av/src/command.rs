//! External process execution with incremental line delivery.
//!
//! [`ToolCommand`] is a builder for a single tool invocation. Unlike a plain
//! `output()` call it drains stdout and stderr concurrently while the process
//! runs, handing every line to a callback as soon as it arrives, so progress
//! can be observed before the tool exits.
//!
//! [`ProcessRunner`] is the seam the pipeline depends on; the production
//! implementation is [`TokioProcessRunner`], tests substitute a scripted fake.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use dashforge_core::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Callback receiving one line of tool output.
pub type LineSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Exit code and captured output of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Process exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// Every stdout and stderr line, in arrival order.
    pub output: Vec<String>,
}

impl ExecutionResult {
    /// Whether the tool exited with code zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs an external program, streaming its output lines to callbacks.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args` to completion.
    ///
    /// `on_stdout` / `on_stderr` are invoked once per line while the process
    /// is still running. A non-zero exit is reported through
    /// [`ExecutionResult::exit_code`], not as an error; `Err` means the
    /// process could not be started or did not finish.
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        on_stdout: LineSink<'_>,
        on_stderr: LineSink<'_>,
    ) -> Result<ExecutionResult>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner {
    timeout: Option<Duration>,
}

impl TokioProcessRunner {
    /// A runner without a time limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: kill invocations that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        on_stdout: LineSink<'_>,
        on_stderr: LineSink<'_>,
    ) -> Result<ExecutionResult> {
        let mut cmd = ToolCommand::new(program.to_path_buf());
        cmd.args(args.iter().cloned());
        if let Some(limit) = self.timeout {
            cmd.timeout(limit);
        }
        cmd.execute_with_callbacks(on_stdout, on_stderr).await
    }
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use dashforge_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> dashforge_core::Result<()> {
/// let mut lines = Vec::new();
/// let result = ToolCommand::new(PathBuf::from("ffmpeg"))
///     .arg("-version")
///     .execute_with_callbacks(&mut |l| lines.push(l.to_string()), &mut |_| {})
///     .await?;
/// assert!(result.success());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = Some(d);
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, delivering output lines while it runs.
    ///
    /// # Errors
    ///
    /// - [`Error::Tool`] if the process cannot be spawned.
    /// - [`Error::Tool`] if the timeout expires (the child is killed).
    ///
    /// A non-zero exit status is *not* an error.
    pub async fn execute_with_callbacks(
        &self,
        on_stdout: LineSink<'_>,
        on_stderr: LineSink<'_>,
    ) -> Result<ExecutionResult> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::tool(&program_name, "stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::tool(&program_name, "stderr was not captured"))?;

        let mut output = Vec::new();

        let waited = {
            let run = async {
                drain_lines(stdout, stderr, on_stdout, on_stderr, &mut output).await;
                child.wait().await
            };
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, run).await.ok(),
                None => Some(run.await),
            }
        };

        let status = match waited {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                return Err(Error::tool(
                    program_name,
                    format!("I/O error waiting for process: {e}"),
                ))
            }
            None => {
                let _ = child.kill().await;
                return Err(Error::tool(
                    program_name,
                    format!("timed out after {:?}", self.timeout.unwrap_or_default()),
                ));
            }
        };

        Ok(ExecutionResult {
            exit_code: status.code().unwrap_or(-1),
            output,
        })
    }
}

/// Read both pipes until they close, dispatching each complete line.
///
/// Bytes are decoded lossily so a tool emitting invalid UTF-8 can never stall
/// the drain (and with it the child, once its pipe buffer fills).
async fn drain_lines<O, E>(
    stdout: O,
    stderr: E,
    on_stdout: LineSink<'_>,
    on_stderr: LineSink<'_>,
    output: &mut Vec<String>,
) where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_reader = BufReader::new(stdout);
    let mut err_reader = BufReader::new(stderr);
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = out_reader.read_until(b'\n', &mut out_buf), if out_open => match read {
                Ok(0) => out_open = false,
                Ok(_) => {
                    let line = take_line(&mut out_buf);
                    on_stdout(&line);
                    output.push(line);
                }
                Err(e) => {
                    tracing::warn!("stopped reading stdout: {e}");
                    out_open = false;
                }
            },
            read = err_reader.read_until(b'\n', &mut err_buf), if err_open => match read {
                Ok(0) => err_open = false,
                Ok(_) => {
                    let line = take_line(&mut err_buf);
                    on_stderr(&line);
                    output.push(line);
                }
                Err(e) => {
                    tracing::warn!("stopped reading stderr: {e}");
                    err_open = false;
                }
            },
        }
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string();
    buf.clear();
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_line_strips_terminators() {
        let mut buf = b"frame=10\r\n".to_vec();
        assert_eq!(take_line(&mut buf), "frame=10");
        assert!(buf.is_empty());

        let mut invalid = vec![b'o', b'k', 0xff, b'\n'];
        assert_eq!(take_line(&mut invalid), "ok\u{fffd}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streams_both_pipes_and_reports_exit_code() {
        let mut stdout_lines = Vec::new();
        let mut stderr_lines = Vec::new();

        let result = ToolCommand::new(PathBuf::from("sh"))
            .args(["-c", "echo one; echo two 1>&2; echo three; exit 3"])
            .execute_with_callbacks(
                &mut |l| stdout_lines.push(l.to_string()),
                &mut |l| stderr_lines.push(l.to_string()),
            )
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert!(!result.success());
        assert_eq!(stdout_lines, vec!["one", "three"]);
        assert_eq!(stderr_lines, vec!["two"]);
        assert_eq!(result.output.len(), 3);
    }

    #[tokio::test]
    async fn nonexistent_tool_is_an_error() {
        let result = ToolCommand::new(PathBuf::from("nonexistent_tool_xyz_12345"))
            .execute_with_callbacks(&mut |_| {}, &mut |_| {})
            .await;
        assert!(matches!(result, Err(Error::Tool { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_fires() {
        let result = ToolCommand::new(PathBuf::from("sleep"))
            .arg("10")
            .timeout(Duration::from_millis(100))
            .execute_with_callbacks(&mut |_| {}, &mut |_| {})
            .await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("timed out"), "unexpected error: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runner_delegates_to_tool_command() {
        let runner = TokioProcessRunner::new();
        let mut seen = Vec::new();
        let result = runner
            .run(
                Path::new("sh"),
                &["-c".to_string(), "echo hello".to_string()],
                &mut |l| seen.push(l.to_string()),
                &mut |_| {},
            )
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(seen, vec!["hello"]);
        assert_eq!(result.output, vec!["hello"]);
    }
}
