//! The `bash` tool and the persistent shell process behind it.

use super::{Tool, ToolResult, ToolSchema};
use crate::core::error::ToolError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const BASH_TOOL_NAME: &str = "bash";

const MARKER_PREFIX: &str = "__toolchat_done_";

/// Room after the marker for the exit status and its newline.
const STATUS_WINDOW: usize = 16;

struct ShellProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

/// One long-lived shell whose working directory and environment survive
/// between commands.
pub struct ShellSession {
    shell_path: PathBuf,
    timeout: Duration,
    max_output_bytes: usize,
    process: Option<ShellProcess>,
    commands_run: u64,
}

impl ShellSession {
    pub fn new(shell_path: impl Into<PathBuf>, timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            shell_path: shell_path.into(),
            timeout,
            max_output_bytes,
            process: None,
            commands_run: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    async fn start(&mut self) -> Result<&mut ShellProcess, ToolError> {
        let mut child = Command::new(&self.shell_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ToolError::TransportFailure(format!(
                    "cannot spawn shell {}: {}",
                    self.shell_path.display(),
                    e
                ))
            })?;

        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ToolError::TransportFailure(
                "shell started without piped stdio".to_string(),
            ));
        };
        stdin
            .write_all(b"exec 2>&1\n")
            .await
            .map_err(|e| ToolError::TransportFailure(format!("cannot talk to shell: {}", e)))?;

        info!(shell = %self.shell_path.display(), pid = ?child.id(), "shell session started");
        Ok(self.process.insert(ShellProcess {
            child,
            stdin,
            stdout,
        }))
    }

    /// Kills the current shell, if any. The next command starts a fresh one.
    pub async fn stop(&mut self) {
        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.child.kill().await {
                warn!(error = %e, "failed to kill shell");
            }
        }
    }

    pub async fn restart(&mut self) -> Result<(), ToolError> {
        self.stop().await;
        self.start().await?;
        Ok(())
    }

    /// End-of-command marker, unique per call so that output which happens to
    /// contain an older marker cannot end a later command.
    fn next_marker(&mut self) -> String {
        self.commands_run += 1;
        format!("{}{}_{}__", MARKER_PREFIX, std::process::id(), self.commands_run)
    }

    /// Runs `command` in the session and waits for it to finish.
    pub async fn execute(
        &mut self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let timeout = self.timeout;
        let limit = self.max_output_bytes;
        let marker = self.next_marker();
        let process = match self.process.take() {
            Some(process) => self.process.insert(process),
            None => self.start().await?,
        };

        let script = format!("{}\nprintf '\\n{}%d\\n' \"$?\"\n", command, marker);
        if let Err(e) = process.stdin.write_all(script.as_bytes()).await {
            // broken pipe: the shell died since the last command
            let status = process.child.try_wait().ok().flatten();
            self.process = None;
            debug!(error = %e, "shell stdin closed");
            return Err(ToolError::ShellExited(
                status
                    .map(|s| format!(" with {}", s))
                    .unwrap_or_default(),
            ));
        }

        let deadline = Instant::now() + timeout;
        let mut capture = OutputCapture::new(&marker, limit);
        let mut chunk = [0u8; 8192];

        let status = loop {
            tokio::select! {
                read = process.stdout.read(&mut chunk) => match read {
                    Ok(0) | Err(_) => {
                        let status = process.child.wait().await.ok();
                        self.process = None;
                        debug!(?status, output = %String::from_utf8_lossy(&capture.head), "shell exited mid-command");
                        return Err(ToolError::ShellExited(
                            status.map(|s| format!(" with {}", s)).unwrap_or_default(),
                        ));
                    }
                    Ok(n) => {
                        if let Some(status) = capture.push(&chunk[..n]) {
                            break status;
                        }
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(command, "shell command timed out");
                    self.stop().await;
                    return Err(ToolError::Timeout(timeout.as_secs()));
                }
                _ = cancel.cancelled() => {
                    info!(command, "shell command cancelled");
                    self.stop().await;
                    return Err(ToolError::Cancelled);
                }
            }
        };

        let (body, dropped) = capture.finish();
        let mut result = ToolResult::success(body).clipped(limit);
        if status != 0 {
            if !result.output.is_empty() && !result.output.ends_with('\n') {
                result.output.push('\n');
            }
            result.output.push_str(&format!("[exit status: {}]", status));
        }
        debug!(status, dropped, bytes = result.output.len(), "shell command finished");
        Ok(result)
    }
}

/// Collects a command's output until its marker line shows up. Keeps at most
/// `limit + 1` bytes of output, so an overlong result still gets clipped, and
/// only counts the rest.
struct OutputCapture {
    /// Newline plus marker; the status digits and a newline follow it.
    needle: Vec<u8>,
    limit: usize,
    head: Vec<u8>,
    /// Unsearched bytes plus the tail that may still hold a partial marker.
    pending: Vec<u8>,
    dropped: usize,
}

impl OutputCapture {
    fn new(marker: &str, limit: usize) -> Self {
        let mut needle = Vec::with_capacity(marker.len() + 1);
        needle.push(b'\n');
        needle.extend_from_slice(marker.as_bytes());
        Self {
            needle,
            limit,
            head: Vec::new(),
            pending: Vec::new(),
            dropped: 0,
        }
    }

    /// Feeds freshly read bytes. Returns the exit status once the marker
    /// line is complete.
    fn push(&mut self, bytes: &[u8]) -> Option<i32> {
        self.pending.extend_from_slice(bytes);

        let mut from = 0;
        while let Some(offset) = find(&self.pending[from..], &self.needle) {
            let start = from + offset;
            let rest = &self.pending[start + self.needle.len()..];
            let Some(end) = rest.iter().position(|&b| b == b'\n') else {
                break;
            };
            if let Some(status) = parse_status(&rest[..end]) {
                self.pending.truncate(start);
                return Some(status);
            }
            from = start + 1;
        }

        let keep_from = self
            .pending
            .len()
            .saturating_sub(self.needle.len() + STATUS_WINDOW);
        self.retain(keep_from);
        self.pending.drain(..keep_from);
        None
    }

    fn retain(&mut self, len: usize) {
        let room = (self.limit + 1).saturating_sub(self.head.len());
        let take = room.min(len);
        self.head.extend_from_slice(&self.pending[..take]);
        self.dropped += len - take;
    }

    /// Output minus one trailing newline, plus the number of bytes that were
    /// not kept.
    fn finish(mut self) -> (String, usize) {
        self.retain(self.pending.len());
        if self.dropped == 0 && self.head.last() == Some(&b'\n') {
            self.head.pop();
        }
        (String::from_utf8_lossy(&self.head).into_owned(), self.dropped)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_status(bytes: &[u8]) -> Option<i32> {
    let text = std::str::from_utf8(bytes).ok()?;
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[derive(Debug, Deserialize)]
struct BashArgs {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    restart: bool,
}

/// Tool adapter exposing a [`ShellSession`] to the model.
pub struct BashTool {
    session: ShellSession,
    schema: ToolSchema,
}

impl BashTool {
    pub fn new(session: ShellSession) -> Self {
        Self {
            session,
            schema: bash_schema(),
        }
    }
}

fn bash_schema() -> ToolSchema {
    ToolSchema {
        name: BASH_TOOL_NAME.to_string(),
        description: "Run commands in a bash shell.\n\
* The shell is persistent: working directory, environment variables and background jobs carry over between calls.\n\
* stdout and stderr are combined. Very large outputs are clipped, so filter with grep, head or tail.\n\
* Avoid commands that never return in the foreground (servers, watchers, interactive programs); start them in the background with `&` and redirect their output to a file.\n\
* Commands that run too long are killed together with the shell; the next call starts a fresh shell.\n\
* Pass `restart: true` to get a fresh shell."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to run. Required unless `restart` is true."
                },
                "restart": {
                    "type": "boolean",
                    "description": "Restart the shell session instead of running a command."
                }
            }
        }),
    }
}

#[async_trait]
impl Tool for BashTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(
        &mut self,
        args: Value,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let args: BashArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidParameter(e.to_string()))?;

        if args.restart {
            self.session.restart().await?;
            return Ok(ToolResult::success("Shell has been restarted."));
        }

        match args.command {
            Some(command) if !command.trim().is_empty() => {
                self.session.execute(&command, cancel).await
            }
            _ => Err(ToolError::InvalidParameter("no command provided".to_string())),
        }
    }
}
