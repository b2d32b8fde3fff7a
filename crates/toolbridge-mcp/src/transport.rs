//! MCP transport implementations.
//!
//! This module provides the transport layer for communicating with MCP servers.
//! The only transport is stdio: a child process spoken to over stdin/stdout
//! using newline-delimited JSON.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::{InitError, TransportError};

/// Default time a server gets to exit after its stdin is closed, and again
/// after SIGTERM, before it is killed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Trait for MCP transport implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message to the server.
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Receive the next message from the server.
    async fn receive(&mut self) -> Result<String, TransportError>;

    /// Close the transport and release the underlying process.
    ///
    /// Closing an already closed transport is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// Resolve the executable to spawn for `command`.
///
/// Commands containing a path separator are used as given; whether they exist
/// is left to the spawn step. Bare names (`npx`, `uvx`, `my-server`) are
/// looked up on `PATH`, taken from the server's own environment overrides if
/// it sets one, so a missing launcher is reported as a resolution failure
/// instead of an opaque spawn error.
pub fn resolve_command(
    command: &str,
    env: &HashMap<String, String>,
) -> Result<PathBuf, InitError> {
    let path = Path::new(command);
    if path.is_absolute() || path.components().count() > 1 {
        return Ok(path.to_path_buf());
    }

    let search_path = env
        .get("PATH")
        .map(OsString::from)
        .or_else(|| std::env::var_os("PATH"));

    search_path
        .and_then(|paths| find_executable(command, &paths))
        .ok_or_else(|| InitError::CommandNotFound {
            command: command.to_string(),
        })
}

fn find_executable(name: &str, paths: &OsString) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    for dir in std::env::split_paths(paths) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }

        #[cfg(windows)]
        {
            for ext in ["exe", "cmd", "bat"] {
                let candidate = candidate.with_extension(ext);
                if is_executable(&candidate) {
                    return Some(candidate);
                }
            }
        }
    }

    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Standard I/O transport for MCP servers.
///
/// This transport spawns a child process and communicates via stdin/stdout
/// using newline-delimited JSON messages.
pub struct StdioTransport {
    /// The child process.
    child: Child,
    /// Stdin writer; taken when the transport closes so the server sees EOF.
    stdin: Option<ChildStdin>,
    /// Buffered stdout reader for receiving messages.
    stdout: BufReader<ChildStdout>,
    /// Bytes of a line that has not been fully received yet.
    pending: Vec<u8>,
    /// Grace period for each shutdown step.
    shutdown_grace: Duration,
    /// Whether messages can still be exchanged.
    connected: bool,
    /// Whether `close` has run.
    closed: bool,
}

impl StdioTransport {
    /// Spawn a new stdio transport.
    ///
    /// # Arguments
    ///
    /// * `program` - The resolved executable to run
    /// * `args` - Command arguments
    /// * `env` - Environment variables added to the inherited environment
    /// * `working_dir` - Optional working directory for the child process
    pub async fn spawn(
        program: &Path,
        args: &[String],
        env: &HashMap<String, String>,
        working_dir: Option<&Path>,
    ) -> Result<Self, TransportError> {
        debug!(
            program = %program.display(),
            args = ?args,
            "Spawning MCP server process"
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let stderr pass through for debugging
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(TransportError::SpawnFailed)?;

        // If a pipe is missing the child is dropped here, and kill_on_drop
        // takes it down with it.
        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::SpawnFailed(std::io::Error::other("Failed to capture stdin"))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::SpawnFailed(std::io::Error::other("Failed to capture stdout"))
        })?;

        debug!(pid = ?child.id(), "MCP server process spawned successfully");

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            pending: Vec::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            connected: true,
            closed: false,
        })
    }

    /// Set the grace period used by each shutdown step.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Get the process ID of the child process.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait up to the grace period for the child to exit.
    async fn wait_for_exit(&mut self) -> bool {
        match tokio::time::timeout(self.shutdown_grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(%status, "MCP server exited");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to wait for MCP server");
                false
            }
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let stdin = self.stdin.as_mut().ok_or(TransportError::NotConnected)?;

        debug!(message = message, "Sending message to MCP server");

        stdin
            .write_all(message.as_bytes())
            .await
            .map_err(TransportError::WriteError)?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(TransportError::WriteError)?;
        stdin.flush().await.map_err(TransportError::WriteError)?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        loop {
            // read_until keeps partial bytes in `pending` if this future is
            // dropped mid-line, so a timed-out caller does not corrupt the
            // stream for the next one.
            let bytes_read = self
                .stdout
                .read_until(b'\n', &mut self.pending)
                .await
                .map_err(TransportError::ReadError)?;

            if bytes_read == 0 {
                self.connected = false;
                return Err(TransportError::ConnectionClosed);
            }

            let line = std::mem::take(&mut self.pending);
            let message = String::from_utf8_lossy(&line).trim().to_string();
            if message.is_empty() {
                continue;
            }

            debug!(message = %message, "Received message from MCP server");
            return Ok(message);
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.connected = false;

        debug!(pid = ?self.child.id(), "Closing MCP server transport");

        // Closing stdin is the polite way to ask a stdio server to exit
        drop(self.stdin.take());
        if self.wait_for_exit().await {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                debug!(pid = pid, "Sending SIGTERM to MCP server");
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                if self.wait_for_exit().await {
                    return Ok(());
                }
            }
        }

        warn!("MCP server did not exit gracefully, killing");
        self.child
            .kill()
            .await
            .map_err(TransportError::TerminateFailed)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[cfg(unix)]
    fn write_executable(dir: &Path, name: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_resolve_path_command_is_used_as_given() {
        let resolved = resolve_command("/opt/servers/does-not-exist", &no_env()).unwrap();
        assert_eq!(resolved, PathBuf::from("/opt/servers/does-not-exist"));

        let resolved = resolve_command("./bin/server", &no_env()).unwrap();
        assert_eq!(resolved, PathBuf::from("./bin/server"));
    }

    #[test]
    fn test_resolve_missing_bare_command() {
        let err = resolve_command("toolbridge-surely-missing-launcher", &no_env()).unwrap_err();
        assert!(matches!(err, InitError::CommandNotFound { ref command }
            if command == "toolbridge-surely-missing-launcher"));
    }

    #[test]
    fn test_resolve_empty_command() {
        assert!(resolve_command("", &no_env()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_uses_path_from_server_env() {
        let dir = tempfile::tempdir().unwrap();
        let expected = write_executable(dir.path(), "fake-npx", 0o755);

        let mut env = HashMap::new();
        env.insert("PATH".to_string(), dir.path().display().to_string());

        assert_eq!(resolve_command("fake-npx", &env).unwrap(), expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_skips_non_executable_files() {
        let dir = tempfile::tempdir().unwrap();
        write_executable(dir.path(), "fake-uvx", 0o644);

        let mut env = HashMap::new();
        env.insert("PATH".to_string(), dir.path().display().to_string());

        assert!(matches!(
            resolve_command("fake-uvx", &env),
            Err(InitError::CommandNotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdio_transport_echo() {
        let cat = resolve_command("cat", &no_env()).unwrap();
        let mut transport = StdioTransport::spawn(&cat, &[], &no_env(), None)
            .await
            .unwrap();
        assert!(transport.is_connected());
        assert!(transport.pid().is_some());

        transport.send(r#"{"test": "hello"}"#).await.unwrap();
        let response = transport.receive().await.unwrap();
        assert_eq!(response, r#"{"test": "hello"}"#);

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_is_idempotent_and_disconnects() {
        let cat = resolve_command("cat", &no_env()).unwrap();
        let mut transport = StdioTransport::spawn(&cat, &[], &no_env(), None)
            .await
            .unwrap()
            .with_shutdown_grace(Duration::from_millis(500));

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let result = transport.send("test").await;
        assert!(matches!(result, Err(TransportError::NotConnected)));

        let result = transport.receive().await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let result = StdioTransport::spawn(
            Path::new("/nonexistent/toolbridge/server"),
            &[],
            &no_env(),
            None,
        )
        .await;
        assert!(matches!(result, Err(TransportError::SpawnFailed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_receive_reports_closed_on_exit() {
        let sh = resolve_command("sh", &no_env()).unwrap();
        let args = vec!["-c".to_string(), "echo '{\"a\":1}'; echo; exit 0".to_string()];
        let mut transport = StdioTransport::spawn(&sh, &args, &no_env(), None)
            .await
            .unwrap();

        // Blank lines are skipped
        assert_eq!(transport.receive().await.unwrap(), r#"{"a":1}"#);
        assert!(matches!(
            transport.receive().await,
            Err(TransportError::ConnectionClosed)
        ));
        assert!(!transport.is_connected());
        transport.close().await.unwrap();
    }
}
