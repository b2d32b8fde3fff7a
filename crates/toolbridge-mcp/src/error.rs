//! MCP-specific error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to spawn the child process.
    #[error("failed to spawn process: {0}")]
    SpawnFailed(std::io::Error),

    /// Failed to write to the transport.
    #[error("write error: {0}")]
    WriteError(std::io::Error),

    /// Failed to read from the transport.
    #[error("read error: {0}")]
    ReadError(std::io::Error),

    /// Connection was closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport is not connected.
    #[error("not connected")]
    NotConnected,

    /// Failed to terminate the process.
    #[error("failed to terminate process: {0}")]
    TerminateFailed(std::io::Error),
}

/// Errors that can occur during MCP requests on an established session.
#[derive(Debug, Error)]
pub enum McpError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol-level error (malformed messages, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server returned an error response.
    #[error("server error (code {code}): {message}")]
    ServerError { code: i32, message: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection is not in the correct state.
    #[error("invalid connection state: expected {expected}, got {actual}")]
    InvalidState {
        expected: ConnectionState,
        actual: ConnectionState,
    },

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl McpError {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a server error from JSON-RPC error.
    pub fn server_error(code: i32, message: impl Into<String>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(expected: ConnectionState, actual: ConnectionState) -> Self {
        Self::InvalidState { expected, actual }
    }

    /// Whether the error means the server process is gone rather than one
    /// request having failed.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Transport(
                TransportError::ConnectionClosed
                    | TransportError::NotConnected
                    | TransportError::WriteError(_)
            )
        )
    }
}

impl From<McpError> for toolbridge_core::Error {
    fn from(e: McpError) -> Self {
        toolbridge_core::Error::Mcp(e.to_string())
    }
}

/// Phase of server initialization in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    /// Locating the executable on the search path.
    Resolution,
    /// Starting the child process and capturing its pipes.
    Spawn,
    /// The protocol handshake over the established transport.
    Handshake,
}

impl std::fmt::Display for InitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolution => write!(f, "resolution"),
            Self::Spawn => write!(f, "spawn"),
            Self::Handshake => write!(f, "handshake"),
        }
    }
}

/// Errors that can occur while bringing a server connection up.
#[derive(Debug, Error)]
pub enum InitError {
    /// The command is a bare name and no executable of that name exists on
    /// the search path.
    #[error("command '{command}' not found on PATH")]
    CommandNotFound { command: String },

    /// The process could not be started.
    #[error("{0}")]
    Spawn(TransportError),

    /// The server answered the handshake with an error, or the exchange
    /// broke down.
    #[error("handshake failed: {0}")]
    Handshake(McpError),

    /// The server did not complete the handshake in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The connection was closed while the handshake was in flight.
    #[error("connection closed during handshake")]
    Aborted,

    /// `initialize` was called on a connection that was already started.
    #[error("invalid connection state: expected {expected}, got {actual}")]
    InvalidState {
        expected: ConnectionState,
        actual: ConnectionState,
    },
}

impl InitError {
    /// The initialization phase this error belongs to.
    ///
    /// `None` for a rejected `initialize` call, which never entered a phase.
    pub fn phase(&self) -> Option<InitPhase> {
        match self {
            Self::CommandNotFound { .. } => Some(InitPhase::Resolution),
            Self::Spawn(_) => Some(InitPhase::Spawn),
            Self::Handshake(_) | Self::HandshakeTimeout(_) | Self::Aborted => {
                Some(InitPhase::Handshake)
            }
            Self::InvalidState { .. } => None,
        }
    }
}

/// Errors found while reading the server document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document could not be read.
    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The document is not valid JSON or has the wrong shape.
    #[error("malformed server document: {0}")]
    MalformedDocument(String),

    /// A single server entry is unusable; the rest of the document is not
    /// affected.
    #[error("server '{name}': {reason}")]
    MalformedEntry { name: String, reason: String },
}

impl ConfigError {
    pub(crate) fn entry(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedEntry {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::ConnectionClosed;
        assert_eq!(err.to_string(), "connection closed");
    }

    #[test]
    fn test_mcp_error_display() {
        let err = McpError::server_error(-32602, "Invalid params");
        assert_eq!(err.to_string(), "server error (code -32602): Invalid params");

        let err = McpError::invalid_state(ConnectionState::Ready, ConnectionState::Closed);
        assert_eq!(
            err.to_string(),
            "invalid connection state: expected ready, got closed"
        );
    }

    #[test]
    fn test_connection_lost_classification() {
        assert!(McpError::Transport(TransportError::ConnectionClosed).is_connection_lost());
        assert!(!McpError::server_error(-32602, "bad").is_connection_lost());
        assert!(!McpError::Timeout(Duration::from_secs(1)).is_connection_lost());
    }

    #[test]
    fn test_init_error_phases() {
        let err = InitError::CommandNotFound {
            command: "npx".to_string(),
        };
        assert_eq!(err.phase(), Some(InitPhase::Resolution));
        assert_eq!(err.to_string(), "command 'npx' not found on PATH");

        let err = InitError::Spawn(TransportError::SpawnFailed(std::io::Error::other("nope")));
        assert_eq!(err.phase(), Some(InitPhase::Spawn));

        let err = InitError::HandshakeTimeout(Duration::from_secs(30));
        assert_eq!(err.phase(), Some(InitPhase::Handshake));
        assert_eq!(InitPhase::Handshake.to_string(), "handshake");
    }

    #[test]
    fn test_repeated_initialize_has_no_phase() {
        let err = InitError::InvalidState {
            expected: ConnectionState::Unstarted,
            actual: ConnectionState::Ready,
        };
        assert_eq!(err.phase(), None);
    }

    #[test]
    fn test_mcp_error_to_core_error() {
        let err = McpError::protocol("test error");
        let core_err: toolbridge_core::Error = err.into();
        assert!(matches!(core_err, toolbridge_core::Error::Mcp(_)));
    }

    #[test]
    fn test_config_entry_error_display() {
        let err = ConfigError::entry("beta", "missing field `command`");
        assert_eq!(err.to_string(), "server 'beta': missing field `command`");
    }
}
