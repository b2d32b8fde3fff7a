//! A connection to a single MCP server.
//!
//! [`ServerConnection`] owns the whole resource chain for one server: the
//! child process and its pipes (the transport) and the protocol session laid
//! over them. Nothing else touches either; the registry and the tool adapters
//! only hold references to the connection.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex, RwLock};
use toolbridge_core::ToolOutput;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::config::ServerConfig;
use crate::error::{InitError, McpError, TransportError};
use crate::protocol::{
    CallToolParams, IncomingMessage, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsParams, ListToolsResult,
    McpToolDefinition, RequestId, ServerInfo,
};
use crate::transport::{resolve_command, StdioTransport, Transport, DEFAULT_SHUTDOWN_GRACE};

/// Lifecycle state of a server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, nothing acquired yet.
    Unstarted,
    /// Resolving, spawning or handshaking.
    Initializing,
    /// Handshake complete; tools can be listed and called.
    Ready,
    /// Initialization failed; nothing is held.
    Failed,
    /// Cleanup has run.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unstarted => write!(f, "unstarted"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Timeouts applied to one connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Maximum duration of the protocol handshake.
    pub handshake_timeout: Duration,
    /// Maximum duration of a single request; `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
    /// Grace period for each shutdown step of the child process.
    pub shutdown_grace: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            call_timeout: Some(Duration::from_secs(60)),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl From<&toolbridge_core::Config> for ConnectionSettings {
    fn from(config: &toolbridge_core::Config) -> Self {
        Self {
            handshake_timeout: config.timeouts.handshake(),
            call_timeout: config.timeouts.call(),
            shutdown_grace: config.timeouts.shutdown_grace(),
        }
    }
}

/// Protocol session bound to exactly one transport.
///
/// One request is outstanding at a time; the owning connection serializes
/// access with a mutex.
struct Session {
    transport: Box<dyn Transport>,
    next_id: u64,
    server_info: Option<ServerInfo>,
}

impl Session {
    fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            next_id: 1,
            server_info: None,
        }
    }

    /// Send a request and wait for the response with the same id.
    ///
    /// Notifications and responses to earlier, abandoned requests are skipped;
    /// server-initiated requests are answered in place.
    async fn request<P, R>(&mut self, method: &str, params: Option<P>) -> Result<R, McpError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request_id = RequestId::from(self.next_id);
        self.next_id += 1;

        let message = serde_json::to_string(&JsonRpcRequest::new(
            request_id.clone(),
            method,
            params,
        ))?;
        self.transport.send(&message).await?;

        loop {
            let line = self.transport.receive().await?;
            let incoming = match IncomingMessage::parse(&line) {
                Ok(incoming) => incoming,
                Err(e) => {
                    warn!(error = %e, "Ignoring unparseable message from MCP server");
                    continue;
                }
            };

            match incoming {
                IncomingMessage::Response { id, result, error } if id == request_id => {
                    if let Some(error) = error {
                        return Err(McpError::server_error(error.code, error.message));
                    }
                    let result =
                        result.ok_or_else(|| McpError::protocol("Response missing result"))?;
                    return serde_json::from_value(result).map_err(|e| {
                        McpError::protocol(format!("Failed to parse {} result: {}", method, e))
                    });
                }
                IncomingMessage::Response { id, .. } => {
                    debug!(id = %id, "Discarding response to an abandoned request");
                }
                IncomingMessage::Request { id, method, .. } => {
                    self.answer(id, &method).await?;
                }
                IncomingMessage::Notification { method, .. } => {
                    debug!(method = %method, "Ignoring server notification");
                }
            }
        }
    }

    /// Reply to a request the server sent us.
    async fn answer(&mut self, id: RequestId, method: &str) -> Result<(), McpError> {
        let reply = if method == "ping" {
            JsonRpcResponse::success(id, serde_json::json!({}))
        } else {
            debug!(method = method, "Rejecting unsupported server request");
            JsonRpcResponse::failure(
                id,
                JsonRpcError::new(
                    JsonRpcError::METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                ),
            )
        };
        let message = serde_json::to_string(&reply)?;
        self.transport.send(&message).await?;
        Ok(())
    }

    /// Send a notification (no response expected).
    async fn notify(&mut self, method: &str) -> Result<(), McpError> {
        let message = serde_json::to_string(&JsonRpcNotification::<()>::new(method, None))?;
        self.transport.send(&message).await?;
        Ok(())
    }

    /// Perform the MCP handshake.
    async fn handshake(&mut self) -> Result<(), McpError> {
        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;
        self.notify("notifications/initialized").await?;

        info!(
            server_name = %result.server_info.name,
            protocol_version = %result.protocol_version,
            "MCP handshake complete"
        );
        self.server_info = Some(result.server_info);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.transport.close().await
    }
}

/// A connection to a single MCP server.
pub struct ServerConnection {
    /// Server configuration.
    config: ServerConfig,
    /// Timeouts.
    settings: ConnectionSettings,
    /// Current lifecycle state.
    state: RwLock<ConnectionState>,
    /// The session, present only while `Ready`.
    session: Mutex<Option<Session>>,
    /// Serializes cleanup against itself and against the end of initialization.
    lifecycle: Mutex<()>,
    /// Held by `initialize` until it has either installed or released its
    /// transport.
    initializing: Mutex<()>,
    /// Set once cleanup starts; in-flight handshakes and requests race it.
    closed: watch::Sender<bool>,
    /// Span all of this connection's events are recorded under.
    span: Span,
}

impl ServerConnection {
    /// Create an unstarted connection.
    pub fn new(config: ServerConfig, settings: ConnectionSettings) -> Self {
        let span = info_span!("mcp_server", server = %config.name);
        Self::with_span(config, settings, span)
    }

    /// Create an unstarted connection recording its events under `span`.
    pub fn with_span(config: ServerConfig, settings: ConnectionSettings, span: Span) -> Self {
        Self {
            config,
            settings,
            state: RwLock::new(ConnectionState::Unstarted),
            session: Mutex::new(None),
            lifecycle: Mutex::new(()),
            initializing: Mutex::new(()),
            closed: watch::channel(false).0,
            span,
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Check if the connection is ready for use.
    pub async fn is_ready(&self) -> bool {
        self.state().await == ConnectionState::Ready
    }

    /// Server information reported during the handshake.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.session
            .lock()
            .await
            .as_ref()
            .and_then(|session| session.server_info.clone())
    }

    /// Resolve the command, spawn the server and perform the handshake.
    ///
    /// On failure the connection is `Failed` and everything acquired along the
    /// way has already been released.
    pub async fn initialize(&self) -> Result<(), InitError> {
        self.start_with(self.spawn_transport())
            .instrument(self.span.clone())
            .await
    }

    /// Perform the handshake over an already established transport.
    pub async fn attach(&self, transport: Box<dyn Transport>) -> Result<(), InitError> {
        self.start_with(async move { Ok(transport) })
            .instrument(self.span.clone())
            .await
    }

    /// Resolves once cleanup has started, including when it already has.
    fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut closed = self.closed.subscribe();
        async move {
            loop {
                let is_closed = *closed.borrow_and_update();
                if is_closed || closed.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    async fn spawn_transport(&self) -> Result<Box<dyn Transport>, InitError> {
        let program = resolve_command(&self.config.command, &self.config.env)?;
        let transport = StdioTransport::spawn(
            &program,
            &self.config.args,
            &self.config.env,
            self.config.cwd.as_deref(),
        )
        .await
        .map_err(InitError::Spawn)?
        .with_shutdown_grace(self.settings.shutdown_grace);

        Ok(Box::new(transport))
    }

    async fn start_with<F>(&self, transport: F) -> Result<(), InitError>
    where
        F: Future<Output = Result<Box<dyn Transport>, InitError>> + Send,
    {
        let _initializing = self.initializing.lock().await;
        {
            let mut state = self.state.write().await;
            if *state != ConnectionState::Unstarted {
                return Err(InitError::InvalidState {
                    expected: ConnectionState::Unstarted,
                    actual: *state,
                });
            }
            *state = ConnectionState::Initializing;
        }

        debug!(command = %self.config.command, "Initializing MCP connection");

        let result = match transport.await {
            Ok(transport) => self.handshake(transport).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(session) => self.install(session).await,
            Err(e) => {
                let mut state = self.state.write().await;
                if *state == ConnectionState::Initializing {
                    *state = ConnectionState::Failed;
                }
                drop(state);

                error!(
                    server = %self.config.name,
                    phase = e.phase().map(tracing::field::display),
                    error = %e,
                    "MCP server failed to initialize"
                );
                Err(e)
            }
        }
    }

    /// Run the handshake; on failure the transport is closed before returning.
    async fn handshake(&self, transport: Box<dyn Transport>) -> Result<Session, InitError> {
        let mut session = Session::new(transport);
        let timeout = self.settings.handshake_timeout;

        let error = tokio::select! {
            outcome = tokio::time::timeout(timeout, session.handshake()) => match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(InitError::Handshake(e)),
                Err(_) => Some(InitError::HandshakeTimeout(timeout)),
            },
            () = self.closed() => Some(InitError::Aborted),
        };
        let Some(error) = error else {
            return Ok(session);
        };

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to release transport after handshake failure");
        }
        Err(error)
    }

    /// Make a freshly handshaken session the live one, unless the connection
    /// was closed in the meantime.
    async fn install(&self, mut session: Session) -> Result<(), InitError> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.state().await != ConnectionState::Initializing {
            if let Err(e) = session.close().await {
                warn!(error = %e, "Failed to release transport of aborted connection");
            }
            warn!("MCP connection was closed during its handshake");
            return Err(InitError::Aborted);
        }

        *self.session.lock().await = Some(session);
        *self.state.write().await = ConnectionState::Ready;

        info!(server = %self.config.name, "MCP connection initialized");
        Ok(())
    }

    fn ensure_ready(&self, state: ConnectionState) -> Result<(), McpError> {
        if state != ConnectionState::Ready {
            return Err(McpError::invalid_state(ConnectionState::Ready, state));
        }
        Ok(())
    }

    /// Send a request on the session, honouring the per-call timeout.
    ///
    /// Cleanup cuts the request short; it then fails with a closed-state error.
    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R, McpError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let closed = self.closed();
        self.ensure_ready(self.state().await)?;

        let call = async {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return Err(McpError::invalid_state(
                    ConnectionState::Ready,
                    ConnectionState::Closed,
                ));
            };

            match self.settings.call_timeout {
                Some(limit) => tokio::time::timeout(limit, session.request(method, params))
                    .await
                    .unwrap_or(Err(McpError::Timeout(limit))),
                None => session.request(method, params).await,
            }
        };

        let result = tokio::select! {
            biased;
            () = closed => Err(McpError::invalid_state(
                ConnectionState::Ready,
                ConnectionState::Closed,
            )),
            result = call => result,
        };

        if let Err(ref e) = result {
            if e.is_connection_lost() {
                error!(server = %self.config.name, error = %e, "MCP server connection lost");
            }
        }
        result
    }

    /// List the server's tools, following pagination.
    pub async fn try_list_capabilities(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        async {
            let mut tools = Vec::new();
            let mut cursor: Option<String> = None;

            loop {
                let page: ListToolsResult = self
                    .request("tools/list", Some(ListToolsParams { cursor: cursor.clone() }))
                    .await?;
                tools.extend(page.tools);

                match page.next_cursor {
                    Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                        return Err(McpError::protocol(format!(
                            "tools/list returned the same cursor twice: {}",
                            next
                        )));
                    }
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }

            debug!(tool_count = tools.len(), "Listed tools");
            Ok(tools)
        }
        .instrument(self.span.clone())
        .await
    }

    /// List the server's tools.
    ///
    /// A failed listing is logged and reported as no tools; the connection
    /// stays usable.
    pub async fn list_capabilities(&self) -> Vec<McpToolDefinition> {
        match self.try_list_capabilities().await {
            Ok(tools) => tools,
            Err(e) => {
                error!(parent: &self.span, server = %self.config.name, error = %e, "Failed to list tools");
                Vec::new()
            }
        }
    }

    /// Call a tool and return the raw `result` value.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<Value, McpError> {
        async {
            debug!(tool = name, "Calling tool");

            let params = CallToolParams {
                name: name.to_string(),
                arguments,
            };
            let result: Value = self.request("tools/call", Some(params)).await?;

            if result.get("isError").and_then(Value::as_bool) == Some(true) {
                warn!(tool = name, "Tool returned error");
            }
            Ok(result)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Call a tool, converting every failure into an error result.
    pub async fn invoke(&self, name: &str, arguments: Option<Value>) -> ToolOutput {
        match self.call_tool(name, arguments).await {
            Ok(result) => ToolOutput::success(result),
            Err(e) => {
                warn!(
                    parent: &self.span,
                    server = %self.config.name,
                    tool = name,
                    error = %e,
                    "Tool call failed"
                );
                ToolOutput::failure(e.to_string())
            }
        }
    }

    /// Close the session and the transport.
    ///
    /// Safe from any state and idempotent; concurrent calls run one after the
    /// other and every call after the first is a no-op. In-flight handshakes
    /// and requests are cut short, and by the time this returns no transport
    /// of this connection is open.
    pub async fn cleanup(&self) -> Result<(), TransportError> {
        async {
            let result = self.close_session().await;
            // An aborted initializer closes its own transport
            drop(self.initializing.lock().await);
            result
        }
        .instrument(self.span.clone())
        .await
    }

    async fn close_session(&self) -> Result<(), TransportError> {
        let _lifecycle = self.lifecycle.lock().await;

        let previous = {
            let mut state = self.state.write().await;
            let previous = *state;
            *state = ConnectionState::Closed;
            previous
        };
        if previous == ConnectionState::Closed {
            return Ok(());
        }
        self.closed.send_replace(true);

        let session = self.session.lock().await.take();
        let result = match session {
            Some(mut session) => session.close().await,
            None => Ok(()),
        };

        match result {
            Ok(()) => info!(previous = %previous, "MCP connection closed"),
            Err(ref e) => error!(error = %e, "Failed to close MCP connection cleanly"),
        }
        result
    }
}
