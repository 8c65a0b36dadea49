//! Session states and the errors surfaced to the host.

use std::fmt;

use serde::Serialize;

/// Lifecycle of the single chat session an engine drives.
///
/// `Resolving` and `Ending` are transient: the engine passes through them
/// inside one step, so hosts observe them only through state subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Resolving,
    Verifying,
    Connecting,
    Connected,
    Ending,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Verifying => "verifying",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ending => "ending",
            Self::Failed => "failed",
        }
    }

    /// Whether a session exists in any form (anything but `Idle`).
    pub fn in_progress(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by the engine, either as a call result or through
/// [`StatusDelegate::error`](crate::delegate::StatusDelegate::error).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("a chat session is already active")]
    AlreadyActive,
    #[error("no chat session is active")]
    NotActive,
    #[error("chat is disabled by the host")]
    ChatDisabled,
    #[error("no skill resolved, routing is left to the server")]
    NoDestination,
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("identity verification failed: {0}")]
    HandshakeFailed(String),
    #[error("reconnect cache corrupt: {0}")]
    CacheCorrupt(String),
    #[error("an attachment selection is already in progress")]
    PluginAlreadyInProgress,
    #[error("malformed plugin descriptor: {0}")]
    MalformedPluginDescriptor(String),
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),
    #[error("plugin {plugin_id} has no action {index}")]
    UnknownAction { plugin_id: String, index: usize },
    #[error("attachments require an active chat session")]
    NoActiveSession,
    #[error("config: {0}")]
    Config(String),
    #[error("engine shut down")]
    Shutdown,
}

/// Failures of the socket transport.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("handshake: {0}")]
    Handshake(String),
    #[error("timed out waiting for the server")]
    Timeout,
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Handshake errors mean the server answered with something we do not
    /// understand; retrying will not help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Handshake(_))
    }
}

impl From<TransportError> for EngineError {
    fn from(e: TransportError) -> Self {
        Self::TransportUnavailable(e.to_string())
    }
}

/// Why the identity verification handshake failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The key-generation endpoint could not be reached.
    #[error("key endpoint unreachable: {0}")]
    Unreachable(String),
    /// The endpoint answered with something other than `{"ssoKey": "..."}`.
    #[error("malformed key response: {0}")]
    Malformed(String),
    /// The endpoint or the chat server refused the identity.
    #[error("identity rejected: {0}")]
    Rejected(String),
}

impl From<HandshakeError> for EngineError {
    fn from(e: HandshakeError) -> Self {
        Self::HandshakeFailed(e.to_string())
    }
}
