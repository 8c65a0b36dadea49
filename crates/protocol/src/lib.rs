//! Chat protocol: WebSocket message types exchanged between the engine and
//! the chat server.
//!
//! Every frame is a JSON text message tagged by `type`.  The engine opens
//! with `visitor_hello`; the server answers with `session_welcome` (fresh or
//! resumed) or `agents_unavailable`.  After that, chat lines flow in both
//! directions and are acknowledged cumulatively with `ack`.

use lc_domain::{Destination, EventRecord, VariableSet};
use serde::{Deserialize, Serialize};

/// Bumped whenever the envelope changes incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default upper bound for a single inbound frame.
pub const MAX_FRAME_BYTES: usize = 256 * 1024;

/// WebSocket message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Engine → Server: open or resume a session.
    VisitorHello {
        protocol_version: u32,
        app_id: String,
        visitor_id: String,
        destination: Destination,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resume: Option<ResumeRequest>,
        /// Verification key from the single sign-on handshake.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sso_key: Option<String>,
        #[serde(default)]
        visit: VisitStatus,
        sdk_version: String,
    },

    /// Server → Engine: session established.
    SessionWelcome {
        session_token: String,
        /// `true` when the server honoured the `resume` request.
        #[serde(default)]
        resumed: bool,
        /// Outcome of checking `sso_key` against the host backend; absent
        /// when no key was sent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verified: Option<bool>,
    },

    /// Server → Engine: nobody can take the chat right now.
    AgentsUnavailable { destination: Destination },

    /// A chat line.  Outbound lines carry the engine-assigned `seq`; inbound
    /// lines carry a server `line_id` used to drop replayed duplicates.
    ChatLine {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line_id: Option<String>,
        text: String,
    },

    /// Bidirectional: everything up to and including `seq` was received.
    Ack { seq: u64 },

    /// Engine → Server: buffered custom variables and events.
    VisitorData {
        #[serde(default)]
        variables: VariableSet,
        #[serde(default)]
        events: Vec<EventRecord>,
    },

    /// Engine → Server: host-reported visit status changed.
    VisitStatus(VisitStatus),

    /// Server → Engine: agent availability for a pool.  Both fields unset
    /// means the global status.
    Availability {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        skill: Option<String>,
        enabled: bool,
    },

    /// Engine → Server: rich content produced by an attachment plugin.
    Attachment {
        plugin_id: String,
        content_key: String,
    },

    /// Engine → Server: the visitor ended the chat.
    EndChat { reason: String },

    /// Server → Engine: the agent side ended the chat.
    ChatEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Bidirectional: heartbeat.
    Ping { timestamp: i64 },

    /// Bidirectional: heartbeat response.
    Pong { timestamp: i64 },
}

/// Resumption request: replay everything after `last_acked_seq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub session_token: String,
    pub last_acked_seq: u64,
}

/// Visit state reported by the host's custom chat button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitStatus {
    #[serde(default)]
    pub chat_available: bool,
    #[serde(default)]
    pub invitation_shown: bool,
    #[serde(default)]
    pub chat_disabled: bool,
}

impl WireMessage {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VisitorHello { .. } => "visitor_hello",
            Self::SessionWelcome { .. } => "session_welcome",
            Self::AgentsUnavailable { .. } => "agents_unavailable",
            Self::ChatLine { .. } => "chat_line",
            Self::Ack { .. } => "ack",
            Self::VisitorData { .. } => "visitor_data",
            Self::VisitStatus(_) => "visit_status",
            Self::Availability { .. } => "availability",
            Self::Attachment { .. } => "attachment",
            Self::EndChat { .. } => "end_chat",
            Self::ChatEnded { .. } => "chat_ended",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
        }
    }

    pub fn ping_now() -> Self {
        Self::Ping {
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
