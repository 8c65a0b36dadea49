use serde::Serialize;

/// Structured trace events emitted across the live-chat crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionStateChanged {
        from: String,
        to: String,
        session_token: Option<String>,
    },
    DestinationResolved {
        account: String,
        skill: Option<String>,
    },
    HandshakeCompleted {
        verified: bool,
        error: Option<String>,
    },
    ResumeRequested {
        session_token: String,
        last_acked_seq: u64,
    },
    BufferFlushed {
        variables: usize,
        events: usize,
    },
    ReplayStored {
        session_token: String,
        messages: usize,
        last_acked_seq: u64,
    },
    ReplayEvicted {
        session_token: String,
        reason: String,
    },
    ReplayCorrupt {
        path: String,
        error: String,
    },
    PluginSelection {
        plugin_id: String,
        action_index: usize,
        outcome: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "lc_event");
    }
}
