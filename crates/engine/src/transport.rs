//! Seam between the session state machine and the network.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lc_domain::Destination;
use lc_protocol::WireMessage;

use crate::types::TransportError;

/// Open channels to an established session.
///
/// `inbound` ends (yields `None`) when the connection drops.  Cancelling
/// `close` tears the connection down from our side.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::Sender<WireMessage>,
    pub inbound: mpsc::Receiver<WireMessage>,
    pub close: CancellationToken,
}

/// How a connection attempt ended.
#[derive(Debug)]
pub enum ConnectOutcome {
    Established {
        session_token: String,
        resumed: bool,
        verified: Option<bool>,
        link: TransportLink,
    },
    /// The server answered but no agent can take the chat.
    AgentsUnavailable { destination: Destination },
}

/// Establishes chat sessions.  Implementations own their retry policy; the
/// state machine makes exactly one `connect` call per attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `hello` (a `visitor_hello`) and wait for the server's answer.
    async fn connect(&self, hello: WireMessage) -> Result<ConnectOutcome, TransportError>;
}
