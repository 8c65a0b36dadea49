//! `lc-engine`: embeddable live-chat client engine.
//!
//! A host application builds one [`ChatEngine`], tells it where chats
//! should go, and begins sessions.  The engine resolves the destination,
//! optionally verifies the visitor's identity, connects (resuming a cached
//! session when it can), flushes buffered visitor data and then relays chat
//! lines until either side ends the chat.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────── host ────────────────┐
//! │ ChatEngine (clone freely)            │      Status / Customization /
//! │   begin_chat, end_chat, set_skill,   │◀──── Presentation delegates
//! │   set_custom_variable, …             │
//! └───────────────┬──────────────────────┘
//!                 │ commands (mpsc)
//!       ┌─────────▼──────────┐   KeyGenerator (HTTP)
//!       │   session actor    │──▶ Transport (WebSocket)
//!       │  (state machine)   │──▶ ReplayCache (lc-sessions)
//!       └────────────────────┘
//!   shared: RoutingResolver · VisitorBuffer · PluginBroker
//! ```
//!
//! The routing resolver, buffer and plugin broker are safe to use from any
//! thread; every session state transition happens on the actor task.

pub mod broker;
pub mod buffer;
pub mod builder;
pub mod compat;
pub mod delegate;
pub mod engine;
pub mod reconnect;
pub mod routing;
pub mod sso;
pub mod transport;
pub mod types;
pub mod ws;

mod actor;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use broker::{
    AttachmentAction, AttachmentPlugin, ContentHandle, DisplayReply, ExchangePhase,
    PluginDescriptor, SelectionReply, SelectionResult, Thumbnail,
};
pub use builder::ChatEngineBuilder;
pub use delegate::{
    CollaborationComponents, CustomizationDelegate, Delegates, LinkView, NoopDelegate,
    PresentationDelegate, StatusDelegate, ViewHandle,
};
pub use engine::ChatEngine;
pub use reconnect::ReconnectBackoff;
pub use sso::{HttpKeyGenerator, KeyGenerator};
pub use transport::{ConnectOutcome, Transport, TransportLink};
pub use types::{EngineError, HandshakeError, SessionState, TransportError};
pub use ws::WsTransport;

// Hosts should not need to depend on the lower crates directly.
pub use lc_domain::config::{ConfigError, ConfigSeverity, EngineConfig, SsoFailurePolicy};
pub use lc_domain::{Destination, EventKind, EventRecord, VariableSet};
pub use lc_protocol::{VisitStatus, WireMessage};
pub use lc_sessions::ReplayCache;
