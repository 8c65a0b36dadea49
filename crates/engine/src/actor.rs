//! The session actor: sole owner and writer of the session state machine.
//!
//! ```text
//! Idle ─▶ Resolving ─┬─▶ Verifying ─┐
//!                    └──────────────┴─▶ Connecting ─▶ Connected ─▶ Ending ─▶ Idle
//!                                          │   │          │
//!                                          │   └ no agents ┴ link lost ─▶ Failed ─▶ Idle
//!                                          └ error ───────────────────▶ Failed ─▶ Idle
//! ```
//!
//! Host calls, handshake and connect completions, plugin results and
//! inbound frames all arrive on one task, so transitions never interleave.
//! Background work is tagged with the attempt number that started it and
//! its result is dropped if the session has moved on.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use lc_domain::config::{EngineConfig, SsoFailurePolicy};
use lc_domain::trace::TraceEvent;
use lc_domain::Destination;
use lc_protocol::{ResumeRequest, VisitStatus, WireMessage, PROTOCOL_VERSION};
use lc_sessions::{Direction, ReplayCache, ReplaySnapshot};

use crate::broker::{PluginBroker, SelectionResult};
use crate::buffer::{FlushBatch, VisitorBuffer};
use crate::delegate::{Delegates, StatusDelegate};
use crate::routing::{AvailabilityChange, RoutingResolver};
use crate::sso::KeyGenerator;
use crate::transport::{ConnectOutcome, Transport, TransportLink};
use crate::types::{EngineError, HandshakeError, SessionState, TransportError};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

pub(crate) enum Command {
    Begin {
        destination: Option<Destination>,
        reply: Reply<()>,
    },
    End {
        show_alert: bool,
        reply: Reply<()>,
    },
    Send {
        text: String,
        reply: Reply<u64>,
    },
    SetChatVisible(bool),
    /// Buffered variables or events are waiting.
    FlushBuffer,
    VisitChanged,
    HandshakeFinished {
        attempt: u64,
        result: Result<String, HandshakeError>,
    },
    ConnectFinished {
        attempt: u64,
        result: Result<ConnectOutcome, TransportError>,
    },
    SelectionFinished {
        generation: u64,
        result: SelectionResult,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State shared with the host handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pieces the host may read or write without going through the actor.
pub(crate) struct Shared {
    pub routing: RwLock<RoutingResolver>,
    pub buffer: VisitorBuffer,
    pub broker: PluginBroker,
    pub visit: Mutex<VisitStatus>,
    pub state: watch::Sender<SessionState>,
}

impl Shared {
    pub fn new(default_account: &str) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            routing: RwLock::new(RoutingResolver::new(default_account)),
            buffer: VisitorBuffer::new(),
            broker: PluginBroker::new(),
            visit: Mutex::new(VisitStatus::default()),
            state,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Chat is not disabled and the default account has agents available.
    pub fn is_enabled(&self) -> bool {
        let disabled = self.visit.lock().chat_disabled;
        !disabled && self.routing.read().default_account_enabled()
    }

    pub fn apply_availability(
        &self,
        account: Option<&str>,
        skill: Option<&str>,
        enabled: bool,
        status: &dyn StatusDelegate,
    ) {
        let before = self.is_enabled();
        let change = self.routing.write().apply(account, skill, enabled);
        if let Some(AvailabilityChange::Pool {
            account,
            skill: Some(skill),
            enabled,
        }) = &change
        {
            status.skill_enabled_changed(skill, account, *enabled);
        }
        if change.is_some() {
            tracing::debug!(?change, "availability updated");
        }
        self.notify_if_enabled_changed(before, status);
    }

    /// Report a flip of [`is_enabled`](Self::is_enabled) since `before`.
    pub fn notify_if_enabled_changed(&self, before: bool, status: &dyn StatusDelegate) {
        let after = self.is_enabled();
        if before == after {
            return;
        }
        status.enabled_status_changed(after);
        if after {
            status.control_button_shown();
        } else {
            status.control_button_hidden();
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Actor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ActiveSession {
    destination: Destination,
    cache_enabled: bool,
    sso_key: Option<String>,
    /// Snapshot offered for resumption while connecting.
    resume: Option<ReplaySnapshot>,
    /// Lines of the connected session.
    snapshot: Option<ReplaySnapshot>,
}

impl ActiveSession {
    fn token(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|s| s.session_token.as_str())
    }
}

enum Event {
    Command(Command),
    Inbound(Option<WireMessage>),
}

pub(crate) struct SessionActor {
    config: Arc<EngineConfig>,
    visitor_id: String,
    shared: Arc<Shared>,
    delegates: Delegates,
    transport: Arc<dyn Transport>,
    keys: Arc<dyn KeyGenerator>,
    cache: Arc<ReplayCache>,
    commands: mpsc::Receiver<Command>,
    loopback: mpsc::WeakSender<Command>,
    shutdown: CancellationToken,

    attempt: u64,
    inflight: Option<AbortHandle>,
    session: Option<ActiveSession>,
    link: Option<TransportLink>,
    chat_visible: bool,
    unread: usize,
}

pub(crate) struct ActorParts {
    pub config: Arc<EngineConfig>,
    pub shared: Arc<Shared>,
    pub delegates: Delegates,
    pub transport: Arc<dyn Transport>,
    pub keys: Arc<dyn KeyGenerator>,
    pub cache: Arc<ReplayCache>,
    pub shutdown: CancellationToken,
}

impl SessionActor {
    pub fn new(
        parts: ActorParts,
        commands: mpsc::Receiver<Command>,
        loopback: mpsc::WeakSender<Command>,
    ) -> Self {
        let visitor_id = parts.config.visitor_id_or_generate();
        Self {
            config: parts.config,
            visitor_id,
            shared: parts.shared,
            delegates: parts.delegates,
            transport: parts.transport,
            keys: parts.keys,
            cache: parts.cache,
            commands,
            loopback,
            shutdown: parts.shutdown,
            attempt: 0,
            inflight: None,
            session: None,
            link: None,
            chat_visible: false,
            unread: 0,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(visitor_id = %self.visitor_id, "session actor started");
        loop {
            let event = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => Event::Command(cmd),
                    None => break,
                },
                msg = next_inbound(&mut self.link) => Event::Inbound(msg),
                _ = self.shutdown.cancelled() => break,
            };

            match event {
                Event::Command(cmd) => self.handle_command(cmd).await,
                Event::Inbound(Some(msg)) => self.handle_inbound(msg).await,
                Event::Inbound(None) => self.link_lost(),
            }

            // Catch writes whose wake-up was dropped on a full queue.
            if self.shared.buffer.has_pending() {
                self.flush_buffer().await;
            }
        }

        if let Some(task) = self.inflight.take() {
            task.abort();
        }
        if let Some(link) = self.link.take() {
            link.close.cancel();
        }
        self.shared.broker.set_session_active(false);
        self.shared.broker.reset();
        tracing::debug!("session actor stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Begin { destination, reply } => {
                let _ = reply.send(self.begin(destination));
            }
            Command::End { show_alert, reply } => {
                let _ = reply.send(self.end(show_alert, true).await);
            }
            Command::Send { text, reply } => {
                let _ = reply.send(self.send_line(text).await);
            }
            Command::SetChatVisible(visible) => {
                self.chat_visible = visible;
                if visible {
                    self.unread = 0;
                }
            }
            Command::FlushBuffer => self.flush_buffer().await,
            Command::VisitChanged => {
                if self.state() == SessionState::Connected {
                    let visit = *self.shared.visit.lock();
                    self.send(WireMessage::VisitStatus(visit)).await;
                }
            }
            Command::HandshakeFinished { attempt, result } => {
                self.handshake_finished(attempt, result);
            }
            Command::ConnectFinished { attempt, result } => {
                self.connect_finished(attempt, result).await;
            }
            Command::SelectionFinished { generation, result } => {
                self.selection_finished(generation, result).await;
            }
        }
    }

    fn state(&self) -> SessionState {
        self.shared.state()
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.shared.state.send_replace(to);
        if from != to {
            TraceEvent::SessionStateChanged {
                from: from.to_string(),
                to: to.to_string(),
                session_token: self
                    .session
                    .as_ref()
                    .and_then(|s| s.token())
                    .map(str::to_string),
            }
            .emit();
        }
    }

    // ── begin ────────────────────────────────────────────────────────

    fn begin(&mut self, explicit: Option<Destination>) -> Result<(), EngineError> {
        if self.state().in_progress() {
            return Err(EngineError::AlreadyActive);
        }
        if self.shared.visit.lock().chat_disabled {
            return Err(EngineError::ChatDisabled);
        }

        self.transition(SessionState::Resolving);
        let destination = self.shared.routing.read().resolve(explicit.as_ref());
        if destination.skill.is_none() {
            tracing::info!(
                destination = %destination,
                reason = %EngineError::NoDestination,
                "beginning chat without a skill"
            );
        }

        let customization = self.delegates.customization.clone();
        let cache_enabled = customization.should_cache_messages_for_reconnect();
        self.session = Some(ActiveSession {
            destination,
            cache_enabled,
            sso_key: None,
            resume: None,
            snapshot: None,
        });
        self.attempt += 1;
        self.delegates.status.chat_shown();

        if !customization.single_sign_on_enabled() {
            self.start_connecting();
            return Ok(());
        }

        self.transition(SessionState::Verifying);
        let Some(url) = customization.single_sign_on_key_gen_url() else {
            self.handshake_failed(HandshakeError::Malformed(
                "single sign-on enabled without a key generation URL".into(),
            ));
            return Ok(());
        };

        let keys = self.keys.clone();
        let loopback = self.loopback.clone();
        let attempt = self.attempt;
        let task = tokio::spawn(async move {
            let result = keys.generate(&url).await;
            if let Some(tx) = loopback.upgrade() {
                let _ = tx.send(Command::HandshakeFinished { attempt, result }).await;
            }
        });
        self.inflight = Some(task.abort_handle());
        Ok(())
    }

    fn handshake_finished(&mut self, attempt: u64, result: Result<String, HandshakeError>) {
        if attempt != self.attempt || self.state() != SessionState::Verifying {
            tracing::debug!(attempt, "late handshake result dropped");
            return;
        }
        self.inflight = None;

        match result {
            Ok(key) => {
                TraceEvent::HandshakeCompleted {
                    verified: true,
                    error: None,
                }
                .emit();
                if let Some(session) = self.session.as_mut() {
                    session.sso_key = Some(key);
                }
                self.start_connecting();
            }
            Err(e) => self.handshake_failed(e),
        }
    }

    fn handshake_failed(&mut self, error: HandshakeError) {
        TraceEvent::HandshakeCompleted {
            verified: false,
            error: Some(error.to_string()),
        }
        .emit();
        let error = EngineError::from(error);
        self.delegates
            .status
            .on_event("handshake_failed", &json!({ "error": error.to_string() }));

        match self.config.sso.failure_policy {
            SsoFailurePolicy::Degrade => {
                tracing::warn!(error = %error, "continuing without identity verification");
                self.delegates.status.error(&error);
                self.start_connecting();
            }
            SsoFailurePolicy::Block => self.fail(error),
        }
    }

    fn start_connecting(&mut self) {
        self.transition(SessionState::Connecting);
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let resume = if session.cache_enabled {
            self.cache
                .load_resumable(&session.destination)
                .and_then(|snapshot| {
                    if snapshot.is_consistent() {
                        return Some(snapshot);
                    }
                    let error = EngineError::CacheCorrupt(format!(
                        "snapshot {} acknowledges past its last line",
                        snapshot.session_token
                    ));
                    tracing::warn!(error = %error, "ignoring cached snapshot");
                    self.cache.discard(&snapshot.session_token);
                    None
                })
        } else {
            self.cache.clear();
            None
        };

        if let Some(snapshot) = &resume {
            TraceEvent::ResumeRequested {
                session_token: snapshot.session_token.clone(),
                last_acked_seq: snapshot.last_acked_seq,
            }
            .emit();
        }

        let hello = WireMessage::VisitorHello {
            protocol_version: PROTOCOL_VERSION,
            app_id: self.config.app_id.clone(),
            visitor_id: self.visitor_id.clone(),
            destination: session.destination.clone(),
            resume: resume.as_ref().map(|s| ResumeRequest {
                session_token: s.session_token.clone(),
                last_acked_seq: s.last_acked_seq,
            }),
            sso_key: session.sso_key.clone(),
            visit: *self.shared.visit.lock(),
            sdk_version: env!("CARGO_PKG_VERSION").into(),
        };
        session.resume = resume;

        let transport = self.transport.clone();
        let loopback = self.loopback.clone();
        let attempt = self.attempt;
        let task = tokio::spawn(async move {
            let result = transport.connect(hello).await;
            match loopback.upgrade() {
                Some(tx) => {
                    let _ = tx.send(Command::ConnectFinished { attempt, result }).await;
                }
                None => {
                    if let Ok(ConnectOutcome::Established { link, .. }) = result {
                        link.close.cancel();
                    }
                }
            }
        });
        self.inflight = Some(task.abort_handle());
    }

    async fn connect_finished(
        &mut self,
        attempt: u64,
        result: Result<ConnectOutcome, TransportError>,
    ) {
        if attempt != self.attempt || self.state() != SessionState::Connecting {
            tracing::debug!(attempt, "late connect result dropped");
            if let Ok(ConnectOutcome::Established { link, .. }) = result {
                link.close.cancel();
            }
            return;
        }
        self.inflight = None;

        match result {
            Err(e) => self.fail(e.into()),
            Ok(ConnectOutcome::AgentsUnavailable { destination }) => self.unanswered(destination),
            Ok(ConnectOutcome::Established {
                session_token,
                resumed,
                verified,
                link,
            }) => {
                self.established(session_token, resumed, verified, link)
                    .await;
            }
        }
    }

    async fn established(
        &mut self,
        session_token: String,
        resumed: bool,
        verified: Option<bool>,
        link: TransportLink,
    ) {
        let Some(session) = self.session.as_mut() else {
            link.close.cancel();
            return;
        };

        let (snapshot, resumed) = match session.resume.take() {
            Some(candidate) if resumed && candidate.session_token == session_token => {
                (candidate, true)
            }
            other => {
                if let Some(stale) = other {
                    tracing::info!(
                        session_token = %stale.session_token,
                        "server started a fresh session, dropping cached one"
                    );
                    self.cache.discard(&stale.session_token);
                }
                (
                    ReplaySnapshot::new(session_token.clone(), session.destination.clone()),
                    false,
                )
            }
        };
        let key_sent = session.sso_key.is_some();
        session.snapshot = Some(snapshot);
        self.link = Some(link);

        self.transition(SessionState::Connected);
        self.shared.broker.set_session_active(true);
        self.delegates.status.chat_started(&session_token);
        let name = if resumed { "chat_resumed" } else { "chat_started" };
        self.delegates
            .status
            .on_event(name, &json!({ "session_token": session_token }));

        if key_sent && verified == Some(false) {
            let error = EngineError::from(HandshakeError::Rejected(
                "chat server refused the verification key".into(),
            ));
            self.delegates
                .status
                .on_event("handshake_failed", &json!({ "error": error.to_string() }));
            match self.config.sso.failure_policy {
                SsoFailurePolicy::Degrade => {
                    tracing::warn!(error = %error, "chat continues unverified");
                    self.delegates.status.error(&error);
                }
                SsoFailurePolicy::Block => {
                    self.send(WireMessage::EndChat {
                        reason: "identity_rejected".into(),
                    })
                    .await;
                    self.cache.discard(&session_token);
                    self.fail(error);
                    return;
                }
            }
        }

        if resumed {
            self.resend_unacked().await;
        }
        let batch = self.shared.buffer.take_all();
        self.send_batch(batch).await;
        self.persist();
    }

    fn unanswered(&mut self, destination: Destination) {
        tracing::info!(destination = %destination, "no agents available");
        self.delegates.status.on_event(
            "agents_unavailable",
            &json!({ "destination": destination.to_string() }),
        );

        let customization = self.delegates.customization.clone();
        if customization.should_use_custom_action_for_unanswered_chat() {
            customization.custom_action_for_unanswered_chat();
        } else {
            self.delegates.presentation.show_offline_survey(&destination);
        }

        self.teardown();
        self.transition(SessionState::Idle);
    }

    // ── connected ────────────────────────────────────────────────────

    async fn handle_inbound(&mut self, msg: WireMessage) {
        match msg {
            WireMessage::ChatLine { line_id, text, .. } => self.receive_line(line_id, text).await,
            WireMessage::Ack { seq } => {
                if let Some(snapshot) = self.snapshot_mut() {
                    snapshot.acknowledge_remote(seq);
                }
                self.persist();
            }
            WireMessage::Availability {
                account,
                skill,
                enabled,
            } => {
                self.shared.apply_availability(
                    account.as_deref(),
                    skill.as_deref(),
                    enabled,
                    self.delegates.status.as_ref(),
                );
            }
            WireMessage::ChatEnded { reason } => {
                tracing::info!(reason = reason.as_deref().unwrap_or("none"), "agent ended the chat");
                let _ = self.end(false, false).await;
            }
            WireMessage::Ping { timestamp } => {
                self.send(WireMessage::Pong { timestamp }).await;
            }
            other => {
                tracing::debug!(kind = other.kind(), "ignoring inbound message");
            }
        }
    }

    async fn receive_line(&mut self, line_id: Option<String>, text: String) {
        let max_messages = self.config.replay.max_messages;
        let Some(snapshot) = self.snapshot_mut() else {
            return;
        };
        if let Some(id) = line_id.as_deref() {
            if snapshot.contains_line(id) {
                tracing::debug!(line_id = %id, "dropping replayed line");
                return;
            }
        }

        let payload = serde_json::to_value(WireMessage::ChatLine {
            seq: None,
            line_id,
            text: text.clone(),
        })
        .unwrap_or_default();
        let seq = snapshot.append(Direction::Inbound, payload);
        snapshot.trim_to(max_messages);

        self.send(WireMessage::Ack { seq }).await;
        self.delegates.presentation.show_agent_line(seq, &text);
        if !self.chat_visible {
            self.unread += 1;
            self.delegates.status.notification(&text, self.unread);
        }
        self.persist();
    }

    async fn send_line(&mut self, text: String) -> Result<u64, EngineError> {
        if self.state() != SessionState::Connected {
            return Err(EngineError::NotActive);
        }
        let max_messages = self.config.replay.max_messages;
        let snapshot = self.snapshot_mut().ok_or(EngineError::NotActive)?;

        let seq = snapshot.append_with(Direction::Outbound, |seq| {
            serde_json::to_value(WireMessage::ChatLine {
                seq: Some(seq),
                line_id: None,
                text: text.clone(),
            })
            .unwrap_or_default()
        });
        snapshot.trim_to(max_messages);

        self.send(WireMessage::ChatLine {
            seq: Some(seq),
            line_id: None,
            text,
        })
        .await;
        self.persist();
        Ok(seq)
    }

    async fn resend_unacked(&mut self) {
        let pending: Vec<WireMessage> = match self.session.as_ref().and_then(|s| s.snapshot.as_ref()) {
            Some(snapshot) => snapshot
                .unacked_outbound()
                .filter_map(|m| serde_json::from_value(m.payload.clone()).ok())
                .collect(),
            None => return,
        };
        if !pending.is_empty() {
            tracing::info!(lines = pending.len(), "re-sending unacknowledged lines");
        }
        for msg in pending {
            self.send(msg).await;
        }
    }

    async fn flush_buffer(&mut self) {
        if self.state() != SessionState::Connected {
            return;
        }
        let batch = self.shared.buffer.take_pending();
        self.send_batch(batch).await;
    }

    async fn send_batch(&mut self, batch: FlushBatch) {
        if batch.is_empty() {
            return;
        }
        TraceEvent::BufferFlushed {
            variables: batch.variables.len(),
            events: batch.events.len(),
        }
        .emit();
        self.send(WireMessage::VisitorData {
            variables: batch.variables,
            events: batch.events,
        })
        .await;
    }

    async fn selection_finished(&mut self, generation: u64, result: SelectionResult) {
        let Some(content) = self.shared.broker.complete_selection(generation, result) else {
            return;
        };
        if self.state() != SessionState::Connected {
            return;
        }

        self.send(WireMessage::Attachment {
            plugin_id: content.plugin_id.clone(),
            content_key: content.content_key.clone(),
        })
        .await;

        let thumbnail = match self.shared.broker.thumbnail(&content) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "no thumbnail for attachment");
                None
            }
        };
        self.delegates
            .presentation
            .show_attachment_preview(&content, thumbnail.as_ref());
        self.delegates.status.on_event(
            "attachment_sent",
            &json!({ "plugin_id": content.plugin_id, "content_key": content.content_key }),
        );
    }

    // ── ending ───────────────────────────────────────────────────────

    /// End the session.  `by_visitor` is false when the server ended it.
    async fn end(&mut self, show_alert: bool, by_visitor: bool) -> Result<(), EngineError> {
        if !matches!(
            self.state(),
            SessionState::Verifying | SessionState::Connecting | SessionState::Connected
        ) {
            return Err(EngineError::NotActive);
        }

        // Anything still in flight belongs to this session.
        self.attempt += 1;
        self.transition(SessionState::Ending);

        if by_visitor {
            if let Some(link) = &self.link {
                let _ = link.outbound.try_send(WireMessage::EndChat {
                    reason: "visitor_ended".into(),
                });
            }
        }

        if let Some(session) = &self.session {
            let tokens = session
                .snapshot
                .iter()
                .chain(session.resume.iter())
                .map(|s| s.session_token.as_str());
            for token in tokens {
                self.cache.discard(token);
            }
        }

        self.delegates.status.chat_ended();
        self.delegates.status.on_event(
            "chat_ended",
            &json!({ "by": if by_visitor { "visitor" } else { "agent" } }),
        );
        if show_alert {
            self.delegates.presentation.show_chat_ended_alert();
        }

        self.teardown();
        self.transition(SessionState::Idle);
        Ok(())
    }

    fn link_lost(&mut self) {
        self.link = None;
        if self.state() != SessionState::Connected {
            return;
        }
        let token = self
            .session
            .as_ref()
            .and_then(|s| s.token())
            .unwrap_or_default()
            .to_string();
        tracing::warn!(session_token = %token, "chat connection lost");
        self.delegates
            .status
            .on_event("chat_interrupted", &json!({ "session_token": token }));
        self.fail(EngineError::TransportUnavailable("connection lost".into()));
    }

    /// Report `error`, pass through `Failed` and settle in `Idle`.  Cached
    /// snapshots stay so a later attempt can resume.
    fn fail(&mut self, error: EngineError) {
        tracing::warn!(error = %error, "chat attempt failed");
        self.transition(SessionState::Failed);
        self.delegates.status.error(&error);
        self.teardown();
        self.transition(SessionState::Idle);
    }

    fn teardown(&mut self) {
        if let Some(task) = self.inflight.take() {
            task.abort();
        }
        if let Some(link) = self.link.take() {
            link.close.cancel();
        }
        self.shared.broker.set_session_active(false);
        self.shared.broker.reset();
        self.session = None;
        self.unread = 0;
        self.delegates.status.chat_hidden();
    }

    // ── helpers ──────────────────────────────────────────────────────

    fn snapshot_mut(&mut self) -> Option<&mut ReplaySnapshot> {
        self.session.as_mut().and_then(|s| s.snapshot.as_mut())
    }

    fn persist(&self) {
        if let Some(session) = &self.session {
            if let (true, Some(snapshot)) = (session.cache_enabled, &session.snapshot) {
                self.cache.store(snapshot);
            }
        }
    }

    async fn send(&self, msg: WireMessage) {
        let Some(link) = &self.link else {
            tracing::debug!(kind = msg.kind(), "no link, dropping outbound message");
            return;
        };
        if link.outbound.send(msg).await.is_err() {
            tracing::debug!("link closed while sending");
        }
    }
}

async fn next_inbound(link: &mut Option<TransportLink>) -> Option<WireMessage> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => std::future::pending().await,
    }
}
