//! Shared fixtures: a scripted transport standing in for the chat server,
//! a delegate that records every callback, and a canned key generator.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lc_engine::broker::{AttachmentAction, ContentHandle, Thumbnail};
use lc_engine::{
    ChatEngine, ChatEngineBuilder, CollaborationComponents, ConnectOutcome, CustomizationDelegate,
    Delegates, Destination, EngineConfig, EngineError, HandshakeError, KeyGenerator,
    PresentationDelegate, ReplayCache, StatusDelegate, Transport, TransportError, TransportLink,
    WireMessage,
};

// ── Scripted transport ──────────────────────────────────────────────────

/// What the fake server does with the next connection attempt.
#[derive(Debug, Clone)]
pub enum Script {
    Welcome {
        token: &'static str,
        resumed: bool,
        verified: Option<bool>,
    },
    Unavailable,
    Fail(TransportError),
    /// Never answer.
    Hang,
}

impl Script {
    pub fn welcome(token: &'static str) -> Self {
        Self::Welcome {
            token,
            resumed: false,
            verified: None,
        }
    }
}

/// The server side of an established link.
pub struct ServerEnd {
    pub to_engine: mpsc::Sender<WireMessage>,
    pub from_engine: mpsc::Receiver<WireMessage>,
    pub close: CancellationToken,
}

impl ServerEnd {
    pub async fn push(&self, msg: WireMessage) {
        self.to_engine.send(msg).await.unwrap();
    }

    pub async fn push_line(&self, line_id: &str, text: &str) {
        self.push(WireMessage::ChatLine {
            seq: None,
            line_id: Some(line_id.into()),
            text: text.into(),
        })
        .await;
    }

    /// Next message from the engine, skipping acks.
    pub async fn next_non_ack(&mut self) -> WireMessage {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.from_engine.recv())
                .await
                .expect("timed out waiting for the engine")
                .expect("engine closed the link");
            if !matches!(msg, WireMessage::Ack { .. }) {
                return msg;
            }
        }
    }

    pub async fn next(&mut self) -> WireMessage {
        tokio::time::timeout(Duration::from_secs(5), self.from_engine.recv())
            .await
            .expect("timed out waiting for the engine")
            .expect("engine closed the link")
    }
}

pub struct ScriptedTransport {
    script: Mutex<VecDeque<Script>>,
    hellos: Mutex<Vec<WireMessage>>,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Script>) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            script: Mutex::new(script.into()),
            hellos: Mutex::new(Vec::new()),
            servers: tx,
        });
        (transport, rx)
    }

    pub fn hellos(&self) -> Vec<WireMessage> {
        self.hellos.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.hellos.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, hello: WireMessage) -> Result<ConnectOutcome, TransportError> {
        let destination = match &hello {
            WireMessage::VisitorHello { destination, .. } => destination.clone(),
            _ => Destination::default(),
        };
        self.hellos.lock().push(hello);

        let step = self.script.lock().pop_front();
        match step {
            None => Err(TransportError::Connect("no scripted answer".into())),
            Some(Script::Fail(e)) => Err(e),
            Some(Script::Unavailable) => Ok(ConnectOutcome::AgentsUnavailable { destination }),
            Some(Script::Hang) => std::future::pending().await,
            Some(Script::Welcome {
                token,
                resumed,
                verified,
            }) => {
                let (to_engine, inbound) = mpsc::channel(64);
                let (outbound, from_engine) = mpsc::channel(64);
                let close = CancellationToken::new();
                let _ = self.servers.send(ServerEnd {
                    to_engine,
                    from_engine,
                    close: close.clone(),
                });
                Ok(ConnectOutcome::Established {
                    session_token: token.into(),
                    resumed,
                    verified,
                    link: TransportLink {
                        outbound,
                        inbound,
                        close,
                    },
                })
            }
        }
    }
}

pub async fn next_server(rx: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("transport dropped")
}

// ── Recording delegate ──────────────────────────────────────────────────

#[derive(Default)]
pub struct Recorder {
    log: Mutex<Vec<String>>,
    errors: Mutex<Vec<EngineError>>,
    pub cache: AtomicBool,
    pub sso: AtomicBool,
    pub sso_url: Mutex<Option<String>>,
    pub custom_unanswered: AtomicBool,
    pub no_deflection: AtomicBool,
    pub photo: AtomicBool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, entry: impl Into<String>) {
        self.log.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.log.lock().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub fn errors(&self) -> Vec<EngineError> {
        self.errors.lock().clone()
    }
}

impl StatusDelegate for Recorder {
    fn enabled_status_changed(&self, enabled: bool) {
        self.record(format!("enabled:{enabled}"));
    }
    fn skill_enabled_changed(&self, skill: &str, account: &str, enabled: bool) {
        self.record(format!("skill_enabled:{account}/{skill}:{enabled}"));
    }
    fn control_button_shown(&self) {
        self.record("control_button_shown");
    }
    fn control_button_hidden(&self) {
        self.record("control_button_hidden");
    }
    fn chat_shown(&self) {
        self.record("chat_shown");
    }
    fn chat_hidden(&self) {
        self.record("chat_hidden");
    }
    fn chat_started(&self, session_token: &str) {
        self.record(format!("chat_started:{session_token}"));
    }
    fn chat_ended(&self) {
        self.record("chat_ended");
    }
    fn notification(&self, message: &str, unread: usize) {
        self.record(format!("notification:{message}:{unread}"));
    }
    fn on_event(&self, name: &str, _parameters: &serde_json::Value) {
        self.record(format!("event:{name}"));
    }
    fn error(&self, error: &EngineError) {
        self.record("error");
        self.errors.lock().push(error.clone());
    }
}

impl CustomizationDelegate for Recorder {
    fn enabled_collaboration_components(&self) -> CollaborationComponents {
        if self.photo.load(Ordering::SeqCst) {
            CollaborationComponents::PHOTO
        } else {
            CollaborationComponents::NONE
        }
    }
    fn should_use_custom_action_for_unanswered_chat(&self) -> bool {
        self.custom_unanswered.load(Ordering::SeqCst)
    }
    fn custom_action_for_unanswered_chat(&self) {
        self.record("custom_unanswered_action");
    }
    fn should_cache_messages_for_reconnect(&self) -> bool {
        self.cache.load(Ordering::SeqCst)
    }
    fn should_report_call_deflection(&self) -> bool {
        !self.no_deflection.load(Ordering::SeqCst)
    }
    fn single_sign_on_enabled(&self) -> bool {
        self.sso.load(Ordering::SeqCst)
    }
    fn single_sign_on_key_gen_url(&self) -> Option<String> {
        self.sso_url.lock().clone()
    }
}

impl PresentationDelegate for Recorder {
    fn show_agent_line(&self, seq: u64, text: &str) {
        self.record(format!("agent_line:{seq}:{text}"));
    }
    fn show_chat_ended_alert(&self) {
        self.record("ended_alert");
    }
    fn show_offline_survey(&self, destination: &Destination) {
        self.record(format!("offline_survey:{destination}"));
    }
    fn show_attachment_actions(&self, actions: &[AttachmentAction]) {
        self.record(format!("attachment_actions:{}", actions.len()));
    }
    fn show_attachment_preview(&self, content: &ContentHandle, thumbnail: Option<&Thumbnail>) {
        self.record(format!(
            "attachment_preview:{}:{}",
            content.content_key,
            thumbnail.is_some()
        ));
    }
}

// ── Key generator ───────────────────────────────────────────────────────

pub struct StaticKeys {
    result: Option<Result<String, HandshakeError>>,
    pub calls: AtomicUsize,
}

impl StaticKeys {
    pub fn ok(key: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Some(Ok(key.into())),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: HandshakeError) -> Arc<Self> {
        Arc::new(Self {
            result: Some(Err(error)),
            calls: AtomicUsize::new(0),
        })
    }

    /// Never answers.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            result: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl KeyGenerator for StaticKeys {
    async fn generate(&self, _url: &str) -> Result<String, HandshakeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.result {
            Some(r) => r.clone(),
            None => std::future::pending().await,
        }
    }
}

// ── Engine assembly ─────────────────────────────────────────────────────

pub struct Harness {
    pub engine: ChatEngine,
    pub recorder: Arc<Recorder>,
    pub transport: Arc<ScriptedTransport>,
    pub servers: mpsc::UnboundedReceiver<ServerEnd>,
    pub cache: Arc<ReplayCache>,
}

pub fn harness(script: Vec<Script>) -> Harness {
    harness_with(script, EngineConfig::default(), StaticKeys::ok("unused"), |_| {})
}

pub fn harness_with(
    script: Vec<Script>,
    config: EngineConfig,
    keys: Arc<dyn KeyGenerator>,
    prepare: impl FnOnce(&Recorder),
) -> Harness {
    let recorder = Recorder::new();
    prepare(&recorder);
    let (transport, servers) = ScriptedTransport::new(script);
    let cache = Arc::new(ReplayCache::in_memory(&config.replay));
    let engine = ChatEngineBuilder::new()
        .config(config)
        .delegates(Delegates::from_single(recorder.clone()))
        .transport(transport.clone())
        .key_generator(keys)
        .replay_cache(cache.clone())
        .build()
        .unwrap();
    Harness {
        engine,
        recorder,
        transport,
        servers,
        cache,
    }
}

/// Poll `cond` until it holds or five seconds pass.
pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
