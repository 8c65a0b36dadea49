//! Identity verification, routing availability, attachments and visitor
//! events, exercised against the scripted transport.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use common::*;
use lc_engine::{
    AttachmentPlugin, DisplayReply, EngineConfig, EngineError, EventKind, HandshakeError,
    PluginDescriptor, SelectionReply, SessionState, SsoFailurePolicy, Thumbnail, WireMessage,
};

const KEY_URL: &str = "https://example.com/sso/key";

fn with_sso(r: &Recorder) {
    r.sso.store(true, Ordering::SeqCst);
    *r.sso_url.lock() = Some(KEY_URL.into());
}

fn sso_key_of(hello: &WireMessage) -> Option<String> {
    match hello {
        WireMessage::VisitorHello { sso_key, .. } => sso_key.clone(),
        other => panic!("expected hello, got {other:?}"),
    }
}

fn blocking() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.sso.failure_policy = SsoFailurePolicy::Block;
    config
}

// ── single sign-on ──────────────────────────────────────────────────────

#[tokio::test]
async fn verified_key_travels_in_hello() {
    let keys = StaticKeys::ok("abc123");
    let mut h = harness_with(
        vec![Script::welcome("t-1")],
        EngineConfig::default(),
        keys.clone(),
        with_sso,
    );
    h.engine.begin_chat().await.unwrap();
    let _server = next_server(&mut h.servers).await;

    assert_eq!(sso_key_of(&h.transport.hellos()[0]).as_deref(), Some("abc123"));
    assert_eq!(keys.calls.load(Ordering::SeqCst), 1);
    assert!(h.recorder.errors().is_empty());
}

#[tokio::test]
async fn failed_verification_degrades_to_unverified_chat() {
    let mut h = harness_with(
        vec![Script::welcome("t-1")],
        EngineConfig::default(),
        StaticKeys::failing(HandshakeError::Unreachable("connection refused".into())),
        with_sso,
    );
    h.engine.begin_chat().await.unwrap();
    let _server = next_server(&mut h.servers).await;

    assert_eq!(sso_key_of(&h.transport.hellos()[0]), None);
    assert!(matches!(
        h.recorder.errors()[0],
        EngineError::HandshakeFailed(_)
    ));
    assert_eq!(h.recorder.count("event:handshake_failed"), 1);
    let engine = h.engine.clone();
    eventually("connected", move || engine.state() == SessionState::Connected).await;
}

#[tokio::test]
async fn failed_verification_blocks_when_configured() {
    let h = harness_with(
        vec![Script::welcome("t-1")],
        blocking(),
        StaticKeys::failing(HandshakeError::Rejected("403 Forbidden".into())),
        with_sso,
    );
    h.engine.begin_chat().await.unwrap();

    let recorder = h.recorder.clone();
    eventually("failure reported", move || recorder.count("error") == 1).await;
    assert_eq!(h.engine.state(), SessionState::Idle);
    assert_eq!(h.transport.connects(), 0);
    assert_eq!(h.recorder.count("chat_ended"), 0);
}

#[tokio::test]
async fn missing_key_url_counts_as_malformed() {
    let mut h = harness_with(
        vec![Script::welcome("t-1")],
        EngineConfig::default(),
        StaticKeys::ok("never used"),
        |r| r.sso.store(true, Ordering::SeqCst),
    );
    h.engine.begin_chat().await.unwrap();
    let _server = next_server(&mut h.servers).await;

    assert_eq!(sso_key_of(&h.transport.hellos()[0]), None);
    match &h.recorder.errors()[0] {
        EngineError::HandshakeFailed(m) => assert!(m.contains("malformed")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn ending_during_verification_cancels_the_attempt() {
    let keys = StaticKeys::hanging();
    let h = harness_with(
        vec![Script::welcome("t-1")],
        EngineConfig::default(),
        keys.clone(),
        with_sso,
    );
    h.engine.begin_chat().await.unwrap();
    assert_eq!(h.engine.state(), SessionState::Verifying);

    h.engine.end_chat(false).await.unwrap();
    assert_eq!(h.engine.state(), SessionState::Idle);
    assert_eq!(h.recorder.count("chat_ended"), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.transport.connects(), 0);
    assert_eq!(keys.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_rejecting_the_key_is_reported() {
    let mut h = harness_with(
        vec![Script::Welcome {
            token: "t-1",
            resumed: false,
            verified: Some(false),
        }],
        EngineConfig::default(),
        StaticKeys::ok("abc123"),
        with_sso,
    );
    h.engine.begin_chat().await.unwrap();
    let _server = next_server(&mut h.servers).await;

    let recorder = h.recorder.clone();
    eventually("rejection reported", move || recorder.count("error") == 1).await;
    assert_eq!(h.engine.state(), SessionState::Connected);
}

#[tokio::test]
async fn server_rejecting_the_key_ends_a_blocking_chat() {
    let mut h = harness_with(
        vec![Script::Welcome {
            token: "t-1",
            resumed: false,
            verified: Some(false),
        }],
        blocking(),
        StaticKeys::ok("abc123"),
        with_sso,
    );
    h.engine.begin_chat().await.unwrap();
    let mut server = next_server(&mut h.servers).await;

    assert_eq!(
        server.next().await,
        WireMessage::EndChat {
            reason: "identity_rejected".into()
        }
    );
    let engine = h.engine.clone();
    eventually("idle", move || engine.state() == SessionState::Idle).await;
    assert_eq!(h.recorder.count("error"), 1);
}

// ── routing and availability ────────────────────────────────────────────

#[tokio::test]
async fn availability_follows_account_then_global() {
    let h = harness(vec![]);
    assert!(!h.engine.is_enabled());

    h.engine.apply_availability(None, None, true);
    assert!(h.engine.is_enabled());
    assert_eq!(h.recorder.count("enabled:true"), 1);
    assert_eq!(h.recorder.count("control_button_shown"), 1);

    h.engine.apply_availability(Some("acme"), Some("billing"), false);
    assert_eq!(h.recorder.count("skill_enabled:acme/billing:false"), 1);
    assert!(!h.engine.is_chat_enabled_for_skill_in_account("billing", "acme"));
    assert!(h.engine.is_chat_enabled_for_skill("billing"));

    // Repeating an update changes nothing.
    h.engine.apply_availability(Some("acme"), Some("billing"), false);
    assert_eq!(h.recorder.count_prefix("skill_enabled"), 1);

    h.engine.set_chat_disabled(true);
    assert!(!h.engine.is_enabled());
    assert!(!h.engine.is_chat_enabled_for_skill("billing"));
    assert_eq!(h.recorder.count("enabled:false"), 1);
    assert_eq!(h.recorder.count("control_button_hidden"), 1);
}

#[tokio::test]
async fn default_account_pool_decides_is_enabled() {
    let h = harness(vec![]);
    h.engine.apply_availability(None, None, true);
    assert!(h.engine.is_enabled());

    h.engine.apply_availability(Some("default"), None, false);
    assert!(!h.engine.is_enabled());
    assert_eq!(h.recorder.count("enabled:false"), 1);
    assert_eq!(h.recorder.count("control_button_hidden"), 1);

    // Another account's pool does not move it.
    h.engine.apply_availability(Some("acme"), None, true);
    assert!(!h.engine.is_enabled());

    h.engine.apply_availability(Some("default"), None, true);
    assert!(h.engine.is_enabled());
    assert_eq!(h.recorder.count("enabled:true"), 2);
}

#[tokio::test]
async fn server_pushes_availability_while_connected() {
    let mut h = harness(vec![Script::welcome("t-1")]);
    h.engine.begin_chat().await.unwrap();
    let server = next_server(&mut h.servers).await;

    server
        .push(WireMessage::Availability {
            account: None,
            skill: Some("sales".into()),
            enabled: true,
        })
        .await;

    let recorder = h.recorder.clone();
    eventually("skill update", move || {
        recorder.count("skill_enabled:default/sales:true") == 1
    })
    .await;
    assert!(h.engine.is_chat_enabled_for_skill("sales"));
}

#[tokio::test]
async fn pending_destination_feeds_the_hello() {
    let mut h = harness(vec![Script::welcome("t-1")]);
    h.engine.set_skill_in_account("billing", "acme");
    h.engine.set_skill("support");
    assert_eq!(h.engine.pending_destination().to_string(), "acme/support");

    h.engine.begin_chat().await.unwrap();
    let _server = next_server(&mut h.servers).await;
    match &h.transport.hellos()[0] {
        WireMessage::VisitorHello { destination, .. } => {
            assert_eq!(destination.account(), Some("acme"));
            assert_eq!(destination.skill_name(), Some("support"));
        }
        other => panic!("expected hello, got {other:?}"),
    }
}

// ── attachments ─────────────────────────────────────────────────────────

/// Holds the reply until the test decides how the flow ends.
#[derive(Default)]
struct Camera {
    pending: Mutex<Option<SelectionReply>>,
    resets: AtomicUsize,
}

impl Camera {
    fn answer(&self, key: &str) {
        let reply = self.pending.lock().take().expect("no selection in progress");
        reply.produced(key);
    }
}

impl AttachmentPlugin for Camera {
    fn begin_selection(&self, _action_index: usize, reply: SelectionReply) {
        *self.pending.lock() = Some(reply);
    }

    fn thumbnail(&self, _content_key: &str) -> Option<Thumbnail> {
        Some(Thumbnail {
            mime_type: "image/png".into(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        })
    }

    fn begin_display(&self, _content_key: &str, reply: DisplayReply) {
        reply.done();
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

fn camera_harness(photo: bool) -> (Harness, Arc<Camera>) {
    let h = harness_with(
        vec![Script::welcome("t-1")],
        EngineConfig::default(),
        StaticKeys::ok("unused"),
        |r| r.photo.store(photo, Ordering::SeqCst),
    );
    let camera = Arc::new(Camera::default());
    h.engine
        .register_plugin(
            PluginDescriptor::new("camera", ["Take photo", "Choose photo"]),
            camera.clone(),
        )
        .unwrap();
    (h, camera)
}

#[tokio::test]
async fn attachment_flow_sends_content_and_previews_it() {
    let (mut h, camera) = camera_harness(true);
    assert_eq!(
        h.engine.select_attachment("camera", 0),
        Err(EngineError::NoActiveSession)
    );

    h.engine.begin_chat().await.unwrap();
    let mut server = next_server(&mut h.servers).await;
    let engine = h.engine.clone();
    eventually("connected", move || engine.state() == SessionState::Connected).await;

    let actions = h.engine.offer_attachments();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[1].label, "Choose photo");
    assert_eq!(h.recorder.count("attachment_actions:2"), 1);

    h.engine.select_attachment("camera", 0).unwrap();
    assert_eq!(
        h.engine.select_attachment("camera", 1),
        Err(EngineError::PluginAlreadyInProgress)
    );

    camera.answer("photo-1");
    assert_eq!(
        server.next_non_ack().await,
        WireMessage::Attachment {
            plugin_id: "camera".into(),
            content_key: "photo-1".into(),
        }
    );
    let recorder = h.recorder.clone();
    eventually("preview", move || {
        recorder.count("attachment_preview:photo-1:true") == 1
    })
    .await;
    assert_eq!(h.recorder.count("event:attachment_sent"), 1);
}

#[tokio::test]
async fn ending_the_chat_resets_plugins_and_drops_late_results() {
    let (mut h, camera) = camera_harness(true);
    h.engine.begin_chat().await.unwrap();
    let _server = next_server(&mut h.servers).await;
    let engine = h.engine.clone();
    eventually("connected", move || engine.state() == SessionState::Connected).await;

    h.engine.select_attachment("camera", 1).unwrap();
    h.engine.end_chat(false).await.unwrap();
    assert!(camera.resets.load(Ordering::SeqCst) >= 1);

    camera.answer("photo-late");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.recorder.count_prefix("attachment_preview"), 0);
    assert_eq!(
        h.engine.select_attachment("camera", 0),
        Err(EngineError::NoActiveSession)
    );
}

#[tokio::test]
async fn unknown_plugins_and_actions_are_rejected() {
    let (mut h, _camera) = camera_harness(true);
    h.engine.begin_chat().await.unwrap();
    let _server = next_server(&mut h.servers).await;
    let engine = h.engine.clone();
    eventually("connected", move || engine.state() == SessionState::Connected).await;

    assert_eq!(
        h.engine.select_attachment("scanner", 0),
        Err(EngineError::UnknownPlugin("scanner".into()))
    );
    assert_eq!(
        h.engine.select_attachment("camera", 7),
        Err(EngineError::UnknownAction {
            plugin_id: "camera".into(),
            index: 7,
        })
    );
    assert!(matches!(
        h.engine
            .register_plugin(PluginDescriptor::new("empty", Vec::<String>::new()), Arc::new(Camera::default())),
        Err(EngineError::MalformedPluginDescriptor(_))
    ));
}

#[tokio::test]
async fn no_collaboration_components_means_no_offer() {
    let (h, _camera) = camera_harness(false);
    assert!(h.engine.offer_attachments().is_empty());
    assert_eq!(h.recorder.count_prefix("attachment_actions"), 0);
}

// ── visitor events ──────────────────────────────────────────────────────

#[tokio::test]
async fn call_deflection_is_reported_unless_disabled() {
    let mut h = harness(vec![Script::welcome("t-1")]);
    h.engine.begin_chat().await.unwrap();
    let mut server = next_server(&mut h.servers).await;
    let engine = h.engine.clone();
    eventually("connected", move || engine.state() == SessionState::Connected).await;

    h.engine.report_call_deflection(Duration::from_secs(90));
    match server.next_non_ack().await {
        WireMessage::VisitorData { events, .. } => {
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].kind, EventKind::Custom("call_deflection".into()));
            assert_eq!(events[0].data, Some(json!({ "duration_secs": 90.0 })));
        }
        other => panic!("expected visitor_data, got {other:?}"),
    }

    let mut quiet = harness_with(
        vec![Script::welcome("t-2")],
        EngineConfig::default(),
        StaticKeys::ok("unused"),
        |r| r.no_deflection.store(true, Ordering::SeqCst),
    );
    quiet.engine.begin_chat().await.unwrap();
    let mut server = next_server(&mut quiet.servers).await;
    let engine = quiet.engine.clone();
    eventually("connected", move || engine.state() == SessionState::Connected).await;

    quiet.engine.report_call_deflection(Duration::from_secs(90));
    let nothing = tokio::time::timeout(Duration::from_millis(50), server.from_engine.recv()).await;
    assert!(nothing.is_err(), "deflection was reported: {nothing:?}");
}

#[tokio::test]
async fn older_entry_points_forward_to_current_ones() {
    let mut h = harness(vec![Script::welcome("t-1")]);
    h.engine.set_session_extra(json!("vip"), "tier");
    assert_eq!(h.engine.session_extra("tier"), Some(json!("vip")));
    h.engine.record_current_ui_location("checkout");

    h.engine.begin_session().await.unwrap();
    let mut server = next_server(&mut h.servers).await;
    match server.next().await {
        WireMessage::VisitorData { variables, events } => {
            assert_eq!(variables["tier"], json!("vip"));
            assert_eq!(events[0].kind, EventKind::PageView);
            assert_eq!(events[0].data, Some(json!({ "location": "checkout" })));
        }
        other => panic!("expected visitor_data, got {other:?}"),
    }

    h.engine.end_chat_and_show_alert(true).await.unwrap();
    assert_eq!(h.recorder.count("ended_alert"), 1);

    h.engine.clear_session_extras();
    assert!(h.engine.custom_variables().is_empty());
}

#[tokio::test]
async fn link_views_default_to_plain_labels() {
    let h = harness(vec![]);
    assert_eq!(
        h.engine.link_view_for_url("https://example.com/help"),
        lc_engine::LinkView::Label("https://example.com/help".into())
    );
    assert_eq!(h.engine.branding_image(64, 64), None);
}
