//! [`ChatEngine`]: the handle a host application holds.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use lc_domain::config::EngineConfig;
use lc_domain::{Destination, EventKind, EventRecord, VariableSet};
use lc_sessions::ReplayCache;

use crate::actor::{Command, Reply, Shared};
use crate::broker::{AttachmentAction, AttachmentPlugin, ContentHandle, PluginDescriptor, Thumbnail};
use crate::builder::ChatEngineBuilder;
use crate::delegate::{Delegates, LinkView};
use crate::types::{EngineError, SessionState};

/// Live-chat engine handle.  Cheap to clone; all clones drive the same
/// session.
///
/// Calls that need the session actor are `async` and return once the
/// request is accepted.  Network outcomes (connected, failed, unanswered)
/// arrive through the delegates and [`subscribe_state`](Self::subscribe_state).
#[derive(Clone)]
pub struct ChatEngine {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) delegates: Delegates,
    pub(crate) cache: Arc<ReplayCache>,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) shutdown: CancellationToken,
}

impl ChatEngine {
    pub fn builder() -> ChatEngineBuilder {
        ChatEngineBuilder::new()
    }

    /// Build an engine with the default WebSocket transport, HTTP key
    /// generator and the replay cache described by `config`.
    pub fn setup(config: EngineConfig, delegates: Delegates) -> Result<Self, EngineError> {
        ChatEngineBuilder::new()
            .config(config)
            .delegates(delegates)
            .build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Session lifecycle
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Begin a chat to the pending destination.
    pub async fn begin_chat(&self) -> Result<(), EngineError> {
        self.begin_chat_to(None).await
    }

    pub async fn begin_chat_with_skill(&self, skill: &str) -> Result<(), EngineError> {
        self.begin_chat_to(Some(Destination::skill(skill))).await
    }

    pub async fn begin_chat_with_skill_and_account(
        &self,
        skill: &str,
        account: &str,
    ) -> Result<(), EngineError> {
        self.begin_chat_to(Some(Destination::skill_in_account(skill, account)))
            .await
    }

    /// Begin a chat.  Fields set in `destination` override the pending
    /// ones for this session only.  Fails with
    /// [`EngineError::AlreadyActive`] unless the engine is idle.
    pub async fn begin_chat_to(&self, destination: Option<Destination>) -> Result<(), EngineError> {
        self.request(|reply| Command::Begin { destination, reply })
            .await
    }

    /// End the current chat.  With `show_alert`, the presentation layer is
    /// asked to tell the visitor.
    pub async fn end_chat(&self, show_alert: bool) -> Result<(), EngineError> {
        self.request(|reply| Command::End { show_alert, reply }).await
    }

    /// Send a visitor line.  Returns its sequence number.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<u64, EngineError> {
        let text = text.into();
        self.request(|reply| Command::Send { text, reply }).await
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn chat_in_progress(&self) -> bool {
        self.state().in_progress()
    }

    /// Chat is not disabled and agents are available.
    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    /// Tell the engine whether the chat UI is on screen.  Agent lines that
    /// arrive while it is not raise unread notifications.
    pub async fn set_chat_visible(&self, visible: bool) {
        let _ = self.commands.send(Command::SetChatVisible(visible)).await;
    }

    /// Stop the session actor and wait for queued cache writes.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.cache.flush().await;
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Visit status
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Disable or re-enable chat.  While disabled, `begin_chat` fails with
    /// [`EngineError::ChatDisabled`].
    pub fn set_chat_disabled(&self, disabled: bool) {
        let before = self.shared.is_enabled();
        self.update_visit(|v| v.chat_disabled = disabled);
        self.shared
            .notify_if_enabled_changed(before, self.delegates.status.as_ref());
    }

    /// The host's own chat button is showing as available.
    pub fn set_chat_available(&self) {
        self.update_visit(|v| v.chat_available = true);
    }

    pub fn set_chat_unavailable(&self) {
        self.update_visit(|v| v.chat_available = false);
    }

    pub fn set_invitation_shown(&self) {
        self.update_visit(|v| v.invitation_shown = true);
    }

    pub fn set_invitation_not_shown(&self) {
        self.update_visit(|v| v.invitation_shown = false);
    }

    fn update_visit(&self, change: impl FnOnce(&mut lc_protocol::VisitStatus)) {
        {
            let mut visit = self.shared.visit.lock();
            let before = *visit;
            change(&mut *visit);
            if *visit == before {
                return;
            }
        }
        self.notify(Command::VisitChanged);
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Routing
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Route the next chat to `skill` in the last account set.
    pub fn set_skill(&self, skill: &str) {
        self.shared.routing.write().set_skill(skill, None);
    }

    pub fn set_skill_in_account(&self, skill: &str, account: &str) {
        self.shared.routing.write().set_skill(skill, Some(account));
    }

    pub fn pending_destination(&self) -> Destination {
        self.shared.routing.read().pending().clone()
    }

    /// Whether a chat to `skill` in the default account would reach an
    /// agent right now.
    pub fn is_chat_enabled_for_skill(&self, skill: &str) -> bool {
        self.skill_enabled(skill, None)
    }

    pub fn is_chat_enabled_for_skill_in_account(&self, skill: &str, account: &str) -> bool {
        self.skill_enabled(skill, Some(account))
    }

    fn skill_enabled(&self, skill: &str, account: Option<&str>) -> bool {
        !self.shared.visit.lock().chat_disabled
            && self.shared.routing.read().is_enabled(skill, account)
    }

    /// Feed an availability update (normally pushed by the chat server).
    /// Both `account` and `skill` unset means the global flag.
    pub fn apply_availability(&self, account: Option<&str>, skill: Option<&str>, enabled: bool) {
        self.shared.apply_availability(
            account,
            skill,
            enabled,
            self.delegates.status.as_ref(),
        );
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Variables and events
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn report_event(&self, kind: EventKind) {
        self.report_event_with_data(kind, None);
    }

    pub fn report_event_with_data(&self, kind: EventKind, data: Option<serde_json::Value>) {
        tracing::debug!(event = kind.name(), "visitor event reported");
        self.shared.buffer.push_event(EventRecord::new(kind, data));
        self.notify(Command::FlushBuffer);
    }

    /// Record how long the visitor spent in chat instead of calling, unless
    /// the host opted out.
    pub fn report_call_deflection(&self, duration: Duration) {
        if !self
            .delegates
            .customization
            .should_report_call_deflection()
        {
            tracing::debug!("call deflection reporting disabled by host");
            return;
        }
        self.report_event_with_data(
            EventKind::Custom("call_deflection".into()),
            Some(json!({ "duration_secs": duration.as_secs_f64() })),
        );
    }

    /// Set a custom variable.  Argument order follows the host API:
    /// value first.
    pub fn set_custom_variable(&self, value: serde_json::Value, key: &str) {
        self.shared.buffer.set_variable(key, value);
        self.notify(Command::FlushBuffer);
    }

    pub fn custom_variable(&self, key: &str) -> Option<serde_json::Value> {
        self.shared.buffer.variable(key)
    }

    pub fn add_custom_variables(&self, variables: VariableSet) {
        self.shared.buffer.add_variables(variables);
        self.notify(Command::FlushBuffer);
    }

    pub fn custom_variables(&self) -> VariableSet {
        self.shared.buffer.variables()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Attachments
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn register_plugin(
        &self,
        descriptor: PluginDescriptor,
        plugin: Arc<dyn AttachmentPlugin>,
    ) -> Result<(), EngineError> {
        self.shared.broker.register(descriptor, plugin)
    }

    /// Offer every registered attachment action to the presentation layer.
    /// Nothing is offered when the host enables no collaboration component.
    pub fn offer_attachments(&self) -> Vec<AttachmentAction> {
        if self
            .delegates
            .customization
            .enabled_collaboration_components()
            .is_empty()
        {
            return Vec::new();
        }
        let actions = self.shared.broker.offer();
        if !actions.is_empty() {
            self.delegates.presentation.show_attachment_actions(&actions);
        }
        actions
    }

    /// Start action `action_index` of `plugin_id`.  The produced content is
    /// sent to the chat once the plugin reports back.
    pub fn select_attachment(&self, plugin_id: &str, action_index: usize) -> Result<(), EngineError> {
        let pending = self.shared.broker.select(plugin_id, action_index)?;
        let loopback = self.commands.downgrade();
        tokio::spawn(async move {
            let (generation, result) = pending.wait().await;
            if let Some(tx) = loopback.upgrade() {
                let _ = tx
                    .send(Command::SelectionFinished { generation, result })
                    .await;
            }
        });
        Ok(())
    }

    pub fn attachment_thumbnail(&self, content: &ContentHandle) -> Result<Option<Thumbnail>, EngineError> {
        self.shared.broker.thumbnail(content)
    }

    /// Open the full view of `content`.
    pub fn display_attachment(&self, content: &ContentHandle) -> Result<(), EngineError> {
        let pending = self.shared.broker.display(content)?;
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let _ = pending.rx.await;
            shared.broker.finish_display(pending.generation);
        });
        Ok(())
    }

    /// Abandon any in-progress attachment flow.
    pub fn reset_plugin_state(&self) {
        self.shared.broker.reset();
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Presentation queries
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn link_view_for_url(&self, url: &str) -> LinkView {
        self.delegates
            .customization
            .link_view_for_url(url)
            .unwrap_or_else(|| LinkView::Label(url.to_string()))
    }

    pub fn branding_image(&self, width: u32, height: u32) -> Option<Vec<u8>> {
        self.delegates.customization.branding_image(width, height)
    }

    // ── plumbing ─────────────────────────────────────────────────────

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| EngineError::Shutdown)?;
        rx.await.map_err(|_| EngineError::Shutdown)?
    }

    /// Wake the actor without waiting.  Buffered data survives a full
    /// queue since the actor drains the buffer after every event.
    fn notify(&self, cmd: Command) {
        if let Err(mpsc::error::TrySendError::Closed(_)) = self.commands.try_send(cmd) {
            tracing::debug!("engine shut down, notification dropped");
        }
    }
}
