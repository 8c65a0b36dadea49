use lc_engine::broker::{AttachmentAction, ContentHandle, Thumbnail};
use lc_engine::{
    CustomizationDelegate, Destination, EngineError, PresentationDelegate, StatusDelegate,
};

/// Prints the conversation to stdout and logs every other callback.
pub struct TerminalDelegate {
    cache_messages: bool,
    sso_url: Option<String>,
}

impl TerminalDelegate {
    pub fn new(cache_messages: bool, sso_url: Option<String>) -> Self {
        Self {
            cache_messages,
            sso_url,
        }
    }
}

impl StatusDelegate for TerminalDelegate {
    fn enabled_status_changed(&self, enabled: bool) {
        tracing::info!(enabled, "chat availability changed");
    }

    fn skill_enabled_changed(&self, skill: &str, account: &str, enabled: bool) {
        tracing::info!(%account, %skill, enabled, "skill availability changed");
    }

    fn chat_started(&self, session_token: &str) {
        tracing::info!(%session_token, "chat started");
        println!("-- connected, type to chat, /end to finish --");
    }

    fn chat_ended(&self) {
        tracing::info!("chat ended");
    }

    fn notification(&self, message: &str, unread: usize) {
        tracing::info!(unread, %message, "unread agent line");
    }

    fn on_event(&self, name: &str, parameters: &serde_json::Value) {
        tracing::debug!(event = %name, %parameters, "engine event");
    }

    fn error(&self, error: &EngineError) {
        tracing::warn!(error = %error, "chat engine error");
    }
}

impl CustomizationDelegate for TerminalDelegate {
    fn should_cache_messages_for_reconnect(&self) -> bool {
        self.cache_messages
    }

    fn single_sign_on_enabled(&self) -> bool {
        self.sso_url.is_some()
    }

    fn single_sign_on_key_gen_url(&self) -> Option<String> {
        self.sso_url.clone()
    }
}

impl PresentationDelegate for TerminalDelegate {
    fn show_agent_line(&self, seq: u64, text: &str) {
        println!("[agent #{seq}] {text}");
    }

    fn show_chat_ended_alert(&self) {
        println!("-- the chat has ended --");
    }

    fn show_offline_survey(&self, destination: &Destination) {
        println!("-- no agents available for {destination}, please leave a message later --");
    }

    fn show_attachment_actions(&self, actions: &[AttachmentAction]) {
        for action in actions {
            println!("  {}:{} {}", action.plugin_id, action.index, action.label);
        }
    }

    fn show_attachment_preview(&self, content: &ContentHandle, thumbnail: Option<&Thumbnail>) {
        tracing::info!(
            plugin_id = %content.plugin_id,
            content_key = %content.content_key,
            thumbnail_bytes = thumbnail.map(|t| t.bytes.len()).unwrap_or(0),
            "attachment sent"
        );
    }
}
