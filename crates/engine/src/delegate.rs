//! Host callback interfaces.
//!
//! The engine talks back to its host through three narrow traits instead of
//! one large delegate.  Every method has a no-op default, so a host
//! implements only what it cares about.  Callbacks run on engine tasks and
//! must return quickly.

use std::sync::Arc;

use lc_domain::Destination;

use crate::broker::{AttachmentAction, ContentHandle, Thumbnail};
use crate::types::EngineError;

/// Opaque reference to a host-rendered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle(pub u64);

/// How a URL inside a chat line is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkView {
    /// Plain text label; the default is the URL itself.
    Label(String),
    /// A view the host rendered for this link.
    RenderedView(ViewHandle),
}

/// Collaboration features the host enables for attachments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CollaborationComponents(u32);

impl CollaborationComponents {
    pub const NONE: Self = Self(0);
    pub const PHOTO: Self = Self(1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for CollaborationComponents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Notifications about availability and the session lifecycle.
pub trait StatusDelegate: Send + Sync {
    /// Overall chat availability flipped.
    fn enabled_status_changed(&self, _enabled: bool) {}

    /// Availability of one routing pool changed.
    fn skill_enabled_changed(&self, _skill: &str, _account: &str, _enabled: bool) {}

    fn control_button_shown(&self) {}
    fn control_button_hidden(&self) {}

    /// The chat surface should appear (a session attempt started).
    fn chat_shown(&self) {}
    /// The chat surface should go away.
    fn chat_hidden(&self) {}

    fn chat_started(&self, _session_token: &str) {}

    /// Fired exactly once per session that ends, whoever ended it.
    fn chat_ended(&self) {}

    /// An agent line arrived while the chat was not visible.
    fn notification(&self, _message: &str, _unread: usize) {}

    /// Named lifecycle event with free-form parameters.
    fn on_event(&self, _name: &str, _parameters: &serde_json::Value) {}

    /// A failure the host may want to surface.  Non-fatal problems such as
    /// a degraded handshake arrive here too.
    fn error(&self, _error: &EngineError) {}
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Customization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Host decisions the engine queries at specific points.  Values are read
/// when needed and never cached across decisions.
pub trait CustomizationDelegate: Send + Sync {
    fn link_view_for_url(&self, _url: &str) -> Option<LinkView> {
        None
    }

    /// Encoded image shown in the chat header, if any.
    fn branding_image(&self, _width: u32, _height: u32) -> Option<Vec<u8>> {
        None
    }

    fn enabled_collaboration_components(&self) -> CollaborationComponents {
        CollaborationComponents::NONE
    }

    fn should_use_custom_action_for_unanswered_chat(&self) -> bool {
        false
    }

    /// Invoked instead of the offline survey when the above returns `true`.
    fn custom_action_for_unanswered_chat(&self) {}

    /// Queried when a session begins.
    fn should_cache_messages_for_reconnect(&self) -> bool {
        false
    }

    fn should_report_call_deflection(&self) -> bool {
        true
    }

    /// Queried when a session begins.
    fn single_sign_on_enabled(&self) -> bool {
        false
    }

    fn single_sign_on_key_gen_url(&self) -> Option<String> {
        None
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Presentation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the host's chat UI is asked to display.
pub trait PresentationDelegate: Send + Sync {
    /// An agent line for the transcript.
    fn show_agent_line(&self, _seq: u64, _text: &str) {}

    /// The visitor ended the chat and asked to be told about it.
    fn show_chat_ended_alert(&self) {}

    /// Nobody answered; offer the offline survey for this destination.
    fn show_offline_survey(&self, _destination: &Destination) {}

    /// Attachment actions offered by the registered plugins, in order.
    fn show_attachment_actions(&self, _actions: &[AttachmentAction]) {}

    /// Content produced by a plugin was sent; show its preview.
    fn show_attachment_preview(&self, _content: &ContentHandle, _thumbnail: Option<&Thumbnail>) {}
}

/// Delegate that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDelegate;

impl StatusDelegate for NoopDelegate {}
impl CustomizationDelegate for NoopDelegate {}
impl PresentationDelegate for NoopDelegate {}

/// The three delegates an engine reports to.
#[derive(Clone)]
pub struct Delegates {
    pub status: Arc<dyn StatusDelegate>,
    pub customization: Arc<dyn CustomizationDelegate>,
    pub presentation: Arc<dyn PresentationDelegate>,
}

impl Default for Delegates {
    fn default() -> Self {
        Self {
            status: Arc::new(NoopDelegate),
            customization: Arc::new(NoopDelegate),
            presentation: Arc::new(NoopDelegate),
        }
    }
}

impl Delegates {
    /// One object serving all three roles.
    pub fn from_single<D>(delegate: Arc<D>) -> Self
    where
        D: StatusDelegate + CustomizationDelegate + PresentationDelegate + 'static,
    {
        Self {
            status: delegate.clone(),
            customization: delegate.clone(),
            presentation: delegate,
        }
    }
}
