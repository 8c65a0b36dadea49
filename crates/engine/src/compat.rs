//! Older entry points kept for hosts written against the previous SDK
//! surface.  Each forwards to the current [`ChatEngine`] API.

use serde_json::json;

use lc_domain::{EventKind, VariableSet};

use crate::engine::ChatEngine;
use crate::types::EngineError;

impl ChatEngine {
    /// Same as [`begin_chat`](Self::begin_chat).
    pub async fn begin_session(&self) -> Result<(), EngineError> {
        self.begin_chat().await
    }

    /// Same as [`set_custom_variable`](Self::set_custom_variable).
    pub fn set_session_extra(&self, value: serde_json::Value, key: &str) {
        self.set_custom_variable(value, key);
    }

    pub fn session_extra(&self, key: &str) -> Option<serde_json::Value> {
        self.custom_variable(key)
    }

    pub fn add_session_extras(&self, extras: VariableSet) {
        self.add_custom_variables(extras);
    }

    /// Forget every custom variable, delivered or not.
    pub fn clear_session_extras(&self) {
        self.shared.buffer.clear_variables();
    }

    /// Report where in the host UI the visitor is, as a page view.
    pub fn record_current_ui_location(&self, location: &str) {
        self.report_event_with_data(EventKind::PageView, Some(json!({ "location": location })));
    }

    pub async fn end_chat_and_show_alert(&self, show_alert: bool) -> Result<(), EngineError> {
        self.end_chat(show_alert).await
    }

    /// Report an event by its free-form name.
    pub fn report_named_event(&self, name: &str, data: Option<serde_json::Value>) {
        self.report_event_with_data(EventKind::from_name(name), data);
    }
}
