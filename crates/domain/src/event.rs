//! Visitor events and custom variables reported by the host.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Custom visitor attributes.  Last write wins per key.
pub type VariableSet = BTreeMap<String, serde_json::Value>;

/// Kind of a reported visitor event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Conversion,
    PageView,
    SignUp,
    SignIn,
    AddedToCart,
    Custom(String),
}

impl EventKind {
    /// Parse an event name as hosts pass it (`"conversion"`, `"page_view"`,
    /// `"pageview"`, …).  Unknown names become [`EventKind::Custom`].
    pub fn from_name(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "conversion" => Self::Conversion,
            "pageview" => Self::PageView,
            "signup" => Self::SignUp,
            "signin" => Self::SignIn,
            "addedtocart" => Self::AddedToCart,
            _ => Self::Custom(name.to_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Conversion => "conversion",
            Self::PageView => "page_view",
            Self::SignUp => "sign_up",
            Self::SignIn => "sign_in",
            Self::AddedToCart => "added_to_cart",
            Self::Custom(name) => name,
        }
    }
}

/// A fire-and-forget visitor event, buffered until a session can send it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(kind: EventKind, data: Option<serde_json::Value>) -> Self {
        Self {
            kind,
            data,
            recorded_at: Utc::now(),
        }
    }
}
