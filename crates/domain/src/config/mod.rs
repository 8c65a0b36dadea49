mod connection;
mod replay;
mod sso;

pub use connection::*;
pub use replay::*;
pub use sso::*;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Identifies the host application to the chat server.
    #[serde(default = "d_app_id")]
    pub app_id: String,

    /// Account used when the host never set one.
    #[serde(default = "d_default_account")]
    pub default_account: String,

    /// Stable visitor identity.  A random one is generated per process when
    /// unset.
    #[serde(default)]
    pub visitor_id: Option<String>,

    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub sso: SsoConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_id: d_app_id(),
            default_account: d_default_account(),
            visitor_id: None,
            connection: ConnectionConfig::default(),
            replay: ReplayConfig::default(),
            sso: SsoConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document.  Missing sections take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// The configured visitor id, or a freshly generated one.
    pub fn visitor_id_or_generate(&self) -> String {
        self.visitor_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl EngineConfig {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.app_id.trim().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "app_id".into(),
                message: "app_id must not be empty".into(),
            });
        }

        if self.default_account.trim().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "default_account".into(),
                message: "default_account must not be empty".into(),
            });
        }

        let url = &self.connection.server_url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "connection.server_url".into(),
                message: format!("expected a ws:// or wss:// URL, got {url:?}"),
            });
        } else if url.starts_with("ws://") && !is_loopback(url) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "connection.server_url".into(),
                message: "plain ws:// to a remote host sends chat traffic unencrypted".into(),
            });
        }

        if self.connection.connect_timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "connection.connect_timeout_ms".into(),
                message: "connect timeout must be greater than 0".into(),
            });
        }

        if self.connection.max_frame_bytes == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "connection.max_frame_bytes".into(),
                message: "frame limit must be greater than 0".into(),
            });
        }

        if self.connection.reconnect.backoff_factor < 1.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "connection.reconnect.backoff_factor".into(),
                message: "backoff factor must be at least 1.0".into(),
            });
        }

        if self.replay.max_messages == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "replay.max_messages".into(),
                message: "replay cache must hold at least one message".into(),
            });
        }

        if self.replay.max_age_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "replay.max_age_secs".into(),
                message: "a zero max age makes every snapshot non-resumable".into(),
            });
        }

        if self.sso.timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sso.timeout_ms".into(),
                message: "SSO timeout must be greater than 0".into(),
            });
        }

        errors
    }
}

fn is_loopback(url: &str) -> bool {
    let host = url
        .split("://")
        .nth(1)
        .unwrap_or_default()
        .split(['/', ':'])
        .next()
        .unwrap_or_default();
    matches!(host, "localhost" | "127.0.0.1")
}

// ── serde default helpers ───────────────────────────────────────────

fn d_app_id() -> String {
    "lc-app".into()
}
fn d_default_account() -> String {
    "default".into()
}
