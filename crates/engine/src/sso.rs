//! Single sign-on: fetch a verification key from the host's backend.
//!
//! The endpoint must answer with a JSON object holding exactly one field,
//! `{"ssoKey": "<key>"}`.  Anything else is malformed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use lc_domain::config::SsoConfig;
use lc_domain::error::{Error, Result};

use crate::types::HandshakeError;

/// Produces the key presented to the chat server.
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    async fn generate(&self, url: &str) -> std::result::Result<String, HandshakeError>;
}

/// [`KeyGenerator`] backed by an HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpKeyGenerator {
    http: Client,
}

impl HttpKeyGenerator {
    pub fn new(cfg: &SsoConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl KeyGenerator for HttpKeyGenerator {
    async fn generate(&self, url: &str) -> std::result::Result<String, HandshakeError> {
        tracing::debug!(url = %url, "requesting sso key");

        let resp = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| HandshakeError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if status.is_client_error() {
            return Err(HandshakeError::Rejected(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(HandshakeError::Unreachable(format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| HandshakeError::Unreachable(e.to_string()))?;
        parse_key_response(&body)
    }
}

/// Extract the key from a key-generation response body.
pub fn parse_key_response(body: &str) -> std::result::Result<String, HandshakeError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| HandshakeError::Malformed(e.to_string()))?;

    let obj = value
        .as_object()
        .ok_or_else(|| HandshakeError::Malformed("expected a JSON object".into()))?;

    if obj.len() != 1 {
        return Err(HandshakeError::Malformed(format!(
            "expected exactly one field, got {}",
            obj.len()
        )));
    }

    match obj.get("ssoKey") {
        Some(serde_json::Value::String(key)) if !key.is_empty() => Ok(key.clone()),
        Some(_) => Err(HandshakeError::Malformed(
            "ssoKey must be a non-empty string".into(),
        )),
        None => Err(HandshakeError::Malformed("missing ssoKey field".into())),
    }
}
