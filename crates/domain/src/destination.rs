//! Routing destination: the (account, skill) pair a chat is addressed to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The agent pool a session is routed to.
///
/// Both fields are optional while the host is still configuring routing.
/// Once resolved for a connection attempt the account is always present
/// (it falls back to the configured default); the skill may stay unset, in
/// which case the server picks a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
}

impl Destination {
    pub fn new(account: Option<String>, skill: Option<String>) -> Self {
        Self {
            account: normalize(account),
            skill: normalize(skill),
        }
    }

    /// Destination for `skill` in whatever account ends up resolved.
    pub fn skill(skill: impl Into<String>) -> Self {
        Self::new(None, Some(skill.into()))
    }

    /// Destination for `skill` in an explicit `account`.
    pub fn skill_in_account(skill: impl Into<String>, account: impl Into<String>) -> Self {
        Self::new(Some(account.into()), Some(skill.into()))
    }

    /// Fill the account from `default_account` when unset.
    pub fn with_default_account(mut self, default_account: &str) -> Self {
        if self.account.is_none() {
            self.account = Some(default_account.to_owned());
        }
        self
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn skill_name(&self) -> Option<&str> {
        self.skill.as_deref()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.account.as_deref().unwrap_or("<default>"),
            self.skill.as_deref().unwrap_or("<any>")
        )
    }
}

/// Empty strings are treated the same as "not set".
fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
