//! Destination resolution and per-pool availability.

use std::collections::HashMap;

use lc_domain::trace::TraceEvent;
use lc_domain::Destination;

/// What changed after an availability update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityChange {
    /// The global flag changed.
    Global { enabled: bool },
    /// An account-wide or skill-specific flag changed.
    Pool {
        account: String,
        skill: Option<String>,
        enabled: bool,
    },
}

/// Tracks the pending destination set by the host and the availability the
/// server reports for each pool.
///
/// Availability is looked up most specific first: `(account, skill)`, then
/// `(account, any skill)`, then the global flag.
#[derive(Debug)]
pub struct RoutingResolver {
    default_account: String,
    pending: Destination,
    global_enabled: bool,
    pools: HashMap<(String, Option<String>), bool>,
}

impl RoutingResolver {
    pub fn new(default_account: impl Into<String>) -> Self {
        Self {
            default_account: default_account.into(),
            pending: Destination::default(),
            global_enabled: false,
            pools: HashMap::new(),
        }
    }

    pub fn default_account(&self) -> &str {
        &self.default_account
    }

    /// Set the skill for the next session.  The account is replaced only
    /// when given; otherwise the last account set (or the default) applies.
    /// The last call before a session begins wins.
    pub fn set_skill(&mut self, skill: &str, account: Option<&str>) {
        let account = match account {
            Some(a) => Some(a.to_string()),
            None => self.pending.account.clone(),
        };
        self.pending = Destination::new(account, Some(skill.to_string()));
    }

    /// The destination as set by the host, before defaults.
    pub fn pending(&self) -> &Destination {
        &self.pending
    }

    /// Destination for a session about to begin.  Fields of `explicit`
    /// override the pending ones; a missing account becomes the default.
    /// A missing skill stays missing and the server routes the chat.
    pub fn resolve(&self, explicit: Option<&Destination>) -> Destination {
        let mut dest = self.pending.clone();
        if let Some(explicit) = explicit {
            if explicit.skill.is_some() {
                dest.skill = explicit.skill.clone();
            }
            if explicit.account.is_some() {
                dest.account = explicit.account.clone();
            }
        }
        let dest = dest.with_default_account(&self.default_account);

        TraceEvent::DestinationResolved {
            account: dest.account().unwrap_or_default().to_string(),
            skill: dest.skill.clone(),
        }
        .emit();

        dest
    }

    /// Global availability reported by the server.
    pub fn globally_enabled(&self) -> bool {
        self.global_enabled
    }

    /// Availability of the default account's pool, falling back to the
    /// global flag.
    pub fn default_account_enabled(&self) -> bool {
        self.pools
            .get(&(self.default_account.clone(), None))
            .copied()
            .unwrap_or(self.global_enabled)
    }

    /// Availability of a skill.  Without an account, the default account's
    /// pool is consulted.
    pub fn is_enabled(&self, skill: &str, account: Option<&str>) -> bool {
        let account = account
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.default_account)
            .to_string();

        if let Some(enabled) = self.pools.get(&(account.clone(), Some(skill.to_string()))) {
            return *enabled;
        }
        if let Some(enabled) = self.pools.get(&(account, None)) {
            return *enabled;
        }
        self.global_enabled
    }

    /// Record an availability update and report whether anything changed.
    pub fn apply(
        &mut self,
        account: Option<&str>,
        skill: Option<&str>,
        enabled: bool,
    ) -> Option<AvailabilityChange> {
        let account = account.filter(|a| !a.is_empty());
        let skill = skill.filter(|s| !s.is_empty());

        if account.is_none() && skill.is_none() {
            if self.global_enabled == enabled {
                return None;
            }
            self.global_enabled = enabled;
            return Some(AvailabilityChange::Global { enabled });
        }

        let account = account.unwrap_or(&self.default_account).to_string();
        let skill = skill.map(str::to_string);
        let previous = self
            .pools
            .insert((account.clone(), skill.clone()), enabled);
        if previous == Some(enabled) {
            return None;
        }
        Some(AvailabilityChange::Pool {
            account,
            skill,
            enabled,
        })
    }
}
