//! Custom variables and reported events awaiting delivery.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use lc_domain::{EventRecord, VariableSet};

/// Everything pending at the moment of a flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushBatch {
    pub variables: VariableSet,
    pub events: Vec<EventRecord>,
}

impl FlushBatch {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.events.is_empty()
    }
}

#[derive(Debug, Default)]
struct Inner {
    values: VariableSet,
    dirty: BTreeSet<String>,
    events: Vec<EventRecord>,
}

/// Thread-safe buffer for variables and events.
///
/// Variable values stay readable after delivery.  A new session gets all of
/// them through [`take_all`](VisitorBuffer::take_all); after that only the
/// keys changed since the last flush are pending.  Events are pending until
/// flushed, in the order they were reported.
#[derive(Debug, Default)]
pub struct VisitorBuffer {
    inner: Mutex<Inner>,
}

impl VisitorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable; a later write to the same key replaces it.
    pub fn set_variable(&self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        let mut inner = self.inner.lock();
        inner.values.insert(key.clone(), value);
        inner.dirty.insert(key);
    }

    pub fn add_variables(&self, variables: VariableSet) {
        let mut inner = self.inner.lock();
        for (key, value) in variables {
            inner.values.insert(key.clone(), value);
            inner.dirty.insert(key);
        }
    }

    pub fn variable(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.lock().values.get(key).cloned()
    }

    pub fn variables(&self) -> VariableSet {
        self.inner.lock().values.clone()
    }

    /// Forget all variables, including ones not yet delivered.
    pub fn clear_variables(&self) {
        let mut inner = self.inner.lock();
        inner.values.clear();
        inner.dirty.clear();
    }

    pub fn push_event(&self, event: EventRecord) {
        self.inner.lock().events.push(event);
    }

    pub fn has_pending(&self) -> bool {
        let inner = self.inner.lock();
        !inner.dirty.is_empty() || !inner.events.is_empty()
    }

    /// Atomically take everything pending.  Writes racing with this call
    /// land either in the returned batch or in the next one, never both.
    pub fn take_pending(&self) -> FlushBatch {
        let mut inner = self.inner.lock();
        let dirty = std::mem::take(&mut inner.dirty);
        let variables = dirty
            .into_iter()
            .filter_map(|k| inner.values.get(&k).cloned().map(|v| (k, v)))
            .collect();
        FlushBatch {
            variables,
            events: std::mem::take(&mut inner.events),
        }
    }

    /// Every variable plus the pending events, for a freshly connected
    /// session.  Clears the changed-key set like [`take_pending`](Self::take_pending).
    pub fn take_all(&self) -> FlushBatch {
        let mut inner = self.inner.lock();
        inner.dirty.clear();
        FlushBatch {
            variables: inner.values.clone(),
            events: std::mem::take(&mut inner.events),
        }
    }
}
