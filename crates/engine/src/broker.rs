//! Attachment plugin broker.
//!
//! Host-registered plugins produce rich content (a photo, say) through a
//! turn-based exchange:
//!
//! ```text
//! Offered ──select──▶ Selecting ──produced──▶ Produced ──thumbnail──▶ Thumbnailed
//!    ▲                    │                                     │  ▲
//!    │                 cancelled                          display│  │done
//!    └────────────────────┴──────────── reset ◀──────────────────▼  │
//!                                                            Displaying
//! ```
//!
//! Plugins report completion through a one-shot reply instead of a return
//! value.  Every exchange carries a generation number; a reply that arrives
//! after [`PluginBroker::reset`] (or after a newer exchange started) is
//! dropped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use lc_domain::trace::TraceEvent;

use crate::types::EngineError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A plugin's identity and the actions it offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub id: String,
    pub action_labels: Vec<String>,
}

impl PluginDescriptor {
    pub fn new<I, S>(id: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            action_labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::MalformedPluginDescriptor("empty id".into()));
        }
        if self.action_labels.is_empty() {
            return Err(EngineError::MalformedPluginDescriptor(format!(
                "plugin {} has no action labels",
                self.id
            )));
        }
        Ok(())
    }
}

/// Content produced by a plugin.  Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHandle {
    pub plugin_id: String,
    pub content_key: String,
}

/// Lightweight preview of a piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// One selectable action in the attachment menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentAction {
    pub plugin_id: String,
    pub index: usize,
    pub label: String,
}

/// How a selection flow finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionResult {
    Produced { content_key: String },
    Cancelled,
}

/// Reply slot handed to a plugin's selection flow.  Dropping it without
/// answering counts as a cancellation.
#[derive(Debug)]
pub struct SelectionReply {
    tx: oneshot::Sender<SelectionResult>,
}

impl SelectionReply {
    pub fn produced(self, content_key: impl Into<String>) {
        let _ = self.tx.send(SelectionResult::Produced {
            content_key: content_key.into(),
        });
    }

    pub fn cancelled(self) {
        let _ = self.tx.send(SelectionResult::Cancelled);
    }
}

/// Reply slot handed to a plugin's full-display flow.
#[derive(Debug)]
pub struct DisplayReply {
    tx: oneshot::Sender<()>,
}

impl DisplayReply {
    pub fn done(self) {
        let _ = self.tx.send(());
    }
}

/// A host content provider.
pub trait AttachmentPlugin: Send + Sync {
    /// Start the content-producing flow for action `action_index`.
    fn begin_selection(&self, action_index: usize, reply: SelectionReply);

    /// Preview for previously produced content.  Must be repeatable and
    /// free of side effects.
    fn thumbnail(&self, content_key: &str) -> Option<Thumbnail>;

    /// Start the full view of previously produced content.
    fn begin_display(&self, content_key: &str, reply: DisplayReply);

    /// Abandon any in-progress flow.
    fn reset(&self) {}
}

/// Phase of the current exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    Offered,
    Selecting,
    Produced,
    Thumbnailed,
    Displaying,
}

/// A selection the caller must wait on.
#[derive(Debug)]
pub struct PendingSelection {
    pub generation: u64,
    pub plugin_id: String,
    pub action_index: usize,
    pub rx: oneshot::Receiver<SelectionResult>,
}

impl PendingSelection {
    /// Wait for the plugin.  A dropped reply reads as a cancellation.
    pub async fn wait(self) -> (u64, SelectionResult) {
        let result = self.rx.await.unwrap_or(SelectionResult::Cancelled);
        (self.generation, result)
    }
}

/// A full-display flow the caller must wait on.
#[derive(Debug)]
pub struct PendingDisplay {
    pub generation: u64,
    pub rx: oneshot::Receiver<()>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Broker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Registered {
    descriptor: PluginDescriptor,
    plugin: Arc<dyn AttachmentPlugin>,
}

#[derive(Debug, Clone)]
struct Exchange {
    generation: u64,
    plugin_id: String,
    action_index: usize,
    phase: ExchangePhase,
    content: Option<ContentHandle>,
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    plugins: HashMap<String, Registered>,
    exchange: Option<Exchange>,
    generation: u64,
    session_active: bool,
}

/// Registry of attachment plugins plus the single active exchange.
#[derive(Default)]
pub struct PluginBroker {
    inner: Mutex<Inner>,
}

impl PluginBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin.  A second registration with the same id replaces
    /// the first but keeps its place in the offer order.
    pub fn register(
        &self,
        descriptor: PluginDescriptor,
        plugin: Arc<dyn AttachmentPlugin>,
    ) -> Result<(), EngineError> {
        descriptor.validate()?;
        let mut inner = self.inner.lock();
        let id = descriptor.id.clone();
        if !inner.plugins.contains_key(&id) {
            inner.order.push(id.clone());
        }
        inner.plugins.insert(id.clone(), Registered { descriptor, plugin });
        tracing::debug!(plugin_id = %id, "attachment plugin registered");
        Ok(())
    }

    pub fn descriptor(&self, plugin_id: &str) -> Option<PluginDescriptor> {
        self.inner
            .lock()
            .plugins
            .get(plugin_id)
            .map(|r| r.descriptor.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark whether a chat session is connected.  Selections are only
    /// accepted while one is.
    pub fn set_session_active(&self, active: bool) {
        self.inner.lock().session_active = active;
    }

    pub fn phase(&self) -> Option<ExchangePhase> {
        self.inner.lock().exchange.as_ref().map(|e| e.phase)
    }

    /// Ordered union of every plugin's actions.  Opens an exchange in the
    /// `Offered` phase when none is running.
    pub fn offer(&self) -> Vec<AttachmentAction> {
        let mut inner = self.inner.lock();
        let actions: Vec<AttachmentAction> = inner
            .order
            .iter()
            .filter_map(|id| inner.plugins.get(id))
            .flat_map(|r| {
                r.descriptor
                    .action_labels
                    .iter()
                    .enumerate()
                    .map(|(index, label)| AttachmentAction {
                        plugin_id: r.descriptor.id.clone(),
                        index,
                        label: label.clone(),
                    })
            })
            .collect();

        if inner.exchange.is_none() && !actions.is_empty() {
            inner.generation += 1;
            inner.exchange = Some(Exchange {
                generation: inner.generation,
                plugin_id: String::new(),
                action_index: 0,
                phase: ExchangePhase::Offered,
                content: None,
            });
        }
        actions
    }

    /// Hand control to `plugin_id`'s selection flow.
    ///
    /// Fails with [`EngineError::PluginAlreadyInProgress`] while another
    /// selection is outstanding, leaving that one untouched.
    pub fn select(&self, plugin_id: &str, action_index: usize) -> Result<PendingSelection, EngineError> {
        let (plugin, generation, rx, reply) = {
            let mut inner = self.inner.lock();
            if !inner.session_active {
                return Err(EngineError::NoActiveSession);
            }
            if matches!(
                inner.exchange.as_ref().map(|e| e.phase),
                Some(ExchangePhase::Selecting)
            ) {
                return Err(EngineError::PluginAlreadyInProgress);
            }
            let registered = inner
                .plugins
                .get(plugin_id)
                .ok_or_else(|| EngineError::UnknownPlugin(plugin_id.to_string()))?;
            if action_index >= registered.descriptor.action_labels.len() {
                return Err(EngineError::UnknownAction {
                    plugin_id: plugin_id.to_string(),
                    index: action_index,
                });
            }
            let plugin = registered.plugin.clone();

            inner.generation += 1;
            let generation = inner.generation;
            inner.exchange = Some(Exchange {
                generation,
                plugin_id: plugin_id.to_string(),
                action_index,
                phase: ExchangePhase::Selecting,
                content: None,
            });
            let (tx, rx) = oneshot::channel();
            (plugin, generation, rx, SelectionReply { tx })
        };

        // The plugin may answer synchronously; the lock is already released.
        plugin.begin_selection(action_index, reply);

        Ok(PendingSelection {
            generation,
            plugin_id: plugin_id.to_string(),
            action_index,
            rx,
        })
    }

    /// Apply a selection outcome.  Returns the new content when the
    /// outcome belongs to the current exchange and produced something.
    pub fn complete_selection(&self, generation: u64, result: SelectionResult) -> Option<ContentHandle> {
        let mut inner = self.inner.lock();
        let current = match inner.exchange.as_mut() {
            Some(e) if e.generation == generation && e.phase == ExchangePhase::Selecting => e,
            _ => {
                tracing::debug!(generation, "late plugin selection result dropped");
                return None;
            }
        };

        let outcome = match &result {
            SelectionResult::Produced { .. } => "produced",
            SelectionResult::Cancelled => "cancelled",
        };
        TraceEvent::PluginSelection {
            plugin_id: current.plugin_id.clone(),
            action_index: current.action_index,
            outcome: outcome.into(),
        }
        .emit();

        match result {
            SelectionResult::Produced { content_key } => {
                let handle = ContentHandle {
                    plugin_id: current.plugin_id.clone(),
                    content_key,
                };
                current.phase = ExchangePhase::Produced;
                current.content = Some(handle.clone());
                Some(handle)
            }
            SelectionResult::Cancelled => {
                inner.exchange = None;
                None
            }
        }
    }

    /// Preview for `content`, from its owning plugin.
    pub fn thumbnail(&self, content: &ContentHandle) -> Result<Option<Thumbnail>, EngineError> {
        let plugin = self.plugin(&content.plugin_id)?;
        let thumbnail = plugin.thumbnail(&content.content_key);

        let mut inner = self.inner.lock();
        if let Some(e) = inner.exchange.as_mut() {
            if e.phase == ExchangePhase::Produced && e.content.as_ref() == Some(content) {
                e.phase = ExchangePhase::Thumbnailed;
            }
        }
        Ok(thumbnail)
    }

    /// Start the full view of `content`.  Content from earlier exchanges can
    /// be displayed too; only the current one tracks the `Displaying` phase.
    pub fn display(&self, content: &ContentHandle) -> Result<PendingDisplay, EngineError> {
        let plugin = self.plugin(&content.plugin_id)?;
        let generation = {
            let mut inner = self.inner.lock();
            match inner.exchange.as_mut() {
                Some(e) if e.content.as_ref() == Some(content) => {
                    e.phase = ExchangePhase::Displaying;
                    e.generation
                }
                _ => 0,
            }
        };

        let (tx, rx) = oneshot::channel();
        plugin.begin_display(&content.content_key, DisplayReply { tx });
        Ok(PendingDisplay { generation, rx })
    }

    /// Release the `Displaying` phase once the plugin hands control back.
    pub fn finish_display(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if let Some(e) = inner.exchange.as_mut() {
            if e.generation == generation && e.phase == ExchangePhase::Displaying {
                e.phase = ExchangePhase::Thumbnailed;
            }
        }
    }

    /// Drop the current exchange and return every plugin to a clean state.
    /// Outstanding replies become stale.
    pub fn reset(&self) {
        let plugins: Vec<Arc<dyn AttachmentPlugin>> = {
            let mut inner = self.inner.lock();
            inner.exchange = None;
            inner.generation += 1;
            inner.plugins.values().map(|r| r.plugin.clone()).collect()
        };
        for plugin in plugins {
            plugin.reset();
        }
    }

    fn plugin(&self, plugin_id: &str) -> Result<Arc<dyn AttachmentPlugin>, EngineError> {
        self.inner
            .lock()
            .plugins
            .get(plugin_id)
            .map(|r| r.plugin.clone())
            .ok_or_else(|| EngineError::UnknownPlugin(plugin_id.to_string()))
    }
}
