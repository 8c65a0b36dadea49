//! Builder for [`ChatEngine`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lc_domain::config::{ConfigSeverity, EngineConfig};
use lc_sessions::ReplayCache;

use crate::actor::{ActorParts, SessionActor, Shared};
use crate::delegate::{CustomizationDelegate, Delegates, PresentationDelegate, StatusDelegate};
use crate::engine::ChatEngine;
use crate::sso::{HttpKeyGenerator, KeyGenerator};
use crate::transport::Transport;
use crate::types::EngineError;
use crate::ws::WsTransport;

/// Command queue depth between handles and the session actor.
const COMMAND_QUEUE: usize = 64;

/// Configures and starts a [`ChatEngine`].
///
/// ```rust,no_run
/// # use lc_engine::ChatEngineBuilder;
/// # async fn demo() -> Result<(), lc_engine::EngineError> {
/// let engine = ChatEngineBuilder::new().build()?;
/// engine.set_skill("billing");
/// engine.begin_chat().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ChatEngineBuilder {
    config: EngineConfig,
    delegates: Delegates,
    transport: Option<Arc<dyn Transport>>,
    key_generator: Option<Arc<dyn KeyGenerator>>,
    replay_cache: Option<Arc<ReplayCache>>,
}

impl ChatEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn delegates(mut self, delegates: Delegates) -> Self {
        self.delegates = delegates;
        self
    }

    pub fn status_delegate(mut self, delegate: Arc<dyn StatusDelegate>) -> Self {
        self.delegates.status = delegate;
        self
    }

    pub fn customization_delegate(mut self, delegate: Arc<dyn CustomizationDelegate>) -> Self {
        self.delegates.customization = delegate;
        self
    }

    pub fn presentation_delegate(mut self, delegate: Arc<dyn PresentationDelegate>) -> Self {
        self.delegates.presentation = delegate;
        self
    }

    /// Replace the WebSocket transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the HTTP key generator used for single sign-on.
    pub fn key_generator(mut self, generator: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = Some(generator);
        self
    }

    /// Use an already opened replay cache instead of opening one from the
    /// config.
    pub fn replay_cache(mut self, cache: Arc<ReplayCache>) -> Self {
        self.replay_cache = Some(cache);
        self
    }

    /// Validate the configuration and start the session actor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<ChatEngine, EngineError> {
        let mut errors = Vec::new();
        for issue in self.config.validate() {
            match issue.severity {
                ConfigSeverity::Warning => tracing::warn!("{issue}"),
                ConfigSeverity::Error => errors.push(issue.to_string()),
            }
        }
        if !errors.is_empty() {
            return Err(EngineError::Config(errors.join("; ")));
        }

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(EngineError::Config(
                "the chat engine must be built inside a Tokio runtime".into(),
            ));
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(WsTransport::from_config(&self.config.connection)),
        };
        let keys: Arc<dyn KeyGenerator> = match self.key_generator {
            Some(k) => k,
            None => Arc::new(
                HttpKeyGenerator::new(&self.config.sso)
                    .map_err(|e| EngineError::Config(e.to_string()))?,
            ),
        };
        let cache = match self.replay_cache {
            Some(c) => c,
            None => Arc::new(
                ReplayCache::open(&self.config.replay)
                    .map_err(|e| EngineError::Config(format!("replay cache: {e}")))?,
            ),
        };

        let config = Arc::new(self.config);
        let shared = Arc::new(Shared::new(&config.default_account));
        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);

        let actor = SessionActor::new(
            ActorParts {
                config: config.clone(),
                shared: shared.clone(),
                delegates: self.delegates.clone(),
                transport,
                keys,
                cache: cache.clone(),
                shutdown: shutdown.clone(),
            },
            rx,
            tx.downgrade(),
        );
        tokio::spawn(actor.run());

        tracing::info!(
            app_id = %config.app_id,
            persistent_replay = cache.is_persistent(),
            "chat engine ready"
        );

        Ok(ChatEngine {
            commands: tx,
            shared,
            delegates: self.delegates,
            cache,
            config,
            shutdown,
        })
    }
}
