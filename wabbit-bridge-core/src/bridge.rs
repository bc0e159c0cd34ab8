//! Host-facing bridge
//!
//! [`Bridge`] is the boundary surface: `initialize`, `predict_or_learn` and
//! `close` over opaque handles, each run behind an unwind guard. [`Learner`]
//! wraps one handle for Rust hosts and closes it when dropped.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{BridgeConfig, CoreBackend, join_options};
use crate::core::{LinearFactory, NativeLibrary};
use crate::error::{self, BridgeResult, ErrorEnvelope};
use crate::label::LabelKind;
use crate::session::{CoreFactory, SessionHandle, SessionInfo, SessionRegistry};

/// Core factory plus the sessions it has produced
pub struct Bridge {
    factory: Box<dyn CoreFactory>,
    registry: Arc<SessionRegistry>,
    default_options: String,
}

impl Bridge {
    pub fn new(factory: Box<dyn CoreFactory>, registry: SessionRegistry) -> Self {
        Self { factory, registry: Arc::new(registry), default_options: String::new() }
    }

    /// Bridge over the built-in linear core with no session limit
    pub fn builtin() -> Self {
        Self::new(Box::new(LinearFactory), SessionRegistry::new())
    }

    /// Build a bridge from configuration, loading a native core if selected
    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let factory: Box<dyn CoreFactory> = match &config.core {
            CoreBackend::Builtin => Box::new(LinearFactory),
            CoreBackend::Native { library } => {
                let library = NativeLibrary::load(library)
                    .map_err(|failure| ErrorEnvelope::invalid_configuration(failure.to_string()))?;
                Box::new(library)
            }
        };

        let registry = match config.max_sessions {
            Some(limit) => SessionRegistry::with_max_sessions(limit),
            None => SessionRegistry::new(),
        };

        debug!(core = factory.name(), max_sessions = ?config.max_sessions, "bridge configured");
        Ok(Self { factory, registry: Arc::new(registry), default_options: config.default_options.clone() })
    }

    /// Open a session configured by `config`
    pub fn initialize(&self, config: &str) -> BridgeResult<SessionHandle> {
        error::guard("initialize", || {
            let options = join_options(&self.default_options, config);
            self.registry.initialize(self.factory.as_ref(), &options)
        })
    }

    /// Learn from or predict on one example
    pub fn predict_or_learn(&self, handle: SessionHandle, text: &str, learn: bool) -> BridgeResult<f32> {
        error::guard("predict_or_learn", || self.registry.predict_or_learn(handle, text, learn))
    }

    /// Close a session
    pub fn close(&self, handle: SessionHandle) -> BridgeResult<()> {
        error::guard("close", || self.registry.close(handle))
    }

    /// Open a session wrapped in a [`Learner`]
    pub fn open(&self, config: &str) -> BridgeResult<Learner> {
        let handle = self.initialize(config)?;
        Ok(Learner { registry: Arc::clone(&self.registry), handle, open: true })
    }

    /// Open sessions, ordered by handle
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.list()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn core_name(&self) -> &'static str {
        self.factory.name()
    }
}

/// Owned session handle
pub struct Learner {
    registry: Arc<SessionRegistry>,
    handle: SessionHandle,
    open: bool,
}

impl Learner {
    /// Update the model from a labeled example, returning the prediction made before the update
    pub fn learn(&mut self, text: &str) -> BridgeResult<f32> {
        self.call(text, true)
    }

    /// Predict without updating the model
    pub fn predict(&mut self, text: &str) -> BridgeResult<f32> {
        self.call(text, false)
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn label_kind(&self) -> BridgeResult<LabelKind> {
        self.registry.label_kind(self.handle)
    }

    pub fn info(&self) -> BridgeResult<SessionInfo> {
        self.registry.info(self.handle)
    }

    /// Close the session, reporting any failure to flush it
    pub fn close(mut self) -> BridgeResult<()> {
        self.open = false;
        error::guard("close", || self.registry.close(self.handle))
    }

    fn call(&mut self, text: &str, learn: bool) -> BridgeResult<f32> {
        error::guard("predict_or_learn", || self.registry.predict_or_learn(self.handle, text, learn))
    }
}

impl Drop for Learner {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if let Err(err) = error::guard("close", || self.registry.close(self.handle)) {
            warn!(handle = %self.handle, kind = %err.kind, "failed to close dropped learner: {}", err.message);
        }
    }
}
