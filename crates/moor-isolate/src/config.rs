//! Isolate configuration, validation, and error types.
//!
//! [`IsolateConfig`] is the builder-input for [`Isolate::new`](crate::Isolate::new).
//! [`validate()`](IsolateConfig::validate) checks both slab allocator
//! configurations before any storage is created.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use moor_arena::{ArenaConfig, ArenaError};
use moor_core::{FatalErrorHandler, LogFatalHandler};

use crate::isolate::RootEvent;

/// Hook notified on every root transition of a thread's scope stack.
///
/// Runs while the isolate's heap mutex is held; it must not call back
/// into the isolate.
pub type RootObserver = Arc<dyn Fn(RootEvent) + Send + Sync>;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`IsolateConfig::validate()`].
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// The local-handle allocator configuration is invalid.
    Locals(ArenaError),
    /// The persistent-handle allocator configuration is invalid.
    Persistents(ArenaError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locals(e) => write!(f, "locals: {e}"),
            Self::Persistents(e) => write!(f, "persistents: {e}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Locals(e) | Self::Persistents(e) => Some(e),
        }
    }
}

// ── IsolateConfig ──────────────────────────────────────────────────

/// Complete configuration for constructing an isolate.
#[derive(Clone)]
pub struct IsolateConfig {
    /// Slab layout for local handles. Each entered thread gets its own
    /// allocator with this configuration.
    pub locals: ArenaConfig,
    /// Slab layout for persistent handles.
    pub persistents: ArenaConfig,
    /// Receives usage errors, resource exhaustion and engine-dead reports.
    /// Default: [`LogFatalHandler`].
    pub fatal_handler: Arc<dyn FatalErrorHandler>,
    /// Optional root-transition hook. Default: none.
    pub root_observer: Option<RootObserver>,
}

impl IsolateConfig {
    /// Validate both allocator configurations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.locals.validate().map_err(ConfigError::Locals)?;
        self.persistents
            .validate()
            .map_err(ConfigError::Persistents)?;
        Ok(())
    }

    /// Replace the fatal-error handler.
    pub fn with_fatal_handler(mut self, handler: Arc<dyn FatalErrorHandler>) -> Self {
        self.fatal_handler = handler;
        self
    }

    /// Install a root-transition observer.
    pub fn with_root_observer(mut self, observer: impl Fn(RootEvent) + Send + Sync + 'static) -> Self {
        self.root_observer = Some(Arc::new(observer));
        self
    }
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            locals: ArenaConfig::default(),
            persistents: ArenaConfig::default(),
            fatal_handler: Arc::new(LogFatalHandler),
            root_observer: None,
        }
    }
}

impl fmt::Debug for IsolateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolateConfig")
            .field("locals", &self.locals)
            .field("persistents", &self.persistents)
            .field("root_observer", &self.root_observer.is_some())
            .finish_non_exhaustive()
    }
}
