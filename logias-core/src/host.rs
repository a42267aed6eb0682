//! Script host abstraction
//!
//! User-authored logic (parsers, tests, actions, notifiers, downtime checks)
//! runs inside an embedded scripting engine. The engine crate only sees it
//! through [`ScriptHost`], so any engine able to invoke a callback with a list
//! of arguments can drive the monitoring loop.

use crate::config::{Config, ConfigError};
use thiserror::Error;

/// Failure raised by a user callback
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallbackError {
    #[error("{0}")]
    Raised(String),

    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Result type for callback invocations
pub type CallbackResult<T> = Result<T, CallbackError>;

/// An isolated scripting context.
///
/// A host is owned by exactly one worker; hosts are never shared between
/// concurrently running tasks.
pub trait ScriptHost: Send + Sync + 'static {
    /// Engine value. Tables keep reference semantics across clones so a
    /// callback can mutate a target's State in place.
    type Value: Clone + Send + Sync + 'static;

    /// Handle to a user function
    type Callback: Clone + Send + Sync + 'static;

    /// Invoke `callback`, returning its first result (nil when none)
    fn call(&self, callback: &Self::Callback, args: Vec<Self::Value>) -> CallbackResult<Self::Value>;

    fn nil(&self) -> Self::Value;

    fn string(&self, text: &str) -> CallbackResult<Self::Value>;

    /// Truthiness as the scripting language defines it
    fn truthy(&self, value: &Self::Value) -> bool;

    /// Stringify for logging and pattern matching
    fn render(&self, value: &Self::Value) -> String;

    /// Publish the worker's downtime flag to scripts
    fn set_downtime(&self, _in_downtime: bool) {}
}

/// A freshly loaded host together with the configuration it resolved
pub struct Loaded<H: ScriptHost> {
    pub config: Config<H::Callback>,
    /// Declared last so it outlives the callback handles in `config`
    pub host: H,
}

/// Produces independent hosts from the same configuration source
pub trait HostLoader: Send + Sync {
    type Host: ScriptHost;

    fn load(&self) -> Result<Loaded<Self::Host>, ConfigError>;
}
