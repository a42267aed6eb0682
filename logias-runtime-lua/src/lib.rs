//! Logias Lua Runtime
//!
//! LuaJIT scripting host built on mlua. Each [`LuaHost`] owns its own Lua
//! state with the host functions and prelude installed, and is driven by the
//! engine through [`ScriptHost`].

mod api;
mod convert;
pub mod downtime;
mod loader;
pub mod nqueue;
mod prelude;

use logias_core::{CallbackError, CallbackResult, ConfigError, ScriptHost};
use mlua::{Function, Lua, MultiValue, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use convert::{number, render, to_json, truthy};
pub use loader::{LuaLoader, CONFIG_GLOBAL};
pub use nqueue::NQueue;
pub use prelude::PRELUDE;

/// Lua runtime errors
#[derive(Debug, Error)]
pub enum LuaRuntimeError {
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    #[error("IO error on {0:?}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Downtime error: {0}")]
    Downtime(String),
}

impl From<LuaRuntimeError> for ConfigError {
    fn from(e: LuaRuntimeError) -> Self {
        ConfigError::Script(e.to_string())
    }
}

/// An isolated Lua state
pub struct LuaHost {
    lua: Lua,
    downtime: Arc<AtomicBool>,
}

impl LuaHost {
    /// Create a state with the host functions and prelude installed
    pub fn new() -> Result<Self, LuaRuntimeError> {
        let lua = Lua::new();
        let downtime = Arc::new(AtomicBool::new(false));

        api::register(&lua, Arc::clone(&downtime))?;
        prelude::install(&lua)?;

        debug!("Lua host initialized");
        Ok(Self { lua, downtime })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn in_downtime(&self) -> bool {
        self.downtime.load(Ordering::Acquire)
    }
}

impl ScriptHost for LuaHost {
    type Value = Value;
    type Callback = Function;

    fn call(&self, callback: &Function, args: Vec<Value>) -> CallbackResult<Value> {
        callback
            .call::<Value>(args.into_iter().collect::<MultiValue>())
            .map_err(|e| CallbackError::Raised(e.to_string()))
    }

    fn nil(&self) -> Value {
        Value::Nil
    }

    fn string(&self, text: &str) -> CallbackResult<Value> {
        self.lua
            .create_string(text)
            .map(Value::String)
            .map_err(|e| CallbackError::Conversion(e.to_string()))
    }

    fn truthy(&self, value: &Value) -> bool {
        convert::truthy(value)
    }

    fn render(&self, value: &Value) -> String {
        convert::render(&self.lua, value)
    }

    fn set_downtime(&self, in_downtime: bool) {
        self.downtime.store(in_downtime, Ordering::Release);
    }
}
