//! Logias Engine
//!
//! The monitoring loop: filter pipeline, downtime gate, notification
//! routing, per-target workers and the dispatcher that runs them.

pub mod dispatcher;
pub mod downtime;
pub mod escalate;
pub mod notify;
pub mod pipeline;
pub mod worker;

use logias_core::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

pub use dispatcher::{open_sink, Dispatcher};
pub use downtime::{DowntimeGate, Transition};
pub use escalate::{escalate, Escalation, SYSTEM_ERROR_LEVEL};
pub use notify::{select, Delivery, NotificationRouter, Route};
pub use pipeline::{EventReport, Pipeline};
pub use worker::{run_command, Worker, WorkerPhase};

#[cfg(feature = "lua")]
pub use logias_runtime_lua::{LuaHost, LuaLoader};

/// Dispatcher driven by Lua configuration
#[cfg(feature = "lua")]
pub type LuaDispatcher = Dispatcher<LuaHost>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open log file {0:?}: {1}")]
    LogFile(PathBuf, std::io::Error),
}
