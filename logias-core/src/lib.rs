//! Logias Core
//!
//! Engine-independent building blocks of the monitoring agent: sliding
//! windows and thresholds, stat records and file tailing, the configuration
//! model, the script host abstraction, the shared log sink and the shutdown
//! barrier.

pub mod config;
pub mod host;
pub mod logging;
pub mod number;
pub mod shutdown;
pub mod stat;
pub mod tail;
pub mod threshold;
pub mod window;

pub use config::{
    Config, ConfigError, Filter, FilterGroup, Notifiers, NotifySpec, Target, TargetKind,
};
pub use host::{CallbackError, CallbackResult, HostLoader, Loaded, ScriptHost};
pub use logging::{LogLevel, LogSink};
pub use number::parse_number;
pub use shutdown::{ShutdownChannel, ShutdownListener, ShutdownReport, WaitGroup};
pub use stat::{persistence_key, FileData, StatError, StatStore};
pub use tail::{FileTail, LineFlow, PollOutcome, PollStatus, TailError, MAX_LINES_PER_POLL};
pub use threshold::{Comparator, Threshold, ThresholdConfig, ThresholdError, PUSHED_MARKER_SUFFIX};
pub use window::{SlidingWindow, DEFAULT_WINDOW_CAPACITY};
