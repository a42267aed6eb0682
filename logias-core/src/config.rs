//! Configuration data model
//!
//! The resolved form of the configuration document. Callback slots are generic
//! over the handle type `C` of whichever scripting host produced them, so the
//! model itself never depends on a particular engine.

use crate::host::CallbackError;
use crate::logging::LogLevel;
use crate::stat::persistence_key;
use crate::threshold::ThresholdError;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Load-time configuration errors. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0:?}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("config script error: {0}")]
    Script(String),

    #[error("missing required field: {0}")]
    Missing(String),

    #[error("field '{field}' must be {expected}")]
    InvalidType { field: String, expected: &'static str },

    #[error("unknown target type '{kind}' for target {target}")]
    UnknownTargetKind { target: String, kind: String },

    #[error("interval of target {0} must be a positive number of seconds")]
    InvalidInterval(String),

    #[error("target {0} has no initial_state")]
    MissingInitialState(String),

    #[error("script target {0} has no fn")]
    MissingScript(String),

    #[error("notifiers.default is required")]
    MissingDefaultNotifier,

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown filter kind '{0}'")]
    UnknownFilter(String),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error("unknown log level '{0}'")]
    UnknownLogLevel(String),

    #[error("target {0} is not configured")]
    UnknownTarget(String),

    #[error("initializer of target {target} failed: {source}")]
    Initializer {
        target: String,
        #[source]
        source: CallbackError,
    },
}

/// Kind of monitored source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Tail a file
    File,
    /// Run a shell command
    Cmd,
    /// Invoke a script callback
    Script,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::File => "FILE",
            TargetKind::Cmd => "CMD",
            TargetKind::Script => "SCRIPT",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FILE" => Ok(TargetKind::File),
            "CMD" => Ok(TargetKind::Cmd),
            "SCRIPT" | "LUA" => Ok(TargetKind::Script),
            _ => Err(s.to_string()),
        }
    }
}

/// Settings of a `notify` stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifySpec {
    pub level: Option<String>,
    pub code: Option<String>,
    /// Message sent instead of the raw line
    pub message: Option<String>,
}

/// One pipeline stage
#[derive(Debug, Clone)]
pub enum Filter<C> {
    Match(Regex),
    NotMatch(Regex),
    Test(C),
    Action(C),
    Notify(NotifySpec),
}

impl<C> Filter<C> {
    /// Compile a `match` stage
    pub fn matching(pattern: &str) -> Result<Self, ConfigError> {
        compile(pattern).map(Filter::Match)
    }

    /// Compile a `notmatch` stage
    pub fn not_matching(pattern: &str) -> Result<Self, ConfigError> {
        compile(pattern).map(Filter::NotMatch)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Filter::Match(_) => "match",
            Filter::NotMatch(_) => "notmatch",
            Filter::Test(_) => "test",
            Filter::Action(_) => "action",
            Filter::Notify(_) => "notify",
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// All-must-pass chain of stages
pub type FilterGroup<C> = Vec<Filter<C>>;

/// One monitored source
#[derive(Debug, Clone)]
pub struct Target<C> {
    /// File path, command line or script identifier
    pub path: String,
    pub kind: TargetKind,
    pub interval: Duration,
    /// Produces a fresh State
    pub initial_state: C,
    pub parser: Option<C>,
    /// Per-tick callback of script targets
    pub script: Option<C>,
    pub filter_groups: Vec<FilterGroup<C>>,
    persistence_key: OnceLock<String>,
}

impl<C> Target<C> {
    pub fn new(path: impl Into<String>, kind: TargetKind, interval: Duration, initial_state: C) -> Self {
        Self {
            path: path.into(),
            kind,
            interval,
            initial_state,
            parser: None,
            script: None,
            filter_groups: Vec::new(),
            persistence_key: OnceLock::new(),
        }
    }

    pub fn with_parser(mut self, parser: C) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_script(mut self, script: C) -> Self {
        self.script = Some(script);
        self
    }

    pub fn with_group(mut self, group: FilterGroup<C>) -> Self {
        self.filter_groups.push(group);
        self
    }

    /// Stat record name, computed on first use
    pub fn persistence_key(&self) -> &str {
        self.persistence_key.get_or_init(|| persistence_key(&self.path))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidInterval(self.path.clone()));
        }
        if self.kind == TargetKind::Script && self.script.is_none() {
            return Err(ConfigError::MissingScript(self.path.clone()));
        }
        Ok(())
    }
}

/// Notification handlers
#[derive(Debug, Clone)]
pub struct Notifiers<C> {
    pub default: C,
    pub code: HashMap<String, C>,
    pub level: HashMap<String, C>,
}

impl<C> Notifiers<C> {
    pub fn new(default: C) -> Self {
        Self {
            default,
            code: HashMap::new(),
            level: HashMap::new(),
        }
    }
}

/// Resolved configuration document
#[derive(Debug, Clone)]
pub struct Config<C> {
    /// Directory of stat records
    pub stat_dir: PathBuf,
    /// Log file; stdout only when absent
    pub log_file: Option<PathBuf>,
    pub log_level: LogLevel,
    /// `(level, message)` handler of escalated errors
    pub on_system_error: Option<C>,
    /// `() -> bool` downtime check
    pub downtime: Option<C>,
    pub notifiers: Notifiers<C>,
    /// Sorted by path
    pub targets: Vec<Target<C>>,
}

impl<C> Config<C> {
    pub fn new(notifiers: Notifiers<C>) -> Self {
        Self {
            stat_dir: PathBuf::from("."),
            log_file: None,
            log_level: LogLevel::Info,
            on_system_error: None,
            downtime: None,
            notifiers,
            targets: Vec::new(),
        }
    }

    /// Validate every target and order them by path
    pub fn finish(mut self) -> Result<Self, ConfigError> {
        for target in &self.targets {
            target.validate()?;
        }
        self.targets.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(self)
    }

    pub fn target(&self, path: &str) -> Option<&Target<C>> {
        self.targets.iter().find(|t| t.path == path)
    }

    pub fn target_paths(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.path.clone()).collect()
    }

    /// Detach one target, keeping the shared settings
    pub fn take_target(&mut self, path: &str) -> Result<Target<C>, ConfigError> {
        let index = self
            .targets
            .iter()
            .position(|t| t.path == path)
            .ok_or_else(|| ConfigError::UnknownTarget(path.to_string()))?;
        Ok(self.targets.remove(index))
    }
}
