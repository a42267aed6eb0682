//! Configuration loading
//!
//! Runs the configuration document in a fresh [`LuaHost`] and resolves the
//! `logias` global into the engine-independent [`Config`] model.

use crate::prelude::STAGE_TAG;
use crate::LuaHost;
use logias_core::{
    Config, ConfigError, Filter, FilterGroup, HostLoader, Loaded, LogLevel, Notifiers,
    NotifySpec, Target, TargetKind,
};
use mlua::{FromLua, Function, Table};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Name of the global holding the configuration table
pub const CONFIG_GLOBAL: &str = "logias";

#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Inline { name: String, code: String },
}

/// Loads the configuration document into a new Lua state on every call
#[derive(Debug, Clone)]
pub struct LuaLoader {
    source: Source,
}

impl LuaLoader {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::File(path.into()),
        }
    }

    pub fn inline(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            source: Source::Inline {
                name: name.into(),
                code: code.into(),
            },
        }
    }

    fn code(&self) -> Result<(String, String), ConfigError> {
        match &self.source {
            Source::File(path) => {
                let code = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Io(path.clone(), e))?;
                Ok((path.display().to_string(), code))
            }
            Source::Inline { name, code } => Ok((name.clone(), code.clone())),
        }
    }
}

impl HostLoader for LuaLoader {
    type Host = LuaHost;

    fn load(&self) -> Result<Loaded<LuaHost>, ConfigError> {
        let (name, code) = self.code()?;
        let host = LuaHost::new()?;
        host.lua()
            .load(&code)
            .set_name(format!("@{}", name))
            .exec()
            .map_err(|e| ConfigError::Script(e.to_string()))?;

        let root: Table = get(&host.lua().globals(), CONFIG_GLOBAL, CONFIG_GLOBAL, "a table")?
            .ok_or_else(|| ConfigError::Missing(CONFIG_GLOBAL.to_string()))?;
        let config = resolve(&root)?;
        debug!(config = %name, targets = config.targets.len(), "Configuration loaded");

        Ok(Loaded { host, config })
    }
}

/// Typed optional field lookup
fn get<V: FromLua>(
    table: &Table,
    key: &str,
    field: &str,
    expected: &'static str,
) -> Result<Option<V>, ConfigError> {
    table
        .get::<Option<V>>(key)
        .map_err(|_| ConfigError::InvalidType {
            field: field.to_string(),
            expected,
        })
}

fn resolve(root: &Table) -> Result<Config<Function>, ConfigError> {
    let notifiers: Table = get(root, "notifiers", "notifiers", "a table")?
        .ok_or(ConfigError::MissingDefaultNotifier)?;
    let mut config = Config::new(resolve_notifiers(&notifiers)?);

    if let Some(dir) = get::<String>(root, "stat_dir", "stat_dir", "a string")? {
        config.stat_dir = PathBuf::from(dir);
    }
    config.log_file = get::<String>(root, "log_file", "log_file", "a string")?.map(PathBuf::from);
    if let Some(level) = get::<String>(root, "log_level", "log_level", "a string")? {
        config.log_level = level
            .parse::<LogLevel>()
            .map_err(ConfigError::UnknownLogLevel)?;
    }
    config.on_system_error = get(root, "on_system_error", "on_system_error", "a function")?;
    config.downtime = get(root, "downtime", "downtime", "a function")?;

    if let Some(targets) = get::<Table>(root, "targets", "targets", "a table")? {
        for pair in targets.pairs::<String, Table>() {
            let (path, spec) = pair.map_err(|_| ConfigError::InvalidType {
                field: "targets".to_string(),
                expected: "a table of target tables keyed by path",
            })?;
            config.targets.push(resolve_target(path, &spec)?);
        }
    }

    config.finish()
}

fn resolve_notifiers(table: &Table) -> Result<Notifiers<Function>, ConfigError> {
    let default: Function = get(table, "default", "notifiers.default", "a function")?
        .ok_or(ConfigError::MissingDefaultNotifier)?;
    let mut notifiers = Notifiers::new(default);
    notifiers.code = handler_map(table, "code")?;
    notifiers.level = handler_map(table, "level")?;
    Ok(notifiers)
}

fn handler_map(table: &Table, key: &str) -> Result<HashMap<String, Function>, ConfigError> {
    let field = format!("notifiers.{}", key);
    let Some(handlers) = get::<Table>(table, key, &field, "a table")? else {
        return Ok(HashMap::new());
    };
    handlers
        .pairs::<String, Function>()
        .map(|pair| {
            pair.map_err(|_| ConfigError::InvalidType {
                field: field.clone(),
                expected: "a table of functions",
            })
        })
        .collect()
}

fn resolve_target(path: String, spec: &Table) -> Result<Target<Function>, ConfigError> {
    let field = |name: &str| format!("targets[{}].{}", path, name);

    let kind = match get::<String>(spec, "type", &field("type"), "a string")? {
        None => TargetKind::File,
        Some(kind) => kind.parse().map_err(|kind| ConfigError::UnknownTargetKind {
            target: path.clone(),
            kind,
        })?,
    };

    let seconds = get::<f64>(spec, "interval", &field("interval"), "a number")?
        .ok_or_else(|| ConfigError::Missing(field("interval")))?;
    let interval = Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| ConfigError::InvalidInterval(path.clone()))?;

    let initial_state: Function =
        get(spec, "initial_state", &field("initial_state"), "a function")?
            .ok_or_else(|| ConfigError::MissingInitialState(path.clone()))?;

    let mut target = Target::new(path.clone(), kind, interval, initial_state);
    target.parser = get(spec, "parser", &field("parser"), "a function")?;
    target.script = get(spec, "fn", &field("fn"), "a function")?;

    if let Some(groups) = get::<Table>(spec, "filter_groups", &field("filter_groups"), "a table")? {
        for group in groups.sequence_values::<Table>() {
            let group = group.map_err(|_| ConfigError::InvalidType {
                field: field("filter_groups"),
                expected: "a list of stage lists",
            })?;
            target.filter_groups.push(resolve_group(&path, &group)?);
        }
    }

    Ok(target)
}

fn resolve_group(path: &str, group: &Table) -> Result<FilterGroup<Function>, ConfigError> {
    let field = format!("targets[{}].filter_groups", path);
    group
        .sequence_values::<Table>()
        .map(|stage| {
            let stage = stage.map_err(|_| ConfigError::InvalidType {
                field: field.clone(),
                expected: "a list of stages",
            })?;
            resolve_stage(&field, &stage)
        })
        .collect()
}

fn resolve_stage(field: &str, stage: &Table) -> Result<Filter<Function>, ConfigError> {
    let kind: String = get(stage, STAGE_TAG, field, "a stage built by match/notmatch/test/action/notify")?
        .ok_or_else(|| ConfigError::UnknownFilter("<untagged>".to_string()))?;

    let pattern = || -> Result<String, ConfigError> {
        get::<String>(stage, "pattern", field, "a string")?
            .ok_or_else(|| ConfigError::Missing(format!("{} {} pattern", field, kind)))
    };
    let callback = || -> Result<Function, ConfigError> {
        get::<Function>(stage, "fn", field, "a function")?
            .ok_or_else(|| ConfigError::Missing(format!("{} {} fn", field, kind)))
    };
    let text = |key: &str| get::<String>(stage, key, field, "a string");

    match kind.as_str() {
        "match" => Filter::matching(&pattern()?),
        "notmatch" => Filter::not_matching(&pattern()?),
        "test" => Ok(Filter::Test(callback()?)),
        "action" => Ok(Filter::Action(callback()?)),
        "notify" => Ok(Filter::Notify(NotifySpec {
            level: text("level")?,
            code: text("code")?,
            message: text("message")?,
        })),
        other => Err(ConfigError::UnknownFilter(other.to_string())),
    }
}
