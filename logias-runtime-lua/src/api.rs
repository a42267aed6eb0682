//! Host functions available to configuration scripts
//!
//! - `log(level, message)`
//! - `template(text, table)`
//! - `parseltsv(line)`
//! - `threshold{name, state, op, val, count, recover, size}`
//! - `nqueue.new(capacity)`
//! - `downtimefile(glob)`
//! - `isindowntime()`

use crate::convert::{number, to_json};
use crate::downtime;
use crate::nqueue::{self, NQueue};
use logias_core::{parse_number, LogLevel, Threshold, ThresholdConfig};
use minijinja::Environment;
use mlua::{AnyUserData, Lua, Table, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) fn register(lua: &Lua, downtime_flag: Arc<AtomicBool>) -> mlua::Result<()> {
    let globals = lua.globals();

    globals.set(
        "log",
        lua.create_function(|_, (level, message): (String, String)| {
            let level: LogLevel = level
                .parse()
                .map_err(|l| mlua::Error::RuntimeError(format!("unknown log level '{}'", l)))?;
            level.emit(&message);
            Ok(())
        })?,
    )?;

    globals.set(
        "template",
        lua.create_function(|_, (text, context): (String, Value)| {
            let env = Environment::new();
            env.render_str(&text, to_json(&context))
                .map_err(|e| mlua::Error::RuntimeError(format!("template error: {}", e)))
        })?,
    )?;

    globals.set(
        "parseltsv",
        lua.create_function(|lua, line: String| parse_ltsv(lua, &line))?,
    )?;

    globals.set("threshold", lua.create_function(threshold)?)?;

    nqueue::register(lua)?;

    globals.set(
        "downtimefile",
        lua.create_function(|lua, pattern: String| {
            lua.create_function(move |_, ()| {
                downtime::in_downtime(&pattern, chrono::Utc::now()).map_err(mlua::Error::external)
            })
        })?,
    )?;

    globals.set(
        "isindowntime",
        lua.create_function(move |_, ()| Ok(downtime_flag.load(Ordering::Acquire)))?,
    )?;

    Ok(())
}

/// `key:value` pairs separated by TAB. Numeric values become numbers.
fn parse_ltsv(lua: &Lua, line: &str) -> mlua::Result<Table> {
    let record = lua.create_table()?;
    for field in line.split('\t') {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        match parse_number(value) {
            Some(n) => record.set(key, n)?,
            None => record.set(key, value)?,
        }
    }
    Ok(record)
}

fn threshold(lua: &Lua, spec: Table) -> mlua::Result<mlua::Function> {
    let config = ThresholdConfig {
        name: spec.get::<Option<String>>("name")?.unwrap_or_default(),
        state_key: spec.get::<Option<String>>("state")?,
        op: spec.get::<Option<String>>("op")?.unwrap_or_default(),
        val: spec.get::<Option<String>>("val")?.unwrap_or_default(),
        count: spec.get::<Option<usize>>("count")?.unwrap_or(1),
        recover: spec.get::<Option<bool>>("recover")?.unwrap_or(false),
        capacity: spec.get::<Option<usize>>("size")?,
    };
    let rule = Threshold::new(config).map_err(mlua::Error::external)?;

    lua.create_function(move |lua, (state, _line, object): (Table, Value, Value)| {
        let mut sample = None;
        if let Value::Table(object) = &object {
            let marker = rule.marker_key();
            let pushed = object.get::<Option<bool>>(marker.as_str())?.unwrap_or(false);
            if !pushed {
                sample = number(&object.get::<Value>(rule.name())?);
                if sample.is_some() {
                    object.set(marker, true)?;
                }
            }
        }

        let queue = window_in(lua, &state, &rule)?;
        let mut queue = queue.borrow_mut::<NQueue>()?;
        Ok(rule.observe(queue.window_mut(), sample))
    })
}

/// The rule's window inside `state`, created on first use
fn window_in(lua: &Lua, state: &Table, rule: &Threshold) -> mlua::Result<AnyUserData> {
    if let Value::UserData(ud) = state.get::<Value>(rule.state_key())? {
        if ud.is::<NQueue>() {
            return Ok(ud);
        }
    }
    let ud = lua.create_userdata(NQueue::new(rule.new_window()))?;
    state.set(rule.state_key(), ud.clone())?;
    Ok(ud)
}
