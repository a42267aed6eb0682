//! Conversions between Lua values and Rust/JSON values

use logias_core::parse_number;
use mlua::{Lua, Table, Value};
use serde_json::{Map, Number, Value as Json};

/// Nesting limit when converting tables; guards against cyclic tables
const MAX_DEPTH: usize = 16;

/// Numeric reading of a value: numbers as-is, numeric strings parsed
pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Number(n) => Some(*n),
        Value::String(s) => parse_number(&s.to_string_lossy()),
        _ => None,
    }
}

pub fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil | Value::Boolean(false))
}

fn json_number(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Json::from(n as i64)
    } else {
        Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
    }
}

/// Convert a Lua value into JSON. Sequences become arrays, other tables
/// objects; functions and userdata become null.
pub fn to_json(value: &Value) -> Json {
    to_json_at(value, 0)
}

fn to_json_at(value: &Value, depth: usize) -> Json {
    match value {
        Value::Nil => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => Json::from(*i),
        Value::Number(n) => json_number(*n),
        Value::String(s) => Json::String(s.to_string_lossy()),
        Value::Table(t) if depth < MAX_DEPTH => table_to_json(t, depth + 1),
        _ => Json::Null,
    }
}

fn table_to_json(table: &Table, depth: usize) -> Json {
    let len = table.raw_len();
    let mut entries = Vec::new();
    for pair in table.pairs::<Value, Value>() {
        let Ok((key, value)) = pair else { continue };
        entries.push((key, value));
    }

    if len > 0 && entries.len() == len {
        let mut items = vec![Json::Null; len];
        for (key, value) in &entries {
            if let Some(index) = number(key).filter(|_| !matches!(key, Value::String(_))) {
                let index = index as usize;
                if (1..=len).contains(&index) {
                    items[index - 1] = to_json_at(value, depth);
                }
            }
        }
        return Json::Array(items);
    }

    let mut object = Map::new();
    for (key, value) in &entries {
        let key = match key {
            Value::String(s) => s.to_string_lossy(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            _ => continue,
        };
        object.insert(key, to_json_at(value, depth));
    }
    Json::Object(object)
}

/// Render a value for logging and matching. Strings render verbatim, tables
/// as JSON with sorted keys, anything else through `tostring`.
pub fn render(lua: &Lua, value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string_lossy(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => json_number(*n).to_string(),
        Value::Table(_) => to_json(value).to_string(),
        other => lua
            .globals()
            .get::<mlua::Function>("tostring")
            .and_then(|f| f.call::<String>(other.clone()))
            .unwrap_or_default(),
    }
}
