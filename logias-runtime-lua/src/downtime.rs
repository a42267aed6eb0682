//! Downtime schedule files
//!
//! A schedule file holds two lines, `START: <RFC3339>` and `END: <RFC3339>`
//! (keys are case-insensitive). When several files match the configured glob,
//! the lexicographically last one is used.

use chrono::{DateTime, FixedOffset, Utc};
use std::path::PathBuf;
use tracing::warn;

use crate::LuaRuntimeError;

/// Parsed downtime window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DowntimeWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl DowntimeWindow {
    /// `start < now < end`
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start < now && now < self.end
    }
}

/// Parse a schedule. `Ok(None)` when either bound is missing.
pub fn parse_schedule(text: &str) -> Result<Option<DowntimeWindow>, LuaRuntimeError> {
    let mut start = None;
    let mut end = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let slot = match key.trim().to_ascii_uppercase().as_str() {
            "START" => &mut start,
            "END" => &mut end,
            _ => continue,
        };
        let value = value.trim();
        let parsed = DateTime::parse_from_rfc3339(value)
            .map_err(|e| LuaRuntimeError::Downtime(format!("invalid timestamp '{}': {}", value, e)))?;
        *slot = Some(parsed);
    }

    Ok(start.zip(end).map(|(start, end)| DowntimeWindow { start, end }))
}

/// Lexicographically last file matching `pattern`
pub fn latest_match(pattern: &str) -> Result<Option<PathBuf>, LuaRuntimeError> {
    let paths = glob::glob(pattern)
        .map_err(|e| LuaRuntimeError::Downtime(format!("invalid glob '{}': {}", pattern, e)))?;
    Ok(paths.filter_map(Result::ok).filter(|p| p.is_file()).max())
}

/// Whether `now` lies inside the schedule selected by `pattern`
pub fn in_downtime(pattern: &str, now: DateTime<Utc>) -> Result<bool, LuaRuntimeError> {
    let Some(path) = latest_match(pattern)? else {
        return Ok(false);
    };
    let text = std::fs::read_to_string(&path).map_err(|e| LuaRuntimeError::Io(path.clone(), e))?;
    match parse_schedule(&text)? {
        Some(window) => Ok(window.contains(now)),
        None => {
            warn!(path = %path.display(), "Downtime file has no START/END pair");
            Ok(false)
        }
    }
}
