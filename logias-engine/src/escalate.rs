//! System-error escalation
//!
//! Every per-tick failure ends up here. The downtime check gets the first
//! word: while a target is in downtime the error is only logged at debug
//! level. Otherwise it is logged and handed to `on_system_error`.

use logias_core::{Config, ScriptHost};
use tracing::{debug, error};

/// Severity attached to escalated per-tick failures
pub const SYSTEM_ERROR_LEVEL: &str = "ERROR";

/// What happened to an escalated error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Swallowed because the target is in downtime
    Suppressed,
    /// Delivered to `on_system_error`
    Handled,
    /// Logged only: no handler, or the handler failed
    Logged,
}

pub fn escalate<H: ScriptHost>(
    host: &H,
    config: &Config<H::Callback>,
    target_path: &str,
    level: &str,
    message: &str,
) -> Escalation {
    if let Some(downtime) = &config.downtime {
        // a failing downtime check counts as "not in downtime"
        if let Ok(value) = host.call(downtime, Vec::new()) {
            if host.truthy(&value) {
                debug!(target_path, level, message, "System error suppressed during downtime");
                return Escalation::Suppressed;
            }
        }
    }

    error!(target_path, level, "{}", message);

    let Some(handler) = &config.on_system_error else {
        return Escalation::Logged;
    };
    let args = match (host.string(level), host.string(message)) {
        (Ok(level), Ok(message)) => vec![level, message],
        (Err(e), _) | (_, Err(e)) => {
            error!(target_path, error = %e, "Failed to build on_system_error arguments");
            return Escalation::Logged;
        }
    };
    match host.call(handler, args) {
        Ok(_) => Escalation::Handled,
        Err(e) => {
            error!(target_path, error = %e, "on_system_error handler failed");
            Escalation::Logged
        }
    }
}
