//! Notification Router
//!
//! Picks the handler for a `notify` stage: a handler registered for the
//! stage's code wins over one registered for its level, which wins over the
//! default handler. Nothing is delivered while the worker is in downtime.
//! Handler failures are logged and never escalated.

use logias_core::{CallbackResult, Notifiers, NotifySpec, ScriptHost};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Which handler a notification was routed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Code(String),
    Level(String),
    Default,
}

/// Result of routing one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Suppressed,
    Delivered(Route),
    Failed(Route),
}

fn registered<'a, C>(key: &Option<String>, table: &'a HashMap<String, C>) -> Option<(String, &'a C)> {
    let key = key.as_deref().filter(|k| !k.is_empty())?;
    table.get(key).map(|handler| (key.to_string(), handler))
}

/// Handler chosen for `spec`
pub fn select<'a, C>(notifiers: &'a Notifiers<C>, spec: &NotifySpec) -> (Route, &'a C) {
    if let Some((code, handler)) = registered(&spec.code, &notifiers.code) {
        return (Route::Code(code), handler);
    }
    if let Some((level, handler)) = registered(&spec.level, &notifiers.level) {
        return (Route::Level(level), handler);
    }
    (Route::Default, &notifiers.default)
}

/// Routes notifications of one worker
pub struct NotificationRouter<'a, H: ScriptHost> {
    host: &'a H,
    notifiers: &'a Notifiers<H::Callback>,
    target_path: &'a str,
    in_downtime: bool,
}

impl<'a, H: ScriptHost> NotificationRouter<'a, H> {
    pub fn new(
        host: &'a H,
        notifiers: &'a Notifiers<H::Callback>,
        target_path: &'a str,
        in_downtime: bool,
    ) -> Self {
        Self {
            host,
            notifiers,
            target_path,
            in_downtime,
        }
    }

    /// Invoke the selected handler with `(state, object, message, level, code)`.
    /// Absent level and code are passed as nil.
    pub fn dispatch(
        &self,
        spec: &NotifySpec,
        state: &H::Value,
        object: &H::Value,
        message: &str,
    ) -> Delivery {
        if self.in_downtime {
            debug!(target_path = self.target_path, "Notification suppressed during downtime");
            return Delivery::Suppressed;
        }

        let (route, handler) = select(self.notifiers, spec);
        let result = self
            .arguments(spec, state, object, message)
            .and_then(|args| self.host.call(handler, args));

        match result {
            Ok(_) => {
                debug!(target_path = self.target_path, route = ?route, "Notification delivered");
                Delivery::Delivered(route)
            }
            Err(e) => {
                warn!(
                    target_path = self.target_path,
                    route = ?route,
                    error = %e,
                    "Notification handler failed"
                );
                Delivery::Failed(route)
            }
        }
    }

    fn arguments(
        &self,
        spec: &NotifySpec,
        state: &H::Value,
        object: &H::Value,
        message: &str,
    ) -> CallbackResult<Vec<H::Value>> {
        let optional = |value: &Option<String>| match value {
            Some(v) => self.host.string(v),
            None => Ok(self.host.nil()),
        };
        Ok(vec![
            state.clone(),
            object.clone(),
            self.host.string(message)?,
            optional(&spec.level)?,
            optional(&spec.code)?,
        ])
    }
}
