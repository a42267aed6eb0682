//! Downtime Gate
//!
//! Tracks whether a worker is inside a downtime window, re-evaluated at the
//! start of every tick. Leaving downtime is reported so the worker can reset
//! the target's State before any event is processed.

use logias_core::{CallbackResult, ScriptHost};

/// Change observed by [`DowntimeGate::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Entered,
    /// downtime -> active
    Resumed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DowntimeGate {
    in_downtime: bool,
}

impl DowntimeGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_downtime(&self) -> bool {
        self.in_downtime
    }

    /// Invoke the downtime callback. No callback means never in downtime.
    pub fn query<H: ScriptHost>(host: &H, callback: Option<&H::Callback>) -> CallbackResult<bool> {
        match callback {
            None => Ok(false),
            Some(cb) => host.call(cb, Vec::new()).map(|v| host.truthy(&v)),
        }
    }

    pub fn update(&mut self, in_downtime: bool) -> Transition {
        let transition = match (self.in_downtime, in_downtime) {
            (false, true) => Transition::Entered,
            (true, false) => Transition::Resumed,
            _ => Transition::Unchanged,
        };
        self.in_downtime = in_downtime;
        transition
    }
}
