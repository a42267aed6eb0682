//! Filter Pipeline Evaluator
//!
//! Every filter group of a target is evaluated against each event. A group
//! is an all-must-pass chain: the first failing stage ends that group, the
//! remaining groups still run.

use crate::escalate::{escalate, SYSTEM_ERROR_LEVEL};
use crate::notify::{Delivery, NotificationRouter};
use logias_core::{Config, Filter, FilterGroup, ScriptHost, Target};
use tracing::trace;

/// Counters of one event's evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventReport {
    /// Groups whose every stage passed
    pub passed: usize,
    /// Groups ended early by a failing stage
    pub aborted: usize,
    pub delivered: usize,
    pub suppressed: usize,
    /// Callback failures escalated while evaluating
    pub errors: usize,
}

/// Evaluation context of one worker tick
pub struct Pipeline<'a, H: ScriptHost> {
    host: &'a H,
    config: &'a Config<H::Callback>,
    target: &'a Target<H::Callback>,
    state: &'a H::Value,
    in_downtime: bool,
}

impl<'a, H: ScriptHost> Pipeline<'a, H> {
    pub fn new(
        host: &'a H,
        config: &'a Config<H::Callback>,
        target: &'a Target<H::Callback>,
        state: &'a H::Value,
        in_downtime: bool,
    ) -> Self {
        Self {
            host,
            config,
            target,
            state,
            in_downtime,
        }
    }

    /// Run all filter groups against `(line, object)`
    pub fn evaluate(&self, line: &str, object: &H::Value) -> EventReport {
        let mut report = EventReport::default();
        for group in &self.target.filter_groups {
            if self.evaluate_group(group, line, object, &mut report) {
                report.passed += 1;
            } else {
                report.aborted += 1;
            }
        }
        report
    }

    fn evaluate_group(
        &self,
        group: &FilterGroup<H::Callback>,
        line: &str,
        object: &H::Value,
        report: &mut EventReport,
    ) -> bool {
        for stage in group {
            let pass = match stage {
                Filter::Match(re) => re.is_match(line),
                Filter::NotMatch(re) => !re.is_match(line),
                Filter::Test(callback) => match self.invoke(callback, line, object) {
                    Ok(value) => self.host.truthy(&value),
                    Err(message) => {
                        self.fail("test", &message, report);
                        false
                    }
                },
                Filter::Action(callback) => {
                    if let Err(message) = self.invoke(callback, line, object) {
                        self.fail("action", &message, report);
                    }
                    true
                }
                Filter::Notify(spec) => {
                    let router = NotificationRouter::new(
                        self.host,
                        &self.config.notifiers,
                        &self.target.path,
                        self.in_downtime,
                    );
                    let message = spec.message.as_deref().unwrap_or(line);
                    match router.dispatch(spec, self.state, object, message) {
                        Delivery::Suppressed => report.suppressed += 1,
                        Delivery::Delivered(_) => report.delivered += 1,
                        Delivery::Failed(_) => {}
                    }
                    true
                }
            };

            if !pass {
                trace!(target_path = %self.target.path, stage = stage.kind(), "Filter group stopped");
                return false;
            }
        }
        true
    }

    /// Call a test/action callback with `(state, line, object)`
    fn invoke(&self, callback: &H::Callback, line: &str, object: &H::Value) -> Result<H::Value, String> {
        let line = self.host.string(line).map_err(|e| e.to_string())?;
        self.host
            .call(callback, vec![self.state.clone(), line, object.clone()])
            .map_err(|e| e.to_string())
    }

    fn fail(&self, stage: &str, message: &str, report: &mut EventReport) {
        report.errors += 1;
        escalate(
            self.host,
            self.config,
            &self.target.path,
            SYSTEM_ERROR_LEVEL,
            &format!("{} callback failed for {}: {}", stage, self.target.path, message),
        );
    }
}
