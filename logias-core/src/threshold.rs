//! Threshold Evaluator
//!
//! Hysteresis over a [`SlidingWindow`]: a rule fires when the `count` most
//! recent samples all satisfy the comparator, and the sample just before them
//! (the boundary) decides whether the rule fires again while the condition
//! persists.
//!
//! - `recover = false`: the boundary must be absent or fail the comparator,
//!   so an uninterrupted condition fires once.
//! - `recover = true`: the boundary must be absent or satisfy the comparator.

use crate::number::parse_number;
use crate::window::{SlidingWindow, DEFAULT_WINDOW_CAPACITY};
use thiserror::Error;

/// Suffix of the per-event attribute that records a sample was already pushed.
pub const PUSHED_MARKER_SUFFIX: &str = "__thput__";

/// Threshold errors (all load-time)
#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("Unknown threshold operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid threshold value for '{op}': {value}")]
    InvalidValue { op: String, value: String },

    #[error("Threshold attribute name must not be empty")]
    MissingName,
}

/// Comparison applied to each sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparator {
    Gt(f64),
    Ge(f64),
    Lt(f64),
    Le(f64),
    Ne(f64),
    Eq(f64),
    /// Open interval `(min, max)`
    Range(f64, f64),
}

impl Comparator {
    /// Build a comparator from an operator name and its textual value.
    ///
    /// `range` expects `"min,max"`.
    pub fn parse(op: &str, value: &str) -> Result<Self, ThresholdError> {
        let invalid = || ThresholdError::InvalidValue {
            op: op.to_string(),
            value: value.to_string(),
        };

        if op == "range" {
            let (min, max) = value.split_once(',').ok_or_else(invalid)?;
            let min = parse_number(min).ok_or_else(invalid)?;
            let max = parse_number(max).ok_or_else(invalid)?;
            return Ok(Comparator::Range(min, max));
        }

        let n = parse_number(value).ok_or_else(invalid)?;
        match op {
            "gt" => Ok(Comparator::Gt(n)),
            "ge" => Ok(Comparator::Ge(n)),
            "lt" => Ok(Comparator::Lt(n)),
            "le" => Ok(Comparator::Le(n)),
            "ne" => Ok(Comparator::Ne(n)),
            "eq" => Ok(Comparator::Eq(n)),
            other => Err(ThresholdError::UnknownOperator(other.to_string())),
        }
    }

    pub fn test(&self, n: f64) -> bool {
        match *self {
            Comparator::Gt(v) => n > v,
            Comparator::Ge(v) => n >= v,
            Comparator::Lt(v) => n < v,
            Comparator::Le(v) => n <= v,
            Comparator::Ne(v) => n != v,
            Comparator::Eq(v) => n == v,
            Comparator::Range(min, max) => min < n && n < max,
        }
    }
}

/// Raw threshold settings as written in the configuration document
#[derive(Debug, Clone, Default)]
pub struct ThresholdConfig {
    /// Event attribute that carries the sample
    pub name: String,
    /// State key holding the window (defaults to `name`)
    pub state_key: Option<String>,
    pub op: String,
    pub val: String,
    pub count: usize,
    pub recover: bool,
    /// Window capacity override
    pub capacity: Option<usize>,
}

/// Compiled threshold rule
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    name: String,
    state_key: String,
    comparator: Comparator,
    count: usize,
    recover: bool,
    capacity: usize,
}

impl Threshold {
    pub fn new(config: ThresholdConfig) -> Result<Self, ThresholdError> {
        if config.name.is_empty() {
            return Err(ThresholdError::MissingName);
        }
        let comparator = Comparator::parse(&config.op, &config.val)?;
        let state_key = config
            .state_key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| config.name.clone());

        Ok(Self {
            name: config.name,
            state_key,
            comparator,
            count: config.count,
            recover: config.recover,
            capacity: config.capacity.unwrap_or(DEFAULT_WINDOW_CAPACITY),
        })
    }

    /// Event attribute carrying the sample
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the window inside the target state
    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    /// Event attribute set once this event's sample has been pushed
    pub fn marker_key(&self) -> String {
        format!("{}{}", self.name, PUSHED_MARKER_SUFFIX)
    }

    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    /// Fresh window sized for this rule
    pub fn new_window(&self) -> SlidingWindow {
        SlidingWindow::new(self.capacity)
    }

    /// Push `sample` (if any) and evaluate the window.
    pub fn observe(&self, window: &mut SlidingWindow, sample: Option<f64>) -> bool {
        if let Some(value) = sample {
            window.put(value);
        }
        self.evaluate(window)
    }

    /// Walk `count + 1` samples back from the most recent one.
    pub fn evaluate(&self, window: &SlidingWindow) -> bool {
        for i in 0..=self.count {
            let sample = window.at(-(i as i64) - 1);

            if i < self.count {
                // missing data counts as failure
                match sample {
                    Some(v) if self.comparator.test(v) => continue,
                    _ => return false,
                }
            }

            let boundary_matches = sample.map(|v| self.comparator.test(v));
            let boundary_ok = match boundary_matches {
                None => true,
                Some(matches) => matches == self.recover,
            };
            if !boundary_ok {
                return false;
            }
        }
        true
    }
}
