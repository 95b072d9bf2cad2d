//! Reproducible schedule traces.
//!
//! A trace is plain text, one decision per line:
//!
//! ```text
//! --fair-scheduling
//! --liveness-temperature-threshold:50
//! --test-method:ping_pong
//! (3)
//! True
//! 17
//! ```
//!
//! `(id)` schedules an operation, `True`/`False` answers a boolean choice and
//! a bare integer answers an integer choice. Header lines are optional and
//! come first.

use crate::operation::OperationId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const FAIR_SCHEDULING: &str = "--fair-scheduling";
const LIVENESS_THRESHOLD: &str = "--liveness-temperature-threshold:";
const TEST_METHOD: &str = "--test-method:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("malformed trace line {line}: {text:?}")]
    Malformed { line: usize, text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceStep {
    Schedule(OperationId),
    Boolean(bool),
    Integer(u64),
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceStep::Schedule(id) => write!(f, "({})", id),
            TraceStep::Boolean(true) => f.write_str("True"),
            TraceStep::Boolean(false) => f.write_str("False"),
            TraceStep::Integer(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTrace {
    pub steps: Vec<TraceStep>,
    pub fair_scheduling: bool,
    pub liveness_temperature_threshold: Option<u64>,
    pub test_method: Option<String>,
}

impl ScheduleTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}

impl fmt::Display for ScheduleTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fair_scheduling {
            writeln!(f, "{}", FAIR_SCHEDULING)?;
        }
        if let Some(threshold) = self.liveness_temperature_threshold {
            writeln!(f, "{}{}", LIVENESS_THRESHOLD, threshold)?;
        }
        if let Some(method) = &self.test_method {
            writeln!(f, "{}{}", TEST_METHOD, method)?;
        }
        for step in &self.steps {
            writeln!(f, "{}", step)?;
        }
        Ok(())
    }
}

impl FromStr for ScheduleTrace {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut trace = ScheduleTrace::new();
        for (index, raw) in s.lines().enumerate() {
            let line = raw.trim();
            let malformed = || TraceError::Malformed {
                line: index + 1,
                text: raw.to_string(),
            };
            if line.is_empty() {
                continue;
            }
            if line.starts_with("--") {
                if !trace.steps.is_empty() {
                    return Err(malformed());
                }
                if line == FAIR_SCHEDULING {
                    trace.fair_scheduling = true;
                } else if let Some(value) = line.strip_prefix(LIVENESS_THRESHOLD) {
                    let threshold = value.parse().map_err(|_| malformed())?;
                    trace.liveness_temperature_threshold = Some(threshold);
                } else if let Some(method) = line.strip_prefix(TEST_METHOD) {
                    trace.test_method = Some(method.to_string());
                } else {
                    return Err(malformed());
                }
                continue;
            }
            let step = match line {
                "True" => TraceStep::Boolean(true),
                "False" => TraceStep::Boolean(false),
                _ => match line.strip_prefix('(').and_then(|l| l.strip_suffix(')')) {
                    Some(id) => {
                        TraceStep::Schedule(OperationId(id.trim().parse().map_err(|_| malformed())?))
                    }
                    None => TraceStep::Integer(line.parse().map_err(|_| malformed())?),
                },
            };
            trace.push(step);
        }
        Ok(trace)
    }
}
