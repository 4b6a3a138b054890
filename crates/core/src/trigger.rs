// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger abstraction: the rule computing a job's next fire time.
//!
//! Callers hand the system a [`TriggerSpec`] (the wire form persisted in the
//! task store: a 5-field cron string or interval seconds). The scheduler works
//! against the compiled [`Trigger`], which exposes `next_fire_after`.

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from trigger spec compilation.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },
    #[error("interval must be at least one second")]
    ZeroInterval,
}

/// Wire form of a trigger, as accepted from callers and persisted with the
/// task definition. Either an integer interval in seconds or a 5-field cron
/// expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerSpec {
    Interval(u64),
    Cron(String),
}

impl TriggerSpec {
    /// Compile the spec into a runnable trigger.
    pub fn compile(&self) -> Result<Trigger, TriggerError> {
        match self {
            TriggerSpec::Interval(secs) => Trigger::interval(*secs),
            TriggerSpec::Cron(expr) => Trigger::cron(expr),
        }
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSpec::Interval(secs) => write!(f, "every {}s", secs),
            TriggerSpec::Cron(expr) => write!(f, "cron '{}'", expr),
        }
    }
}

/// A compiled trigger.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Cron expression. The original 5-field expression is kept for display;
    /// the compiled schedule carries a prepended seconds field.
    Cron {
        expr: String,
        schedule: Box<Schedule>,
    },
    /// Fixed interval between fires.
    Interval(Duration),
    /// Fires once at the given instant, then never again.
    OneShot(DateTime<Utc>),
}

impl Trigger {
    /// Compile a cron expression. Classic 5-field crontab form is accepted
    /// and normalized by prepending a seconds field of `0`.
    pub fn cron(expr: &str) -> Result<Self, TriggerError> {
        let normalized = if expr.split_whitespace().count() == 5 {
            format!("0 {}", expr)
        } else {
            expr.to_string()
        };
        let schedule = Schedule::from_str(&normalized).map_err(|e| TriggerError::InvalidCron {
            expr: expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(Trigger::Cron {
            expr: expr.to_string(),
            schedule: Box::new(schedule),
        })
    }

    /// Fixed interval in whole seconds (the wire form).
    pub fn interval(secs: u64) -> Result<Self, TriggerError> {
        if secs == 0 {
            return Err(TriggerError::ZeroInterval);
        }
        Ok(Trigger::Interval(Duration::from_secs(secs)))
    }

    /// Fixed interval with sub-second precision.
    pub fn every(period: Duration) -> Self {
        Trigger::Interval(period)
    }

    /// Fire once at `at`.
    pub fn one_shot(at: DateTime<Utc>) -> Self {
        Trigger::OneShot(at)
    }

    /// Compute the next fire time strictly after `now`.
    ///
    /// `None` means the trigger is exhausted (a one-shot whose instant has
    /// passed, or a cron schedule with no future occurrence).
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron { schedule, .. } => schedule.after(&now).next(),
            Trigger::Interval(period) => {
                let period = chrono::Duration::from_std(*period).ok()?;
                Some(now + period)
            }
            Trigger::OneShot(at) => (*at > now).then_some(*at),
        }
    }
}

impl PartialEq for Trigger {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Trigger::Cron { expr: a, .. }, Trigger::Cron { expr: b, .. }) => a == b,
            (Trigger::Interval(a), Trigger::Interval(b)) => a == b,
            (Trigger::OneShot(a), Trigger::OneShot(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Cron { expr, .. } => write!(f, "cron '{}'", expr),
            Trigger::Interval(period) => write!(f, "every {}ms", period.as_millis()),
            Trigger::OneShot(at) => write!(f, "once at {}", at.to_rfc3339()),
        }
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
