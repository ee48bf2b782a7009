//! Cron schedules for recurring tasks.
//!
//! ## Accepted forms
//! Plans carry classic 5-field expressions (`min hour dom mon dow`), while
//! the `cron` crate parses 6 or 7 fields (seconds first, optional year).
//! 5-field input is normalised by prefixing a `0` seconds field; longer
//! forms pass through unchanged.
//!
//! ## Strictly after
//! `next_after(now)` never returns `now` itself. A task re-enqueued right
//! after a run that started exactly on a fire time would otherwise run
//! twice for the same tick.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::KeeperError;

/// A parsed cron expression.
///
/// Accepts the classic 5-field form (`min hour dom mon dow`) as well as the
/// 6/7-field form with seconds (and year). 5-field expressions fire at second
/// zero.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: Schedule,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, KeeperError> {
        let trimmed = expr.trim();
        let normalized = match trimmed.split_whitespace().count() {
            5 => format!("0 {trimmed}"),
            _ => trimmed.to_string(),
        };
        let schedule = Schedule::from_str(&normalized).map_err(|e| KeeperError::Schedule {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            expr: expr.to_string(),
            schedule,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }
}
