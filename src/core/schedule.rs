//! Cron schedule handling.
//!
//! The `cron` crate expects a leading seconds field ("sec min hour dom month
//! dow [year]"). Classic five-field crontab expressions are accepted too and
//! fire at second zero. Their day-of-week field counts 0-7 from Sunday (0
//! and 7 both mean Sunday) while the `cron` crate counts 1-7 from Sunday, so
//! numeric days are rewritten before parsing.

use crate::utils::error::{CertError, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::BTreeSet;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct CheckSchedule {
    expression: String,
    schedule: Schedule,
}

impl CheckSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let normalized = match fields.as_slice() {
            [minute, hour, day_of_month, month, day_of_week] => format!(
                "0 {} {} {} {} {}",
                minute,
                hour,
                day_of_month,
                month,
                crontab_day_of_week(day_of_week)
            ),
            _ => trimmed.to_string(),
        };

        let schedule = Schedule::from_str(&normalized).map_err(|e| CertError::Schedule {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }
}

/// Rewrites a crontab day-of-week field into the `cron` crate's numbering.
/// Numeric items (single days, ranges, steps) are expanded to explicit days;
/// names and anything unrecognised are left for the parser to judge.
fn crontab_day_of_week(field: &str) -> String {
    let mut days = BTreeSet::new();
    let mut untouched = Vec::new();

    for item in field.split(',') {
        match crontab_days(item) {
            Some(expanded) => days.extend(expanded),
            None => untouched.push(item.to_string()),
        }
    }

    days.into_iter()
        .map(|day| (day + 1).to_string())
        .chain(untouched)
        .collect::<Vec<_>>()
        .join(",")
}

/// Sunday-based day indexes (0-6) selected by one crontab list item.
fn crontab_days(item: &str) -> Option<Vec<u32>> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step.parse::<usize>().ok().filter(|s| *s > 0)?)),
        None => (item, None),
    };

    let (start, end) = match (range, step) {
        ("*", None) => return None,
        ("*", Some(_)) => (0, 6),
        _ => match range.split_once('-') {
            Some((start, end)) => (crontab_day(start)?, crontab_day(end)?),
            None => {
                let day = crontab_day(range)?;
                (day, if step.is_some() { 7 } else { day })
            }
        },
    };
    if start > end {
        return None;
    }

    Some(
        (start..=end)
            .step_by(step.unwrap_or(1))
            .map(|day| day % 7)
            .collect(),
    )
}

fn crontab_day(value: &str) -> Option<u32> {
    value.parse().ok().filter(|day| *day <= 7)
}
