//! Recurrence rule evaluator.
//!
//! # Responsibility
//! - Parse the free-text `repeat` field of a task into day-of-week and
//!   day-of-month sets.
//! - Decide whether a rule fires on a given calendar date.
//!
//! # Invariants
//! - Parsing is case-insensitive and whitespace-tolerant.
//! - A rule that cannot be parsed is an error, never a silent match.
//! - Day-of-month `1` matches every day.

use chrono::{Datelike, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use thiserror::Error;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));
static DAILY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:every day|everyday|daily)$").expect("valid daily regex"));
static MONTHLY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:every month on the (\d{1,2})(?:st|nd|rd|th)?|on the (\d{1,2})(?:st|nd|rd|th)? of every month)$",
    )
    .expect("valid monthly regex")
});
static WEEKDAY_LIST_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(?:,|\band\b)\s*").expect("valid separator regex"));

pub type RecurrenceResult<T> = Result<T, RecurrenceError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecurrenceError {
    #[error("unsupported schedule `{0}`")]
    Unsupported(String),
}

/// Parsed recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    days_of_week: Vec<Weekday>,
    days_of_month: BTreeSet<u32>,
}

impl RecurrenceRule {
    /// Parses a user-authored rule such as `every weekday` or
    /// `every month on the 15th`.
    pub fn parse(rule: &str) -> RecurrenceResult<Self> {
        let normalized = WHITESPACE_RE
            .replace_all(rule.trim(), " ")
            .to_lowercase();
        let unsupported = || RecurrenceError::Unsupported(rule.trim().to_string());

        if normalized.is_empty() {
            return Err(unsupported());
        }

        if DAILY_RE.is_match(&normalized) {
            return Ok(Self::monthly([1]));
        }

        if let Some(captures) = MONTHLY_RE.captures(&normalized) {
            let day = captures
                .get(1)
                .or_else(|| captures.get(2))
                .and_then(|value| value.as_str().parse::<u32>().ok())
                .filter(|day| (1..=31).contains(day))
                .ok_or_else(unsupported)?;
            return Ok(Self::monthly([day]));
        }

        let Some(list) = normalized.strip_prefix("every ") else {
            return Err(unsupported());
        };

        match list {
            "weekday" | "weekdays" => Ok(Self::weekly([
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ])),
            "weekend" | "weekends" => Ok(Self::weekly([Weekday::Sat, Weekday::Sun])),
            _ => {
                let mut days = Vec::new();
                for part in WEEKDAY_LIST_SEPARATOR_RE.split(list) {
                    if part.is_empty() {
                        continue;
                    }
                    days.push(parse_weekday(part).ok_or_else(unsupported)?);
                }
                if days.is_empty() {
                    return Err(unsupported());
                }
                Ok(Self::weekly(days))
            }
        }
    }

    fn weekly(days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut days_of_week: Vec<Weekday> = Vec::new();
        for day in days {
            if !days_of_week.contains(&day) {
                days_of_week.push(day);
            }
        }
        days_of_week.sort_by_key(|day| day.num_days_from_monday());
        Self {
            days_of_week,
            days_of_month: BTreeSet::new(),
        }
    }

    fn monthly(days: impl IntoIterator<Item = u32>) -> Self {
        Self {
            days_of_week: Vec::new(),
            days_of_month: days.into_iter().collect(),
        }
    }

    /// Weekdays the rule fires on, Monday first.
    pub fn days_of_week(&self) -> &[Weekday] {
        &self.days_of_week
    }

    pub fn days_of_month(&self) -> &BTreeSet<u32> {
        &self.days_of_month
    }

    /// Whether the rule fires on `date`.
    pub fn matches(&self, date: NaiveDate) -> bool {
        self.days_of_month.contains(&1)
            || self.days_of_month.contains(&date.day())
            || self.days_of_week.contains(&date.weekday())
    }
}

fn parse_weekday(value: &str) -> Option<Weekday> {
    let value = value.trim().trim_end_matches('s');
    let day = match value {
        "mon" | "monday" => Weekday::Mon,
        "tue" | "tues" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thur" | "thurs" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        "sun" | "sunday" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}
