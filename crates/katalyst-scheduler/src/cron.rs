//! Six-field cron expression parsing and evaluation (spec §4.7).

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Second,
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl Field {
    fn name(&self) -> &'static str {
        match self {
            Field::Second => "second",
            Field::Minute => "minute",
            Field::Hour => "hour",
            Field::DayOfMonth => "day-of-month",
            Field::Month => "month",
            Field::DayOfWeek => "day-of-week",
        }
    }

    fn range(&self) -> (u32, u32) {
        match self {
            Field::Second => (0, 59),
            Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            Field::DayOfWeek => (0, 6),
        }
    }
}

/// One named, specific cron validation problem (spec §4.7 "each produce a
/// specific named validation error").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 6 fields (second minute hour day-of-month month day-of-week), found {found}")]
    FieldCount { found: usize },

    #[error("{field} field: step value must not be zero")]
    StepZero { field: &'static str },

    #[error("{field} field: range {start}-{end} is reversed")]
    ReversedRange { field: &'static str, start: u32, end: u32 },

    #[error("{field} field: `{token}` is not numeric")]
    NonNumeric { field: &'static str, token: String },

    #[error("{field} field: list must not be empty")]
    EmptyList { field: &'static str },

    #[error("{field} field value {value} is out of range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("`?` is only allowed in day-of-month or day-of-week, found in {field}")]
    QuestionMarkNotAllowed { field: &'static str },

    #[error("exactly one of day-of-month/day-of-week may use `?`, or both must be `*`")]
    QuestionMarkExclusivity,
}

#[derive(Debug, Clone)]
struct FieldSpec {
    allowed: Vec<u32>,
    is_question: bool,
    is_wildcard: bool,
}

impl FieldSpec {
    fn matches(&self, value: u32) -> bool {
        self.allowed.contains(&value)
    }
}

fn parse_number(field: Field, token: &str, errors: &mut Vec<CronError>) -> Option<u32> {
    match token.parse::<u32>() {
        Ok(value) => {
            let (min, max) = field.range();
            if value < min || value > max {
                errors.push(CronError::OutOfRange {
                    field: field.name(),
                    value,
                    min,
                    max,
                });
                None
            } else {
                Some(value)
            }
        }
        Err(_) => {
            errors.push(CronError::NonNumeric {
                field: field.name(),
                token: token.to_string(),
            });
            None
        }
    }
}

fn parse_field(field: Field, raw: &str, errors: &mut Vec<CronError>) -> FieldSpec {
    let (min, max) = field.range();

    if raw == "?" {
        if !matches!(field, Field::DayOfMonth | Field::DayOfWeek) {
            errors.push(CronError::QuestionMarkNotAllowed { field: field.name() });
        }
        return FieldSpec {
            allowed: (min..=max).collect(),
            is_question: true,
            is_wildcard: false,
        };
    }

    let parts: Vec<&str> = raw.split(',').collect();
    if parts.is_empty() || parts.iter().any(|p| p.is_empty()) {
        errors.push(CronError::EmptyList { field: field.name() });
        return FieldSpec {
            allowed: Vec::new(),
            is_question: false,
            is_wildcard: false,
        };
    }

    let mut allowed = Vec::new();
    let mut saw_wildcard = false;

    for part in parts {
        let (base, step) = match part.split_once('/') {
            Some((base, step_str)) => {
                let step = match step_str.parse::<u32>() {
                    Ok(0) => {
                        errors.push(CronError::StepZero { field: field.name() });
                        1
                    }
                    Ok(step) => step,
                    Err(_) => {
                        errors.push(CronError::NonNumeric {
                            field: field.name(),
                            token: step_str.to_string(),
                        });
                        1
                    }
                };
                (base, step)
            }
            None => (part, 1),
        };

        let (range_start, range_end) = if base == "*" {
            saw_wildcard = true;
            (min, max)
        } else if let Some((start_str, end_str)) = base.split_once('-') {
            let start = parse_number(field, start_str, errors);
            let end = parse_number(field, end_str, errors);
            match (start, end) {
                (Some(s), Some(e)) => {
                    if s > e {
                        errors.push(CronError::ReversedRange {
                            field: field.name(),
                            start: s,
                            end: e,
                        });
                        continue;
                    }
                    (s, e)
                }
                _ => continue,
            }
        } else {
            match parse_number(field, base, errors) {
                Some(v) => (v, v),
                None => continue,
            }
        };

        let mut value = range_start;
        while value <= range_end {
            allowed.push(value);
            value += step;
        }
    }

    allowed.sort_unstable();
    allowed.dedup();

    FieldSpec {
        allowed,
        is_question: false,
        is_wildcard: saw_wildcard,
    }
}

/// A validated, evaluable six-field cron expression bound to a time zone.
pub struct CronSchedule {
    second: FieldSpec,
    minute: FieldSpec,
    hour: FieldSpec,
    day_of_month: FieldSpec,
    month: FieldSpec,
    day_of_week: FieldSpec,
    tz: chrono_tz::Tz,
}

/// Validates a cron expression without constructing a schedule, matching
/// the spec's standalone `CronValidator.validate` entry point (S4).
pub fn validate(expr: &str) -> Vec<CronError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 6 {
        return vec![CronError::FieldCount { found: fields.len() }];
    }

    let mut errors = Vec::new();
    let dom = parse_field(Field::DayOfMonth, fields[3], &mut errors);
    let dow = parse_field(Field::DayOfWeek, fields[5], &mut errors);
    parse_field(Field::Second, fields[0], &mut errors);
    parse_field(Field::Minute, fields[1], &mut errors);
    parse_field(Field::Hour, fields[2], &mut errors);
    parse_field(Field::Month, fields[4], &mut errors);

    let dom_free = dom.is_question || dom.is_wildcard;
    let dow_free = dow.is_question || dow.is_wildcard;
    if !dom_free && !dow_free {
        // Neither side is `?`/`*`: this is legal classic-cron (AND/OR day
        // matching decides at evaluation time), nothing to flag here.
    }
    if dom.is_question && dow.is_question {
        errors.push(CronError::QuestionMarkExclusivity);
    }

    errors
}

impl CronSchedule {
    pub fn parse(expr: &str, tz: chrono_tz::Tz) -> Result<Self, Vec<CronError>> {
        let errors = validate(expr);
        if !errors.is_empty() {
            return Err(errors);
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        let mut ignore = Vec::new();
        Ok(Self {
            second: parse_field(Field::Second, fields[0], &mut ignore),
            minute: parse_field(Field::Minute, fields[1], &mut ignore),
            hour: parse_field(Field::Hour, fields[2], &mut ignore),
            day_of_month: parse_field(Field::DayOfMonth, fields[3], &mut ignore),
            month: parse_field(Field::Month, fields[4], &mut ignore),
            day_of_week: parse_field(Field::DayOfWeek, fields[5], &mut ignore),
            tz,
        })
    }

    fn day_matches(&self, day_of_month: u32, weekday: u32) -> bool {
        let dom_restricted = !self.day_of_month.is_wildcard && !self.day_of_month.is_question;
        let dow_restricted = !self.day_of_week.is_wildcard && !self.day_of_week.is_question;

        match (dom_restricted, dow_restricted) {
            (false, false) => true,
            (true, false) => self.day_of_month.matches(day_of_month),
            (false, true) => self.day_of_week.matches(weekday),
            (true, true) => self.day_of_month.matches(day_of_month) || self.day_of_week.matches(weekday),
        }
    }

    /// Smallest instant strictly after `after` satisfying every field
    /// constraint (spec §8 testable property 6: `nextFire(t) > t`).
    pub fn next_fire(&self, after: DateTime<chrono_tz::Tz>) -> DateTime<chrono_tz::Tz> {
        let mut candidate = after + chrono::Duration::seconds(1);
        candidate = candidate.with_nanosecond(0).unwrap_or(candidate);

        // Bounded field-carry search: at most a handful of years of
        // one-field increments before giving up, since a well-formed
        // expression always has a solution within that horizon.
        for _ in 0..(4 * 366 * 24 * 60 * 60) {
            if !self.month.matches(candidate.month()) {
                candidate = next_month_boundary(candidate);
                continue;
            }
            if !self.day_matches(candidate.day(), candidate.weekday().num_days_from_sunday()) {
                candidate = next_day_boundary(candidate);
                continue;
            }
            if !self.hour.matches(candidate.hour()) {
                candidate = next_hour_boundary(candidate);
                continue;
            }
            if !self.minute.matches(candidate.minute()) {
                candidate = next_minute_boundary(candidate);
                continue;
            }
            if !self.second.matches(candidate.second()) {
                candidate += chrono::Duration::seconds(1);
                continue;
            }
            return candidate;
        }

        candidate
    }
}

fn next_minute_boundary(t: DateTime<chrono_tz::Tz>) -> DateTime<chrono_tz::Tz> {
    (t + chrono::Duration::minutes(1))
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

fn next_hour_boundary(t: DateTime<chrono_tz::Tz>) -> DateTime<chrono_tz::Tz> {
    (t + chrono::Duration::hours(1))
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .unwrap_or(t)
}

fn next_day_boundary(t: DateTime<chrono_tz::Tz>) -> DateTime<chrono_tz::Tz> {
    (t + chrono::Duration::days(1))
        .with_hour(0)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .unwrap_or(t)
}

fn next_month_boundary(t: DateTime<chrono_tz::Tz>) -> DateTime<chrono_tz::Tz> {
    let (year, month) = if t.month() == 12 { (t.year() + 1, 1) } else { (t.year(), t.month() + 1) };
    t.timezone()
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::UTC;

    /// S4: a 6th field of "60" is out of range and the error mentions "second".
    #[test]
    fn s4_invalid_expression_reports_second_field() {
        let errors = validate("60 * * * * *");
        assert!(!errors.is_empty());
        assert!(errors.iter().any(|e| e.to_string().contains("second")));
    }

    /// S4: a well-formed expression validates clean.
    #[test]
    fn s4_valid_expression_has_no_errors() {
        assert_eq!(validate("0 */15 9-17 * * 1-5"), Vec::new());
    }

    #[test]
    fn rejects_wrong_field_count() {
        let errors = validate("* * * *");
        assert_eq!(errors, vec![CronError::FieldCount { found: 4 }]);
    }

    #[test]
    fn rejects_step_zero() {
        let errors = validate("*/0 * * * * *");
        assert!(errors.iter().any(|e| matches!(e, CronError::StepZero { .. })));
    }

    #[test]
    fn rejects_reversed_range() {
        let errors = validate("0 0 17-9 * * *");
        assert!(errors.iter().any(|e| matches!(e, CronError::ReversedRange { .. })));
    }

    #[test]
    fn rejects_double_question_mark() {
        let errors = validate("0 0 0 ? * ?");
        assert!(errors.contains(&CronError::QuestionMarkExclusivity));
    }

    /// S8 (implicit via §8 property 6): next_fire is always strictly later
    /// and satisfies every field constraint.
    #[test]
    fn next_fire_every_minute_advances_by_a_minute() {
        let schedule = CronSchedule::parse("0 * * * * *", UTC).unwrap();
        let start = UTC.with_ymd_and_hms(2026, 1, 1, 10, 30, 15).unwrap();
        let next = schedule.next_fire(start);
        assert!(next > start);
        assert_eq!(next.minute(), 31);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn next_fire_respects_weekday_restriction() {
        // Every weekday (Mon-Fri) at 09:00.
        let schedule = CronSchedule::parse("0 0 9 * * 1-5", UTC).unwrap();
        // 2026-01-03 is a Saturday.
        let start = UTC.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();
        let next = schedule.next_fire(start);
        assert!(next > start);
        assert_eq!(next.hour(), 9);
        let weekday = next.weekday().num_days_from_sunday();
        assert!((1..=5).contains(&weekday));
    }
}
