//! Recurrence-to-cron mapping and fire-time queries.
//!
//! A job's recurrence is stored as a six-field cron expression
//! (`sec min hour dom month dow`) anchored at its start date: the start
//! date supplies the time of day plus whichever calendar fields the
//! recurrence keeps fixed. All math is in UTC.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use cron::Schedule;
use tracing::warn;

use crate::types::ScheduleType;

/// Next and previous fire times for a scheduled job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunBounds {
    pub next_run: Option<DateTime<Utc>>,
    pub previous_run: Option<DateTime<Utc>>,
}

/// The window a trigger is live in: `[start, end]`, queried at `now`.
#[derive(Debug, Clone, Copy)]
pub struct RunWindow {
    pub now: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

/// Derive the cron expression for a recurrence anchored at `start`.
///
/// `once` jobs have no recurrence and yield `None`; they fire from their
/// start timer alone. A monthly job anchored on the 31st only fires in
/// months that have one, which is ordinary cron behavior.
pub fn recurrence_expression(kind: ScheduleType, start: DateTime<Utc>) -> Option<String> {
    let (sec, min, hour) = (start.second(), start.minute(), start.hour());
    let expr = match kind {
        ScheduleType::Once => return None,
        ScheduleType::Daily => format!("{} {} {} * * *", sec, min, hour),
        ScheduleType::Weekly => {
            format!("{} {} {} * * {}", sec, min, hour, weekday_name(start.weekday()))
        }
        ScheduleType::Monthly => format!("{} {} {} {} * *", sec, min, hour, start.day()),
        ScheduleType::Yearly => {
            format!("{} {} {} {} {} *", sec, min, hour, start.day(), start.month())
        }
    };
    Some(expr)
}

// Names sidestep the 0-vs-1 day-of-week numbering mismatch between cron
// dialects; both the trigger engine and the `cron` crate accept them.
fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// Compute the next and previous fire times for `expression` inside `window`.
///
/// The next run is the first match at or after `max(now, start)` and no
/// later than the end date. The previous run is the last match before `now`
/// that fell inside the window. Unparseable expressions and inverted
/// windows yield empty bounds; read paths treat both as "no runs" rather
/// than an error.
pub fn run_bounds(expression: &str, window: RunWindow) -> RunBounds {
    let schedule = match Schedule::from_str(expression) {
        Ok(schedule) => schedule,
        Err(e) => {
            warn!(expression = expression, error = %e, "unparseable cron expression");
            return RunBounds::default();
        }
    };

    if let Some(end) = window.end {
        if end < window.start {
            warn!(start = %window.start, end = %end, "inverted run window");
            return RunBounds::default();
        }
    }

    // The expression is anchored at the start date, so the start instant
    // itself is a match; scan from just before each lower bound to keep it
    // inclusive.
    let lower = window.now.max(window.start) - Duration::seconds(1);
    let next_run = schedule
        .after(&lower)
        .next()
        .filter(|t| window.end.map_or(true, |end| *t <= end));

    let upper = match window.end {
        Some(end) => window.now.min(end),
        None => window.now,
    };
    let scan_from = window.start - Duration::seconds(1);
    let previous_run = if upper < window.start {
        None
    } else {
        schedule
            .after(&scan_from)
            .take_while(|t| *t <= upper && *t < window.now)
            .last()
    };

    RunBounds {
        next_run,
        previous_run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn once_has_no_expression() {
        assert_eq!(
            recurrence_expression(ScheduleType::Once, at(2025, 3, 10, 14, 30, 5)),
            None
        );
    }

    #[test]
    fn expressions_anchor_on_the_start_date() {
        // 2025-03-10 is a Monday.
        let start = at(2025, 3, 10, 14, 30, 5);

        assert_eq!(
            recurrence_expression(ScheduleType::Daily, start).unwrap(),
            "5 30 14 * * *"
        );
        assert_eq!(
            recurrence_expression(ScheduleType::Weekly, start).unwrap(),
            "5 30 14 * * Mon"
        );
        assert_eq!(
            recurrence_expression(ScheduleType::Monthly, start).unwrap(),
            "5 30 14 10 * *"
        );
        assert_eq!(
            recurrence_expression(ScheduleType::Yearly, start).unwrap(),
            "5 30 14 10 3 *"
        );
    }

    #[test]
    fn generated_expressions_parse() {
        let start = at(2025, 12, 31, 23, 59, 59);
        for kind in [
            ScheduleType::Daily,
            ScheduleType::Weekly,
            ScheduleType::Monthly,
            ScheduleType::Yearly,
        ] {
            let expr = recurrence_expression(kind, start).unwrap();
            assert!(Schedule::from_str(&expr).is_ok(), "bad expression: {}", expr);
        }
    }

    #[test]
    fn bounds_inside_an_open_window() {
        let bounds = run_bounds(
            "0 0 9 * * *",
            RunWindow {
                now: at(2025, 3, 12, 8, 0, 0),
                start: at(2025, 3, 10, 9, 0, 0),
                end: None,
            },
        );

        assert_eq!(bounds.next_run, Some(at(2025, 3, 12, 9, 0, 0)));
        assert_eq!(bounds.previous_run, Some(at(2025, 3, 11, 9, 0, 0)));
    }

    #[test]
    fn next_run_is_the_start_when_queried_early() {
        let bounds = run_bounds(
            "0 0 9 * * *",
            RunWindow {
                now: at(2025, 3, 9, 12, 0, 0),
                start: at(2025, 3, 10, 9, 0, 0),
                end: None,
            },
        );

        assert_eq!(bounds.next_run, Some(at(2025, 3, 10, 9, 0, 0)));
        assert_eq!(bounds.previous_run, None);
    }

    #[test]
    fn end_date_caps_the_next_run() {
        let bounds = run_bounds(
            "0 0 9 * * *",
            RunWindow {
                now: at(2025, 3, 12, 8, 0, 0),
                start: at(2025, 3, 10, 9, 0, 0),
                end: Some(at(2025, 3, 12, 8, 30, 0)),
            },
        );

        assert_eq!(bounds.next_run, None);
        assert_eq!(bounds.previous_run, Some(at(2025, 3, 11, 9, 0, 0)));
    }

    #[test]
    fn inverted_window_yields_empty_bounds() {
        let bounds = run_bounds(
            "0 0 9 * * *",
            RunWindow {
                now: at(2025, 3, 12, 8, 0, 0),
                start: at(2025, 3, 10, 9, 0, 0),
                end: Some(at(2025, 3, 9, 0, 0, 0)),
            },
        );

        assert_eq!(bounds, RunBounds::default());
    }

    #[test]
    fn garbage_expression_yields_empty_bounds() {
        let bounds = run_bounds(
            "not a cron line",
            RunWindow {
                now: at(2025, 3, 12, 8, 0, 0),
                start: at(2025, 3, 10, 9, 0, 0),
                end: None,
            },
        );

        assert_eq!(bounds, RunBounds::default());
    }
}
