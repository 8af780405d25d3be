//! Week arithmetic and the clock the store reads "now" from.
//!
//! Weeks start on Monday. Week 1 is the week containing January 1, so it may
//! begin on a Monday in late December of the previous year; a year can have up
//! to 54 weeks under this numbering.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};

use crate::models::YearWeek;

/// Timestamp format used for `created_at` / `updated_at`, identical to SQLite's CURRENT_TIMESTAMP
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of the current time
pub trait Clock: Send {
    /// Current UTC time, written into row timestamps
    fn now_utc(&self) -> NaiveDateTime;
    /// Current local calendar date, used for week computation
    fn today(&self) -> NaiveDate;

    fn timestamp(&self) -> String {
        self.now_utc().format(TIMESTAMP_FORMAT).to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock frozen at one instant; `today` is the date part of that instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    pub fn at(date: NaiveDate) -> Self {
        Self(NaiveDateTime::new(date, NaiveTime::default()))
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> NaiveDateTime {
        self.0
    }

    fn today(&self) -> NaiveDate {
        self.0.date()
    }
}

/// Days between the Monday that starts week 1 and January 1 (0 when Jan 1 is a Monday)
fn week_one_offset(year: i32) -> i64 {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .map(|jan1| jan1.weekday().num_days_from_monday() as i64)
        .unwrap_or(0)
}

/// Week bucket containing `today`
pub fn compute_current_week(today: NaiveDate) -> YearWeek {
    let year = today.year();
    let elapsed = today.ordinal0() as i64;
    let week = (elapsed + week_one_offset(year) + 1 + 6) / 7;
    YearWeek::new(year, week as u32)
}

/// Week new tasks are filed under by default: from Friday on, plan against next week
pub fn compute_default_week(today: NaiveDate) -> YearWeek {
    let current = compute_current_week(today);
    match today.weekday() {
        Weekday::Fri | Weekday::Sat | Weekday::Sun => next_week(current),
        _ => current,
    }
}

/// Year-naive increment. Only used to pick UI defaults; it never wraps into the next year.
pub fn next_week(week: YearWeek) -> YearWeek {
    YearWeek::new(week.year, week.week + 1)
}

/// Year-naive decrement, stopping at week 1
pub fn previous_week(week: YearWeek) -> YearWeek {
    YearWeek::new(week.year, week.week.saturating_sub(1).max(1))
}

/// Monday that begins `week` under the same numbering as `compute_current_week`
pub fn week_start(week: YearWeek) -> Option<NaiveDate> {
    let jan1 = NaiveDate::from_ymd_opt(week.year, 1, 1)?;
    let days = 7 * (week.week as i64 - 1) - week_one_offset(week.year);
    jan1.checked_add_signed(Duration::days(days))
}

/// Monday of the week containing `today`; the lower bound of the "added this week" window
pub fn monday_of(today: NaiveDate) -> NaiveDate {
    today - Duration::days(today.weekday().num_days_from_monday() as i64)
}

/// The `count` most recent weeks, current week first, never going below week 1
pub fn report_week_options(today: NaiveDate, count: usize) -> Vec<YearWeek> {
    let current = compute_current_week(today);
    (0..count as u32)
        .take_while(|i| *i < current.week)
        .map(|i| YearWeek::new(current.year, current.week - i))
        .collect()
}
