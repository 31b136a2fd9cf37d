//! Calendar arithmetic for named relative periods

use chrono::{Datelike, Days, Months, NaiveDate};

/// Monday of the week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Monday up to and including `today`
pub fn this_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (week_start(today), today)
}

/// Monday through Sunday of the previous week
pub fn last_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = week_start(today) - Days::new(7);
    (start, start + Days::new(6))
}

/// Monday through Sunday of the following week
pub fn next_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = week_start(today) + Days::new(7);
    (start, start + Days::new(6))
}

pub fn this_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (month_start(today), today)
}

/// First through last day of the previous month
pub fn last_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let end = month_start(today) - Days::new(1);
    (month_start(end), end)
}

/// First through last day of the following month
pub fn next_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = month_start(today) + Months::new(1);
    let end = start + Months::new(1) - Days::new(1);
    (start, end)
}

pub fn this_year(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
    (start, today)
}

pub fn last_year(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let year = today.year() - 1;
    match (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year, 12, 31),
    ) {
        (Some(start), Some(end)) => (start, end),
        _ => (today, today),
    }
}
