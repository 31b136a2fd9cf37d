//! Time-expression rules, evaluated as an ordered chain
//!
//! Each rule is a pure function from the query to an optional match. The
//! resolver stops at the first rule that returns `Some`, so the order of
//! [`RULES`] is the precedence order.

use super::calendar;
use super::{QueryCategory, TimeReference};
use crate::error::{RagError, Result};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use regex::{Captures, Regex};

/// Everything a rule may look at
pub(crate) struct RuleContext<'a> {
    pub raw: &'a str,
    pub lower: &'a str,
    pub now: NaiveDateTime,
    pub category: QueryCategory,
    pub trend_default_days: u64,
}

impl RuleContext<'_> {
    fn today(&self) -> NaiveDate {
        self.now.date()
    }
}

/// A rule hit: the time reference plus whether it forces a numeric lookup
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RuleMatch {
    pub time_reference: TimeReference,
    pub requires_structured: bool,
}

impl RuleMatch {
    fn new(time_reference: TimeReference) -> Self {
        Self {
            time_reference,
            requires_structured: false,
        }
    }

    fn structured(time_reference: TimeReference) -> Self {
        Self {
            time_reference,
            requires_structured: true,
        }
    }
}

pub(crate) type Rule = fn(&TimePatterns, &RuleContext<'_>) -> Option<RuleMatch>;

/// Rules in precedence order. The trend default runs last so that any
/// explicit expression wins over it.
pub(crate) const RULES: &[(&str, Rule)] = &[
    ("absolute_date", absolute_date),
    ("relative_day", relative_day),
    ("days_ago", days_ago),
    ("hours_minutes_ago", hours_minutes_ago),
    ("future_relative", future_relative),
    ("day_and_time", day_and_time),
    ("trend_default", trend_default),
];

/// Named relative periods
#[derive(Debug, Clone, Copy)]
enum RelativePeriod {
    DayOffset(i64),
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisYear,
    LastYear,
}

/// Phrase table for relative periods. Longer phrases that contain a shorter
/// one ("day before yesterday" / "yesterday") must come first.
const RELATIVE_PHRASES: &[(&str, RelativePeriod)] = &[
    ("hôm nay", RelativePeriod::DayOffset(0)),
    ("today", RelativePeriod::DayOffset(0)),
    ("hôm qua", RelativePeriod::DayOffset(-1)),
    ("day before yesterday", RelativePeriod::DayOffset(-2)),
    ("yesterday", RelativePeriod::DayOffset(-1)),
    ("hôm kia", RelativePeriod::DayOffset(-2)),
    ("tuần này", RelativePeriod::ThisWeek),
    ("this week", RelativePeriod::ThisWeek),
    ("tuần trước", RelativePeriod::LastWeek),
    ("last week", RelativePeriod::LastWeek),
    ("tháng này", RelativePeriod::ThisMonth),
    ("this month", RelativePeriod::ThisMonth),
    ("tháng trước", RelativePeriod::LastMonth),
    ("last month", RelativePeriod::LastMonth),
    ("năm nay", RelativePeriod::ThisYear),
    ("this year", RelativePeriod::ThisYear),
    ("năm ngoái", RelativePeriod::LastYear),
    ("last year", RelativePeriod::LastYear),
];

/// Pre-compiled regexes for the numeric time expressions
pub(crate) struct TimePatterns {
    /// (regex, year group, month group, day group), in priority order
    absolute_dates: Vec<(Regex, usize, usize, usize)>,
    days_suffix: Regex,
    days_prefix: Regex,
    hours_ago: Regex,
    minutes_ago: Regex,
    day_and_time: Regex,
}

impl TimePatterns {
    pub(crate) fn compile() -> Result<Self> {
        Ok(Self {
            absolute_dates: vec![
                (compile("iso_date", r"(\d{4})-(\d{2})-(\d{2})")?, 1, 2, 3),
                (compile("dmy_slash_date", r"(\d{2})/(\d{2})/(\d{4})")?, 3, 2, 1),
                (compile("dmy_dash_date", r"(\d{2})-(\d{2})-(\d{4})")?, 3, 2, 1),
            ],
            days_suffix: compile(
                "days_suffix",
                r"(?:^|[^\d.])(\d+)\s*(?:ngày|days?)\s*(?:gần nhất|gần đây|qua|trước|ago|back)",
            )?,
            days_prefix: compile("days_prefix", r"(?:last|past)\s+(\d+)\s*days?\b")?,
            hours_ago: compile(
                "hours_ago",
                r"(?:^|[^\d.])(\d+)\s*(?:giờ|hours?|hrs?|h)\s*(?:trước|ago|qua)",
            )?,
            minutes_ago: compile(
                "minutes_ago",
                r"(?:^|[^\d.])(\d+)\s*(?:phút|minutes?|mins?|m)\s*(?:trước|ago|qua)",
            )?,
            day_and_time: compile(
                "day_and_time",
                concat!(
                    r"(?:(?:lúc|at)\s*)?(\d{1,2})[:h]\s*(\d{0,2}).*?(\d{1,2})[/-](\d{1,2})(?:[/-](\d{2,4}))?",
                    r"|(\d{1,2})[/-](\d{1,2})(?:[/-](\d{2,4}))?\s*(?:(?:lúc|at)\s*)?(\d{1,2})[:h]\s*(\d{0,2})",
                ),
            )?,
        })
    }
}

fn compile(name: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| RagError::Pattern {
        name: name.to_string(),
        source,
    })
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, group: usize) -> Option<T> {
    caps.get(group).and_then(|m| m.as_str().parse().ok())
}

fn range((start, end): (NaiveDate, NaiveDate)) -> TimeReference {
    TimeReference::Range { start, end }
}

/// ISO, then DD/MM/YYYY, then DD-MM-YYYY; the first candidate that is a real
/// calendar date wins.
fn absolute_date(patterns: &TimePatterns, ctx: &RuleContext<'_>) -> Option<RuleMatch> {
    patterns
        .absolute_dates
        .iter()
        .flat_map(|(regex, y, m, d)| {
            regex.captures_iter(ctx.raw).filter_map(move |caps| {
                NaiveDate::from_ymd_opt(number(&caps, *y)?, number(&caps, *m)?, number(&caps, *d)?)
            })
        })
        .next()
        .map(|date| RuleMatch::new(TimeReference::ExactDate(date)))
}

fn relative_day(_: &TimePatterns, ctx: &RuleContext<'_>) -> Option<RuleMatch> {
    let (_, period) = RELATIVE_PHRASES
        .iter()
        .find(|(phrase, _)| ctx.lower.contains(phrase))?;
    let today = ctx.today();

    let reference = match *period {
        RelativePeriod::DayOffset(offset) => {
            TimeReference::ExactDate(today.checked_add_signed(TimeDelta::try_days(offset)?)?)
        }
        RelativePeriod::ThisWeek => range(calendar::this_week(today)),
        RelativePeriod::LastWeek => range(calendar::last_week(today)),
        RelativePeriod::ThisMonth => range(calendar::this_month(today)),
        RelativePeriod::LastMonth => range(calendar::last_month(today)),
        RelativePeriod::ThisYear => range(calendar::this_year(today)),
        RelativePeriod::LastYear => range(calendar::last_year(today)),
    };
    Some(RuleMatch::new(reference))
}

/// "N ngày qua", "N days ago", "last N days"
fn days_ago(patterns: &TimePatterns, ctx: &RuleContext<'_>) -> Option<RuleMatch> {
    let caps = patterns
        .days_suffix
        .captures(ctx.lower)
        .or_else(|| patterns.days_prefix.captures(ctx.lower))?;
    let count: u64 = number(&caps, 1)?;
    let today = ctx.today();
    let start = today.checked_sub_days(Days::new(count))?;
    Some(RuleMatch::structured(TimeReference::Range { start, end: today }))
}

/// "N giờ trước", "N minutes ago"; hours are checked before minutes
fn hours_minutes_ago(patterns: &TimePatterns, ctx: &RuleContext<'_>) -> Option<RuleMatch> {
    let offset = if let Some(caps) = patterns.hours_ago.captures(ctx.lower) {
        TimeDelta::try_hours(number(&caps, 1)?)?
    } else {
        let caps = patterns.minutes_ago.captures(ctx.lower)?;
        TimeDelta::try_minutes(number(&caps, 1)?)?
    };
    let instant = ctx
        .now
        .checked_sub_signed(offset)?
        .with_second(0)?
        .with_nanosecond(0)?;
    Some(RuleMatch::structured(TimeReference::ExactInstant(instant)))
}

fn future_relative(_: &TimePatterns, ctx: &RuleContext<'_>) -> Option<RuleMatch> {
    let today = ctx.today();
    let has = |phrases: &[&str]| phrases.iter().any(|p| ctx.lower.contains(p));

    let reference = if has(&["ngày mai", "tomorrow"]) {
        TimeReference::ExactDate(today.checked_add_days(Days::new(1))?)
    } else if has(&["tuần sau", "next week"]) {
        range(calendar::next_week(today))
    } else if has(&["tháng sau", "next month"]) {
        range(calendar::next_month(today))
    } else {
        return None;
    };
    Some(RuleMatch::new(reference))
}

/// "lúc 10h30 ngày 15/1" or "15/01/24 at 10:30". Invalid day/month/hour
/// values fall through to the next rule.
fn day_and_time(patterns: &TimePatterns, ctx: &RuleContext<'_>) -> Option<RuleMatch> {
    let caps = patterns.day_and_time.captures(ctx.lower)?;

    // Groups 1-5: time first. Groups 6-10: date first.
    let (hour_g, minute_g, day_g, month_g, year_g) = if caps.get(1).is_some() {
        (1, 2, 3, 4, 5)
    } else {
        (9, 10, 6, 7, 8)
    };

    let hour: u32 = number(&caps, hour_g)?;
    let minute: u32 = match caps.get(minute_g).map(|m| m.as_str()) {
        None | Some("") => 0,
        Some(text) => text.parse().ok()?,
    };
    let day: u32 = number(&caps, day_g)?;
    let month: u32 = number(&caps, month_g)?;
    let mut year: i32 = match caps.get(year_g) {
        Some(m) => m.as_str().parse().ok()?,
        None => ctx.now.year(),
    };
    if year < 100 {
        year += 2000;
    }

    let instant = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
    Some(RuleMatch::structured(TimeReference::ExactInstant(instant)))
}

fn trend_default(_: &TimePatterns, ctx: &RuleContext<'_>) -> Option<RuleMatch> {
    if ctx.category != QueryCategory::TrendAnalysis {
        return None;
    }
    let today = ctx.today();
    let start = today.checked_sub_days(Days::new(ctx.trend_default_days))?;
    Some(RuleMatch::new(TimeReference::Range { start, end: today }))
}
