//! Numeric summaries over a set of candles, with markdown rendering

use super::Candle;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// `(end - start) / start * 100`; 0 when `start` is 0
pub fn percent_change(start: f64, end: f64) -> f64 {
    if start == 0.0 {
        0.0
    } else {
        (end - start) / start * 100.0
    }
}

fn highest(candles: &[Candle]) -> f64 {
    candles.iter().map(|c| c.high).fold(f64::MIN, f64::max)
}

fn lowest(candles: &[Candle]) -> f64 {
    candles.iter().map(|c| c.low).fold(f64::MAX, f64::min)
}

fn total_volume(candles: &[Candle]) -> f64 {
    candles.iter().map(|c| c.volume).sum()
}

/// Coefficient of variation of close prices in percent (sample stddev / mean)
fn volatility_pct(candles: &[Candle]) -> f64 {
    let n = candles.len();
    if n < 2 {
        return 0.0;
    }
    let mean = candles.iter().map(|c| c.close).sum::<f64>() / n as f64;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = candles
        .iter()
        .map(|c| (c.close - mean).powi(2))
        .sum::<f64>()
        / (n - 1) as f64;
    variance.sqrt() / mean * 100.0
}

/// Price at a requested instant, taken from the nearest earlier candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentSummary {
    pub ticker: String,
    pub requested: NaiveDateTime,
    pub candle_time: DateTime<Utc>,
    pub gap_minutes: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl MomentSummary {
    pub fn new(ticker: &str, requested: NaiveDateTime, candle: &Candle) -> Self {
        let gap = requested.and_utc() - candle.open_time;
        Self {
            ticker: ticker.to_string(),
            requested,
            candle_time: candle.open_time,
            gap_minutes: gap.num_minutes().abs(),
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
        }
    }
}

/// One calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub change_pct: f64,
    pub candles_count: usize,
}

impl DaySummary {
    /// `None` for an empty candle set
    pub fn from_candles(ticker: &str, date: NaiveDate, candles: &[Candle]) -> Option<Self> {
        let (first, last) = (candles.first()?, candles.last()?);
        Some(Self {
            ticker: ticker.to_string(),
            date,
            open: first.open,
            close: last.close,
            high: highest(candles),
            low: lowest(candles),
            volume: total_volume(candles),
            change_pct: percent_change(first.open, last.close),
            candles_count: candles.len(),
        })
    }
}

/// A span of whole days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSummary {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Inclusive of both endpoints
    pub days_count: i64,
    pub start_price: f64,
    pub end_price: f64,
    pub high: f64,
    pub low: f64,
    pub high_change_pct: f64,
    pub low_change_pct: f64,
    pub change_pct: f64,
    pub volatility_pct: f64,
    pub avg_volume: f64,
    pub total_volume: f64,
    pub candles_count: usize,
}

impl RangeSummary {
    pub fn from_candles(
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        candles: &[Candle],
    ) -> Option<Self> {
        let (first, last) = (candles.first()?, candles.last()?);
        let (high, low) = (highest(candles), lowest(candles));
        let total = total_volume(candles);
        Some(Self {
            ticker: ticker.to_string(),
            start_date,
            end_date,
            days_count: (end_date - start_date).num_days() + 1,
            start_price: first.open,
            end_price: last.close,
            high,
            low,
            high_change_pct: percent_change(first.open, high),
            low_change_pct: percent_change(first.open, low),
            change_pct: percent_change(first.open, last.close),
            volatility_pct: volatility_pct(candles),
            avg_volume: total / candles.len() as f64,
            total_volume: total,
            candles_count: candles.len(),
        })
    }
}

/// Latest window, relative to the close of its first candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewSummary {
    pub ticker: String,
    pub current_price: f64,
    pub reference_price: f64,
    pub change_pct: f64,
    pub high: f64,
    pub low: f64,
    pub high_change_pct: f64,
    pub low_change_pct: f64,
    pub volume: f64,
    pub last_update: DateTime<Utc>,
    pub candles_count: usize,
}

impl OverviewSummary {
    pub fn from_candles(ticker: &str, candles: &[Candle]) -> Option<Self> {
        let (first, last) = (candles.first()?, candles.last()?);
        let (high, low) = (highest(candles), lowest(candles));
        Some(Self {
            ticker: ticker.to_string(),
            current_price: last.close,
            reference_price: first.close,
            change_pct: percent_change(first.close, last.close),
            high,
            low,
            high_change_pct: percent_change(first.close, high),
            low_change_pct: percent_change(first.close, low),
            volume: total_volume(candles),
            last_update: last.open_time,
            candles_count: candles.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketSummary {
    Moment(MomentSummary),
    Day(DaySummary),
    Range(RangeSummary),
    Overview(OverviewSummary),
}

impl MarketSummary {
    pub fn ticker(&self) -> &str {
        match self {
            Self::Moment(s) => &s.ticker,
            Self::Day(s) => &s.ticker,
            Self::Range(s) => &s.ticker,
            Self::Overview(s) => &s.ticker,
        }
    }

    pub fn headline(&self) -> String {
        match self {
            Self::Moment(s) => format!(
                "{} @ {}: {}",
                s.ticker,
                s.candle_time.format("%Y-%m-%d %H:%M"),
                money(s.close)
            ),
            Self::Day(s) => format!("{} {}: {:+.2}%", s.ticker, s.date, s.change_pct),
            Self::Range(s) => format!(
                "{} {}→{}: {:+.2}%",
                s.ticker, s.start_date, s.end_date, s.change_pct
            ),
            Self::Overview(s) => format!(
                "{}: {} ({:+.2}% 24h)",
                s.ticker,
                money(s.current_price),
                s.change_pct
            ),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::Moment(s) => render_moment(s),
            Self::Day(s) => render_day(s),
            Self::Range(s) => render_range(s),
            Self::Overview(s) => render_overview(s),
        }
    }
}

fn direction(change: f64, up: &str, down: &str) -> String {
    if change > 0.0 {
        up.to_string()
    } else {
        down.to_string()
    }
}

fn render_moment(s: &MomentSummary) -> String {
    let candle = if s.close >= s.open { "Nến Tăng" } else { "Nến Giảm" };
    format!(
        "### Giá Tại Thời Điểm Cụ Thể\n\n\
         **{}** - {}\n\n\
         **Nến gần nhất:** {} (cách {} phút từ thời điểm yêu cầu)\n\n\
         | Chỉ Số | Giá Trị |\n|--------|---------|\n\
         | Giá Mở | {} |\n| Giá Đóng | {} |\n| Cao Nhất | {} |\n| Thấp Nhất | {} |\n| Volume | {} |\n\n\
         {} - Biên độ: **{:.2}%**",
        s.ticker,
        s.requested.format("%Y-%m-%d %H:%M"),
        s.candle_time.format("%Y-%m-%d %H:%M"),
        s.gap_minutes,
        money(s.open),
        money(s.close),
        money(s.high),
        money(s.low),
        thousands(s.volume),
        candle,
        percent_change(s.low, s.high),
    )
}

fn render_day(s: &DaySummary) -> String {
    format!(
        "### Dữ Liệu Chính Xác\n\n\
         **{}** - Ngày {}\n\n\
         | Chỉ Số | Giá Trị |\n|--------|---------|\n\
         | Mở Cửa | {} |\n| Đóng Cửa | {} |\n| Cao Nhất | {} |\n| Thấp Nhất | {} |\n\
         | Biến Động | {:+.2}% |\n| Volume | {} |\n\n\
         {} **{:.2}%** so với giá mở cửa ({} nến).",
        s.ticker,
        s.date,
        money(s.open),
        money(s.close),
        money(s.high),
        money(s.low),
        s.change_pct,
        thousands(s.volume),
        direction(s.change_pct, "Tăng", "Giảm"),
        s.change_pct.abs(),
        s.candles_count,
    )
}

fn render_range(s: &RangeSummary) -> String {
    format!(
        "### Dữ Liệu Khoảng Thời Gian\n\n\
         **{}** - {} → {} ({} ngày)\n\n\
         | Chỉ Số | Giá Trị |\n|--------|---------|\n\
         | Giá Đầu Kỳ | {} |\n| Giá Cuối Kỳ | {} |\n\
         | Đỉnh | {} ({:+.2}%) |\n| Đáy | {} ({:+.2}%) |\n\
         | Biến Động | {:+.2}% |\n| Volatility | {:.2}% |\n\
         | Volume TB | {} |\n| Tổng Volume | {} |\n\n\
         {} **{:.2}%** trong kỳ. Biên độ dao động: **{:.2}%** ({} nến).",
        s.ticker,
        s.start_date,
        s.end_date,
        s.days_count,
        money(s.start_price),
        money(s.end_price),
        money(s.high),
        s.high_change_pct,
        money(s.low),
        s.low_change_pct,
        s.change_pct,
        s.volatility_pct,
        thousands(s.avg_volume),
        thousands(s.total_volume),
        direction(s.change_pct, "Tăng", "Giảm"),
        s.change_pct.abs(),
        percent_change(s.low, s.high),
        s.candles_count,
    )
}

fn render_overview(s: &OverviewSummary) -> String {
    format!(
        "### Thị Trường Hiện Tại\n\n\
         **{}** - Cập nhật: {}\n\n\
         | Chỉ Số | Giá Trị |\n|--------|---------|\n\
         | Giá Hiện Tại | {} |\n| Thay Đổi | {:+.2}% |\n\
         | Cao | {} ({:+.2}%) |\n| Thấp | {} ({:+.2}%) |\n| Volume | {} |\n\n\
         {} - Biên độ: **{:.2}%**",
        s.ticker,
        s.last_update.format("%H:%M %d/%m/%Y"),
        money(s.current_price),
        s.change_pct,
        money(s.high),
        s.high_change_pct,
        money(s.low),
        s.low_change_pct,
        thousands(s.volume),
        direction(s.change_pct, "Xu Hướng Tăng", "Xu Hướng Giảm"),
        percent_change(s.low, s.high),
    )
}

fn money(value: f64) -> String {
    format!("${}", thousands(value))
}

/// Two decimals with `,` thousands separators
fn thousands(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}
