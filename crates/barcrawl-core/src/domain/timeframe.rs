use std::fmt::{Display, Formatter};
use std::str::FromStr;

use time::{Date, Duration, Month, Weekday};

use crate::error::DomainError;

use super::date_key::DateKey;

/// Supported chart timeframes.
///
/// Intraday carries its bucket width so a 3- or 5-minute collection reuses
/// the same machinery, though the scheduled run only pulls 1-minute bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Daily,
    Intraday { minutes: u32 },
    Weekly,
    Monthly,
}

impl Timeframe {
    pub const ONE_MINUTE: Self = Self::Intraday { minutes: 1 };

    /// Dataset identifier used for store tables, fixtures and logs.
    #[must_use]
    pub fn dataset(self) -> String {
        match self {
            Self::Daily => String::from("day"),
            Self::Intraday { minutes } => format!("{minutes}min"),
            Self::Weekly => String::from("week"),
            Self::Monthly => String::from("month"),
        }
    }

    /// Most rows a single fetch may accumulate. Sized to cover the deepest
    /// real series with headroom; one-minute history is by far the largest.
    #[must_use]
    pub const fn page_ceiling(self) -> usize {
        match self {
            Self::Daily => 10_000,
            Self::Intraday { minutes: 1 } => 200_000,
            Self::Intraday { .. } => 100_000,
            Self::Weekly => 2_000,
            Self::Monthly => 500,
        }
    }

    /// Catalog column holding this timeframe's completion flag.
    #[must_use]
    pub const fn completion_column(self) -> &'static str {
        match self {
            Self::Daily => "day_synced",
            Self::Intraday { .. } => "min_synced",
            Self::Weekly => "week_synced",
            Self::Monthly => "month_synced",
        }
    }

    #[must_use]
    pub const fn is_intraday(self) -> bool {
        matches!(self, Self::Intraday { .. })
    }

    /// Only daily chart rows carry the listed-share market-cap snapshot.
    #[must_use]
    pub const fn carries_market_cap(self) -> bool {
        matches!(self, Self::Daily)
    }

    /// Project the latest fully-closed session key into this timeframe's key
    /// space, yielding the completion watermark a finished sync records.
    ///
    /// * daily: the session date
    /// * intraday: the composite key unchanged
    /// * monthly: `YYYYMM00`
    /// * weekly: `YYYYMMW0`, week-of-month anchored on the month's first
    ///   Sunday (days before it count as week 1)
    #[must_use]
    pub fn closing_watermark(self, latest_closed: DateKey) -> i64 {
        let date = latest_closed.date_part();
        match self {
            Self::Daily => date,
            Self::Intraday { .. } => latest_closed.raw(),
            Self::Monthly => (date / 100) * 100,
            Self::Weekly => weekly_key(date),
        }
    }
}

fn weekly_key(date: i64) -> i64 {
    let Some(day) = parse_date(date) else {
        return date;
    };

    let first = day.replace_day(1).unwrap_or(day);
    let until_sunday = days_until(first.weekday(), Weekday::Sunday);
    let first_sunday = first + Duration::days(until_sunday);

    let week = if day < first_sunday {
        1
    } else {
        (day - first_sunday).whole_days() / 7 + 1
    };

    (date / 100) * 100 + week * 10
}

fn parse_date(date: i64) -> Option<Date> {
    let year = i32::try_from(date / 10_000).ok()?;
    let month = Month::try_from(u8::try_from((date / 100) % 100).ok()?).ok()?;
    let day = u8::try_from(date % 100).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

fn days_until(from: Weekday, to: Weekday) -> i64 {
    let from = i64::from(from.number_days_from_sunday());
    let to = i64::from(to.number_days_from_sunday());
    (to - from).rem_euclid(7)
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dataset().as_str())
    }
}

impl FromStr for Timeframe {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "day" => return Ok(Self::Daily),
            "week" => return Ok(Self::Weekly),
            "month" => return Ok(Self::Monthly),
            _ => {}
        }

        if let Some(minutes) = value.strip_suffix("min") {
            if let Ok(minutes) = minutes.parse::<u32>() {
                if minutes > 0 {
                    return Ok(Self::Intraday { minutes });
                }
            }
        }

        Err(DomainError::InvalidTimeframe { value })
    }
}
