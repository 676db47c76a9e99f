use time::{Date, OffsetDateTime, Time, UtcOffset};

use crate::config::CalendarSection;
use crate::domain::DateKey;
use crate::error::{ConfigError, DomainError};

/// Regular trading session of the exchange: a fixed open/close window on
/// weekdays, in the exchange's local offset.
///
/// Boundary rule: an instant exactly on a session edge belongs to the state
/// that starts there. At 09:00 the market is open; at 15:30 it is closed and
/// 15:30 itself is the latest closed instant.
#[derive(Debug, Clone, Copy)]
pub struct MarketCalendar {
    open: Time,
    close: Time,
    offset: UtcOffset,
}

impl MarketCalendar {
    pub fn from_config(section: &CalendarSection) -> Result<Self, ConfigError> {
        let offset = UtcOffset::from_hms(section.utc_offset_hours, 0, 0).map_err(|_| {
            ConfigError::Domain(DomainError::InvalidTimeOfDay {
                value: format!("utc offset {} hours", section.utc_offset_hours),
            })
        })?;
        Ok(Self {
            open: parse_hhmm(section.open.as_str())?,
            close: parse_hhmm(section.close.as_str())?,
            offset,
        })
    }

    /// The 09:00-15:30 UTC+9 session.
    #[must_use]
    pub fn kst() -> Self {
        Self::from_config(&CalendarSection::default())
            .expect("default calendar section is valid")
    }

    /// Current wall-clock time in the exchange's offset.
    #[must_use]
    pub fn now_local(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }

    #[must_use]
    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    /// Whether a regular session is in progress at `at`.
    #[must_use]
    pub fn is_open_at(&self, at: OffsetDateTime) -> bool {
        let at = at.to_offset(self.offset);
        is_weekday(at.date()) && at.time() >= self.open && at.time() < self.close
    }

    /// Composite key (`YYYYMMDDHHMM` at the close time) of the most recent
    /// fully closed session as of `at`.
    #[must_use]
    pub fn latest_closed(&self, at: OffsetDateTime) -> DateKey {
        let at = at.to_offset(self.offset);
        let mut date = at.date();

        let closed_today = is_weekday(date) && at.time() >= self.close;
        if !closed_today {
            date = previous_weekday(date);
        }

        DateKey::composite(date_int(date), hhmm_int(self.close))
    }
}

/// Parse an `HH:MM` local time of day.
pub fn parse_hhmm(value: &str) -> Result<Time, DomainError> {
    let invalid = || DomainError::InvalidTimeOfDay {
        value: value.to_owned(),
    };

    let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u8 = hours.parse().map_err(|_| invalid())?;
    let minutes: u8 = minutes.parse().map_err(|_| invalid())?;
    Time::from_hms(hours, minutes, 0).map_err(|_| invalid())
}

fn is_weekday(date: Date) -> bool {
    date.weekday().number_days_from_monday() < 5
}

fn previous_weekday(date: Date) -> Date {
    let mut date = date;
    loop {
        let Some(previous) = date.previous_day() else {
            return date;
        };
        date = previous;
        if is_weekday(date) {
            return date;
        }
    }
}

fn date_int(date: Date) -> i64 {
    i64::from(date.year()) * 10_000 + i64::from(u8::from(date.month())) * 100 + i64::from(date.day())
}

fn hhmm_int(time: Time) -> i64 {
    i64::from(time.hour()) * 100 + i64::from(time.minute())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    fn at(year: i32, month: u8, day: u8, hour: u8, minute: u8) -> OffsetDateTime {
        let date = Date::from_calendar_date(year, Month::try_from(month).expect("month"), day)
            .expect("date");
        date.with_time(Time::from_hms(hour, minute, 0).expect("time"))
            .assume_offset(UtcOffset::from_hms(9, 0, 0).expect("offset"))
    }

    #[test]
    fn open_boundary_belongs_to_the_starting_session() {
        let calendar = MarketCalendar::kst();
        // 2024-01-03 is a Wednesday.
        assert!(!calendar.is_open_at(at(2024, 1, 3, 8, 59)));
        assert!(calendar.is_open_at(at(2024, 1, 3, 9, 0)));
        assert!(calendar.is_open_at(at(2024, 1, 3, 15, 29)));
        assert!(!calendar.is_open_at(at(2024, 1, 3, 15, 30)));
    }

    #[test]
    fn weekends_are_closed() {
        let calendar = MarketCalendar::kst();
        // 2024-01-06 is a Saturday.
        assert!(!calendar.is_open_at(at(2024, 1, 6, 10, 0)));
    }

    #[test]
    fn latest_closed_session_after_close_is_today() {
        let calendar = MarketCalendar::kst();
        assert_eq!(
            calendar.latest_closed(at(2024, 1, 3, 15, 30)),
            DateKey::new(202401031530)
        );
        assert_eq!(
            calendar.latest_closed(at(2024, 1, 3, 18, 0)),
            DateKey::new(202401031530)
        );
    }

    #[test]
    fn latest_closed_session_during_trading_is_yesterday() {
        let calendar = MarketCalendar::kst();
        assert_eq!(
            calendar.latest_closed(at(2024, 1, 3, 10, 0)),
            DateKey::new(202401021530)
        );
    }

    #[test]
    fn latest_closed_session_skips_the_weekend() {
        let calendar = MarketCalendar::kst();
        // Monday pre-open resolves to the previous Friday.
        assert_eq!(
            calendar.latest_closed(at(2024, 1, 8, 8, 0)),
            DateKey::new(202401051530)
        );
        // Saturday resolves to Friday as well.
        assert_eq!(
            calendar.latest_closed(at(2024, 1, 6, 12, 0)),
            DateKey::new(202401051530)
        );
    }

    #[test]
    fn parses_time_of_day() {
        assert_eq!(
            parse_hhmm("18:01").expect("time"),
            Time::from_hms(18, 1, 0).expect("hms")
        );
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("1801").is_err());
    }
}
