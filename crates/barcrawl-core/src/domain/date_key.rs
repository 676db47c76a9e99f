use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Integer date key ordering a bar within its series.
///
/// Daily, weekly and monthly bars use a plain `YYYYMMDD` date. Intraday bars
/// use the composite `date * 10_000 + HHMM`, so `20240101` at `09:31` becomes
/// `202401010931`. Plain integer comparison is chronological in both shapes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct DateKey(i64);

impl DateKey {
    /// The absent watermark: every real key compares greater.
    pub const NONE: Self = Self(0);

    const COMPOSITE_FLOOR: i64 = 100_000_000_000;

    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Build the composite intraday key from a date and an HHMM time.
    #[must_use]
    pub const fn composite(date: i64, time: i64) -> Self {
        Self(date * 10_000 + time)
    }

    #[must_use]
    pub const fn raw(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True when this key carries an HHMM component.
    #[must_use]
    pub const fn has_time_component(self) -> bool {
        self.0 >= Self::COMPOSITE_FLOOR
    }

    /// The `YYYYMMDD` part, for plain and composite keys alike.
    #[must_use]
    pub const fn date_part(self) -> i64 {
        if self.has_time_component() {
            self.0 / 10_000
        } else {
            self.0
        }
    }

    /// The HHMM part of a composite key, 0 for plain keys.
    #[must_use]
    pub const fn time_part(self) -> i64 {
        if self.has_time_component() {
            self.0 % 10_000
        } else {
            0
        }
    }

    /// Minutes since midnight of the HHMM part. Gap checks use this so an
    /// hour rollover (09:59 to 10:00) is not mistaken for a missing minute.
    #[must_use]
    pub const fn minutes_of_day(self) -> i64 {
        let time = self.time_part();
        (time / 100) * 60 + time % 100
    }
}

impl Display for DateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DateKey {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}
