use std::fmt::{Display, Formatter};

use barcrawl_store::{BarRecord, IssueRecord, Store, StoreError};
use time::{Date, Month};

use crate::domain::{DateKey, Timeframe};
use crate::error::SyncError;

/// Kinds of findings the series scans can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Consecutive daily keys skipping at least one weekday.
    DateGap,
    /// Consecutive intraday keys on the same day skipping a minute.
    TimeGap,
    /// OHLC rows violating `low <= open, close <= high`.
    PriceInconsistency,
    /// Negative volume.
    VolumeError,
    /// Negative market cap.
    MarketCapError,
    /// Intraday key without an HHMM component.
    MissingTimeField,
    /// The scan itself failed for a series.
    ValidationError,
    /// Non-finite merged diff rate.
    DiffRateTypeError,
}

impl IssueKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DateGap => "date_gap",
            Self::TimeGap => "time_gap",
            Self::PriceInconsistency => "price_inconsistency",
            Self::VolumeError => "volume_error",
            Self::MarketCapError => "market_cap_error",
            Self::MissingTimeField => "missing_time_field",
            Self::ValidationError => "validation_error",
            Self::DiffRateTypeError => "diff_rate_type_error",
        }
    }

    /// Errors are candidates for corrective deletion; warnings only inform.
    /// Continuity findings stay warnings because a hole can be a holiday or
    /// a halt, not lost data.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::DateGap | Self::TimeGap => Severity::Warning,
            Self::PriceInconsistency
            | Self::VolumeError
            | Self::MarketCapError
            | Self::MissingTimeField
            | Self::ValidationError
            | Self::DiffRateTypeError => Severity::Error,
        }
    }
}

impl Display for IssueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Tally of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub scanned: usize,
    pub warnings: usize,
    pub errors: usize,
    /// Set when the run resumed after a recorded checkpoint instead of
    /// starting from the first code.
    pub resumed_after: Option<String>,
}

/// Scans stored series for structural problems, recording findings and a
/// resumable progress checkpoint in the store.
pub struct ValidationEngine {
    store: Store,
    /// Codes between checkpoint writes.
    checkpoint_every: usize,
}

impl ValidationEngine {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            checkpoint_every: 50,
        }
    }

    #[must_use]
    pub fn with_checkpoint_every(mut self, checkpoint_every: usize) -> Self {
        self.checkpoint_every = checkpoint_every.max(1);
        self
    }

    /// Scan every series of one timeframe. An interrupted run resumes after
    /// the last checkpointed code; a completed run clears the checkpoint so
    /// the next run starts from scratch.
    pub fn validate(&self, timeframe: Timeframe) -> Result<ValidationReport, SyncError> {
        let dataset = timeframe.dataset();
        let mut report = ValidationReport::default();

        let resume_after = self.store.scan_checkpoint(dataset.as_str())?;
        let mut codes = self.store.list_codes(dataset.as_str())?;
        if let Some(last) = resume_after.as_deref() {
            codes.retain(|code| code.as_str() > last);
            report.resumed_after = resume_after.clone();
            tracing::info!(dataset, resume_after = last, "resuming validation scan");
        }

        for (index, code) in codes.iter().enumerate() {
            let issues = match self.scan_series(timeframe, dataset.as_str(), code.as_str()) {
                Ok(issues) => issues,
                Err(error) => vec![issue(
                    dataset.as_str(),
                    code.as_str(),
                    DateKey::NONE,
                    timeframe,
                    IssueKind::ValidationError,
                    format!("series scan failed: {error}"),
                )],
            };

            for recorded in &issues {
                match recorded.severity.as_str() {
                    "error" => report.errors += 1,
                    _ => report.warnings += 1,
                }
            }
            self.store.insert_issues(&issues)?;
            report.scanned += 1;

            if (index + 1) % self.checkpoint_every == 0 {
                self.store
                    .set_scan_checkpoint(dataset.as_str(), code.as_str())?;
            }
        }

        self.store.clear_scan_checkpoint(dataset.as_str())?;
        tracing::info!(
            dataset,
            scanned = report.scanned,
            warnings = report.warnings,
            errors = report.errors,
            "validation scan finished"
        );
        Ok(report)
    }

    fn scan_series(
        &self,
        timeframe: Timeframe,
        dataset: &str,
        code: &str,
    ) -> Result<Vec<IssueRecord>, StoreError> {
        let bars = self.store.bars_ascending(dataset, code)?;
        let mut issues = Vec::new();
        let mut previous: Option<DateKey> = None;

        for bar in &bars {
            let key = DateKey::new(bar.date);
            self.check_row(timeframe, dataset, code, key, bar, &mut issues);

            if let Some(previous) = previous {
                self.check_continuity(timeframe, dataset, code, previous, key, &mut issues);
            }
            previous = Some(key);
        }

        Ok(issues)
    }

    fn check_row(
        &self,
        timeframe: Timeframe,
        dataset: &str,
        code: &str,
        key: DateKey,
        bar: &BarRecord,
        issues: &mut Vec<IssueRecord>,
    ) {
        if timeframe.is_intraday() && !key.has_time_component() {
            issues.push(issue(
                dataset,
                code,
                key,
                timeframe,
                IssueKind::MissingTimeField,
                format!("intraday key {key} has no HHMM component"),
            ));
        }

        let ordered = bar.low <= bar.high
            && bar.low <= bar.open
            && bar.open <= bar.high
            && bar.low <= bar.close
            && bar.close <= bar.high;
        if !ordered {
            issues.push(issue(
                dataset,
                code,
                key,
                timeframe,
                IssueKind::PriceInconsistency,
                format!(
                    "open {} / close {} outside low {} .. high {}",
                    bar.open, bar.close, bar.low, bar.high
                ),
            ));
        }

        if bar.volume < 0 {
            issues.push(issue(
                dataset,
                code,
                key,
                timeframe,
                IssueKind::VolumeError,
                format!("negative volume {}", bar.volume),
            ));
        }

        if let Some(cap) = bar.market_cap {
            if cap < 0 {
                issues.push(issue(
                    dataset,
                    code,
                    key,
                    timeframe,
                    IssueKind::MarketCapError,
                    format!("negative market cap {cap}"),
                ));
            }
        }

        if let Some(rate) = bar.diff_rate {
            if !rate.is_finite() {
                issues.push(issue(
                    dataset,
                    code,
                    key,
                    timeframe,
                    IssueKind::DiffRateTypeError,
                    format!("diff rate is not finite: {rate}"),
                ));
            }
        }
    }

    fn check_continuity(
        &self,
        timeframe: Timeframe,
        dataset: &str,
        code: &str,
        previous: DateKey,
        current: DateKey,
        issues: &mut Vec<IssueRecord>,
    ) {
        if timeframe.is_intraday() {
            // Only check within one trading day; the overnight jump is not
            // a gap.
            if previous.date_part() != current.date_part() {
                return;
            }
            let minutes = current.minutes_of_day() - previous.minutes_of_day();
            if minutes > 1 {
                issues.push(issue(
                    dataset,
                    code,
                    current,
                    timeframe,
                    IssueKind::TimeGap,
                    format!("{} minute(s) missing before {current}", minutes - 1),
                ));
            }
            return;
        }

        if timeframe == Timeframe::Daily {
            // Weekends between sessions are normal; any skipped weekday is
            // reported. A holiday produces a warning too, which is why a
            // date gap never escalates past warning severity.
            if let Some(missing) = missing_weekdays_between(previous, current) {
                if missing > 0 {
                    issues.push(issue(
                        dataset,
                        code,
                        current,
                        timeframe,
                        IssueKind::DateGap,
                        format!("{missing} weekday(s) missing between {previous} and {current}"),
                    ));
                }
            }
        }
    }
}

fn issue(
    dataset: &str,
    code: &str,
    key: DateKey,
    timeframe: Timeframe,
    kind: IssueKind,
    description: String,
) -> IssueRecord {
    let (date, time) = if timeframe.is_intraday() && key.has_time_component() {
        (key.date_part(), Some(key.time_part()))
    } else {
        (key.raw(), None)
    };
    IssueRecord {
        dataset: dataset.to_owned(),
        collection: code.to_owned(),
        date,
        time,
        issue_type: kind.as_str().to_owned(),
        severity: kind.severity().as_str().to_owned(),
        description,
    }
}

/// Weekdays strictly between two `YYYYMMDD` keys. Zero means the keys are
/// consecutive trading positions (Friday to Monday included). `None` when
/// either key is not a real calendar date, in which case the pair is
/// skipped rather than guessed at.
fn missing_weekdays_between(previous: DateKey, current: DateKey) -> Option<i64> {
    let previous = to_calendar_date(previous)?;
    let current = to_calendar_date(current)?;

    let mut missing = 0;
    let mut day = previous.next_day()?;
    while day < current {
        if day.weekday().number_days_from_monday() < 5 {
            missing += 1;
        }
        day = day.next_day()?;
    }
    Some(missing)
}

fn to_calendar_date(key: DateKey) -> Option<Date> {
    let raw = key.date_part();
    let year = i32::try_from(raw / 10_000).ok()?;
    let month = Month::try_from(u8::try_from(raw / 100 % 100).ok()?).ok()?;
    let day = u8::try_from(raw % 100).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use barcrawl_store::StoreConfig;
    use tempfile::tempdir;

    fn bar(date: i64, open: f64, high: f64, low: f64, close: f64, volume: i64) -> BarRecord {
        BarRecord {
            date,
            open,
            high,
            low,
            close,
            volume,
            value: 1_000,
            market_cap: None,
            diff_rate: None,
        }
    }

    fn clean(date: i64) -> BarRecord {
        bar(date, 100.0, 101.0, 99.0, 100.5, 1_000)
    }

    fn open_store(temp: &tempfile::TempDir) -> Store {
        Store::open(StoreConfig::at(temp.path().join("store.duckdb"))).expect("store")
    }

    #[test]
    fn flags_price_and_volume_problems_as_errors() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);
        store
            .upsert_bars(
                "day",
                "A005930",
                &[
                    clean(20240102),
                    bar(20240103, 120.0, 101.0, 99.0, 100.0, 1_000), // open above high
                    bar(20240104, 100.0, 101.0, 99.0, 100.0, -5),    // negative volume
                ],
            )
            .expect("seed");

        let report = ValidationEngine::new(store.clone())
            .validate(Timeframe::Daily)
            .expect("validate");

        assert_eq!(report.scanned, 1);
        assert_eq!(report.errors, 2);
        let errors = store.issues_by_severity("error").expect("issues");
        let kinds: Vec<&str> = errors.iter().map(|i| i.issue_type.as_str()).collect();
        assert!(kinds.contains(&"price_inconsistency"));
        assert!(kinds.contains(&"volume_error"));
    }

    #[test]
    fn weekends_and_month_boundaries_are_not_gaps() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);
        store
            .upsert_bars(
                "day",
                "A005930",
                &[
                    clean(20240131), // Wednesday
                    clean(20240201), // Thursday, across the month boundary
                    clean(20240202), // Friday
                    clean(20240205), // Monday, across the weekend
                ],
            )
            .expect("seed");

        let report = ValidationEngine::new(store.clone())
            .validate(Timeframe::Daily)
            .expect("validate");

        assert_eq!(report.errors, 0);
        assert_eq!(report.warnings, 0);
    }

    #[test]
    fn skipped_trading_days_are_flagged() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);
        store
            .upsert_bars(
                "day",
                "A005930",
                &[
                    clean(20240102), // Tuesday
                    clean(20240104), // Thursday: Wednesday is missing
                    clean(20240105), // Friday: fine
                    clean(20240220), // weeks of history missing
                ],
            )
            .expect("seed");

        let report = ValidationEngine::new(store.clone())
            .validate(Timeframe::Daily)
            .expect("validate");

        assert_eq!(report.errors, 0);
        assert_eq!(report.warnings, 2);
        let warnings = store.issues_by_severity("warning").expect("issues");
        assert_eq!(warnings[0].issue_type, "date_gap");
        assert_eq!(warnings[0].date, 20240104);
        assert_eq!(warnings[1].date, 20240220);
    }

    #[test]
    fn minute_gaps_respect_hour_rollovers() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);
        store
            .upsert_bars(
                "1min",
                "A005930",
                &[
                    clean(202401020958),
                    clean(202401020959),
                    clean(202401021000), // hour rollover, continuous
                    clean(202401021003), // two minutes missing
                    clean(202401031030), // next day, not a gap
                ],
            )
            .expect("seed");

        let report = ValidationEngine::new(store.clone())
            .validate(Timeframe::ONE_MINUTE)
            .expect("validate");

        assert_eq!(report.warnings, 1);
        let warnings = store.issues_by_severity("warning").expect("issues");
        assert_eq!(warnings[0].issue_type, "time_gap");
        assert_eq!(warnings[0].date, 20240102);
        assert_eq!(warnings[0].time, Some(1003));
    }

    #[test]
    fn intraday_key_without_time_component_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);
        store
            .upsert_bars("1min", "A005930", &[clean(20240102)])
            .expect("seed");

        let report = ValidationEngine::new(store.clone())
            .validate(Timeframe::ONE_MINUTE)
            .expect("validate");

        assert_eq!(report.errors, 1);
        let errors = store.issues_by_severity("error").expect("issues");
        assert_eq!(errors[0].issue_type, "missing_time_field");
    }

    #[test]
    fn checkpoint_resumes_after_the_recorded_code() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);
        for code in ["A000010", "A000020", "A000030"] {
            store
                .upsert_bars("day", code, &[clean(20240102)])
                .expect("seed");
        }
        // Simulate an interrupted scan that got through the second code.
        store
            .set_scan_checkpoint("day", "A000020")
            .expect("checkpoint");

        let report = ValidationEngine::new(store.clone())
            .validate(Timeframe::Daily)
            .expect("validate");

        assert_eq!(report.scanned, 1);
        assert_eq!(report.resumed_after.as_deref(), Some("A000020"));
        // A finished run clears the checkpoint for the next full pass.
        assert_eq!(store.scan_checkpoint("day").expect("cleared"), None);
    }
}
