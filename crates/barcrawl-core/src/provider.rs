use serde::{Deserialize, Serialize};

use crate::domain::{Bar, DateKey, OutOfHoursTick, StockCode, Timeframe};
use crate::error::ProviderError;

/// Parameters of a chart paging sequence.
///
/// The terminal keeps the paging cursor on its side: issuing the same
/// request again yields the next, strictly older page. A fetch therefore
/// builds one request and hands it to [`ChartDataProvider::next_chart_page`]
/// repeatedly until a stop condition fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRequest {
    pub code: StockCode,
    pub timeframe: Timeframe,
    /// Upper bound on rows the whole sequence should yield.
    pub count: usize,
}

/// One raw chart row as the terminal returns it: newest first within a page,
/// the time field only present on intraday charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRow {
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<i64>,
}

impl BarRow {
    /// The row's key in the requested timeframe's key space.
    #[must_use]
    pub fn date_key(&self, timeframe: Timeframe) -> DateKey {
        if timeframe.is_intraday() {
            DateKey::composite(self.date, self.time.unwrap_or(0))
        } else {
            DateKey::new(self.date)
        }
    }

    #[must_use]
    pub fn into_bar(self, timeframe: Timeframe) -> Bar {
        let date = self.date_key(timeframe);
        Bar {
            date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            value: self.value,
            market_cap: if timeframe.carries_market_cap() {
                self.market_cap
            } else {
                None
            },
            diff_rate: None,
        }
    }
}

/// One page of chart rows plus the terminal's continuation flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartPage {
    pub rows: Vec<BarRow>,
    pub has_more: bool,
}

/// Parameters of an out-of-hours tick paging sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickRequest {
    pub code: StockCode,
    pub count: usize,
}

/// One raw out-of-hours tick row, newest first within a page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickRow {
    pub date: i64,
    pub diff_rate: f64,
}

impl TickRow {
    #[must_use]
    pub fn into_tick(self) -> OutOfHoursTick {
        OutOfHoursTick {
            date: DateKey::new(self.date),
            diff_rate: self.diff_rate,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickPage {
    pub rows: Vec<TickRow>,
    pub has_more: bool,
}

/// One instrument as the terminal's universe enumeration reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseRow {
    pub code: String,
    pub name: String,
    pub market_kind: i64,
    pub status: i64,
}

/// Session-stateful chart terminal.
///
/// Implementations are blocking; the async layers above call them from
/// spawned tasks and own all pacing and retry concerns.
pub trait ChartDataProvider: Send + Sync {
    /// Verify the terminal session is alive. Called before every page
    /// request because the session can die mid-run.
    fn ensure_connected(&self) -> Result<(), ProviderError>;

    /// Fetch the next page of the paging sequence identified by `request`.
    /// Page rows are newest first; an exhausted sequence yields an empty
    /// page with `has_more == false`.
    fn next_chart_page(&self, request: &ChartRequest) -> Result<ChartPage, ProviderError>;

    /// Fetch the next page of out-of-hours ticks for `request`.
    fn next_tick_page(&self, request: &TickRequest) -> Result<TickPage, ProviderError>;

    /// Enumerate every listed instrument the terminal knows.
    fn universe(&self) -> Result<Vec<UniverseRow>, ProviderError>;
}
