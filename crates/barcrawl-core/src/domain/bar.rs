use serde::{Deserialize, Serialize};

use super::date_key::DateKey;

/// One reconciled OHLCV bar, keyed by its [`DateKey`].
///
/// `market_cap` is only present on daily bars, and `diff_rate` only appears
/// after the out-of-hours merge pass has run for that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: DateKey,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_rate: Option<f64>,
}

/// One after-hours single-price tick: the session's out-of-hours change rate
/// for a trading day, merged into the daily bar without touching OHLCV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutOfHoursTick {
    pub date: DateKey,
    pub diff_rate: f64,
}
