//! Shared fixtures for the integration tests: a temp-file store and a sync
//! engine wired to a replay provider with pacing disabled.

use std::sync::Arc;
use std::time::Duration;

use barcrawl_core::{
    BarRow, CallBudget, DelayPolicy, PaginatedFetcher, ReplayProvider, RetryPolicy, StockCode,
    Store, StoreConfig, SyncEngine,
};
use tempfile::TempDir;

pub fn open_store(temp: &TempDir) -> Store {
    Store::open(StoreConfig::at(temp.path().join("store.duckdb"))).expect("store open")
}

pub fn engine(store: &Store, provider: &Arc<ReplayProvider>) -> SyncEngine {
    let fetcher = PaginatedFetcher::new(
        provider.clone(),
        CallBudget::per_hour(1_000_000, Duration::ZERO),
        DelayPolicy::instant(),
    );
    SyncEngine::new(store.clone(), fetcher, RetryPolicy::no_retry())
}

pub fn code(raw: &str) -> StockCode {
    StockCode::parse(raw).expect("valid code")
}

pub fn daily_row(date: i64, close: f64) -> BarRow {
    BarRow {
        date,
        time: None,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1_000,
        value: 10_000,
        market_cap: Some(5_000),
    }
}

pub fn minute_row(date: i64, time: i64, close: f64) -> BarRow {
    BarRow {
        time: Some(time),
        market_cap: None,
        ..daily_row(date, close)
    }
}
