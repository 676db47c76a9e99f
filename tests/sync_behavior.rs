//! Behavior-driven tests for the incremental sync flow.
//!
//! These cover the end-to-end path from replayed terminal pages through
//! reconciliation into the store: full-history bootstraps, incremental
//! re-syncs across the boundary duplicate, the up-to-date short-circuit,
//! the out-of-hours merge, and intraday composite keys.

use std::sync::Arc;

use barcrawl_core::{DateKey, ReplayProvider, SyncOutcome, Timeframe};
use barcrawl_store::BarRecord;
use barcrawl_tests::{code, daily_row, engine, minute_row, open_store};
use tempfile::tempdir;

/// Ascending run of plausible daily keys, 28 days to the month.
fn daily_dates(count: usize) -> Vec<i64> {
    let mut dates = Vec::with_capacity(count);
    'outer: for year in 2021..2030 {
        for month in 1..=12 {
            for day in 1..=28 {
                dates.push(year * 10_000 + month * 100 + day);
                if dates.len() == count {
                    break 'outer;
                }
            }
        }
    }
    dates
}

#[tokio::test]
async fn empty_store_bootstraps_the_full_history_across_pages() {
    // Given: a series the terminal serves as two pages, newest first
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let provider = Arc::new(ReplayProvider::in_memory());

    let dates = daily_dates(800);
    let mut newest_first: Vec<_> = dates
        .iter()
        .map(|&date| daily_row(date, 100.0))
        .collect();
    newest_first.reverse();
    let older = newest_first.split_off(500);
    provider.stage_chart("A005930", "day", vec![newest_first, older]);

    // When: the instrument is synced into an empty store
    let engine = engine(&store, &provider);
    let outcome = engine
        .sync_instrument(&code("A005930"), Timeframe::Daily, *dates.last().expect("dates"))
        .await
        .expect("sync");

    // Then: every row lands, ascending, and the completion flag is stamped
    assert_eq!(outcome, SyncOutcome::Completed { rows: 800 });
    assert_eq!(store.count_bars("day", "A005930").expect("count"), 800);
    assert_eq!(
        store.latest_date("day", "A005930").expect("latest"),
        Some(*dates.last().expect("dates"))
    );
    assert_eq!(
        store.earliest_date("day", "A005930").expect("earliest"),
        Some(dates[0])
    );
    assert_eq!(
        store.completion("A005930", "day_synced").expect("flag"),
        Some(*dates.last().expect("dates"))
    );
}

#[tokio::test]
async fn resync_drops_the_boundary_duplicate_and_keeps_the_stored_row() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let provider = Arc::new(ReplayProvider::in_memory());
    let engine = engine(&store, &provider);
    let samsung = code("A005930");

    // Given: a series already synced through 2024-06-01
    provider.stage_chart(
        "A005930",
        "day",
        vec![vec![daily_row(20240601, 101.0), daily_row(20240531, 100.0)]],
    );
    engine
        .sync_instrument(&samsung, Timeframe::Daily, 20240601)
        .await
        .expect("first sync");

    // When: the next session re-serves the boundary day (with a revised
    // close) plus the nine days that followed
    let batch: Vec<_> = (20240601..=20240610)
        .rev()
        .map(|date| {
            if date == 20240601 {
                daily_row(date, 999.0)
            } else {
                daily_row(date, 102.0)
            }
        })
        .collect();
    provider.stage_chart("A005930", "day", vec![batch]);
    let outcome = engine
        .sync_instrument(&samsung, Timeframe::Daily, 20240610)
        .await
        .expect("second sync");

    // Then: exactly the nine new days are written; the stored boundary row
    // is untouched
    assert_eq!(outcome, SyncOutcome::Completed { rows: 9 });
    assert_eq!(store.count_bars("day", "A005930").expect("count"), 11);
    let boundary = store
        .bar_at("day", "A005930", 20240601)
        .expect("query")
        .expect("boundary row");
    assert_eq!(boundary.close, 101.0);
}

#[tokio::test]
async fn matching_completion_flag_skips_the_terminal_entirely() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let provider = Arc::new(ReplayProvider::in_memory());
    let engine = engine(&store, &provider);
    let samsung = code("A005930");

    provider.stage_chart(
        "A005930",
        "day",
        vec![vec![daily_row(20240102, 102.0), daily_row(20240101, 101.0)]],
    );
    engine
        .sync_instrument(&samsung, Timeframe::Daily, 20240102)
        .await
        .expect("first sync");
    let calls_after_first = provider.chart_calls();

    // When: the same session is synced again
    provider.rewind();
    let outcome = engine
        .sync_instrument(&samsung, Timeframe::Daily, 20240102)
        .await
        .expect("second sync");

    // Then: the run is a skip and costs zero terminal calls
    assert_eq!(outcome, SyncOutcome::UpToDate);
    assert_eq!(provider.chart_calls(), calls_after_first);
}

#[tokio::test]
async fn out_of_hours_merge_writes_only_the_diff_rate_column() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let provider = Arc::new(ReplayProvider::in_memory());
    let engine = engine(&store, &provider);
    let samsung = code("A005930");

    // Given: three stored daily bars and ticks for the last two days
    let stored: Vec<BarRecord> = [20240101, 20240102, 20240103]
        .iter()
        .map(|&date| BarRecord {
            date,
            open: 99.0,
            high: 101.0,
            low: 98.0,
            close: 100.0,
            volume: 1_000,
            value: 10_000,
            market_cap: Some(5_000),
            diff_rate: None,
        })
        .collect();
    store.upsert_bars("day", "A005930", &stored).expect("seed");
    provider.stage_ticks(
        "A005930",
        vec![vec![
            barcrawl_core::TickRow {
                date: 20240103,
                diff_rate: 0.57,
            },
            barcrawl_core::TickRow {
                date: 20240102,
                diff_rate: -0.31,
            },
        ]],
    );

    // When: the out-of-hours pass runs
    let outcome = engine.sync_out_of_hours(&samsung).await.expect("merge");

    // Then: diff rates land on their days and nothing else changes
    assert_eq!(outcome, SyncOutcome::Completed { rows: 2 });
    let merged = store
        .bar_at("day", "A005930", 20240103)
        .expect("query")
        .expect("row");
    assert_eq!(merged.diff_rate, Some(0.57));
    assert_eq!(merged.close, 100.0);
    assert_eq!(merged.volume, 1_000);
    let untouched = store
        .bar_at("day", "A005930", 20240101)
        .expect("query")
        .expect("row");
    assert_eq!(untouched.diff_rate, None);

    // And: a second pass is a skip with zero tick calls
    let calls = provider.tick_calls();
    let repeat = engine.sync_out_of_hours(&samsung).await.expect("repeat");
    assert_eq!(repeat, SyncOutcome::UpToDate);
    assert_eq!(provider.tick_calls(), calls);
}

#[tokio::test]
async fn intraday_series_store_composite_keys() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let provider = Arc::new(ReplayProvider::in_memory());
    let engine = engine(&store, &provider);
    let samsung = code("A005930");

    provider.stage_chart(
        "A005930",
        "1min",
        vec![vec![
            minute_row(20240102, 933, 100.3),
            minute_row(20240102, 932, 100.2),
            minute_row(20240102, 931, 100.1),
            minute_row(20240102, 930, 100.0),
        ]],
    );

    let session = DateKey::composite(20240102, 1530).raw();
    let outcome = engine
        .sync_instrument(&samsung, Timeframe::ONE_MINUTE, session)
        .await
        .expect("sync");

    assert_eq!(outcome, SyncOutcome::Completed { rows: 4 });
    let bars = store.bars_ascending("1min", "A005930").expect("bars");
    let keys: Vec<i64> = bars.iter().map(|bar| bar.date).collect();
    assert_eq!(
        keys,
        vec![202401020930, 202401020931, 202401020932, 202401020933]
    );
    assert_eq!(
        store.completion("A005930", "min_synced").expect("flag"),
        Some(session)
    );
}

#[tokio::test]
async fn market_cap_backfill_fills_rows_that_lack_it() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let provider = Arc::new(ReplayProvider::in_memory());
    let engine = engine(&store, &provider);
    let samsung = code("A005930");

    // Given: stored history that predates the market-cap column
    let stored: Vec<BarRecord> = [20240101, 20240102]
        .iter()
        .map(|&date| BarRecord {
            date,
            open: 99.0,
            high: 101.0,
            low: 98.0,
            close: 100.0,
            volume: 1_000,
            value: 10_000,
            market_cap: None,
            diff_rate: Some(0.1),
        })
        .collect();
    store.upsert_bars("day", "A005930", &stored).expect("seed");
    provider.stage_chart(
        "A005930",
        "day",
        vec![vec![daily_row(20240102, 100.0), daily_row(20240101, 100.0)]],
    );

    // When: the backfill runs
    let outcome = engine.backfill_market_cap(&samsung).await.expect("backfill");

    // Then: caps land and the merged diff rate survives
    assert_eq!(outcome, SyncOutcome::Completed { rows: 2 });
    let row = store
        .bar_at("day", "A005930", 20240101)
        .expect("query")
        .expect("row");
    assert_eq!(row.market_cap, Some(5_000));
    assert_eq!(row.diff_rate, Some(0.1));
}
