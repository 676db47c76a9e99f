use std::collections::BTreeMap;

use barcrawl_store::{BarRecord, Store, StoreError};
use uuid::Uuid;

use crate::domain::{Bar, DateKey, StockCode, Timeframe};
use crate::error::SyncError;
use crate::fetcher::{FetchOutcome, PaginatedFetcher, TickOutcome};
use crate::retry::{retry, RetryPolicy};

/// Result of one per-instrument sync task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Rows were fetched and upserted.
    Completed { rows: usize },
    /// The completion flag already matches the session watermark; the
    /// terminal was not called at all.
    UpToDate,
    /// The terminal has no data for this series.
    NoData,
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_skip(self) -> bool {
        matches!(self, Self::UpToDate | Self::NoData)
    }
}

/// Incremental fetch-and-reconcile engine for one store.
///
/// Each per-instrument pass is idempotent: watermarks come from what is
/// already stored, writes are keyed upserts, and a completion flag keyed to
/// the latest closed session short-circuits repeat runs.
pub struct SyncEngine {
    store: Store,
    fetcher: PaginatedFetcher,
    store_retry: RetryPolicy,
    run_id: String,
}

impl SyncEngine {
    #[must_use]
    pub fn new(store: Store, fetcher: PaginatedFetcher, store_retry: RetryPolicy) -> Self {
        Self {
            store,
            fetcher,
            store_retry,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        self.run_id.as_str()
    }

    /// Bring one series up to the latest closed session.
    ///
    /// `closing_watermark` is the session key projected into this
    /// timeframe's key space (see `Timeframe::closing_watermark`); it is
    /// recorded as the completion flag once the upsert lands, and a matching
    /// flag on entry skips the instrument without any terminal call.
    pub async fn sync_instrument(
        &self,
        code: &StockCode,
        timeframe: Timeframe,
        closing_watermark: i64,
    ) -> Result<SyncOutcome, SyncError> {
        let dataset = timeframe.dataset();
        let column = timeframe.completion_column();

        if let Some(done) = self.store.completion(code.as_str(), column)? {
            if done == closing_watermark {
                tracing::debug!(code = %code, %timeframe, "already synced for this session");
                return Ok(SyncOutcome::UpToDate);
            }
        }

        let watermark = self
            .store
            .latest_date(dataset.as_str(), code.as_str())?
            .map_or(DateKey::NONE, DateKey::new);

        match self.fetcher.fetch_bars(code, timeframe, watermark).await? {
            FetchOutcome::NoData => {
                self.log(code, dataset.as_str(), "no_data", 0).await?;
                Ok(SyncOutcome::NoData)
            }
            FetchOutcome::Bars(raw) => {
                let rows = reconcile(raw, watermark);
                let records: Vec<BarRecord> = rows.iter().map(to_record).collect();

                let written = self
                    .with_store_retry(|| {
                        self.store
                            .upsert_bars(dataset.as_str(), code.as_str(), &records)
                    })
                    .await?;
                self.with_store_retry(|| {
                    self.store
                        .set_completion(code.as_str(), column, closing_watermark)
                })
                .await?;
                self.log(code, dataset.as_str(), "ok", written as i64).await?;

                tracing::info!(code = %code, %timeframe, rows = written, "series synced");
                Ok(SyncOutcome::Completed { rows: written })
            }
        }
    }

    /// Merge after-hours single-price ticks into the daily series. Only the
    /// `diff_rate` column is written; OHLCV stays untouched.
    pub async fn sync_out_of_hours(&self, code: &StockCode) -> Result<SyncOutcome, SyncError> {
        let Some(latest_bar) = self.store.latest_date("day", code.as_str())? else {
            return Ok(SyncOutcome::NoData);
        };

        let merged_until = self.store.latest_date_with_diff_rate(code.as_str())?;
        if merged_until.is_some_and(|merged| merged >= latest_bar) {
            return Ok(SyncOutcome::UpToDate);
        }

        // With nothing merged yet, ticks older than the stored history
        // have no row to land on; bound the fetch at the earliest bar.
        let cutoff = match merged_until {
            Some(merged) => DateKey::new(merged),
            None => self
                .store
                .earliest_date("day", code.as_str())?
                .map_or(DateKey::NONE, DateKey::new),
        };
        match self.fetcher.fetch_ticks(code, cutoff).await? {
            TickOutcome::NoData => {
                self.log(code, "ticks", "no_data", 0).await?;
                Ok(SyncOutcome::NoData)
            }
            TickOutcome::Ticks(raw) => {
                let mut deduped: BTreeMap<DateKey, f64> = BTreeMap::new();
                for tick in raw.into_iter().rev() {
                    if tick.date > cutoff {
                        deduped.insert(tick.date, tick.diff_rate);
                    }
                }
                let pairs: Vec<(i64, f64)> = deduped
                    .into_iter()
                    .map(|(date, diff_rate)| (date.raw(), diff_rate))
                    .collect();

                let merged = self
                    .with_store_retry(|| self.store.merge_diff_rate(code.as_str(), &pairs))
                    .await?;
                self.log(code, "ticks", "ok", merged as i64).await?;

                tracing::info!(code = %code, rows = merged, "out-of-hours ticks merged");
                Ok(SyncOutcome::Completed { rows: merged })
            }
        }
    }

    /// Backfill the market-cap column of daily bars that predate its
    /// introduction, walking back from the newest day that already has it.
    pub async fn backfill_market_cap(&self, code: &StockCode) -> Result<SyncOutcome, SyncError> {
        let covered = self
            .store
            .latest_date_with_market_cap(code.as_str())?
            .map_or(DateKey::NONE, DateKey::new);

        match self.fetcher.fetch_bars(code, Timeframe::Daily, covered).await? {
            FetchOutcome::NoData => Ok(SyncOutcome::NoData),
            FetchOutcome::Bars(raw) => {
                let rows = reconcile(raw, covered);
                let pairs: Vec<(i64, i64)> = rows
                    .iter()
                    .filter_map(|bar| bar.market_cap.map(|cap| (bar.date.raw(), cap)))
                    .collect();

                let merged = self
                    .with_store_retry(|| self.store.merge_market_cap(code.as_str(), &pairs))
                    .await?;
                self.log(code, "market_cap", "ok", merged as i64).await?;
                Ok(SyncOutcome::Completed { rows: merged })
            }
        }
    }

    async fn log(
        &self,
        code: &StockCode,
        dataset: &str,
        status: &str,
        rows: i64,
    ) -> Result<(), SyncError> {
        self.with_store_retry(|| {
            self.store
                .log_sync(self.run_id.as_str(), code.as_str(), dataset, status, rows)
        })
        .await?;
        Ok(())
    }

    async fn with_store_retry<T>(
        &self,
        mut operation: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        retry(
            self.store_retry,
            || {
                let result = operation();
                async move { result }
            },
            |_| true,
        )
        .await
    }
}

/// Turn a raw newest-first fetch into the ascending batch to upsert.
///
/// With a live watermark: keep rows at or above it, drop the final (oldest)
/// row as the boundary duplicate already stored, then flip to chronological
/// order. Duplicated keys within the batch resolve last-row-wins, matching
/// the terminal's own revision order.
fn reconcile(raw: Vec<Bar>, watermark: DateKey) -> Vec<Bar> {
    let mut rows = raw;
    if !watermark.is_none() {
        rows.retain(|bar| bar.date >= watermark);
        rows.pop();
    }
    rows.reverse();

    let mut deduped: BTreeMap<DateKey, Bar> = BTreeMap::new();
    for bar in rows {
        deduped.insert(bar.date, bar);
    }
    deduped.into_values().collect()
}

fn to_record(bar: &Bar) -> BarRecord {
    BarRecord {
        date: bar.date.raw(),
        open: bar.open,
        high: bar.high,
        low: bar.low,
        close: bar.close,
        volume: bar.volume,
        value: bar.value,
        market_cap: bar.market_cap,
        diff_rate: bar.diff_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: i64, close: f64) -> Bar {
        Bar {
            date: DateKey::new(date),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10,
            value: 1_000,
            market_cap: None,
            diff_rate: None,
        }
    }

    #[test]
    fn full_history_is_just_reversed_and_deduped() {
        let raw = vec![bar(20240103, 3.0), bar(20240102, 2.0), bar(20240101, 1.0)];
        let rows = reconcile(raw, DateKey::NONE);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, DateKey::new(20240101));
        assert_eq!(rows[2].date, DateKey::new(20240103));
    }

    #[test]
    fn watermark_drops_older_rows_and_the_boundary_duplicate() {
        let raw = vec![
            bar(20240105, 5.0),
            bar(20240104, 4.0),
            bar(20240103, 3.0), // boundary duplicate
            bar(20240102, 2.0), // already stored
        ];
        let rows = reconcile(raw, DateKey::new(20240103));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, DateKey::new(20240104));
        assert_eq!(rows[1].date, DateKey::new(20240105));
    }

    #[test]
    fn duplicate_keys_resolve_last_row_wins() {
        // Ascending order after the reverse puts the revised row later.
        let raw = vec![bar(20240102, 2.5), bar(20240102, 2.0), bar(20240101, 1.0)];
        let rows = reconcile(raw, DateKey::NONE);
        assert_eq!(rows.len(), 2);
        // Reversed order is [2.0-row, 2.5-row]... the later one wins.
        assert_eq!(rows[1].date, DateKey::new(20240102));
        assert_eq!(rows[1].close, 2.5);
    }

    #[test]
    fn zero_watermark_never_pops_a_row() {
        let raw = vec![bar(20240101, 1.0)];
        let rows = reconcile(raw, DateKey::NONE);
        assert_eq!(rows.len(), 1);
    }
}
