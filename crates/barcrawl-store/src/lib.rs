pub mod migrations;
pub mod pool;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::Connection;
use serde::Serialize;
use thiserror::Error;

pub use pool::{ConnectionManager, PooledConnection};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unsupported bars dataset '{0}'")]
    UnsupportedDataset(String),

    #[error("unknown completion column '{0}'")]
    UnknownCompletionColumn(String),
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let home = resolve_home();
        let db_path = home.join("barcrawl.duckdb");
        Self {
            home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let home = db_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// One OHLCV row keyed by its integer date. Daily rows may carry the
/// market-cap snapshot and the merged out-of-hours diff rate; other
/// timeframes never do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarRecord {
    pub date: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub value: i64,
    pub market_cap: Option<i64>,
    pub diff_rate: Option<f64>,
}

/// Catalog row for one listed instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord {
    pub stock_code: String,
    pub stock_name: String,
    pub market_kind: i64,
    pub stock_status: i64,
    pub date: i64,
}

/// One validation finding against a stored series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueRecord {
    pub dataset: String,
    pub collection: String,
    pub date: i64,
    pub time: Option<i64>,
    pub issue_type: String,
    pub severity: String,
    pub description: String,
}

#[derive(Clone)]
pub struct Store {
    manager: ConnectionManager,
}

impl Store {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(StoreConfig::default())
    }

    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = ConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let store = Self { manager };
        store.initialize()?;
        Ok(store)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Upsert a batch of bars for one series, keyed on (code, date).
    ///
    /// Replaying a batch is a no-op for unchanged rows. OHLCV fields are
    /// overwritten; `market_cap` and `diff_rate` are only overwritten when
    /// the incoming row carries them, so the merge passes survive a re-sync.
    pub fn upsert_bars(
        &self,
        dataset: &str,
        code: &str,
        rows: &[BarRecord],
    ) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let table = bars_table(dataset)?;
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, StoreError> {
            if table == "bars_day" {
                let mut statement = connection.prepare(
                    "INSERT INTO bars_day \
                     (code, date, open, high, low, close, volume, value, market_cap, diff_rate) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT (code, date) DO UPDATE SET \
                         open = excluded.open, \
                         high = excluded.high, \
                         low = excluded.low, \
                         close = excluded.close, \
                         volume = excluded.volume, \
                         value = excluded.value, \
                         market_cap = COALESCE(excluded.market_cap, bars_day.market_cap), \
                         diff_rate = COALESCE(excluded.diff_rate, bars_day.diff_rate), \
                         updated_at = now()",
                )?;
                for row in rows {
                    statement.execute(::duckdb::params![
                        code,
                        row.date,
                        row.open,
                        row.high,
                        row.low,
                        row.close,
                        row.volume,
                        row.value,
                        row.market_cap,
                        row.diff_rate,
                    ])?;
                }
            } else {
                let sql = format!(
                    "INSERT INTO {table} \
                     (code, date, open, high, low, close, volume, value) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT (code, date) DO UPDATE SET \
                         open = excluded.open, \
                         high = excluded.high, \
                         low = excluded.low, \
                         close = excluded.close, \
                         volume = excluded.volume, \
                         value = excluded.value, \
                         updated_at = now()"
                );
                let mut statement = connection.prepare(sql.as_str())?;
                for row in rows {
                    statement.execute(::duckdb::params![
                        code, row.date, row.open, row.high, row.low, row.close, row.volume,
                        row.value,
                    ])?;
                }
            }

            Ok(rows.len())
        })();

        finalize_transaction(&connection, result)
    }

    /// Merge out-of-hours diff rates into existing daily rows. Rows with no
    /// matching daily bar are left alone.
    pub fn merge_diff_rate(&self, code: &str, rows: &[(i64, f64)]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, StoreError> {
            let mut merged = 0;
            let mut statement = connection.prepare(
                "UPDATE bars_day SET diff_rate = ?, updated_at = CURRENT_TIMESTAMP \
                 WHERE code = ? AND date = ?",
            )?;
            for (date, diff_rate) in rows {
                merged += statement.execute(::duckdb::params![diff_rate, code, date])?;
            }
            Ok(merged)
        })();

        finalize_transaction(&connection, result)
    }

    /// Merge market-cap snapshots into existing daily rows.
    pub fn merge_market_cap(&self, code: &str, rows: &[(i64, i64)]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, StoreError> {
            let mut merged = 0;
            let mut statement = connection.prepare(
                "UPDATE bars_day SET market_cap = ?, updated_at = CURRENT_TIMESTAMP \
                 WHERE code = ? AND date = ?",
            )?;
            for (date, market_cap) in rows {
                merged += statement.execute(::duckdb::params![market_cap, code, date])?;
            }
            Ok(merged)
        })();

        finalize_transaction(&connection, result)
    }

    /// Newest stored date key for a series, if any rows exist.
    pub fn latest_date(&self, dataset: &str, code: &str) -> Result<Option<i64>, StoreError> {
        let table = bars_table(dataset)?;
        let connection = self.manager.acquire()?;
        let sql = format!("SELECT MAX(date) FROM {table} WHERE code = ?");
        let latest: Option<i64> =
            connection.query_row(sql.as_str(), ::duckdb::params![code], |row| row.get(0))?;
        Ok(latest)
    }

    /// Oldest stored date key for a series.
    pub fn earliest_date(&self, dataset: &str, code: &str) -> Result<Option<i64>, StoreError> {
        let table = bars_table(dataset)?;
        let connection = self.manager.acquire()?;
        let sql = format!("SELECT MIN(date) FROM {table} WHERE code = ?");
        let earliest: Option<i64> =
            connection.query_row(sql.as_str(), ::duckdb::params![code], |row| row.get(0))?;
        Ok(earliest)
    }

    /// Newest daily date that already has an out-of-hours diff rate merged.
    pub fn latest_date_with_diff_rate(&self, code: &str) -> Result<Option<i64>, StoreError> {
        let connection = self.manager.acquire()?;
        let latest: Option<i64> = connection.query_row(
            "SELECT MAX(date) FROM bars_day WHERE code = ? AND diff_rate IS NOT NULL",
            ::duckdb::params![code],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    /// Newest daily date that already has a market-cap snapshot.
    pub fn latest_date_with_market_cap(&self, code: &str) -> Result<Option<i64>, StoreError> {
        let connection = self.manager.acquire()?;
        let latest: Option<i64> = connection.query_row(
            "SELECT MAX(date) FROM bars_day WHERE code = ? AND market_cap IS NOT NULL",
            ::duckdb::params![code],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    /// Distinct codes present in a bars dataset, sorted.
    pub fn list_codes(&self, dataset: &str) -> Result<Vec<String>, StoreError> {
        let table = bars_table(dataset)?;
        let connection = self.manager.acquire()?;
        let sql = format!("SELECT DISTINCT code FROM {table} ORDER BY code");
        let mut statement = connection.prepare(sql.as_str())?;
        let codes = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(codes)
    }

    /// Full series in ascending date order.
    pub fn bars_ascending(&self, dataset: &str, code: &str) -> Result<Vec<BarRecord>, StoreError> {
        let table = bars_table(dataset)?;
        let connection = self.manager.acquire()?;
        let sql = format!("{} WHERE code = ? ORDER BY date ASC", bars_select(table));
        let mut statement = connection.prepare(sql.as_str())?;
        let rows = statement
            .query_map(::duckdb::params![code], read_bar_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The most recent `limit` rows of a series, returned in ascending order.
    pub fn bars_recent(
        &self,
        dataset: &str,
        code: &str,
        limit: usize,
    ) -> Result<Vec<BarRecord>, StoreError> {
        let table = bars_table(dataset)?;
        let connection = self.manager.acquire()?;
        let sql = format!(
            "{} WHERE code = ? ORDER BY date DESC LIMIT {limit}",
            bars_select(table)
        );
        let mut statement = connection.prepare(sql.as_str())?;
        let mut rows = statement
            .query_map(::duckdb::params![code], read_bar_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// A single stored bar, if present.
    pub fn bar_at(
        &self,
        dataset: &str,
        code: &str,
        date: i64,
    ) -> Result<Option<BarRecord>, StoreError> {
        let table = bars_table(dataset)?;
        let connection = self.manager.acquire()?;
        let sql = format!("{} WHERE code = ? AND date = ?", bars_select(table));
        let mut statement = connection.prepare(sql.as_str())?;
        let mut rows = statement.query_map(::duckdb::params![code, date], read_bar_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Row count of a series.
    pub fn count_bars(&self, dataset: &str, code: &str) -> Result<i64, StoreError> {
        let table = bars_table(dataset)?;
        let connection = self.manager.acquire()?;
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE code = ?");
        let count: i64 =
            connection.query_row(sql.as_str(), ::duckdb::params![code], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete one bar by exact key.
    pub fn delete_bar(&self, dataset: &str, code: &str, date: i64) -> Result<usize, StoreError> {
        let table = bars_table(dataset)?;
        let connection = self.manager.acquire()?;
        let sql = format!("DELETE FROM {table} WHERE code = ? AND date = ?");
        let deleted = connection.execute(sql.as_str(), ::duckdb::params![code, date])?;
        Ok(deleted)
    }

    /// Delete every bar with `low_inclusive <= date < high_exclusive`.
    pub fn delete_bars_between(
        &self,
        dataset: &str,
        code: &str,
        low_inclusive: i64,
        high_exclusive: i64,
    ) -> Result<usize, StoreError> {
        let table = bars_table(dataset)?;
        let connection = self.manager.acquire()?;
        let sql = format!("DELETE FROM {table} WHERE code = ? AND date >= ? AND date < ?");
        let deleted = connection.execute(
            sql.as_str(),
            ::duckdb::params![code, low_inclusive, high_exclusive],
        )?;
        Ok(deleted)
    }

    /// Upsert a catalog row. The per-timeframe completion columns are never
    /// touched here, so a catalog refresh cannot reset sync progress.
    pub fn upsert_instrument(&self, record: &CatalogRecord) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        connection.execute(
            "INSERT INTO catalog (stock_code, stock_name, market_kind, stock_status, date) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (stock_code) DO UPDATE SET \
                 stock_name = excluded.stock_name, \
                 market_kind = excluded.market_kind, \
                 stock_status = excluded.stock_status, \
                 date = excluded.date, \
                 updated_at = now()",
            ::duckdb::params![
                record.stock_code,
                record.stock_name,
                record.market_kind,
                record.stock_status,
                record.date,
            ],
        )?;
        Ok(())
    }

    /// The catalog refresh date recorded for a code, if the code is known.
    pub fn catalog_date(&self, code: &str) -> Result<Option<i64>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement =
            connection.prepare("SELECT date FROM catalog WHERE stock_code = ?")?;
        let mut rows = statement.query_map(::duckdb::params![code], |row| row.get::<_, i64>(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Every catalog row, sorted by code.
    pub fn instruments(&self) -> Result<Vec<CatalogRecord>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT stock_code, stock_name, market_kind, stock_status, date \
             FROM catalog ORDER BY stock_code",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok(CatalogRecord {
                    stock_code: row.get(0)?,
                    stock_name: row.get(1)?,
                    market_kind: row.get(2)?,
                    stock_status: row.get(3)?,
                    date: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Read a per-timeframe completion flag.
    pub fn completion(&self, code: &str, column: &str) -> Result<Option<i64>, StoreError> {
        let column = completion_column(column)?;
        let connection = self.manager.acquire()?;
        let sql = format!("SELECT {column} FROM catalog WHERE stock_code = ?");
        let mut statement = connection.prepare(sql.as_str())?;
        let mut rows =
            statement.query_map(::duckdb::params![code], |row| row.get::<_, Option<i64>>(0))?;
        match rows.next() {
            Some(row) => Ok(row?),
            None => Ok(None),
        }
    }

    /// Record that a series is complete up to the given closing watermark.
    /// Creates a placeholder catalog row when the code is not cataloged yet.
    pub fn set_completion(
        &self,
        code: &str,
        column: &str,
        watermark: i64,
    ) -> Result<(), StoreError> {
        let column = completion_column(column)?;
        let connection = self.manager.acquire()?;
        let sql = format!(
            "UPDATE catalog SET {column} = ?, updated_at = CURRENT_TIMESTAMP WHERE stock_code = ?"
        );
        let updated = connection.execute(sql.as_str(), ::duckdb::params![watermark, code])?;
        if updated == 0 {
            let insert = format!(
                "INSERT INTO catalog (stock_code, stock_name, market_kind, stock_status, date, {column}) \
                 VALUES ('{code}', '', 0, 0, 0, {watermark})",
                column = column,
                code = escape_sql_string(code),
                watermark = watermark,
            );
            connection.execute_batch(insert.as_str())?;
        }
        Ok(())
    }

    pub fn insert_issues(&self, issues: &[IssueRecord]) -> Result<(), StoreError> {
        if issues.is_empty() {
            return Ok(());
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), StoreError> {
            let mut statement = connection.prepare(
                "INSERT INTO validation_issues \
                 (dataset, collection, date, time, issue_type, severity, description) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            for issue in issues {
                statement.execute(::duckdb::params![
                    issue.dataset,
                    issue.collection,
                    issue.date,
                    issue.time,
                    issue.issue_type,
                    issue.severity,
                    issue.description,
                ])?;
            }
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    /// Issues filtered by severity, oldest first.
    pub fn issues_by_severity(&self, severity: &str) -> Result<Vec<IssueRecord>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT dataset, collection, date, time, issue_type, severity, description \
             FROM validation_issues WHERE severity = ? \
             ORDER BY dataset, collection, date",
        )?;
        let rows = statement
            .query_map(::duckdb::params![severity], read_issue_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// (issue_type, severity, count) tallies across all recorded issues.
    pub fn issue_counts(&self) -> Result<Vec<(String, String, i64)>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT issue_type, severity, COUNT(*) FROM validation_issues \
             GROUP BY issue_type, severity ORDER BY issue_type, severity",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Drop every issue recorded against one flagged key.
    pub fn delete_issues(
        &self,
        dataset: &str,
        collection: &str,
        date: i64,
    ) -> Result<usize, StoreError> {
        let connection = self.manager.acquire()?;
        let deleted = connection.execute(
            "DELETE FROM validation_issues WHERE dataset = ? AND collection = ? AND date = ?",
            ::duckdb::params![dataset, collection, date],
        )?;
        Ok(deleted)
    }

    /// The code after which an interrupted validation scan should resume.
    pub fn scan_checkpoint(&self, dataset: &str) -> Result<Option<String>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement =
            connection.prepare("SELECT last_code FROM validation_progress WHERE dataset = ?")?;
        let mut rows =
            statement.query_map(::duckdb::params![dataset], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn set_scan_checkpoint(&self, dataset: &str, last_code: &str) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        connection.execute(
            "INSERT INTO validation_progress (dataset, last_code) VALUES (?, ?) \
             ON CONFLICT (dataset) DO UPDATE SET \
                 last_code = excluded.last_code, \
                 updated_at = now()",
            ::duckdb::params![dataset, last_code],
        )?;
        Ok(())
    }

    pub fn clear_scan_checkpoint(&self, dataset: &str) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        connection.execute(
            "DELETE FROM validation_progress WHERE dataset = ?",
            ::duckdb::params![dataset],
        )?;
        Ok(())
    }

    pub fn log_sync(
        &self,
        run_id: &str,
        code: &str,
        dataset: &str,
        status: &str,
        rows: i64,
    ) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        connection.execute(
            "INSERT INTO sync_log (run_id, code, dataset, status, rows) VALUES (?, ?, ?, ?, ?)",
            ::duckdb::params![run_id, code, dataset, status, rows],
        )?;
        Ok(())
    }
}

fn bars_table(dataset: &str) -> Result<&'static str, StoreError> {
    match dataset {
        "day" => Ok("bars_day"),
        "1min" => Ok("bars_1min"),
        "week" => Ok("bars_week"),
        "month" => Ok("bars_month"),
        other => Err(StoreError::UnsupportedDataset(other.to_owned())),
    }
}

fn completion_column(column: &str) -> Result<&'static str, StoreError> {
    match column {
        "day_synced" => Ok("day_synced"),
        "min_synced" => Ok("min_synced"),
        "week_synced" => Ok("week_synced"),
        "month_synced" => Ok("month_synced"),
        other => Err(StoreError::UnknownCompletionColumn(other.to_owned())),
    }
}

fn bars_select(table: &str) -> String {
    if table == "bars_day" {
        String::from(
            "SELECT date, open, high, low, close, volume, value, market_cap, diff_rate \
             FROM bars_day",
        )
    } else {
        format!(
            "SELECT date, open, high, low, close, volume, value, NULL, NULL FROM {table}"
        )
    }
}

fn read_bar_row(row: &::duckdb::Row<'_>) -> Result<BarRecord, ::duckdb::Error> {
    Ok(BarRecord {
        date: row.get(0)?,
        open: row.get(1)?,
        high: row.get(2)?,
        low: row.get(3)?,
        close: row.get(4)?,
        volume: row.get(5)?,
        value: row.get(6)?,
        market_cap: row.get(7)?,
        diff_rate: row.get(8)?,
    })
}

fn read_issue_row(row: &::duckdb::Row<'_>) -> Result<IssueRecord, ::duckdb::Error> {
    Ok(IssueRecord {
        dataset: row.get(0)?,
        collection: row.get(1)?,
        date: row.get(2)?,
        time: row.get(3)?,
        issue_type: row.get(4)?,
        severity: row.get(5)?,
        description: row.get(6)?,
    })
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

fn resolve_home() -> PathBuf {
    if let Some(path) = env::var_os("BARCRAWL_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".barcrawl");
    }

    PathBuf::from(".barcrawl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn bar(date: i64, close: f64) -> BarRecord {
        BarRecord {
            date,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1_000,
            value: 1_000_000,
            market_cap: None,
            diff_rate: None,
        }
    }

    fn open_store(temp: &tempfile::TempDir) -> Store {
        Store::open(StoreConfig::at(temp.path().join("store.duckdb"))).expect("store open")
    }

    #[test]
    fn upsert_is_idempotent_per_key() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);

        let rows = vec![bar(20240102, 100.0), bar(20240103, 101.0)];
        store.upsert_bars("day", "A005930", &rows).expect("first");
        store.upsert_bars("day", "A005930", &rows).expect("second");

        assert_eq!(store.count_bars("day", "A005930").expect("count"), 2);
        assert_eq!(
            store.latest_date("day", "A005930").expect("latest"),
            Some(20240103)
        );
        assert_eq!(
            store.earliest_date("day", "A005930").expect("earliest"),
            Some(20240102)
        );
    }

    #[test]
    fn resync_preserves_merged_diff_rate() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);

        store
            .upsert_bars("day", "A005930", &[bar(20240102, 100.0)])
            .expect("seed");
        let merged = store
            .merge_diff_rate("A005930", &[(20240102, 1.25)])
            .expect("merge");
        assert_eq!(merged, 1);

        // A later bar re-sync carries no diff_rate; the merged value stays.
        store
            .upsert_bars("day", "A005930", &[bar(20240102, 100.5)])
            .expect("resync");
        let row = store
            .bar_at("day", "A005930", 20240102)
            .expect("read")
            .expect("present");
        assert_eq!(row.close, 100.5);
        assert_eq!(row.diff_rate, Some(1.25));
    }

    #[test]
    fn upsert_writes_optional_daily_columns_when_present() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);

        let mut row = bar(20240102, 100.0);
        row.market_cap = Some(7_000);
        row.diff_rate = Some(0.42);
        store.upsert_bars("day", "A005930", &[row]).expect("seed");

        let stored = store
            .bar_at("day", "A005930", 20240102)
            .expect("read")
            .expect("present");
        assert_eq!(stored.market_cap, Some(7_000));
        assert_eq!(stored.diff_rate, Some(0.42));
    }

    #[test]
    fn catalog_names_with_quotes_survive_the_upsert() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);

        let record = CatalogRecord {
            stock_code: String::from("A004990"),
            stock_name: String::from("Lotte Corp's Holding"),
            market_kind: 1,
            stock_status: 0,
            date: 20240102,
        };
        store.upsert_instrument(&record).expect("insert");
        store.upsert_instrument(&record).expect("conflict update");

        let instruments = store.instruments().expect("instruments");
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].stock_name, "Lotte Corp's Holding");
    }

    #[test]
    fn diff_rate_merge_skips_missing_days() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);

        store
            .upsert_bars("day", "A005930", &[bar(20240102, 100.0)])
            .expect("seed");
        let merged = store
            .merge_diff_rate("A005930", &[(20240102, 0.5), (20240103, 0.7)])
            .expect("merge");
        assert_eq!(merged, 1);
        assert_eq!(
            store
                .latest_date_with_diff_rate("A005930")
                .expect("latest with diff"),
            Some(20240102)
        );
    }

    #[test]
    fn rejects_unknown_dataset() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);

        let error = store
            .upsert_bars("hour", "A005930", &[bar(20240102, 100.0)])
            .expect_err("must reject");
        assert!(matches!(error, StoreError::UnsupportedDataset(_)));
    }

    #[test]
    fn catalog_refresh_keeps_completion_flags() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);

        store
            .upsert_instrument(&CatalogRecord {
                stock_code: String::from("A005930"),
                stock_name: String::from("Samsung Electronics"),
                market_kind: 1,
                stock_status: 0,
                date: 20240102,
            })
            .expect("upsert");
        store
            .set_completion("A005930", "day_synced", 20240102)
            .expect("flag");

        // Next-day refresh must not reset day_synced.
        store
            .upsert_instrument(&CatalogRecord {
                stock_code: String::from("A005930"),
                stock_name: String::from("Samsung Electronics"),
                market_kind: 1,
                stock_status: 0,
                date: 20240103,
            })
            .expect("refresh");

        assert_eq!(
            store.completion("A005930", "day_synced").expect("read"),
            Some(20240102)
        );
        assert_eq!(
            store.catalog_date("A005930").expect("date"),
            Some(20240103)
        );
    }

    #[test]
    fn completion_flag_for_uncataloged_code_creates_placeholder() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);

        store
            .set_completion("A000001", "min_synced", 202401021530)
            .expect("flag");
        assert_eq!(
            store.completion("A000001", "min_synced").expect("read"),
            Some(202401021530)
        );
    }

    #[test]
    fn issue_lifecycle_roundtrip() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);

        store
            .insert_issues(&[IssueRecord {
                dataset: String::from("day"),
                collection: String::from("A005930"),
                date: 20240102,
                time: None,
                issue_type: String::from("price_inconsistency"),
                severity: String::from("error"),
                description: String::from("high 90 below open 100"),
            }])
            .expect("insert");

        let errors = store.issues_by_severity("error").expect("list");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].issue_type, "price_inconsistency");

        let counts = store.issue_counts().expect("counts");
        assert_eq!(counts, vec![(
            String::from("price_inconsistency"),
            String::from("error"),
            1
        )]);

        let deleted = store
            .delete_issues("day", "A005930", 20240102)
            .expect("delete");
        assert_eq!(deleted, 1);
        assert!(store.issues_by_severity("error").expect("list").is_empty());
    }

    #[test]
    fn scan_checkpoint_roundtrip() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);

        assert_eq!(store.scan_checkpoint("day").expect("empty"), None);
        store
            .set_scan_checkpoint("day", "A005930")
            .expect("set");
        store
            .set_scan_checkpoint("day", "A035420")
            .expect("advance");
        assert_eq!(
            store.scan_checkpoint("day").expect("read"),
            Some(String::from("A035420"))
        );
        store.clear_scan_checkpoint("day").expect("clear");
        assert_eq!(store.scan_checkpoint("day").expect("cleared"), None);
    }

    #[test]
    fn range_delete_covers_one_minute_day() {
        let temp = tempdir().expect("tempdir");
        let store = open_store(&temp);

        let rows = vec![
            bar(202401020900, 100.0),
            bar(202401020901, 100.5),
            bar(202401030900, 101.0),
        ];
        store.upsert_bars("1min", "A005930", &rows).expect("seed");

        let deleted = store
            .delete_bars_between("1min", "A005930", 202401020000, 202401030000)
            .expect("delete day");
        assert_eq!(deleted, 2);
        assert_eq!(store.count_bars("1min", "A005930").expect("count"), 1);
    }
}
