use barcrawl_store::{CatalogRecord, Store};

use crate::domain::{Instrument, MarketKind, StockCode, TradingStatus};
use crate::error::SyncError;
use crate::provider::ChartDataProvider;

/// Composite index series collected alongside the equities.
const INDEX_ROWS: [(&str, &str, i64); 2] = [("U001", "KOSPI", 1), ("U201", "KOSDAQ", 2)];

/// Result of one catalog refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    /// Universe rows written or rewritten this refresh.
    pub refreshed: usize,
    /// Universe rows skipped because today's refresh already covered them.
    pub unchanged: usize,
    /// Codes present in the stored bars but missing from the universe,
    /// re-adopted with a placeholder entry (delisted instruments keep their
    /// history queryable).
    pub adopted: usize,
    /// Universe rows dropped because their code failed validation.
    pub rejected: usize,
}

/// Maintains the instrument catalog backing every sync phase.
pub struct InstrumentCatalog {
    store: Store,
}

impl InstrumentCatalog {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Pull the terminal's universe and upsert it, stamped with
    /// `catalog_date` (the latest closed session date). Codes already
    /// stamped with that date are skipped, so re-running the refresh within
    /// one session is cheap and cannot clobber anything.
    pub fn refresh(
        &self,
        provider: &dyn ChartDataProvider,
        catalog_date: i64,
    ) -> Result<CatalogSummary, SyncError> {
        let mut summary = CatalogSummary::default();

        let mut rows = provider.universe()?;
        for (code, name, kind) in INDEX_ROWS {
            rows.push(crate::provider::UniverseRow {
                code: code.to_owned(),
                name: name.to_owned(),
                market_kind: kind,
                status: 0,
            });
        }

        for row in rows {
            let kind = MarketKind::from_code(row.market_kind);
            let is_index = INDEX_ROWS.iter().any(|(code, _, _)| *code == row.code);
            if !kind.is_collected() && !is_index {
                continue;
            }

            let code = match StockCode::parse(row.code.as_str()) {
                Ok(code) => code,
                Err(error) => {
                    tracing::warn!(code = row.code, %error, "rejecting universe row");
                    summary.rejected += 1;
                    continue;
                }
            };

            if self.store.catalog_date(code.as_str())? == Some(catalog_date) {
                summary.unchanged += 1;
                continue;
            }

            self.store.upsert_instrument(&CatalogRecord {
                stock_code: code.as_str().to_owned(),
                stock_name: row.name,
                market_kind: kind.code(),
                stock_status: TradingStatus::from_code(row.status).code(),
                date: catalog_date,
            })?;
            summary.refreshed += 1;
        }

        summary.adopted = self.adopt_orphans(catalog_date)?;
        Ok(summary)
    }

    /// Re-adopt codes that have stored daily bars but vanished from the
    /// universe. They enter the catalog halted, so they are kept queryable
    /// but never fetched again.
    fn adopt_orphans(&self, catalog_date: i64) -> Result<usize, SyncError> {
        let known: std::collections::HashSet<String> = self
            .store
            .instruments()?
            .into_iter()
            .map(|record| record.stock_code)
            .collect();

        let mut adopted = 0;
        for code in self.store.list_codes("day")? {
            if known.contains(code.as_str()) {
                continue;
            }
            let Ok(parsed) = StockCode::parse(code.as_str()) else {
                continue;
            };
            self.store.upsert_instrument(&CatalogRecord {
                stock_code: parsed.as_str().to_owned(),
                stock_name: String::new(),
                market_kind: MarketKind::Unclassified.code(),
                stock_status: TradingStatus::Halted.code(),
                date: catalog_date,
            })?;
            adopted += 1;
        }
        Ok(adopted)
    }

    /// Codes eligible for the bar sync phases: normally trading, not
    /// synthetic. The index series are included.
    pub fn bar_codes(&self) -> Result<Vec<StockCode>, SyncError> {
        self.eligible(|instrument| !instrument.code.is_synthetic())
    }

    /// Codes eligible for the out-of-hours tick pass: as above, minus the
    /// indexes, which have no after-hours session.
    pub fn tick_codes(&self) -> Result<Vec<StockCode>, SyncError> {
        self.eligible(|instrument| {
            !instrument.code.is_synthetic() && !instrument.code.is_index()
        })
    }

    fn eligible(
        &self,
        keep: impl Fn(&Instrument) -> bool,
    ) -> Result<Vec<StockCode>, SyncError> {
        let mut codes = Vec::new();
        for record in self.store.instruments()? {
            let Ok(code) = StockCode::parse(record.stock_code.as_str()) else {
                continue;
            };
            let instrument = Instrument {
                code,
                name: record.stock_name,
                market_kind: MarketKind::from_code(record.market_kind),
                status: TradingStatus::from_code(record.stock_status),
            };
            if instrument.status == TradingStatus::Normal && keep(&instrument) {
                codes.push(instrument.code);
            }
        }
        Ok(codes)
    }
}
