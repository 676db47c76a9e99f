//! Core engine for barcrawl.
//!
//! This crate contains:
//! - Canonical domain models (date keys, timeframes, instruments, bars)
//! - The session-stateful chart provider contract and the replay provider
//! - Pacing, call budgeting, and retry policies
//! - The fetch-and-reconcile sync engine and its concurrency governor
//! - The instrument catalog and the stored-series validation engine

pub mod calendar;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod governor;
pub mod notify;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod throttle;
pub mod validation;

pub use calendar::MarketCalendar;
pub use catalog::{CatalogSummary, InstrumentCatalog};
pub use config::{Config, SyncSection, TelegramSection};
pub use domain::{
    Bar, DateKey, Instrument, MarketKind, OutOfHoursTick, StockCode, Timeframe, TradingStatus,
};
pub use engine::{SyncEngine, SyncOutcome};
pub use error::{ConfigError, DomainError, ProviderError, SyncError};
pub use fetcher::{DelayPolicy, FetchOutcome, PaginatedFetcher, TickOutcome};
pub use governor::{ConcurrencyGovernor, GovernorConfig, PhaseReport};
pub use notify::Notifier;
pub use provider::{
    BarRow, ChartDataProvider, ChartPage, ChartRequest, TickPage, TickRequest, TickRow,
    UniverseRow,
};
pub use providers::ReplayProvider;
pub use retry::{retry, Backoff, RetryPolicy};
pub use throttle::CallBudget;
pub use validation::{IssueKind, Severity, ValidationEngine, ValidationReport};

pub use barcrawl_store::{
    BarRecord, CatalogRecord, IssueRecord, Store, StoreConfig, StoreError,
};
