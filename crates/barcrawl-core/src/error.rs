use std::path::PathBuf;

use thiserror::Error;

/// Validation and contract errors for domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("stock code cannot be empty")]
    EmptyCode,
    #[error("stock code length {len} exceeds max {max}")]
    CodeTooLong { len: usize, max: usize },
    #[error("stock code contains invalid character '{ch}' at index {index}")]
    CodeInvalidChar { ch: char, index: usize },

    #[error("invalid timeframe '{value}', expected day, week, month or <n>min")]
    InvalidTimeframe { value: String },

    #[error("invalid time of day '{value}', expected HH:MM")]
    InvalidTimeOfDay { value: String },
}

/// Failures raised by a chart data provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The terminal session is gone. Nothing else will succeed until the
    /// process restarts against a live session, so this aborts the run.
    #[error("chart terminal session is not connected")]
    Disconnected,

    /// The terminal rejected a request outright.
    #[error("chart terminal returned status {code}: {message}")]
    Status { code: i64, message: String },

    /// A replay fixture could not be read or decoded. Scoped to the one
    /// instrument whose fixture is broken.
    #[error("replay fixture error for {path}: {message}")]
    Fixture { path: PathBuf, message: String },
}

impl ProviderError {
    /// Whether this failure poisons the whole session rather than one
    /// instrument.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Status { .. })
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Top-level error for sync and validation runs.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] barcrawl_store::StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("sync task panicked: {0}")]
    TaskPanicked(String),
}

impl SyncError {
    /// Fatal errors abort the whole run; everything else is retried and, if
    /// it keeps failing, skips only the one instrument.
    ///
    /// Store errors are fatal because the engine has already retried them
    /// with backoff by the time they surface here.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Provider(error) => error.is_fatal(),
            Self::Store(_) => true,
            Self::Domain(_) => false,
            Self::TaskPanicked(_) => true,
        }
    }
}
