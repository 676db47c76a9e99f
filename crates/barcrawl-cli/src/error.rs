use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] barcrawl_core::ConfigError),

    #[error(transparent)]
    Domain(#[from] barcrawl_core::DomainError),

    #[error(transparent)]
    Sync(#[from] barcrawl_core::SyncError),

    #[error(transparent)]
    Store(#[from] barcrawl_core::StoreError),

    #[error("unsupported provider kind: {0}")]
    UnsupportedProvider(String),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Domain(_) | Self::UnsupportedProvider(_) => 2,
            Self::Sync(_) => 3,
            Self::Store(_) => 4,
        }
    }
}
