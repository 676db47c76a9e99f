mod collect;
mod issues;
mod validate;
mod viewer;

use std::sync::Arc;

use barcrawl_core::{ChartDataProvider, Config, ReplayProvider, Store, StoreConfig};

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Shared wiring behind every command: the parsed config, an initialized
/// store, and the chart provider it names.
pub struct AppContext {
    pub config: Config,
    pub store: Store,
    pub provider: Arc<dyn ChartDataProvider>,
}

impl AppContext {
    pub fn build(cli: &Cli) -> Result<Self, CliError> {
        let config = Config::resolve(cli.config.as_deref())?;

        let store = match config.store.db_path.as_ref() {
            Some(path) => {
                let mut store_config = StoreConfig::at(path.clone());
                if let Some(size) = config.store.max_pool_size {
                    store_config.max_pool_size = size;
                }
                Store::open(store_config)?
            }
            None => Store::open_default()?,
        };

        let provider: Arc<dyn ChartDataProvider> = match config.provider.kind.as_str() {
            "replay" => match config.provider.fixtures.as_ref() {
                Some(dir) => Arc::new(ReplayProvider::from_dir(dir.clone())),
                None => Arc::new(ReplayProvider::in_memory()),
            },
            other => return Err(CliError::UnsupportedProvider(other.to_owned())),
        };

        Ok(Self {
            config,
            store,
            provider,
        })
    }
}

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    let context = AppContext::build(cli)?;
    match cli.command.as_ref() {
        None => collect::run(&context, &crate::cli::CollectArgs::default()).await,
        Some(Command::Collect(args)) => collect::run(&context, args).await,
        Some(Command::Validate(args)) => validate::run(&context, args).await,
        Some(Command::CheckIntegrityErrors) => issues::check(&context),
        Some(Command::DeleteIntegrityErrors) => issues::delete(&context),
        Some(Command::ChartViewer(args)) => viewer::run(&context, args),
    }
}
