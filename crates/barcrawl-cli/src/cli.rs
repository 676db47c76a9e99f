//! CLI argument definitions for barcrawl.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `collect` | Run the full collection pass (default when omitted) |
//! | `validate` | Scan stored series for structural problems |
//! | `check-integrity-errors` | Tally recorded validation issues |
//! | `delete-integrity-errors` | Delete bars flagged with error-severity issues |
//! | `chart-viewer` | Print recent bars for one series |
//!
//! # Examples
//!
//! ```bash
//! # Full collection pass with the default config lookup
//! barcrawl
//!
//! # Collection including the market-cap backfill
//! barcrawl collect --market-cap
//!
//! # Validate the one-minute series
//! barcrawl validate --timeframe 1min
//!
//! # Inspect the last 30 daily bars of one series
//! barcrawl chart-viewer A005930
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use barcrawl_core::Timeframe;

/// Scheduled bar collection against a session-stateful chart terminal.
#[derive(Debug, Parser)]
#[command(
    name = "barcrawl",
    author,
    version,
    about = "Incremental OHLCV collection, reconciliation and validation"
)]
pub struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Running without a subcommand is a full `collect`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Refresh the catalog and sync every eligible series, then merge the
    /// out-of-hours ticks once the session has settled.
    Collect(CollectArgs),

    /// Scan one timeframe's stored series and record findings.
    Validate(ValidateArgs),

    /// Tally recorded validation issues by kind and severity.
    CheckIntegrityErrors,

    /// Delete the bars behind every error-severity issue, then drop the
    /// issues themselves. The next sync re-fetches the deleted keys.
    DeleteIntegrityErrors,

    /// Print the most recent bars of one series.
    ChartViewer(ViewerArgs),
}

#[derive(Debug, Default, Args)]
pub struct CollectArgs {
    /// Also backfill the market-cap column of historical daily bars.
    #[arg(long)]
    pub market_cap: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Timeframe to scan: day, 1min, week or month.
    #[arg(long, default_value = "day")]
    pub timeframe: Timeframe,
}

#[derive(Debug, Args)]
pub struct ViewerArgs {
    /// Stock code, e.g. A005930.
    pub code: String,

    #[arg(long, default_value = "day")]
    pub timeframe: Timeframe,

    /// Rows to print, newest last.
    #[arg(long, default_value_t = 30)]
    pub limit: usize,
}
