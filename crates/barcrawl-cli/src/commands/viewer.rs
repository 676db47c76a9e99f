use crate::cli::ViewerArgs;
use crate::commands::AppContext;
use crate::error::CliError;

/// Print the most recent bars of one series as a fixed-width table.
pub fn run(context: &AppContext, args: &ViewerArgs) -> Result<(), CliError> {
    let dataset = args.timeframe.dataset();
    let bars = context
        .store
        .bars_recent(dataset.as_str(), args.code.as_str(), args.limit)?;

    if bars.is_empty() {
        println!("no {dataset} bars stored for {}", args.code);
        return Ok(());
    }

    println!(
        "{:>14} {:>12} {:>12} {:>12} {:>12} {:>14}",
        "date", "open", "high", "low", "close", "volume"
    );
    for bar in &bars {
        println!(
            "{:>14} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>14}",
            bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
        );
    }
    Ok(())
}
