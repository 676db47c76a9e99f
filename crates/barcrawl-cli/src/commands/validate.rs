use barcrawl_core::{Notifier, Timeframe, ValidationEngine, ValidationReport};

use crate::cli::ValidateArgs;
use crate::commands::AppContext;
use crate::error::CliError;

pub async fn run(context: &AppContext, args: &ValidateArgs) -> Result<(), CliError> {
    let engine = ValidationEngine::new(context.store.clone());
    let report = engine.validate(args.timeframe)?;

    if let Some(resumed) = report.resumed_after.as_deref() {
        println!("resumed after {resumed}");
    }
    println!(
        "scanned {} series: {} warning(s), {} error(s)",
        report.scanned, report.warnings, report.errors
    );

    let notifier = Notifier::from_config(context.config.telegram.as_ref());
    notifier
        .send(scan_summary(args.timeframe, &report).as_str())
        .await;
    Ok(())
}

fn scan_summary(timeframe: Timeframe, report: &ValidationReport) -> String {
    format!(
        "[barcrawl] validate {timeframe}: {} series scanned, {} warning(s), {} error(s)",
        report.scanned, report.warnings, report.errors
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_summary_names_the_timeframe_and_tallies() {
        let report = ValidationReport {
            scanned: 12,
            warnings: 3,
            errors: 1,
            resumed_after: None,
        };
        assert_eq!(
            scan_summary(Timeframe::Daily, &report),
            "[barcrawl] validate day: 12 series scanned, 3 warning(s), 1 error(s)"
        );
    }
}
