use crate::commands::AppContext;
use crate::error::CliError;

/// Tally recorded issues by kind and severity.
pub fn check(context: &AppContext) -> Result<(), CliError> {
    let counts = context.store.issue_counts()?;
    if counts.is_empty() {
        println!("no validation issues recorded");
        return Ok(());
    }

    println!("{:<24} {:<8} {:>8}", "issue", "severity", "count");
    for (issue_type, severity, count) in counts {
        println!("{issue_type:<24} {severity:<8} {count:>8}");
    }
    Ok(())
}

/// Delete the bars behind every error-severity issue, then the issues
/// themselves. Warnings are left alone. The deleted keys fall below the
/// series watermark, so the next sync re-fetches them from the terminal.
pub fn delete(context: &AppContext) -> Result<(), CliError> {
    let errors = context.store.issues_by_severity("error")?;
    let mut bars_deleted = 0;
    let mut issues_deleted = 0;

    for issue in &errors {
        bars_deleted += match issue.dataset.as_str() {
            // Intraday issues are recorded by session date; drop the whole
            // day of composite keys, plus any malformed plain-date key.
            "1min" => {
                context.store.delete_bars_between(
                    issue.dataset.as_str(),
                    issue.collection.as_str(),
                    issue.date * 10_000,
                    (issue.date + 1) * 10_000,
                )? + context.store.delete_bar(
                    issue.dataset.as_str(),
                    issue.collection.as_str(),
                    issue.date,
                )?
            }
            _ => context.store.delete_bar(
                issue.dataset.as_str(),
                issue.collection.as_str(),
                issue.date,
            )?,
        };
        issues_deleted += context.store.delete_issues(
            issue.dataset.as_str(),
            issue.collection.as_str(),
            issue.date,
        )?;
        tracing::info!(
            dataset = issue.dataset,
            code = issue.collection,
            date = issue.date,
            kind = issue.issue_type,
            "flagged bars deleted"
        );
    }

    println!("deleted {bars_deleted} bar(s) behind {issues_deleted} issue(s)");
    Ok(())
}
