use std::sync::Arc;
use std::time::Duration;

use barcrawl_core::calendar::parse_hhmm;
use barcrawl_core::{
    CallBudget, CatalogSummary, ConcurrencyGovernor, DateKey, DelayPolicy, GovernorConfig,
    InstrumentCatalog, MarketCalendar, Notifier, PaginatedFetcher, PhaseReport, RetryPolicy,
    StockCode, SyncEngine, SyncError, SyncSection, Timeframe,
};

use crate::cli::CollectArgs;
use crate::commands::AppContext;
use crate::error::CliError;

/// The full collection pass: catalog refresh, daily bars, one-minute bars,
/// then (after the out-of-hours session settles) the tick merge and the
/// optional market-cap backfill.
pub async fn run(context: &AppContext, args: &CollectArgs) -> Result<(), CliError> {
    let config = &context.config;
    let calendar = MarketCalendar::from_config(&config.calendar)?;
    let session = calendar.latest_closed(calendar.now_local());
    let notifier = Notifier::from_config(config.telegram.as_ref());

    let catalog = InstrumentCatalog::new(context.store.clone());
    let summary = catalog.refresh(
        context.provider.as_ref(),
        Timeframe::Daily.closing_watermark(session),
    )?;
    tracing::info!(
        refreshed = summary.refreshed,
        unchanged = summary.unchanged,
        adopted = summary.adopted,
        rejected = summary.rejected,
        "catalog refreshed"
    );
    notifier.send(catalog_summary(&summary).as_str()).await;

    let budget = CallBudget::per_hour(
        config.sync.calls_per_hour,
        Duration::from_millis(config.sync.normal_delay_ms),
    );
    let delays = DelayPolicy::from_config(&config.sync, calendar.offset())?;
    let fetcher = PaginatedFetcher::new(Arc::clone(&context.provider), budget, delays);
    let store_retry = RetryPolicy::attempts(
        config.sync.retry_attempts,
        Duration::from_millis(config.sync.retry_base_ms),
    );
    let engine = Arc::new(SyncEngine::new(context.store.clone(), fetcher, store_retry));

    let bar_codes = catalog.bar_codes()?;
    tracing::info!(run_id = engine.run_id(), instruments = bar_codes.len(), "collection started");

    let daily = bar_phase(
        context,
        &engine,
        bar_codes.clone(),
        Timeframe::Daily,
        session,
        config.sync.daily_permits,
    )
    .await?;
    notifier.send(phase_summary("daily", &daily).as_str()).await;

    let minute = bar_phase(
        context,
        &engine,
        bar_codes,
        Timeframe::ONE_MINUTE,
        session,
        config.sync.intraday_permits,
    )
    .await?;
    notifier.send(phase_summary("1min", &minute).as_str()).await;

    wait_for_out_of_hours(&calendar, &config.sync).await?;

    let tick_codes = catalog.tick_codes()?;
    let governor = ConcurrencyGovernor::new(governor_config(&config.sync, config.sync.tick_permits));
    let ticks = {
        let engine = Arc::clone(&engine);
        governor
            .run("ticks", tick_codes.clone(), move |code| {
                let engine = Arc::clone(&engine);
                async move { engine.sync_out_of_hours(&code).await }
            })
            .await?
    };
    notifier.send(phase_summary("ticks", &ticks).as_str()).await;

    if args.market_cap {
        // Indexes carry no market cap, so the tick list is the right one.
        let governor =
            ConcurrencyGovernor::new(governor_config(&config.sync, config.sync.daily_permits));
        let backfill = {
            let engine = Arc::clone(&engine);
            governor
                .run("market_cap", tick_codes, move |code| {
                    let engine = Arc::clone(&engine);
                    async move { engine.backfill_market_cap(&code).await }
                })
                .await?
        };
        notifier
            .send(phase_summary("market_cap", &backfill).as_str())
            .await;
    }

    tracing::info!(run_id = engine.run_id(), "collection finished");
    Ok(())
}

async fn bar_phase(
    context: &AppContext,
    engine: &Arc<SyncEngine>,
    codes: Vec<StockCode>,
    timeframe: Timeframe,
    session: DateKey,
    permits: usize,
) -> Result<PhaseReport, SyncError> {
    let watermark = timeframe.closing_watermark(session);
    let governor =
        ConcurrencyGovernor::new(governor_config(&context.config.sync, permits));
    let engine = Arc::clone(engine);
    governor
        .run(timeframe.dataset().as_str(), codes, move |code| {
            let engine = Arc::clone(&engine);
            async move { engine.sync_instrument(&code, timeframe, watermark).await }
        })
        .await
}

fn governor_config(sync: &SyncSection, permits: usize) -> GovernorConfig {
    GovernorConfig {
        permits,
        wave_size: sync.wave_size,
        cooldown: Duration::from_secs(sync.cooldown_secs),
        retry: RetryPolicy::attempts(sync.retry_attempts, Duration::from_millis(sync.retry_base_ms)),
    }
}

fn phase_summary(phase: &str, report: &PhaseReport) -> String {
    format!(
        "[barcrawl] {phase}: {}/{} synced, {} up to date, {} failed, {} rows",
        report.completed, report.total, report.skipped, report.failed, report.rows
    )
}

fn catalog_summary(summary: &CatalogSummary) -> String {
    format!(
        "[barcrawl] catalog: {} refreshed, {} unchanged, {} adopted, {} rejected",
        summary.refreshed, summary.unchanged, summary.adopted, summary.rejected
    )
}

/// Hold the tick merge until the out-of-hours session has settled. The gate
/// only applies on weekdays; on weekends yesterday's session is long over.
async fn wait_for_out_of_hours(
    calendar: &MarketCalendar,
    sync: &SyncSection,
) -> Result<(), CliError> {
    let gate = parse_hhmm(sync.out_of_hours_after.as_str())?;
    let mut announced = false;
    loop {
        let now = calendar.now_local();
        let weekday = now.weekday().number_days_from_monday() < 5;
        if !weekday || now.time() >= gate {
            return Ok(());
        }
        if !announced {
            tracing::info!(until = sync.out_of_hours_after, "waiting for the out-of-hours session");
            announced = true;
        }
        let remaining = gate - now.time();
        let sleep = remaining
            .try_into()
            .unwrap_or(Duration::from_secs(60))
            .min(Duration::from_secs(60));
        tokio::time::sleep(sleep.max(Duration::from_secs(1))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_cover_every_tally() {
        let report = PhaseReport {
            total: 10,
            completed: 7,
            skipped: 2,
            failed: 1,
            rows: 3_500,
        };
        assert_eq!(
            phase_summary("daily", &report),
            "[barcrawl] daily: 7/10 synced, 2 up to date, 1 failed, 3500 rows"
        );

        let summary = CatalogSummary {
            refreshed: 4,
            unchanged: 1,
            adopted: 2,
            rejected: 1,
        };
        assert_eq!(
            catalog_summary(&summary),
            "[barcrawl] catalog: 4 refreshed, 1 unchanged, 2 adopted, 1 rejected"
        );
    }
}
