use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::domain::StockCode;
use crate::engine::SyncOutcome;
use crate::error::SyncError;
use crate::retry::{retry, RetryPolicy};

/// Admission settings for one sync phase.
#[derive(Debug, Clone, Copy)]
pub struct GovernorConfig {
    /// Concurrent in-flight instruments.
    pub permits: usize,
    /// Instruments per wave; a cooldown sleep separates waves.
    pub wave_size: usize,
    pub cooldown: Duration,
    /// Per-instrument retry of non-fatal failures.
    pub retry: RetryPolicy,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            permits: 1,
            wave_size: 200,
            cooldown: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Tally of one phase run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseReport {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rows: usize,
}

/// Runs one sync phase across the instrument list.
///
/// Tasks are spawned wave by wave and gated by a semaphore, so at most
/// `permits` instruments talk to the terminal at once. A non-fatal task
/// failure is retried per the policy and then counted and skipped; a fatal
/// failure (dead session, store giving up) aborts the phase.
pub struct ConcurrencyGovernor {
    config: GovernorConfig,
}

impl ConcurrencyGovernor {
    #[must_use]
    pub fn new(config: GovernorConfig) -> Self {
        Self { config }
    }

    pub async fn run<F, Fut>(
        &self,
        phase: &str,
        codes: Vec<StockCode>,
        task: F,
    ) -> Result<PhaseReport, SyncError>
    where
        F: Fn(StockCode) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<SyncOutcome, SyncError>> + Send + 'static,
    {
        let mut report = PhaseReport {
            total: codes.len(),
            ..PhaseReport::default()
        };
        let semaphore = Arc::new(Semaphore::new(self.config.permits.max(1)));
        let wave_size = self.config.wave_size.max(1);
        let started = Instant::now();

        for (wave_index, wave) in codes.chunks(wave_size).enumerate() {
            if wave_index > 0 && !self.config.cooldown.is_zero() {
                tracing::debug!(phase, wave = wave_index, "cooling down between waves");
                tokio::time::sleep(self.config.cooldown).await;
            }

            let mut handles = Vec::with_capacity(wave.len());
            for code in wave {
                let semaphore = Arc::clone(&semaphore);
                let task = task.clone();
                let code = code.clone();
                let policy = self.config.retry;
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("phase semaphore closed");
                    retry(
                        policy,
                        || task(code.clone()),
                        |error: &SyncError| !error.is_fatal(),
                    )
                    .await
                }));
            }

            let mut fatal: Option<SyncError> = None;
            for handle in handles {
                if fatal.is_some() {
                    handle.abort();
                    continue;
                }
                match handle.await {
                    Ok(Ok(SyncOutcome::Completed { rows })) => {
                        report.completed += 1;
                        report.rows += rows;
                    }
                    Ok(Ok(outcome)) if outcome.is_skip() => report.skipped += 1,
                    Ok(Ok(_)) => report.completed += 1,
                    Ok(Err(error)) if error.is_fatal() => fatal = Some(error),
                    Ok(Err(error)) => {
                        tracing::warn!(phase, error = %error, "instrument failed, skipping");
                        report.failed += 1;
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            fatal = Some(SyncError::TaskPanicked(join_error.to_string()));
                        } else {
                            report.failed += 1;
                        }
                    }
                }
            }
            if let Some(error) = fatal {
                tracing::error!(phase, error = %error, "fatal failure, aborting phase");
                return Err(error);
            }

            let processed = report.completed + report.skipped + report.failed;
            let eta = estimate_remaining(started.elapsed(), processed, report.total);
            tracing::info!(
                phase,
                processed,
                total = report.total,
                completed = report.completed,
                skipped = report.skipped,
                failed = report.failed,
                eta_secs = eta.as_secs(),
                "wave finished"
            );
        }

        Ok(report)
    }
}

fn estimate_remaining(elapsed: Duration, processed: usize, total: usize) -> Duration {
    if processed == 0 || total <= processed {
        return Duration::ZERO;
    }
    let per_item = elapsed.as_secs_f64() / processed as f64;
    Duration::from_secs_f64(per_item * (total - processed) as f64)
}
