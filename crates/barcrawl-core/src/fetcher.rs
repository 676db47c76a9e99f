use std::sync::Arc;
use std::time::Duration;

use time::{OffsetDateTime, Time, UtcOffset};

use crate::calendar::parse_hhmm;
use crate::config::SyncSection;
use crate::domain::{Bar, DateKey, OutOfHoursTick, StockCode, Timeframe};
use crate::error::{DomainError, ProviderError};
use crate::provider::{ChartDataProvider, ChartRequest, TickRequest};
use crate::throttle::CallBudget;

/// Per-sequence ceiling for out-of-hours tick rows. The terminal pages them
/// in small blocks and the history is shallow, so this never binds in
/// practice.
const TICK_ROW_CEILING: usize = 50_000;
const TICK_PAGE_SIZE: usize = 200;

/// Inter-call pacing against the terminal.
///
/// The terminal is slow to serve pages right after the open and into the
/// close auction, so calls inside those busy windows (inclusive on both
/// edges) wait longer than the baseline.
#[derive(Debug, Clone)]
pub struct DelayPolicy {
    busy_windows: Vec<(Time, Time)>,
    busy_delay: Duration,
    normal_delay: Duration,
    offset: UtcOffset,
}

impl DelayPolicy {
    pub fn from_config(sync: &SyncSection, offset: UtcOffset) -> Result<Self, DomainError> {
        let mut busy_windows = Vec::with_capacity(sync.busy_windows.len());
        for window in &sync.busy_windows {
            busy_windows.push((
                parse_hhmm(window.start.as_str())?,
                parse_hhmm(window.end.as_str())?,
            ));
        }
        Ok(Self {
            busy_windows,
            busy_delay: Duration::from_millis(sync.busy_delay_ms),
            normal_delay: Duration::from_millis(sync.normal_delay_ms),
            offset,
        })
    }

    /// No pacing at all, for replayed sessions and tests.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            busy_windows: Vec::new(),
            busy_delay: Duration::ZERO,
            normal_delay: Duration::ZERO,
            offset: UtcOffset::UTC,
        }
    }

    /// The delay to apply after a call made at local time `at`.
    #[must_use]
    pub fn delay_at(&self, at: Time) -> Duration {
        let busy = self
            .busy_windows
            .iter()
            .any(|(start, end)| at >= *start && at <= *end);
        if busy {
            self.busy_delay
        } else {
            self.normal_delay
        }
    }

    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.delay_at(OffsetDateTime::now_utc().to_offset(self.offset).time())
    }
}

/// Result of a bar fetch sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Accumulated rows, newest first, not yet reconciled.
    Bars(Vec<Bar>),
    /// The terminal has no chart at all for this series.
    NoData,
}

/// Result of a tick fetch sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Ticks(Vec<OutOfHoursTick>),
    NoData,
}

/// Drives a session-stateful paging sequence to completion.
///
/// Each page request re-verifies the session, takes one unit of the hourly
/// call budget, and is followed by the inter-call delay. Accumulation stops
/// on the first of: the timeframe's row ceiling, an exhausted continuation
/// flag, or a page whose oldest row is already older than the caller's
/// cutoff key.
pub struct PaginatedFetcher {
    provider: Arc<dyn ChartDataProvider>,
    budget: CallBudget,
    delays: DelayPolicy,
}

impl PaginatedFetcher {
    #[must_use]
    pub fn new(
        provider: Arc<dyn ChartDataProvider>,
        budget: CallBudget,
        delays: DelayPolicy,
    ) -> Self {
        Self {
            provider,
            budget,
            delays,
        }
    }

    /// Fetch bars for one series, newest first, back to (and including) the
    /// first row at or before `from_exclusive`. Pass [`DateKey::NONE`] for
    /// full history.
    pub async fn fetch_bars(
        &self,
        code: &StockCode,
        timeframe: Timeframe,
        from_exclusive: DateKey,
    ) -> Result<FetchOutcome, ProviderError> {
        let ceiling = timeframe.page_ceiling();
        let request = ChartRequest {
            code: code.clone(),
            timeframe,
            count: ceiling,
        };

        let mut bars: Vec<Bar> = Vec::new();
        loop {
            self.provider.ensure_connected()?;
            self.admit().await;
            let page = self.provider.next_chart_page(&request)?;
            self.pace().await;

            if page.rows.is_empty() {
                if bars.is_empty() {
                    return Ok(FetchOutcome::NoData);
                }
                break;
            }

            for row in page.rows {
                if bars.len() >= ceiling {
                    break;
                }
                bars.push(row.into_bar(timeframe));
            }

            if bars.len() >= ceiling {
                break;
            }
            let oldest = bars.last().expect("page was non-empty");
            if oldest.date < from_exclusive {
                break;
            }
            if !page.has_more {
                break;
            }
        }

        Ok(FetchOutcome::Bars(bars))
    }

    /// Fetch out-of-hours ticks for one instrument back to `from_exclusive`.
    pub async fn fetch_ticks(
        &self,
        code: &StockCode,
        from_exclusive: DateKey,
    ) -> Result<TickOutcome, ProviderError> {
        let request = TickRequest {
            code: code.clone(),
            count: TICK_PAGE_SIZE,
        };

        let mut ticks: Vec<OutOfHoursTick> = Vec::new();
        loop {
            self.provider.ensure_connected()?;
            self.admit().await;
            let page = self.provider.next_tick_page(&request)?;
            self.pace().await;

            if page.rows.is_empty() {
                if ticks.is_empty() {
                    return Ok(TickOutcome::NoData);
                }
                break;
            }

            for row in page.rows {
                if ticks.len() >= TICK_ROW_CEILING {
                    break;
                }
                ticks.push(row.into_tick());
            }

            if ticks.len() >= TICK_ROW_CEILING {
                break;
            }
            let oldest = ticks.last().expect("page was non-empty");
            if oldest.date < from_exclusive {
                break;
            }
            if !page.has_more {
                break;
            }
        }

        Ok(TickOutcome::Ticks(ticks))
    }

    async fn admit(&self) {
        while let Err(wait) = self.budget.acquire() {
            tokio::time::sleep(wait).await;
        }
    }

    async fn pace(&self) {
        let delay = self.delays.current_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
