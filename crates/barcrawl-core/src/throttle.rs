use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Hourly call budget against the chart terminal.
///
/// The budget spreads the hourly limit evenly (one cell per period) so a
/// fresh process cannot burst-drain the terminal the moment it starts.
#[derive(Clone)]
pub struct CallBudget {
    limiter: Arc<DirectRateLimiter>,
    denied_delay: Duration,
}

impl CallBudget {
    /// A budget of `limit` calls per hour. When a call is denied the caller
    /// should sleep `denied_delay` and try again.
    #[must_use]
    pub fn per_hour(limit: u32, denied_delay: Duration) -> Self {
        Self::new(Duration::from_secs(3_600), limit, denied_delay)
    }

    #[must_use]
    pub fn new(window: Duration, limit: u32, denied_delay: Duration) -> Self {
        let quota = quota_from_window(window, limit);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            denied_delay,
        }
    }

    /// Try to take one call from the budget. On denial returns the delay to
    /// sleep before asking again.
    pub fn acquire(&self) -> Result<(), Duration> {
        if self.limiter.check().is_ok() {
            Ok(())
        } else {
            Err(self.denied_delay)
        }
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let safe_limit = limit.max(1);
    let burst = NonZeroU32::new(safe_limit).expect("safe limit must be non-zero");

    let seconds_per_cell = (window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .expect("period is always greater than zero")
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_once_the_budget_is_spent() {
        let budget = CallBudget::new(Duration::from_secs(3_600), 2, Duration::from_millis(500));

        assert!(budget.acquire().is_ok());
        assert!(budget.acquire().is_ok());

        let delay = budget.acquire().expect_err("third call must be denied");
        assert_eq!(delay, Duration::from_millis(500));
    }
}
