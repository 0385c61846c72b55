use async_trait::async_trait;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Time source used by [`TokenBucket`](crate::rate_limit::TokenBucket).
///
/// Refill is computed from `now()`; waits granted by the bucket are handed
/// back to `sleep()` after the bucket's lock has been released.
#[async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;

    /// Suspend the calling task for at least `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant::now`] and the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::time::sleep(duration).await;
    }
}

/// Manually driven clock for deterministic tests.
///
/// Simulated time only moves through [`advance`](MockClock::advance) or
/// [`set_elapsed`](MockClock::set_elapsed). `sleep` returns immediately and
/// records the requested duration.
#[derive(Debug)]
pub struct MockClock {
    base: Instant,
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Move simulated time forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.offset = state.offset.saturating_add(by);
    }

    /// Pin simulated time to `elapsed` past the clock's creation.
    pub fn set_elapsed(&self, elapsed: Duration) {
        self.lock().offset = elapsed;
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().offset
    }

    /// Every duration passed to `sleep` so far, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + self.lock().offset
    }

    async fn sleep(&self, duration: Duration) {
        self.lock().sleeps.push(duration);
    }
}
