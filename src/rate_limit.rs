use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::BucketOptions;
use crate::error::BucketError;

/// Wait bound used by [`TokenBucket::take`]: block until granted.
pub const INFINITE_WAIT: Duration = Duration::MAX;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A token bucket with lazy, tick-based refill.
///
/// The bucket starts full. Every `fill_interval` since creation adds
/// `quantum` tokens, up to `capacity`. Nothing runs in the background: the
/// balance is brought up to date whenever a caller touches the bucket.
///
/// A request that cannot be served right away reserves its tokens
/// immediately, driving the balance negative, and the caller then sleeps
/// until the ticks that repay the debt have elapsed. The lock only covers
/// that bookkeeping; sleeping happens after it is released, so concurrent
/// callers queue up behind each other's reservations.
#[derive(Debug)]
pub struct TokenBucket {
    clock: Arc<dyn Clock>,
    capacity: i64,
    quantum: i64,
    fill_interval: Duration,
    create_time: Instant,
    prohibit_overflow: bool,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    // Negative while callers hold reservations against future ticks.
    available_tokens: i64,
    last_tick: i64,
}

/// Outcome of [`TokenBucket::take_locked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reservation {
    Granted(Duration),
    Overflow,
    TooLong(Duration),
}

impl TokenBucket {
    /// Create a bucket on the system clock.
    ///
    /// # Panics
    ///
    /// Panics if `capacity`, `quantum` or `fill_interval` is not positive.
    pub fn new(capacity: i64, quantum: i64, fill_interval: Duration) -> Self {
        Self::with_options(capacity, quantum, fill_interval, BucketOptions::default())
    }

    /// Create a bucket with explicit [`BucketOptions`].
    ///
    /// # Panics
    ///
    /// Panics if `capacity`, `quantum` or `fill_interval` is not positive.
    pub fn with_options(
        capacity: i64,
        quantum: i64,
        fill_interval: Duration,
        options: BucketOptions,
    ) -> Self {
        match Self::try_new(capacity, quantum, fill_interval, options) {
            Ok(bucket) => bucket,
            Err(e) => panic!("invalid token bucket: {e}"),
        }
    }

    /// Fallible constructor used where invalid parameters come from
    /// configuration rather than code.
    pub fn try_new(
        capacity: i64,
        quantum: i64,
        fill_interval: Duration,
        options: BucketOptions,
    ) -> Result<Self, BucketError> {
        if capacity <= 0 {
            return Err(BucketError::InvalidParameter {
                name: "capacity",
                value: capacity.to_string(),
            });
        }
        if quantum <= 0 {
            return Err(BucketError::InvalidParameter {
                name: "quantum",
                value: quantum.to_string(),
            });
        }
        if fill_interval.is_zero() {
            return Err(BucketError::InvalidParameter {
                name: "fill interval",
                value: format!("{fill_interval:?}"),
            });
        }

        let clock = options
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let create_time = clock.now();
        debug!(
            capacity,
            quantum,
            ?fill_interval,
            prohibit_overflow = options.prohibit_overflow,
            "token bucket created"
        );
        Ok(Self {
            clock,
            capacity,
            quantum,
            fill_interval,
            create_time,
            prohibit_overflow: options.prohibit_overflow,
            state: Mutex::new(BucketState {
                available_tokens: capacity,
                last_tick: 0,
            }),
        })
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    pub fn quantum(&self) -> i64 {
        self.quantum
    }

    pub fn fill_interval(&self) -> Duration {
        self.fill_interval
    }

    pub fn prohibits_overflow(&self) -> bool {
        self.prohibit_overflow
    }

    /// Tokens that can be taken right now without waiting.
    ///
    /// Outstanding reservations read as an empty bucket until enough ticks
    /// have elapsed to repay them.
    pub fn available(&self) -> i64 {
        let mut state = self.lock_state();
        let tick = self.current_tick(self.clock.now());
        self.adjust_available_tokens(&mut state, tick);
        state.available_tokens.max(0)
    }

    /// Take `count` tokens, waiting as long as it takes.
    ///
    /// Never fails on insufficiency. With overflow prohibited, a request
    /// larger than the capacity returns [`BucketError::Overflow`] and leaves
    /// the bucket untouched.
    pub async fn take(&self, count: i64) -> Result<(), BucketError> {
        match self.reserve(count, INFINITE_WAIT) {
            Reservation::Granted(wait) => {
                self.clock.sleep(wait).await;
                Ok(())
            }
            Reservation::Overflow => {
                warn!(
                    requested = count,
                    capacity = self.capacity,
                    "token request exceeds capacity; rejected"
                );
                Err(BucketError::Overflow {
                    requested: count,
                    capacity: self.capacity,
                })
            }
            // an unbounded wait cannot be exceeded
            Reservation::TooLong(_) => unreachable!("infinite wait exceeded"),
        }
    }

    /// Take `count` tokens if that requires waiting no longer than
    /// `max_wait`.
    ///
    /// On success the required wait has already elapsed when this returns.
    /// On failure nothing is reserved.
    pub async fn try_take(&self, count: i64, max_wait: Duration) -> bool {
        match self.reserve(count, max_wait) {
            Reservation::Granted(wait) => {
                self.clock.sleep(wait).await;
                true
            }
            Reservation::Overflow => {
                debug!(requested = count, capacity = self.capacity, "try_take over capacity");
                false
            }
            Reservation::TooLong(wait) => {
                debug!(requested = count, ?wait, ?max_wait, "try_take wait exceeds bound");
                false
            }
        }
    }

    /// Take up to `count` tokens without waiting and return how many were
    /// granted.
    pub fn take_available(&self, count: i64) -> i64 {
        if count <= 0 {
            return 0;
        }
        let granted = {
            let mut state = self.lock_state();
            let tick = self.current_tick(self.clock.now());
            self.adjust_available_tokens(&mut state, tick);
            let granted = count.min(state.available_tokens.max(0));
            state.available_tokens -= granted;
            granted
        };
        if granted > 0 {
            metrics::counter!("token_bucket_granted_total").increment(granted as u64);
        }
        #[cfg(feature = "debug-logs")]
        tracing::trace!(requested = count, granted, "take_available");
        granted
    }

    fn reserve(&self, count: i64, max_wait: Duration) -> Reservation {
        let outcome = {
            let mut state = self.lock_state();
            let now = self.clock.now();
            self.take_locked(&mut state, count, now, max_wait)
        };

        match outcome {
            Reservation::Granted(wait) => {
                if count > 0 {
                    metrics::counter!("token_bucket_granted_total").increment(count as u64);
                }
                if !wait.is_zero() {
                    metrics::counter!("token_bucket_reservations_total").increment(1);
                    metrics::histogram!("token_bucket_wait_seconds").record(wait.as_secs_f64());
                    debug!(requested = count, ?wait, "tokens reserved; waiting for refill");
                }
                #[cfg(feature = "debug-logs")]
                tracing::trace!(requested = count, ?wait, "take granted");
            }
            Reservation::Overflow | Reservation::TooLong(_) => {
                metrics::counter!("token_bucket_rejected_total").increment(1);
            }
        }
        outcome
    }

    fn lock_state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Core acquisition step; must run under the state lock.
    ///
    /// Commits the deduction whenever it grants, including when the balance
    /// goes negative and the caller still has to wait.
    fn take_locked(
        &self,
        state: &mut BucketState,
        count: i64,
        now: Instant,
        max_wait: Duration,
    ) -> Reservation {
        if count <= 0 {
            return Reservation::Granted(Duration::ZERO);
        }
        if self.prohibit_overflow && count > self.capacity {
            return Reservation::Overflow;
        }

        let tick = self.current_tick(now);
        self.adjust_available_tokens(state, tick);
        let new_available = state.available_tokens.saturating_sub(count);
        if new_available >= 0 {
            state.available_tokens = new_available;
            return Reservation::Granted(Duration::ZERO);
        }

        let deficit = new_available.unsigned_abs();
        let ticks_needed = deficit.div_ceil(self.quantum as u64);
        let end_tick = tick.saturating_add(i64::try_from(ticks_needed).unwrap_or(i64::MAX));
        let wait = self.wait_until_tick(end_tick, now);
        if wait <= max_wait {
            state.available_tokens = new_available;
            Reservation::Granted(wait)
        } else {
            Reservation::TooLong(wait)
        }
    }

    /// Whole fill intervals elapsed between creation and `now`.
    fn current_tick(&self, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.create_time).as_nanos();
        i64::try_from(elapsed / self.fill_interval.as_nanos()).unwrap_or(i64::MAX)
    }

    fn adjust_available_tokens(&self, state: &mut BucketState, tick: i64) {
        let elapsed_ticks = tick.saturating_sub(state.last_tick);
        if elapsed_ticks <= 0 {
            return;
        }
        state.last_tick = tick;
        if state.available_tokens >= self.capacity {
            return;
        }
        state.available_tokens = state
            .available_tokens
            .saturating_add(elapsed_ticks.saturating_mul(self.quantum))
            .min(self.capacity);
    }

    /// Time from `now` until tick `end_tick` starts.
    fn wait_until_tick(&self, end_tick: i64, now: Instant) -> Duration {
        let deadline = self
            .fill_interval
            .as_nanos()
            .saturating_mul(end_tick.max(0) as u128);
        let elapsed = now.saturating_duration_since(self.create_time).as_nanos();
        nanos_to_duration(deadline.saturating_sub(elapsed))
    }
}

fn nanos_to_duration(nanos: u128) -> Duration {
    let secs = nanos / NANOS_PER_SEC;
    match u64::try_from(secs) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}
