//! Token bucket rate limiting for callers sharing one process.
//!
//! ```no_run
//! use std::time::Duration;
//! use token_bucket::TokenBucket;
//!
//! # async fn run() -> Result<(), token_bucket::BucketError> {
//! let bucket = TokenBucket::new(10, 1, Duration::from_secs(1));
//! bucket.take(3).await?;
//! let granted = bucket.take_available(20);
//! assert!(granted <= 7);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rate_limit;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::{BucketConfig, BucketOptions};
pub use error::BucketError;
pub use rate_limit::{TokenBucket, INFINITE_WAIT};
