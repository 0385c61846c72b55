use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::{env, sync::Arc, time::Duration};

use crate::clock::Clock;
use crate::rate_limit::TokenBucket;

/// Construction-time options for [`TokenBucket`].
#[derive(Debug, Clone, Default)]
pub struct BucketOptions {
    pub clock: Option<Arc<dyn Clock>>,
    pub prohibit_overflow: bool,
}

impl BucketOptions {
    /// Replace the system clock, e.g. with a [`MockClock`](crate::clock::MockClock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Reject any single request for more tokens than the capacity instead
    /// of letting it overdraw the bucket.
    pub fn prohibit_overflow(mut self) -> Self {
        self.prohibit_overflow = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BucketConfig {
    pub capacity: i64,
    pub quantum: i64,
    pub fill_interval_ms: u64,
    #[serde(default)]
    pub prohibit_overflow: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            quantum: 10,
            fill_interval_ms: 1000,
            prohibit_overflow: false,
        }
    }
}

impl BucketConfig {
    /// Read `{prefix}_CAPACITY`, `{prefix}_QUANTUM`,
    /// `{prefix}_FILL_INTERVAL_MS` and `{prefix}_PROHIBIT_OVERFLOW`.
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        let capacity = env::var(format!("{prefix}_CAPACITY"))
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults.capacity);
        let quantum = env::var(format!("{prefix}_QUANTUM"))
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults.quantum);
        let fill_interval_ms = env::var(format!("{prefix}_FILL_INTERVAL_MS"))
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.fill_interval_ms);
        let prohibit_overflow = env::var(format!("{prefix}_PROHIBIT_OVERFLOW"))
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.prohibit_overflow);

        BucketConfig {
            capacity,
            quantum,
            fill_interval_ms,
            prohibit_overflow,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("parsing bucket config")
    }

    pub fn fill_interval(&self) -> Duration {
        Duration::from_millis(self.fill_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity <= 0 {
            return Err(anyhow!("capacity must be greater than zero"));
        }
        if self.quantum <= 0 {
            return Err(anyhow!("quantum must be greater than zero"));
        }
        if self.fill_interval_ms == 0 {
            return Err(anyhow!("fill_interval_ms must be greater than zero"));
        }
        Ok(())
    }

    pub fn options(&self) -> BucketOptions {
        BucketOptions {
            clock: None,
            prohibit_overflow: self.prohibit_overflow,
        }
    }

    pub fn build(&self) -> Result<TokenBucket> {
        self.build_with_options(self.options())
    }

    pub fn build_with_clock(&self, clock: Arc<dyn Clock>) -> Result<TokenBucket> {
        self.build_with_options(self.options().with_clock(clock))
    }

    fn build_with_options(&self, options: BucketOptions) -> Result<TokenBucket> {
        self.validate()?;
        let bucket = TokenBucket::try_new(
            self.capacity,
            self.quantum,
            self.fill_interval(),
            options,
        )?;
        Ok(bucket)
    }
}
