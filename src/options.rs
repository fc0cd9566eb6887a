use std::time::Duration;

use crate::{BggError, Result};

/// Configures per-attempt timeout and retry/backoff behavior of a fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchOptions {
    /// Timeout of the first attempt.
    pub timeout: Duration,
    /// Number of additional attempts allowed after the first one.
    pub retries: u32,
    /// Sleep before the first retry of a not-ready or throttled response.
    pub retry_delay: Duration,
    /// Factor applied to `retry_delay` after every sleep.
    pub delay_multiplier: f64,
    /// Factor applied to the per-attempt timeout after every timeout.
    pub timeout_multiplier: f64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            retries: 3,
            retry_delay: Duration::from_secs(5),
            delay_multiplier: 1.5,
            timeout_multiplier: 2.5,
        }
    }
}

impl FetchOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Checks that both multipliers are finite and at least `1.0`, so
    /// delays and timeouts never shrink between attempts.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("delay_multiplier", self.delay_multiplier),
            ("timeout_multiplier", self.timeout_multiplier),
        ] {
            if !value.is_finite() || value < 1.0 {
                return Err(BggError::Configuration(format!(
                    "{name} must be a finite number >= 1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}
