// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use crate::error::{FlashLoanError, Result};

/// Bounded retry policy for transient `NetworkUnavailable` dispatch failures.
///
/// # Examples
///
/// ```rust
/// use xchain_flashloan::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::default()
///     .with_max_attempts(5)
///     .with_initial_backoff(Duration::from_millis(200));
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total dispatch attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles on every further retry.
    pub initial_backoff: Duration,
    /// Upper bound on a single retry delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    /// - `max_attempts`: 3
    /// - `initial_backoff`: 500ms
    /// - `max_backoff`: 5s
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(FlashLoanError::InvalidConfig(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Exponential backoff used while waiting for a receipt.
///
/// Polls happen at `t = 0`, then after `initial_interval`, growing by
/// `multiplier` up to `max_interval`, until `max_wait` has elapsed. The last
/// sleep is clamped so the final poll lands exactly on the bound.
///
/// # Examples
///
/// ```rust
/// use xchain_flashloan::TrackingConfig;
/// use std::time::Duration;
///
/// // Defaults: 1s initial, x2, capped at 8s, give up after 2 minutes
/// let config = TrackingConfig::default();
///
/// // Local dev chains produce blocks every couple of seconds
/// let config = TrackingConfig::fast();
///
/// let config = TrackingConfig::default().with_max_wait(Duration::from_secs(30));
/// assert_eq!(config.max_wait, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Bound after which tracking fails with `ConfirmationTimeout`.
    pub max_wait: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(8),
            multiplier: 2.0,
            max_wait: Duration::from_secs(120),
        }
    }
}

impl TrackingConfig {
    /// Tight polling for local dev chains.
    ///
    /// - `initial_interval`: 250ms
    /// - `max_interval`: 2s
    /// - `max_wait`: 30s
    pub fn fast() -> Self {
        Self {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(2),
            multiplier: 2.0,
            max_wait: Duration::from_secs(30),
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// The interval that follows `current`, saturating at `max_interval`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max_interval, |next| next.min(self.max_interval))
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_interval.is_zero() {
            return Err(FlashLoanError::InvalidConfig(
                "tracking initial_interval must be non-zero".to_string(),
            ));
        }
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(FlashLoanError::InvalidConfig(format!(
                "tracking multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_interval < self.initial_interval {
            return Err(FlashLoanError::InvalidConfig(
                "tracking max_interval is shorter than initial_interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the orchestrator watches for the destination-side effect of a flash
/// loan. The effect is produced by the relayer, not by us, so this is a plain
/// fixed-interval read loop with its own bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationConfig {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for DestinationConfig {
    /// - `poll_interval`: 2s
    /// - `max_wait`: 5 minutes
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(300),
        }
    }
}

impl DestinationConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(FlashLoanError::InvalidConfig(
                "destination poll_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything tunable about an [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    pub retry: RetryConfig,
    pub tracking: TrackingConfig,
    pub destination: DestinationConfig,
    /// Finished operations kept queryable before the oldest are dropped.
    pub retained_operations: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            tracking: TrackingConfig::default(),
            destination: DestinationConfig::default(),
            retained_operations: 1024,
        }
    }
}

impl OrchestratorConfig {
    /// Presets tuned for a local supersim network.
    pub fn local_dev() -> Self {
        Self {
            retry: RetryConfig::default().with_initial_backoff(Duration::from_millis(100)),
            tracking: TrackingConfig::fast(),
            destination: DestinationConfig::default()
                .with_poll_interval(Duration::from_millis(500))
                .with_max_wait(Duration::from_secs(60)),
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_tracking(mut self, tracking: TrackingConfig) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn with_destination(mut self, destination: DestinationConfig) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_retained_operations(mut self, retained: usize) -> Self {
        self.retained_operations = retained;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        self.tracking.validate()?;
        self.destination.validate()
    }
}
