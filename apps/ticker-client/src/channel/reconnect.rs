//! Reopen Backoff
//!
//! Delays between attempts to reopen a faulted channel. The first reopen
//! happens immediately; this policy only paces the retries that follow a
//! failed reopen.

use std::time::Duration;

use rand::Rng;

/// Backoff configuration for channel recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Same backoff without randomization.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }
}

/// Stateful exponential backoff with jitter.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy at attempt zero.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        let base = self.base_delay(self.attempt_count);
        self.attempt_count = self.attempt_count.saturating_add(1);
        Some(self.apply_jitter(base))
    }

    /// Start over after a successful reopen.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts handed out so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// `initial * multiplier^attempt`, capped at `max_delay`.
    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.powi(exponent);
        let scaled = self.config.initial_delay.as_secs_f64() * factor;
        if !scaled.is_finite() || scaled >= self.config.max_delay.as_secs_f64() {
            return self.config.max_delay;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.config.jitter_factor;
        let offset: f64 = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.001))
    }
}
