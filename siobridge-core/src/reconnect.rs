//! Reconnection utilities with exponential backoff support.
//!
//! The runtime thread consults a [`ReconnectState`] whenever a link drops or
//! an open attempt fails. The state decides whether another attempt is
//! allowed and how long to wait before it.

use rand::Rng;
use std::time::Duration;

use crate::options::ClientOptions;

/// Reconnection state tracker for managing connection attempts and backoff.
///
/// # Example
///
/// ```rust
/// use siobridge_core::reconnect::ReconnectState;
/// use siobridge_core::options::ClientOptions;
/// use std::time::Duration;
///
/// let options = ClientOptions::default()
///     .with_reconnect_delay(Duration::from_millis(100))
///     .with_reconnect_delay_max(Duration::from_secs(10))
///     .with_randomization_factor(0.0);
///
/// let mut reconnect = ReconnectState::new(&options);
///
/// // First attempt uses base interval
/// assert_eq!(reconnect.next_attempt(), Some((1, Duration::from_millis(100))));
///
/// // Subsequent attempts use exponential backoff
/// assert_eq!(reconnect.next_attempt(), Some((2, Duration::from_millis(200))));
///
/// // Reset on successful connection
/// reconnect.reset();
/// assert_eq!(reconnect.next_attempt(), Some((1, Duration::from_millis(100))));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectState {
    /// Base reconnection interval
    base_interval: Duration,
    /// Maximum reconnection interval
    max_interval: Duration,
    /// Attempt limit (`None` = unlimited)
    max_attempts: Option<u32>,
    /// Jitter fraction
    randomization: f64,
    /// Attempts made since the last reset
    attempt: u32,
    /// Un-jittered interval for the next attempt
    current_interval: Duration,
}

impl ReconnectState {
    /// Create a new reconnection state tracker from client options.
    #[must_use]
    pub fn new(options: &ClientOptions) -> Self {
        Self {
            base_interval: options.reconnect_delay,
            max_interval: options.reconnect_delay_max.max(options.reconnect_delay),
            max_attempts: options.effective_attempts(),
            randomization: options.randomization_factor,
            attempt: 0,
            current_interval: options.reconnect_delay,
        }
    }

    /// Returns true once the attempt limit has been used up.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        matches!(self.max_attempts, Some(max) if self.attempt >= max)
    }

    /// Claim the next attempt.
    ///
    /// Returns the 1-based attempt number and the delay to wait before it, or
    /// `None` when the attempt limit is reached.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.exhausted() {
            return None;
        }

        let delay = self.jittered(self.current_interval);

        self.attempt = self.attempt.saturating_add(1);
        self.current_interval = self
            .base_interval
            .checked_mul(1_u32 << self.attempt.min(10))
            .unwrap_or(self.max_interval)
            .min(self.max_interval);

        Some((self.attempt, delay))
    }

    fn jittered(&self, interval: Duration) -> Duration {
        if self.randomization <= 0.0 || interval.is_zero() {
            return interval;
        }
        let spread = interval.as_secs_f64() * self.randomization;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((interval.as_secs_f64() + offset).max(0.0)).min(self.max_interval)
    }

    /// Reset the reconnection state after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_interval = self.base_interval;
    }

    /// Get the number of attempts made since the last reset.
    #[inline]
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Get the current (un-jittered) reconnection interval.
    #[inline]
    #[must_use]
    pub const fn current_interval(&self) -> Duration {
        self.current_interval
    }
}
