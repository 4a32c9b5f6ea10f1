//! Client configuration options
//!
//! Reconnection policy knobs, modeled on the socket.io client options
//! (`reconnection`, `reconnectionAttempts`, `reconnectionDelay`,
//! `reconnectionDelayMax`, `randomizationFactor`).

use std::time::Duration;

/// Client configuration options.
///
/// Options are read when `connect` spawns the runtime thread; changing them
/// afterwards affects the next connection only.
///
/// # Examples
///
/// ```
/// use siobridge_core::options::ClientOptions;
/// use std::time::Duration;
///
/// let opts = ClientOptions::default()
///     .with_reconnect_attempts(Some(3))
///     .with_reconnect_delay(Duration::from_millis(500));
/// assert_eq!(opts.reconnect_attempts, Some(3));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Reconnect after a dropped link or a failed open.
    ///
    /// - Default: `true`
    /// - `false` behaves like `reconnect_attempts = Some(0)`
    pub reconnect: bool,

    /// Maximum number of consecutive reconnection attempts.
    ///
    /// - `None`: unlimited (default)
    /// - `Some(n)`: give up after `n` attempts and report a failure
    pub reconnect_attempts: Option<u32>,

    /// Delay before the first reconnection attempt.
    ///
    /// - Default: 5 seconds
    /// - Doubles on every further attempt up to `reconnect_delay_max`
    pub reconnect_delay: Duration,

    /// Upper bound for the reconnection delay.
    ///
    /// - Default: 25 seconds
    pub reconnect_delay_max: Duration,

    /// Jitter applied to each delay, as a fraction of it.
    ///
    /// - Default: 0.5 (delay drawn from `[0.5 * d, 1.5 * d]`)
    /// - `0.0`: deterministic delays
    pub randomization_factor: f64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_attempts: None,
            reconnect_delay: Duration::from_millis(5000),
            reconnect_delay_max: Duration::from_millis(25000),
            randomization_factor: 0.5,
        }
    }
}

impl ClientOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable reconnection.
    #[must_use]
    pub const fn with_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }

    /// Set the reconnection attempt limit (`None` = unlimited).
    #[must_use]
    pub const fn with_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    /// Set the initial reconnection delay.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the reconnection delay cap.
    #[must_use]
    pub const fn with_reconnect_delay_max(mut self, delay: Duration) -> Self {
        self.reconnect_delay_max = delay;
        self
    }

    /// Set the jitter factor, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Attempt limit after folding in the `reconnect` switch.
    #[must_use]
    pub const fn effective_attempts(&self) -> Option<u32> {
        if self.reconnect {
            self.reconnect_attempts
        } else {
            Some(0)
        }
    }
}
