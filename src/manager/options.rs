//! Connection options and reconnect policy.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use console_link::{ConnectionOptions, RetryPolicy};
//!
//! let options = ConnectionOptions::new("ws://localhost:8000/ws")
//!     .with_retry(RetryPolicy::exponential(
//!         Duration::from_secs(1),
//!         Duration::from_secs(30),
//!         5,
//!     ))
//!     .with_open_timeout(Duration::from_secs(5));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default backend WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";

/// Default delay between attempts for [`RetryPolicy::Fixed`].
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3000);

/// Default first delay for [`RetryPolicy::Exponential`].
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default delay cap for [`RetryPolicy::Exponential`].
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Default number of consecutive failures before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// RetryPolicy
// ============================================================================

/// How long to wait before each reconnect, and when to stop.
///
/// The delay depends only on the number of failures so far, so a given
/// attempt counter always yields the same delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Same delay before every attempt.
    Fixed {
        /// Delay before each reconnect.
        delay: Duration,
        /// Failures after which the link enters the terminal error state.
        max_attempts: u32,
    },

    /// Delay doubles per failure: `min(base_delay * 2^n, max_delay)`.
    Exponential {
        /// Delay before the first reconnect.
        base_delay: Duration,
        /// Upper bound for any delay.
        max_delay: Duration,
        /// Failures after which the link enters the terminal error state.
        max_attempts: u32,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_DELAY, DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Creates a fixed-delay policy.
    #[inline]
    #[must_use]
    pub const fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self::Fixed {
            delay,
            max_attempts,
        }
    }

    /// Creates an exponential backoff policy.
    #[inline]
    #[must_use]
    pub const fn exponential(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self::Exponential {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Returns the failure count at which retrying stops.
    #[inline]
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        match *self {
            Self::Fixed { max_attempts, .. } | Self::Exponential { max_attempts, .. } => {
                max_attempts
            }
        }
    }

    /// Returns the delay before the reconnect that follows `prior_failures`
    /// earlier failures (0 for the first reconnect).
    #[must_use]
    pub fn delay_for(&self, prior_failures: u32) -> Duration {
        match *self {
            Self::Fixed { delay, .. } => delay,
            Self::Exponential {
                base_delay,
                max_delay,
                ..
            } => {
                let factor = 2u32.checked_pow(prior_failures).unwrap_or(u32::MAX);
                base_delay
                    .checked_mul(factor)
                    .map_or(max_delay, |delay| delay.min(max_delay))
            }
        }
    }

    /// Returns `true` once `attempts` failures exhaust the budget.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts()
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the attempt budget is zero or the
    /// exponential cap is below the base delay.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts() == 0 {
            return Err(Error::config("max_attempts must be at least 1"));
        }

        if let Self::Exponential {
            base_delay,
            max_delay,
            ..
        } = *self
            && max_delay < base_delay
        {
            return Err(Error::config(format!(
                "max_delay ({max_delay:?}) must not be below base_delay ({base_delay:?})"
            )));
        }

        Ok(())
    }
}

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Everything the manager needs to reach the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// WebSocket endpoint.
    pub url: String,

    /// Reconnect policy.
    pub retry: RetryPolicy,

    /// Time allowed for one open attempt.
    pub open_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new(DEFAULT_WS_URL)
    }
}

impl ConnectionOptions {
    /// Creates options for `url` with the default policy and timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry: RetryPolicy::default(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the open timeout.
    #[inline]
    #[must_use]
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the URL does not parse
    /// - [`Error::InvalidUrl`] if the scheme is not `ws` or `wss`
    /// - [`Error::Config`] if the retry policy or timeout is invalid
    pub fn validate(&self) -> Result<()> {
        validate_ws_url(&self.url)?;
        self.retry.validate()?;

        if self.open_timeout.is_zero() {
            return Err(Error::config("open_timeout must be greater than zero"));
        }

        Ok(())
    }
}

/// Checks that `url` parses and uses a WebSocket scheme.
pub(crate) fn validate_ws_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(Error::invalid_url(
            url,
            format!("expected ws or wss scheme, got {other}"),
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_fixed() {
        let policy = RetryPolicy::default();
        assert_eq!(policy, RetryPolicy::fixed(Duration::from_millis(3000), 5));
        assert_eq!(policy.max_attempts(), 5);
    }

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(Duration::from_millis(3000), 5);
        for n in 0..10 {
            assert_eq!(policy.delay_for(n), Duration::from_millis(3000));
        }
    }

    #[test]
    fn test_exponential_delay_doubles_then_caps() {
        let policy = RetryPolicy::exponential(
            Duration::from_millis(1000),
            Duration::from_millis(30_000),
            10,
        );
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(16_000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(200), Duration::from_millis(30_000));
    }

    #[test]
    fn test_exhaustion() {
        let policy = RetryPolicy::fixed(Duration::from_millis(10), 3);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let policy = RetryPolicy::fixed(Duration::from_millis(10), 0);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_caps() {
        let policy =
            RetryPolicy::exponential(Duration::from_secs(10), Duration::from_secs(1), 3);
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("max_delay"));
    }

    #[test]
    fn test_options_defaults() {
        let options = ConnectionOptions::default();
        assert_eq!(options.url, DEFAULT_WS_URL);
        assert_eq!(options.open_timeout, DEFAULT_OPEN_TIMEOUT);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_reject_http_scheme() {
        let options = ConnectionOptions::new("http://localhost:8000/ws");
        let err = options.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn test_options_reject_garbage_url() {
        let options = ConnectionOptions::new("not a url");
        assert!(matches!(options.validate().unwrap_err(), Error::Url(_)));
    }

    #[test]
    fn test_options_reject_zero_timeout() {
        let options = ConnectionOptions::default().with_open_timeout(Duration::ZERO);
        assert!(options.validate().is_err());
    }
}
