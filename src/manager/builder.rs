//! Builder pattern for manager configuration.
//!
//! Provides a fluent API for configuring and creating [`ConnectionManager`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use console_link::ConnectionManager;
//!
//! # async fn example() -> console_link::Result<()> {
//! let manager = ConnectionManager::builder()
//!     .url("wss://console.example.com/ws")
//!     .exponential_backoff(Duration::from_secs(1), Duration::from_secs(30), 8)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::transport::Connector;

use super::core::ConnectionManager;
use super::options::{ConnectionOptions, RetryPolicy};

// ============================================================================
// ConnectionManagerBuilder
// ============================================================================

/// Builder for configuring a [`ConnectionManager`] instance.
///
/// Use [`ConnectionManager::builder()`] to create a new builder. Unset
/// fields fall back to [`ConnectionOptions::default()`].
#[derive(Default, Clone)]
pub struct ConnectionManagerBuilder {
    /// Options being assembled.
    options: ConnectionOptions,
    /// Custom socket factory.
    connector: Option<Arc<dyn Connector>>,
}

impl fmt::Debug for ConnectionManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManagerBuilder")
            .field("options", &self.options)
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}

// ============================================================================
// ConnectionManagerBuilder Implementation
// ============================================================================

impl ConnectionManagerBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket endpoint.
    ///
    /// # Arguments
    ///
    /// * `url` - `ws://` or `wss://` URL (e.g., "ws://localhost:8000/ws")
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.options.url = url.into();
        self
    }

    /// Sets the reconnect policy directly.
    #[inline]
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.options.retry = policy;
        self
    }

    /// Retries after a constant delay.
    ///
    /// # Arguments
    ///
    /// * `delay` - Wait before each reconnect
    /// * `max_attempts` - Consecutive failures before giving up
    #[inline]
    #[must_use]
    pub fn fixed_delay(self, delay: Duration, max_attempts: u32) -> Self {
        self.retry_policy(RetryPolicy::fixed(delay, max_attempts))
    }

    /// Retries with a doubling delay capped at `max_delay`.
    ///
    /// # Arguments
    ///
    /// * `base_delay` - Wait before the first reconnect
    /// * `max_delay` - Upper bound for any wait
    /// * `max_attempts` - Consecutive failures before giving up
    #[inline]
    #[must_use]
    pub fn exponential_backoff(
        self,
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        self.retry_policy(RetryPolicy::exponential(base_delay, max_delay, max_attempts))
    }

    /// Sets how long one open attempt may take.
    #[inline]
    #[must_use]
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.options.open_timeout = timeout;
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Opens sockets through `connector` instead of `tokio-tungstenite`.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Builds the manager with validation.
    ///
    /// Must be called inside a tokio runtime. The manager starts
    /// `disconnected`.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`](crate::Error::Url) if the URL does not parse
    /// - [`Error::InvalidUrl`](crate::Error::InvalidUrl) if the scheme is not `ws`/`wss`
    /// - [`Error::Config`](crate::Error::Config) if the policy or timeout is invalid,
    ///   or no runtime is running
    pub fn build(self) -> Result<ConnectionManager> {
        match self.connector {
            Some(connector) => ConnectionManager::with_connector(self.options, connector),
            None => ConnectionManager::new(self.options),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
