//! Connection manager.
//!
//! The public face of the crate: an owned handle that keeps one WebSocket
//! alive, reports its status and routes inbound messages.
//!
//! # Example
//!
//! ```no_run
//! use console_link::ConnectionManager;
//!
//! # async fn example() -> console_link::Result<()> {
//! let manager = ConnectionManager::builder().build()?;
//! manager.on_status_change(|state| println!("{}", state.status.label()));
//! manager.connect()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Manager builder.
pub mod builder;

/// Manager handle.
pub mod core;

/// Observer and handler registry.
pub mod listeners;

/// Connection options and retry policy.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionManagerBuilder;
pub use self::core::ConnectionManager;
pub use listeners::{MessageHandler, StatusObserver};
pub use options::{
    ConnectionOptions, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    DEFAULT_OPEN_TIMEOUT, DEFAULT_RETRY_DELAY, DEFAULT_WS_URL, RetryPolicy,
};
