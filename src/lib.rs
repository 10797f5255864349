//! Console Link - Self-healing WebSocket link for an admin console.
//!
//! This library keeps a single WebSocket connection to the console backend
//! alive, reports where it stands through a small status state machine and
//! routes pushed messages to registered handlers.
//!
//! # Architecture
//!
//! The manager follows a handle/loop model:
//!
//! - **Handle ([`ConnectionManager`])**: Cheap to call from anywhere, forwards
//!   commands and reads published state
//! - **Control loop**: One tokio task owning the socket, the retry timer and
//!   the transition logic
//!
//! Key design principles:
//!
//! - At most one live socket per manager
//! - Transitions are computed by a pure [`StateMachine`], so timing and retry
//!   behavior is testable without a network
//! - Stale events from replaced sockets or cancelled timers are ignored
//! - No global instance: create a manager and pass it around
//!
//! # Quick Start
//!
//! ```no_run
//! use console_link::{ConnectionManager, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = ConnectionManager::builder()
//!         .url("ws://localhost:8000/ws")
//!         .build()?;
//!
//!     manager.on_status_change(|state| {
//!         println!("{} (attempts: {})", state.status.label(), state.reconnect_attempts);
//!     });
//!     manager.on_message("log", |message| println!("log: {}", message.data));
//!
//!     manager.connect()?;
//!     tokio::signal::ctrl_c().await?;
//!     manager.shutdown().await;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`manager`] | [`ConnectionManager`], builder, options, retry policy |
//! | [`protocol`] | Status types and message envelopes |
//! | [`transport`] | State machine, socket traits, control loop |
//! | [`invalidation`] | Per-domain change counters fed by push messages |
//! | [`settings`] | Persisted endpoint settings |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for sockets, timers and listeners.
pub mod identifiers;

/// Per-domain invalidation driven by push messages.
pub mod invalidation;

/// Connection manager handle and configuration.
///
/// Use [`ConnectionManager::builder()`] to create a configured manager.
pub mod manager;

/// Status types and message envelopes.
pub mod protocol;

/// Persisted client settings.
pub mod settings;

/// Transport layer.
///
/// Connection state machine, socket abstraction and the control loop.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Manager types
pub use manager::{
    ConnectionManager, ConnectionManagerBuilder, ConnectionOptions, MessageHandler, RetryPolicy,
    StatusObserver,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ListenerId, RetryToken, SocketId};

// Protocol types
pub use protocol::{ConnectionState, ConnectionStatus, InboundMessage, MessageKind, OutboundMessage};

// Transport types
pub use transport::{Connector, Effect, Frame, Input, Socket, StateMachine, WsConnector};

// Other types
pub use invalidation::InvalidationTracker;
pub use settings::Settings;
