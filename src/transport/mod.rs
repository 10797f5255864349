//! WebSocket transport layer.
//!
//! This module keeps one socket to the backend alive and decides what to do
//! when it fails.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   Command    ┌──────────────────────────────┐
//! │  ConnectionManager   │─────────────►│  EventLoop (one tokio task)  │
//! │  (handle)            │◄─────────────│                              │
//! └──────────────────────┘  watch state │  StateMachine ──► Effects    │
//!                                       │       ▲              │       │
//!                                       │    Inputs            ▼       │
//!                                       │  socket / timer   Connector  │
//!                                       └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `machine` | Transition logic, free of I/O |
//! | `socket` | `Socket`/`Connector` traits and the tungstenite client |
//! | `event_loop` | Task that drives the machine |

// ============================================================================
// Submodules
// ============================================================================

/// Control loop task.
pub(crate) mod event_loop;

/// Connection state machine.
pub mod machine;

/// Socket abstraction and WebSocket client.
pub mod socket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use machine::{Effect, Input, StateMachine};
pub use socket::{Connector, Frame, Socket, WsConnector};
