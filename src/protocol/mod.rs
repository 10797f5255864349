//! Data model shared between the state machine and its observers.
//!
//! # Overview
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | [`ConnectionState`] | Local | Status, last sync, error, attempt counter |
//! | [`InboundMessage`] | Remote → Local | Tagged backend notification |
//! | [`OutboundMessage`] | Local → Remote | Tagged client message |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Frame envelope and type classification |
//! | `status` | Connection status and state snapshot |

// ============================================================================
// Submodules
// ============================================================================

/// Frame envelope and type classification.
pub mod message;

/// Connection status and state snapshot.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{BRAIN_UPDATE, DATA_UPDATE, InboundMessage, LOG, MessageKind, OutboundMessage};
pub use status::{ConnectionState, ConnectionStatus};
