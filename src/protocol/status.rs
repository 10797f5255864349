//! Connection status and the observable connection state.
//!
//! [`ConnectionState`] is owned and mutated by the state machine only.
//! Everything else sees cloned snapshots.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Connectivity of the link to the backend.
///
/// Exactly one value is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No socket and no retry pending.
    #[default]
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// The socket is open.
    Connected,
    /// Waiting for the retry timer before the next open attempt.
    Reconnecting,
    /// A transport error was reported, or retries are exhausted.
    Error,
}

impl ConnectionStatus {
    /// Returns the lowercase wire name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }

    /// Returns a short label for a status indicator.
    #[inline]
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting...",
            Self::Error => "Connection error",
        }
    }

    /// Returns `true` if the socket is open.
    #[inline]
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ConnectionState
// ============================================================================

/// Snapshot of everything the link exposes to observers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// Current status.
    pub status: ConnectionStatus,

    /// Time of the last successful open or processed inbound message.
    ///
    /// Never moves backward.
    pub last_sync_time: Option<SystemTime>,

    /// Human-readable cause of the last failure.
    pub error_message: Option<String>,

    /// Consecutive failed attempts since the last successful open.
    pub reconnect_attempts: u32,
}

impl ConnectionState {
    /// Creates the initial state: disconnected, never synced, no error.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the socket is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// Returns how long ago the last sync happened, relative to `now`.
    ///
    /// `None` if the link never synced or the clock went backwards.
    #[must_use]
    pub fn since_last_sync(&self, now: SystemTime) -> Option<Duration> {
        self.last_sync_time
            .and_then(|synced| now.duration_since(synced).ok())
    }

    /// Advances `last_sync_time` to `at` unless it already is later.
    pub(crate) fn mark_synced(&mut self, at: SystemTime) {
        self.last_sync_time = Some(match self.last_sync_time {
            Some(previous) if previous > at => previous,
            _ => at,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
