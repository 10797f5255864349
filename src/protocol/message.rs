//! Message types carried over the WebSocket.
//!
//! Every text frame is a JSON object with a `type` tag and an opaque body,
//! found under `data` or, from older backends, `payload`.
//!
//! # Format
//!
//! ```json
//! { "type": "data_update", "data": { "table": "users" } }
//! ```
//!
//! # Known Types
//!
//! | Type | Kind | Domain |
//! |------|------|--------|
//! | `data_update` | [`MessageKind::DataUpdate`] | `data` |
//! | `log` | [`MessageKind::Log`] | `logs` |
//! | `brain_update` | [`MessageKind::BrainUpdate`] | `brain` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::invalidation;

// ============================================================================
// Constants
// ============================================================================

/// Message type announcing changed table data.
pub const DATA_UPDATE: &str = "data_update";

/// Message type carrying a new backend log entry.
pub const LOG: &str = "log";

/// Message type announcing new memory visualizer data.
pub const BRAIN_UPDATE: &str = "brain_update";

// ============================================================================
// InboundMessage
// ============================================================================

/// A message received from the backend.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InboundMessage {
    /// Message type tag.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Message body. `null` when absent.
    #[serde(default, alias = "payload")]
    pub data: Value,
}

impl InboundMessage {
    /// Creates a message directly.
    #[inline]
    #[must_use]
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
        }
    }

    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not valid JSON or has no string `type`
    /// - [`Error::Protocol`] if the frame is valid JSON but not an object
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        if !value.is_object() {
            return Err(Error::protocol(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Returns the classified message kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        MessageKind::from(self.message_type.as_str())
    }
}

/// Names a JSON value's type for error messages.
fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// OutboundMessage
// ============================================================================

/// A message sent to the backend, using the same envelope as inbound ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    /// Message type tag.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Message body.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl OutboundMessage {
    /// Creates an outbound message.
    #[inline]
    #[must_use]
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
        }
    }
}

// ============================================================================
// MessageKind
// ============================================================================

/// Classification of a message type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `data_update`: table contents changed.
    DataUpdate,
    /// `log`: a new log entry.
    Log,
    /// `brain_update`: memory visualizer data changed.
    BrainUpdate,
    /// Any other type.
    Other(String),
}

impl MessageKind {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::DataUpdate => DATA_UPDATE,
            Self::Log => LOG,
            Self::BrainUpdate => BRAIN_UPDATE,
            Self::Other(name) => name,
        }
    }

    /// Returns the cached data domain this kind invalidates, if any.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> Option<&'static str> {
        match self {
            Self::DataUpdate => Some(invalidation::DATA),
            Self::Log => Some(invalidation::LOGS),
            Self::BrainUpdate => Some(invalidation::BRAIN),
            Self::Other(_) => None,
        }
    }
}

impl From<&str> for MessageKind {
    fn from(name: &str) -> Self {
        match name {
            DATA_UPDATE => Self::DataUpdate,
            LOG => Self::Log,
            BRAIN_UPDATE => Self::BrainUpdate,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
