//! Connection state machine.
//!
//! [`StateMachine`] holds the [`ConnectionState`] and decides every
//! transition. It performs no I/O: each [`Input`] returns the ordered
//! [`Effect`]s the event loop must carry out.
//!
//! # Transitions
//!
//! ```text
//!                connect()
//! disconnected ────────────► connecting ──── opened ────► connected
//!      ▲                      │    ▲                          │
//!      │ disconnect()         │    │ retry timer              │ closed
//!      │ (from any state)     ▼    │                          ▼
//!      └──────────────── reconnecting ◄───── failure ─────────┘
//!                             │
//!                             │ attempts == max
//!                             ▼
//!                           error  (only connect() resumes)
//! ```
//!
//! A transport error on a live socket also sets `error`, carrying the cause.
//! The close that follows it is handled like any other failure, so the link
//! keeps retrying until the attempt budget runs out.
//!
//! # Stale Inputs
//!
//! Each open attempt gets a fresh [`SocketId`] and each scheduled retry a
//! fresh [`RetryToken`]. Inputs naming anything else are ignored, which is
//! what makes `disconnect()` win over a retry that is already in flight.

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, SystemTime};

use tracing::{debug, info, trace, warn};

use crate::identifiers::{RetryToken, SocketId};
use crate::manager::RetryPolicy;
use crate::protocol::{ConnectionState, ConnectionStatus, InboundMessage};

// ============================================================================
// Input
// ============================================================================

/// Something that happened: an API call, a socket event or a timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// `connect()` was called.
    Connect,
    /// `disconnect()` was called.
    Disconnect,
    /// The socket finished its handshake.
    Opened(SocketId),
    /// The socket could not be opened.
    OpenFailed {
        /// Socket that failed.
        socket: SocketId,
        /// Cause.
        reason: String,
    },
    /// The transport reported an error.
    SocketError {
        /// Socket that errored.
        socket: SocketId,
        /// Cause.
        reason: String,
    },
    /// The socket closed.
    Closed {
        /// Socket that closed.
        socket: SocketId,
        /// Close reason, if the peer gave one.
        reason: Option<String>,
    },
    /// A text frame arrived.
    Frame {
        /// Socket the frame arrived on.
        socket: SocketId,
        /// Raw frame text.
        text: String,
    },
    /// A scheduled retry timer fired.
    RetryElapsed(RetryToken),
    /// `send()` was called with serialized text.
    Send(String),
}

// ============================================================================
// Effect
// ============================================================================

/// Work the event loop must do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start opening a new socket.
    Open(SocketId),
    /// Close (or abandon the opening of) a socket.
    Close(SocketId),
    /// Start a retry timer.
    ScheduleRetry {
        /// Token the timer reports back with.
        token: RetryToken,
        /// Delay before it fires.
        delay: Duration,
    },
    /// Stop a retry timer.
    CancelRetry(RetryToken),
    /// Write a text frame on the live socket.
    Transmit(String),
    /// Notify status observers.
    StatusChanged(ConnectionState),
    /// Deliver a parsed message to handlers.
    Dispatch(InboundMessage),
}

// ============================================================================
// SocketSlot
// ============================================================================

/// The single transport the machine may own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketSlot {
    Idle,
    Opening(SocketId),
    Open(SocketId),
}

impl SocketSlot {
    fn id(self) -> Option<SocketId> {
        match self {
            Self::Idle => None,
            Self::Opening(id) | Self::Open(id) => Some(id),
        }
    }

    fn holds(self, socket: SocketId) -> bool {
        self.id() == Some(socket)
    }
}

// ============================================================================
// StateMachine
// ============================================================================

/// Connection state machine.
#[derive(Debug, Clone)]
pub struct StateMachine {
    /// Reconnect policy.
    policy: RetryPolicy,
    /// Observable state.
    state: ConnectionState,
    /// Current transport, if any.
    socket: SocketSlot,
    /// Retry timer that has not fired yet.
    pending_retry: Option<RetryToken>,
    /// Id for the next socket.
    next_socket: SocketId,
    /// Token for the next retry.
    next_retry: RetryToken,
    /// Error message observers last saw.
    notified_error: Option<String>,
}

impl StateMachine {
    /// Creates a machine in the initial `disconnected` state.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::new(),
            socket: SocketSlot::Idle,
            pending_retry: None,
            next_socket: SocketId::new(1),
            next_retry: RetryToken::new(1),
            notified_error: None,
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.state.status
    }

    /// Returns the reconnect policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the socket being opened or open, if any.
    #[inline]
    #[must_use]
    pub fn current_socket(&self) -> Option<SocketId> {
        self.socket.id()
    }

    /// Returns the socket if its handshake completed.
    #[inline]
    #[must_use]
    pub fn open_socket(&self) -> Option<SocketId> {
        match self.socket {
            SocketSlot::Open(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the retry timer that is still pending.
    #[inline]
    #[must_use]
    pub fn pending_retry(&self) -> Option<RetryToken> {
        self.pending_retry
    }

    /// Applies one input at wall-clock time `now`.
    pub fn handle(&mut self, input: Input, now: SystemTime) -> Vec<Effect> {
        let mut effects = Vec::new();

        match input {
            Input::Connect => self.on_connect(&mut effects),
            Input::Disconnect => self.on_disconnect(&mut effects),
            Input::Opened(socket) => self.on_opened(socket, now, &mut effects),
            Input::OpenFailed { socket, reason } => {
                if self.socket == SocketSlot::Opening(socket) {
                    debug!(%socket, %reason, "Open failed");
                    self.socket = SocketSlot::Idle;
                    self.on_failure(reason, &mut effects);
                } else {
                    trace!(%socket, "Ignoring open failure of stale socket");
                }
            }
            Input::SocketError { socket, reason } => {
                if self.socket.holds(socket) {
                    warn!(%socket, %reason, "Socket error");
                    self.state.error_message = Some(reason);
                    self.transition(ConnectionStatus::Error, &mut effects);
                } else {
                    trace!(%socket, "Ignoring error of stale socket");
                }
            }
            Input::Closed { socket, reason } => {
                if self.socket.holds(socket) {
                    let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                    info!(%socket, %reason, "Socket closed");
                    self.socket = SocketSlot::Idle;
                    self.on_failure(reason, &mut effects);
                } else {
                    trace!(%socket, "Ignoring close of stale socket");
                }
            }
            Input::Frame { socket, text } => self.on_frame(socket, &text, now, &mut effects),
            Input::RetryElapsed(token) => self.on_retry_elapsed(token, &mut effects),
            Input::Send(text) => {
                if self.state.status.is_connected() && self.open_socket().is_some() {
                    effects.push(Effect::Transmit(text));
                } else {
                    debug!(
                        status = %self.state.status,
                        len = text.len(),
                        "Dropping outbound message while not connected"
                    );
                }
            }
        }

        effects
    }

    fn on_connect(&mut self, effects: &mut Vec<Effect>) {
        if let Some(socket) = self.socket.id() {
            trace!(%socket, "connect() ignored, socket already present");
            return;
        }

        self.cancel_retry(effects);
        self.state.reconnect_attempts = 0;
        self.open(effects);
    }

    fn on_disconnect(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_retry(effects);

        if let Some(socket) = self.socket.id() {
            debug!(%socket, "Closing socket on disconnect()");
            effects.push(Effect::Close(socket));
            self.socket = SocketSlot::Idle;
        }

        self.transition(ConnectionStatus::Disconnected, effects);
    }

    fn on_opened(&mut self, socket: SocketId, now: SystemTime, effects: &mut Vec<Effect>) {
        if self.socket == SocketSlot::Open(socket) {
            trace!(%socket, "Ignoring duplicate open");
            return;
        }
        if self.socket != SocketSlot::Opening(socket) {
            // Opened after being abandoned: release it.
            trace!(%socket, "Closing stale socket that finished opening");
            effects.push(Effect::Close(socket));
            return;
        }

        info!(%socket, "Connected");
        self.socket = SocketSlot::Open(socket);
        self.state.reconnect_attempts = 0;
        self.state.error_message = None;
        self.state.mark_synced(now);
        self.transition(ConnectionStatus::Connected, effects);
    }

    fn on_frame(&mut self, socket: SocketId, text: &str, now: SystemTime, effects: &mut Vec<Effect>) {
        if self.socket != SocketSlot::Open(socket) {
            trace!(%socket, "Ignoring frame from stale socket");
            return;
        }

        match InboundMessage::parse(text) {
            Ok(message) => {
                trace!(message_type = %message.message_type, "Frame received");
                self.state.mark_synced(now);
                effects.push(Effect::Dispatch(message));
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping malformed frame");
            }
        }
    }

    fn on_retry_elapsed(&mut self, token: RetryToken, effects: &mut Vec<Effect>) {
        if self.pending_retry != Some(token) {
            trace!(%token, "Ignoring cancelled retry");
            return;
        }
        self.pending_retry = None;

        if self.socket != SocketSlot::Idle || self.policy.is_exhausted(self.state.reconnect_attempts)
        {
            return;
        }

        debug!(attempt = self.state.reconnect_attempts + 1, "Retrying connection");
        self.open(effects);
    }

    /// Counts a failure and either schedules a retry or gives up.
    fn on_failure(&mut self, reason: String, effects: &mut Vec<Effect>) {
        self.state.reconnect_attempts = self.state.reconnect_attempts.saturating_add(1);
        let attempts = self.state.reconnect_attempts;

        if self.policy.is_exhausted(attempts) {
            warn!(attempts, %reason, "Giving up reconnecting");
            self.state.error_message =
                Some(format!("Connection lost after {attempts} attempts: {reason}"));
            self.transition(ConnectionStatus::Error, effects);
            return;
        }

        let token = self.next_retry;
        self.next_retry = token.next();
        self.pending_retry = Some(token);

        let delay = self.policy.delay_for(attempts - 1);
        info!(
            attempts,
            max_attempts = self.policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            %reason,
            "Scheduling reconnect"
        );

        self.state.error_message = Some(reason);
        effects.push(Effect::ScheduleRetry { token, delay });
        self.transition(ConnectionStatus::Reconnecting, effects);
    }

    fn open(&mut self, effects: &mut Vec<Effect>) {
        let socket = self.next_socket;
        self.next_socket = socket.next();
        self.socket = SocketSlot::Opening(socket);

        self.transition(ConnectionStatus::Connecting, effects);
        effects.push(Effect::Open(socket));
    }

    fn cancel_retry(&mut self, effects: &mut Vec<Effect>) {
        if let Some(token) = self.pending_retry.take() {
            debug!(%token, "Cancelling pending retry");
            effects.push(Effect::CancelRetry(token));
        }
    }

    /// Sets the status, notifying observers when it or the error changed.
    fn transition(&mut self, status: ConnectionStatus, effects: &mut Vec<Effect>) {
        let changed =
            self.state.status != status || self.notified_error != self.state.error_message;
        self.state.status = status;

        if changed {
            self.notified_error = self.state.error_message.clone();
            effects.push(Effect::StatusChanged(self.state.clone()));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
