//! The manager's control loop.
//!
//! One tokio task per manager owns the [`StateMachine`], the socket and the
//! retry timer. It waits on whichever of these is pending:
//!
//! - Commands from the [`ConnectionManager`](crate::ConnectionManager) handle
//! - The open attempt in progress
//! - The next frame from the live socket
//! - The retry timer
//!
//! Each wake-up becomes one or more [`Input`]s. Their [`Effect`]s are carried
//! out before the next wake-up, so callbacks see events in arrival order and
//! a cancelled timer can never fire.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::future::{Future, pending};
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{mpsc, watch};
use tokio::time::{Sleep, sleep};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::identifiers::{RetryToken, SocketId};
use crate::manager::listeners::Listeners;
use crate::protocol::ConnectionState;

use super::machine::{Effect, Input, StateMachine};
use super::socket::{Connector, Frame, Socket};

// ============================================================================
// Types
// ============================================================================

/// Future resolving to a freshly opened socket.
type OpenFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Socket>>> + Send>>;

/// Requests from the handle to the loop.
#[derive(Debug)]
pub(crate) enum Command {
    /// Start connecting.
    Connect,
    /// Stop connecting and close the socket.
    Disconnect,
    /// Send a serialized message if connected.
    Send(String),
    /// Disconnect and stop the loop.
    Shutdown,
}

/// What woke the loop up.
enum Wake {
    Command(Option<Command>),
    Opened(SocketId, Result<Box<dyn Socket>>),
    Frame(SocketId, Option<Result<Frame>>),
    RetryElapsed(RetryToken),
}

// ============================================================================
// EventLoop
// ============================================================================

/// Owns all mutable connection state.
pub(crate) struct EventLoop {
    /// Transition logic.
    machine: StateMachine,
    /// Opens sockets.
    connector: Arc<dyn Connector>,
    /// Endpoint.
    url: String,
    /// Commands from the handle.
    commands: mpsc::UnboundedReceiver<Command>,
    /// Callbacks.
    listeners: Arc<Listeners>,
    /// Published state snapshots.
    state_tx: watch::Sender<ConnectionState>,
    /// Open attempt in progress.
    opening: Option<(SocketId, OpenFuture)>,
    /// Socket whose handshake completed.
    live: Option<(SocketId, Box<dyn Socket>)>,
    /// Retry timer.
    retry: Option<(RetryToken, Pin<Box<Sleep>>)>,
    /// Inputs produced while carrying out effects.
    follow_up: VecDeque<Input>,
}

impl EventLoop {
    /// Creates the loop. Call [`run`](Self::run) on a spawned task.
    pub fn new(
        machine: StateMachine,
        connector: Arc<dyn Connector>,
        url: String,
        commands: mpsc::UnboundedReceiver<Command>,
        listeners: Arc<Listeners>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            machine,
            connector,
            url,
            commands,
            listeners,
            state_tx,
            opening: None,
            live: None,
            retry: None,
            follow_up: VecDeque::new(),
        }
    }

    /// Runs until shutdown is requested or the handle is dropped.
    pub async fn run(mut self) {
        debug!(url = %self.url, "Control loop started");

        loop {
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),

                (socket, result) = wait_open(&mut self.opening), if self.opening.is_some() => {
                    Wake::Opened(socket, result)
                }

                (socket, frame) = next_frame(&mut self.live), if self.live.is_some() => {
                    Wake::Frame(socket, frame)
                }

                token = wait_retry(&mut self.retry), if self.retry.is_some() => {
                    Wake::RetryElapsed(token)
                }
            };

            let inputs = match wake {
                Wake::Command(Some(Command::Connect)) => vec![Input::Connect],
                Wake::Command(Some(Command::Disconnect)) => vec![Input::Disconnect],
                Wake::Command(Some(Command::Send(text))) => vec![Input::Send(text)],
                Wake::Command(Some(Command::Shutdown) | None) => break,

                Wake::Opened(socket, Ok(opened)) => {
                    self.opening = None;
                    self.live = Some((socket, opened));
                    vec![Input::Opened(socket)]
                }
                Wake::Opened(socket, Err(e)) => {
                    self.opening = None;
                    vec![Input::OpenFailed {
                        socket,
                        reason: e.to_string(),
                    }]
                }

                Wake::Frame(socket, Some(Ok(Frame::Text(text)))) => {
                    vec![Input::Frame { socket, text }]
                }
                Wake::Frame(socket, Some(Ok(Frame::Close(reason)))) => {
                    if let Some((_, mut live)) = self.live.take()
                        && let Err(e) = live.close().await
                    {
                        debug!(%socket, error = %e, "Error while finishing close handshake");
                    }
                    vec![Input::Closed { socket, reason }]
                }
                Wake::Frame(socket, Some(Err(e))) => {
                    self.live = None;
                    let reason = e.to_string();
                    vec![
                        Input::SocketError {
                            socket,
                            reason: reason.clone(),
                        },
                        Input::Closed {
                            socket,
                            reason: Some(reason),
                        },
                    ]
                }
                Wake::Frame(socket, None) => {
                    self.live = None;
                    vec![Input::Closed {
                        socket,
                        reason: None,
                    }]
                }

                Wake::RetryElapsed(token) => {
                    self.retry = None;
                    vec![Input::RetryElapsed(token)]
                }
            };

            self.process(inputs).await;
        }

        self.teardown().await;
        debug!("Control loop terminated");
    }

    /// Feeds inputs, and anything they cause, through the machine.
    async fn process(&mut self, inputs: Vec<Input>) {
        self.follow_up.extend(inputs);

        while let Some(input) = self.follow_up.pop_front() {
            let effects = self.machine.handle(input, SystemTime::now());
            self.publish_state();

            for effect in effects {
                self.perform(effect).await;
            }
        }
    }

    /// Makes the latest state visible to `state()` callers before callbacks run.
    fn publish_state(&self) {
        let current = self.machine.state();
        self.state_tx.send_if_modified(|published| {
            if *published == *current {
                return false;
            }
            *published = current.clone();
            true
        });
    }

    async fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::Open(socket) => {
                let connector = Arc::clone(&self.connector);
                let url = self.url.clone();
                debug!(%socket, url = %url, "Opening socket");
                self.opening = Some((socket, Box::pin(async move { connector.open(&url).await })));
            }

            Effect::Close(socket) => {
                if self.opening.as_ref().is_some_and(|(id, _)| *id == socket) {
                    debug!(%socket, "Abandoning open attempt");
                    self.opening = None;
                }

                if self.live.as_ref().is_some_and(|(id, _)| *id == socket)
                    && let Some((_, mut live)) = self.live.take()
                    && let Err(e) = live.close().await
                {
                    debug!(%socket, error = %e, "Error while closing socket");
                }
            }

            Effect::ScheduleRetry { token, delay } => {
                self.retry = Some((token, Box::pin(sleep(delay))));
            }

            Effect::CancelRetry(token) => {
                if self.retry.as_ref().is_some_and(|(pending, _)| *pending == token) {
                    self.retry = None;
                }
            }

            Effect::Transmit(text) => {
                let Some((socket, live)) = self.live.as_mut() else {
                    return;
                };
                let socket = *socket;

                let result = live.send_text(text).await;
                if let Err(e) = result {
                    warn!(%socket, error = %e, "Failed to send message");
                    self.live = None;
                    let reason = e.to_string();
                    self.follow_up.push_back(Input::SocketError {
                        socket,
                        reason: reason.clone(),
                    });
                    self.follow_up.push_back(Input::Closed {
                        socket,
                        reason: Some(reason),
                    });
                }
            }

            Effect::StatusChanged(state) => {
                info!(status = %state.status, attempts = state.reconnect_attempts, "Status changed");
                self.listeners.notify_status(&state);
            }

            Effect::Dispatch(message) => {
                self.listeners.dispatch(&message);
            }
        }
    }

    /// Releases the timer and socket on every exit path.
    async fn teardown(&mut self) {
        self.process(vec![Input::Disconnect]).await;

        self.retry = None;
        self.opening = None;
        if let Some((socket, mut live)) = self.live.take()
            && let Err(e) = live.close().await
        {
            debug!(%socket, error = %e, "Error while closing socket");
        }
    }
}

// ============================================================================
// Wait Helpers
// ============================================================================

async fn wait_open(opening: &mut Option<(SocketId, OpenFuture)>) -> (SocketId, Result<Box<dyn Socket>>) {
    match opening {
        Some((socket, future)) => (*socket, future.await),
        None => pending().await,
    }
}

async fn next_frame(live: &mut Option<(SocketId, Box<dyn Socket>)>) -> (SocketId, Option<Result<Frame>>) {
    match live {
        Some((socket, stream)) => (*socket, stream.next_frame().await),
        None => pending().await,
    }
}

async fn wait_retry(retry: &mut Option<(RetryToken, Pin<Box<Sleep>>)>) -> RetryToken {
    match retry {
        Some((token, timer)) => {
            timer.await;
            *token
        }
        None => pending().await,
    }
}
