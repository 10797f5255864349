//! Connection manager handle.
//!
//! The [`ConnectionManager`] is the owned entry point to the link. It holds no
//! connection state itself: every request is forwarded to the control loop,
//! and state is read from the snapshot the loop publishes.
//!
//! # Example
//!
//! ```no_run
//! use console_link::{ConnectionManager, ConnectionStatus};
//!
//! # async fn example() -> console_link::Result<()> {
//! let manager = ConnectionManager::builder()
//!     .url("ws://localhost:8000/ws")
//!     .build()?;
//!
//! manager.on_status_change(|state| println!("status: {}", state.status));
//! manager.on_message("log", |message| println!("log: {}", message.data));
//!
//! manager.connect()?;
//! manager.wait_for_status(ConnectionStatus::Connected).await?;
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::identifiers::ListenerId;
use crate::protocol::{ConnectionState, ConnectionStatus, InboundMessage};
use crate::transport::event_loop::{Command, EventLoop};
use crate::transport::{Connector, StateMachine, WsConnector};

use super::builder::ConnectionManagerBuilder;
use super::listeners::Listeners;
use super::options::ConnectionOptions;

// ============================================================================
// ConnectionManager
// ============================================================================

/// Keeps one WebSocket to the backend alive and reports its status.
///
/// Create one per application and pass it to whatever needs connectivity.
///
/// Dropping the manager only requests teardown: the final `disconnected`
/// notification, and a frame the loop has already picked up, may still reach
/// callbacks after `drop` returns. [`shutdown`](Self::shutdown) is the only
/// way to be sure no callback runs afterwards.
pub struct ConnectionManager {
    /// Channel to the control loop.
    command_tx: mpsc::UnboundedSender<Command>,
    /// Latest published state.
    state_rx: watch::Receiver<ConnectionState>,
    /// Registered callbacks (shared with the control loop).
    listeners: Arc<Listeners>,
    /// Options the manager was built with.
    options: ConnectionOptions,
    /// Control loop task, taken on shutdown.
    task: Mutex<Option<JoinHandle<()>>>,
}

// ============================================================================
// ConnectionManager - Display
// ============================================================================

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.options.url)
            .field("status", &self.status())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Lifecycle
// ============================================================================

impl ConnectionManager {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new()
    }

    /// Creates a manager that connects with `tokio-tungstenite`.
    ///
    /// The manager starts `disconnected`; call [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid or no tokio runtime is running
    /// - [`Error::InvalidUrl`] / [`Error::Url`] if the URL is unusable
    pub fn new(options: ConnectionOptions) -> Result<Self> {
        let connector = Arc::new(WsConnector::new(options.open_timeout));
        Self::with_connector(options, connector)
    }

    /// Creates a manager that opens sockets through `connector`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_connector(options: ConnectionOptions, connector: Arc<dyn Connector>) -> Result<Self> {
        options.validate()?;

        let runtime = Handle::try_current()
            .map_err(|_| Error::config("ConnectionManager must be created inside a tokio runtime"))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::new());
        let listeners = Arc::new(Listeners::new());

        let event_loop = EventLoop::new(
            StateMachine::new(options.retry),
            connector,
            options.url.clone(),
            command_rx,
            Arc::clone(&listeners),
            state_tx,
        );
        let task = runtime.spawn(event_loop.run());

        debug!(url = %options.url, retry = ?options.retry, "ConnectionManager created");

        Ok(Self {
            command_tx,
            state_rx,
            listeners,
            options,
            task: Mutex::new(Some(task)),
        })
    }

    /// Tears the connection down and waits for the control loop to stop.
    ///
    /// Cancels any pending retry, closes the socket and notifies observers of
    /// the final `disconnected` status. No callback runs after this returns.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown);

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!(error = %e, "Control loop ended abnormally");
        }
    }

    /// Returns `true` once the control loop has stopped.
    #[inline]
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.command_tx.is_closed()
    }
}

// ============================================================================
// ConnectionManager - Connection Control
// ============================================================================

impl ConnectionManager {
    /// Starts connecting. No-op if a socket is already opening or open.
    ///
    /// Also resumes after the terminal `error` state, with a fresh attempt
    /// budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManagerShutdown`] after shutdown.
    pub fn connect(&self) -> Result<()> {
        self.submit(Command::Connect)
    }

    /// Cancels any pending retry, closes the socket and goes `disconnected`.
    ///
    /// No automatic reconnect happens until [`connect`](Self::connect) is
    /// called again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManagerShutdown`] after shutdown.
    pub fn disconnect(&self) -> Result<()> {
        self.submit(Command::Disconnect)
    }

    /// Serializes `message` to JSON and sends it if connected.
    ///
    /// Messages sent while not connected are dropped without notice; check
    /// [`is_connected`](Self::is_connected) first if delivery matters.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if serialization fails
    /// - [`Error::ManagerShutdown`] after shutdown
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let text = serde_json::to_string(message)?;
        self.send_text(text)
    }

    /// Sends a raw text frame if connected. Dropped otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManagerShutdown`] after shutdown.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.submit(Command::Send(text.into()))
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::ManagerShutdown)
    }
}

// ============================================================================
// ConnectionManager - State
// ============================================================================

impl ConnectionManager {
    /// Returns a snapshot of the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.state_rx.borrow().status
    }

    /// Returns `true` if the socket is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Returns the options the manager was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.options.url
    }

    /// Returns a receiver that sees every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Waits until the status equals `status`.
    ///
    /// Returns immediately if it already does. Only the latest state is
    /// observed, so a status that is replaced right away (such as the `error`
    /// reported just before `reconnecting` after a transport error) can be
    /// missed and the wait would not return. Use
    /// [`on_status_change`](Self::on_status_change) to see every transition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManagerShutdown`] if the loop stops first.
    pub async fn wait_for_status(&self, status: ConnectionStatus) -> Result<ConnectionState> {
        let mut rx = self.state_rx.clone();
        let state = rx
            .wait_for(|state| state.status == status)
            .await
            .map_err(|_| Error::ManagerShutdown)?;
        Ok(state.clone())
    }
}

// ============================================================================
// ConnectionManager - Listeners
// ============================================================================

impl ConnectionManager {
    /// Registers a callback for status changes.
    ///
    /// Runs on the control loop every time the status (or its error message)
    /// changes.
    pub fn on_status_change<F>(&self, observer: F) -> ListenerId
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.listeners.add_observer(Arc::new(observer))
    }

    /// Registers a handler for messages whose `type` equals `message_type`.
    pub fn on_message<F>(&self, message_type: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.listeners.add_handler(message_type, Arc::new(handler))
    }

    /// Registers a handler for every message.
    ///
    /// Runs after the type-specific handlers.
    pub fn on_any_message<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.listeners.add_catch_all(Arc::new(handler))
    }

    /// Removes a registered observer or handler.
    ///
    /// Returns `true` if it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // The loop disconnects before exiting.
        let _ = self.command_tx.send(Command::Shutdown);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::{Duration, SystemTime};

    use serde_json::json;
    use tokio::time::{Instant, sleep};

    use crate::manager::RetryPolicy;
    use crate::protocol::OutboundMessage;
    use crate::transport::mock::{MockConnector, Outcome};

    fn options(max_attempts: u32) -> ConnectionOptions {
        ConnectionOptions::new("ws://localhost:8000/ws")
            .with_retry(RetryPolicy::fixed(Duration::from_millis(3000), max_attempts))
    }

    fn record_statuses(manager: &ConnectionManager) -> Arc<Mutex<Vec<ConnectionStatus>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        manager.on_status_change(move |state| seen_clone.lock().push(state.status));
        seen
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let (connector, _peers) = MockConnector::new([]);
        let manager = ConnectionManager::with_connector(options(5), connector.clone())
            .expect("build");

        let state = manager.state();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(state.last_sync_time.is_none());
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(connector.opens(), 0);
    }

    #[test]
    fn test_requires_runtime() {
        let (connector, _peers) = MockConnector::new([]);
        let err = ConnectionManager::with_connector(options(5), connector).unwrap_err();
        assert!(err.to_string().contains("tokio runtime"));
    }

    #[tokio::test]
    async fn test_rejects_invalid_options() {
        let (connector, _peers) = MockConnector::new([]);
        let result = ConnectionManager::with_connector(options(0), connector);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_after_two_failures() {
        let (connector, _peers) =
            MockConnector::new([Outcome::Refuse, Outcome::Refuse, Outcome::Accept]);
        let manager = ConnectionManager::with_connector(options(5), connector.clone())
            .expect("build");
        let seen = record_statuses(&manager);
        let started = Instant::now();

        manager.connect().expect("connect");
        let state = manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected");

        use ConnectionStatus::*;
        assert_eq!(
            *seen.lock(),
            vec![Connecting, Reconnecting, Connecting, Reconnecting, Connecting, Connected]
        );
        assert_eq!(state.reconnect_attempts, 0);
        assert!(state.error_message.is_none());
        assert!(state.last_sync_time.is_some());
        assert_eq!(connector.opens(), 3);
        assert!(started.elapsed() >= Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let (connector, _peers) = MockConnector::new([]);
        let manager = ConnectionManager::with_connector(options(5), connector.clone())
            .expect("build");

        manager.connect().expect("connect");
        let state = manager
            .wait_for_status(ConnectionStatus::Error)
            .await
            .expect("error");

        assert_eq!(state.reconnect_attempts, 5);
        assert!(state.error_message.is_some());

        // No further automatic attempts.
        sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.opens(), 5);
        assert_eq!(manager.status(), ConnectionStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_resumes_after_error() {
        let (connector, _peers) = MockConnector::new([Outcome::Refuse, Outcome::Accept]);
        let manager = ConnectionManager::with_connector(options(1), connector.clone())
            .expect("build");

        manager.connect().expect("connect");
        manager
            .wait_for_status(ConnectionStatus::Error)
            .await
            .expect("error");

        manager.connect().expect("reconnect");
        let state = manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected");
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(connector.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_retry() {
        let (connector, _peers) = MockConnector::new([]);
        let manager = ConnectionManager::with_connector(options(5), connector.clone())
            .expect("build");
        let seen = record_statuses(&manager);

        manager.connect().expect("connect");
        manager
            .wait_for_status(ConnectionStatus::Reconnecting)
            .await
            .expect("reconnecting");

        manager.disconnect().expect("disconnect");
        manager
            .wait_for_status(ConnectionStatus::Disconnected)
            .await
            .expect("disconnected");

        sleep(Duration::from_secs(60)).await;

        use ConnectionStatus::*;
        assert_eq!(*seen.lock(), vec![Connecting, Reconnecting, Disconnected]);
        assert_eq!(connector.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_opening() {
        let (connector, _peers) = MockConnector::new([Outcome::Hang]);
        let manager = ConnectionManager::with_connector(options(5), connector.clone())
            .expect("build");

        manager.connect().expect("connect");
        manager
            .wait_for_status(ConnectionStatus::Connecting)
            .await
            .expect("connecting");

        manager.disconnect().expect("disconnect");
        manager
            .wait_for_status(ConnectionStatus::Disconnected)
            .await
            .expect("disconnected");

        sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.opens(), 1);
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_twice_keeps_one_socket() {
        let (connector, mut peers) = MockConnector::new([Outcome::Accept, Outcome::Accept]);
        let manager = ConnectionManager::with_connector(options(5), connector.clone())
            .expect("build");

        manager.connect().expect("connect");
        manager.connect().expect("connect");
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected");
        manager.connect().expect("connect");

        let _peer = peers.recv().await.expect("peer");
        manager.shutdown().await;

        assert_eq!(connector.opens(), 1);
        assert_eq!(connector.max_live(), 1);
        assert_eq!(connector.live(), 0);
    }

    #[tokio::test]
    async fn test_log_frame_updates_sync_and_fires_handler_once() {
        let (connector, mut peers) = MockConnector::new([Outcome::Accept]);
        let manager = ConnectionManager::with_connector(options(5), connector).expect("build");

        let (log_tx, mut log_rx) = mpsc::unbounded_channel();
        manager.on_message("log", move |message| {
            let _ = log_tx.send(message.clone());
        });

        manager.connect().expect("connect");
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected");
        let peer = peers.recv().await.expect("peer");

        let sent_at = SystemTime::now();
        peer.send_text(r#"{"type":"log","data":{"line":"started"}}"#);
        let message = log_rx.recv().await.expect("handler fired");

        assert_eq!(message.data, json!({ "line": "started" }));
        let synced = manager.state().last_sync_time.expect("sync time set");
        assert!(synced >= sent_at);
        assert!(log_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped() {
        let (connector, mut peers) = MockConnector::new([Outcome::Accept]);
        let manager = ConnectionManager::with_connector(options(5), connector).expect("build");
        let seen = record_statuses(&manager);

        let (any_tx, mut any_rx) = mpsc::unbounded_channel();
        manager.on_any_message(move |message| {
            let _ = any_tx.send(message.message_type.clone());
        });

        manager.connect().expect("connect");
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected");
        let peer = peers.recv().await.expect("peer");

        peer.send_text(r#"{"type":"log","da"#);
        peer.send_text("not json at all");
        peer.send_text(r#"{"type":"data_update"}"#);

        // Frames are handled in order, so the valid one proves the others were seen.
        assert_eq!(any_rx.recv().await.as_deref(), Some("data_update"));
        assert!(any_rx.try_recv().is_err());
        assert_eq!(manager.status(), ConnectionStatus::Connected);

        use ConnectionStatus::*;
        assert_eq!(*seen.lock(), vec![Connecting, Connected]);
    }

    #[tokio::test]
    async fn test_send_only_while_connected() {
        let (connector, mut peers) = MockConnector::new([Outcome::Accept]);
        let manager = ConnectionManager::with_connector(options(5), connector).expect("build");

        // Dropped: not connected yet.
        manager
            .send(&OutboundMessage::new("early", json!(null)))
            .expect("send");

        manager.connect().expect("connect");
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected");
        let mut peer = peers.recv().await.expect("peer");

        manager
            .send(&OutboundMessage::new("subscribe", json!({ "topic": "logs" })))
            .expect("send");

        let received = peer.from_client.recv().await.expect("delivered");
        assert_eq!(received, r#"{"type":"subscribe","data":{"topic":"logs"}}"#);
        assert!(peer.from_client.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_close_triggers_reconnect() {
        let (connector, mut peers) = MockConnector::new([Outcome::Accept, Outcome::Accept]);
        let manager = ConnectionManager::with_connector(options(5), connector.clone())
            .expect("build");
        let seen = record_statuses(&manager);

        manager.connect().expect("connect");
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected");

        let peer = peers.recv().await.expect("first peer");
        let _ = peer.to_client.send(Ok(crate::transport::Frame::Close(None)));

        let reconnecting = manager
            .wait_for_status(ConnectionStatus::Reconnecting)
            .await
            .expect("reconnecting");
        assert_eq!(reconnecting.reconnect_attempts, 1);

        let _second = peers.recv().await.expect("second peer");
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected again");

        use ConnectionStatus::*;
        assert_eq!(
            *seen.lock(),
            vec![Connecting, Connected, Reconnecting, Connecting, Connected]
        );
        assert_eq!(connector.max_live(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_reports_error_then_retries() {
        let (connector, mut peers) = MockConnector::new([Outcome::Accept, Outcome::Accept]);
        let manager = ConnectionManager::with_connector(options(5), connector).expect("build");
        let seen = record_statuses(&manager);

        manager.connect().expect("connect");
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected");

        let peer = peers.recv().await.expect("peer");
        let _ = peer.to_client.send(Err(Error::connection("reset by peer")));

        let _second = peers.recv().await.expect("second peer");
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected again");

        assert_eq!(
            *seen.lock(),
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Error,
                ConnectionStatus::Reconnecting,
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_callbacks() {
        let (connector, mut peers) = MockConnector::new([Outcome::Accept]);
        let manager = ConnectionManager::with_connector(options(5), connector.clone())
            .expect("build");
        let seen = record_statuses(&manager);

        manager.connect().expect("connect");
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected");
        let peer = peers.recv().await.expect("peer");

        manager.shutdown().await;
        let after_shutdown = seen.lock().len();

        peer.send_text(r#"{"type":"log"}"#);
        tokio::task::yield_now().await;

        assert_eq!(seen.lock().last(), Some(&ConnectionStatus::Disconnected));
        assert_eq!(seen.lock().len(), after_shutdown);
        assert_eq!(connector.live(), 0);
        assert!(manager.is_shut_down());
        assert!(matches!(manager.connect(), Err(Error::ManagerShutdown)));
    }

    #[tokio::test]
    async fn test_remove_listener_stops_delivery() {
        let (connector, mut peers) = MockConnector::new([Outcome::Accept]);
        let manager = ConnectionManager::with_connector(options(5), connector).expect("build");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx_removed = tx.clone();
        let removed = manager.on_message("log", move |_| {
            let _ = tx_removed.send("removed");
        });
        manager.on_message("log", move |_| {
            let _ = tx.send("kept");
        });
        assert!(manager.remove_listener(removed));

        manager.connect().expect("connect");
        manager
            .wait_for_status(ConnectionStatus::Connected)
            .await
            .expect("connected");
        let peer = peers.recv().await.expect("peer");
        peer.send_text(r#"{"type":"log"}"#);

        assert_eq!(rx.recv().await, Some("kept"));
        assert!(rx.try_recv().is_err());
    }
}
