//! In-memory connector for exercising the control loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::socket::{Connector, Frame, Socket};

/// Result of one scripted open attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Outcome {
    Accept,
    Refuse,
    /// Never completes.
    Hang,
}

/// The backend's end of an accepted mock socket.
pub(crate) struct MockPeer {
    pub to_client: mpsc::UnboundedSender<Result<Frame>>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl MockPeer {
    pub fn send_text(&self, text: &str) {
        let _ = self.to_client.send(Ok(Frame::Text(text.to_string())));
    }
}

/// Scripted connector. Attempts past the end of the script are refused.
pub(crate) struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    peers: mpsc::UnboundedSender<MockPeer>,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(script: impl IntoIterator<Item = Outcome>) -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            peers,
            opens: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
        });
        (connector, peers_rx)
    }

    /// Number of open attempts so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Accepted sockets not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live sockets seen.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _url: &str) -> Result<Box<dyn Socket>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().pop_front().unwrap_or(Outcome::Refuse);

        match outcome {
            Outcome::Refuse => Err(Error::connection("connection refused")),
            Outcome::Hang => std::future::pending().await,
            Outcome::Accept => {
                let (to_client, inbound) = mpsc::unbounded_channel();
                let (outbound, from_client) = mpsc::unbounded_channel();

                let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_live.fetch_max(now_live, Ordering::SeqCst);

                let _ = self.peers.send(MockPeer {
                    to_client,
                    from_client,
                });

                Ok(Box::new(MockSocket {
                    inbound,
                    outbound,
                    live: Arc::clone(&self.live),
                }))
            }
        }
    }
}

struct MockSocket {
    inbound: mpsc::UnboundedReceiver<Result<Frame>>,
    outbound: mpsc::UnboundedSender<String>,
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl Socket for MockSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.outbound.send(text).map_err(|_| Error::ConnectionClosed)
    }

    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.inbound.close();
        Ok(())
    }
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
