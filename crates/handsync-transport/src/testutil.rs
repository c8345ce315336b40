//! Channel-backed connector for driving the manager without a network.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, channel::mpsc};

use crate::connector::{Connector, Socket, TransportError};

/// Let spawned tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Server end of one mock socket.
pub struct MockServer {
    to_client: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
    /// Frames the client wrote, already encoded.
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl MockServer {
    /// Deliver a text frame to the client.
    pub fn push(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.unbounded_send(Ok(text.to_string()));
        }
    }

    /// End the client's inbound stream as a remote close would.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }
}

#[derive(Default)]
struct MockState {
    urls: Vec<String>,
    servers: VecDeque<MockServer>,
}

/// Connector whose sockets are in-memory channel pairs.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
    refuse: Arc<AtomicBool>,
}

impl MockConnector {
    /// Make subsequent attempts fail (or succeed again).
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of connection attempts so far.
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().urls.len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.lock().unwrap().urls.clone()
    }

    /// Take the server end of the oldest unclaimed socket.
    pub fn next_server(&self) -> Option<MockServer> {
        self.state.lock().unwrap().servers.pop_front()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Socket, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.urls.push(url.to_string());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let (to_client, inbound) = mpsc::unbounded();
        let (outbound, from_client) = mpsc::unbounded();
        state.servers.push_back(MockServer {
            to_client: Some(to_client),
            from_client,
        });

        Ok(Socket {
            outbound: Box::pin(outbound.sink_map_err(|_| TransportError::Closed)),
            inbound: inbound.boxed(),
        })
    }
}
