//! Connection manager: one live socket, fixed-delay reconnect, heartbeat.
//!
//! Each `connect()` spawns a link task that owns the socket. The task feeds
//! decoded messages into the [`SyncStore`] in arrival order, runs a heartbeat
//! task alongside the open socket, and after an unexpected close waits the
//! reconnect delay before trying once more. `connect()` and `disconnect()`
//! hold the link slot for their whole duration, cancel the previous link
//! through its `CancellationToken` and wait for the task to finish, so a stale
//! link can never touch the store again and overlapping calls serialize.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use handsync_core::{ConnectionState, DecodeError, SyncStore, protocol};
use tokio::{
    sync::{Mutex as AsyncMutex, mpsc},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::SyncConfig,
    connector::{Connector, Socket, TransportError},
    protocol::ClientMessage,
};

/// Upper bound on the close handshake when tearing a socket down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>>;

/// Running link task and the handle that stops it.
struct Link {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the connection to the tracking service.
///
/// Construct one per session, call [`connect`](Self::connect) (or
/// [`start`](Self::start)) to begin and [`disconnect`](Self::disconnect) to
/// tear down. Nothing here is fatal: failures are logged and surface as the
/// store's connection state.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    store: Arc<SyncStore>,
    config: SyncConfig,
    link: AsyncMutex<Option<Link>>,
    outbound: OutboundSlot,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager. No connection is made until `connect()`.
    #[must_use]
    pub fn new(config: SyncConfig, connector: C, store: Arc<SyncStore>) -> Self {
        Self {
            connector: Arc::new(connector),
            store,
            config,
            link: AsyncMutex::new(None),
            outbound: Arc::new(Mutex::new(None)),
        }
    }

    /// Store this manager writes into.
    #[must_use]
    pub fn store(&self) -> Arc<SyncStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.store.connection()
    }

    /// Connect to the configured address.
    pub async fn start(&self) {
        let url = self.config.url();
        self.connect(url).await;
    }

    /// Open a connection to `url`, replacing any existing one.
    ///
    /// Returns once the link task is running; the store reports `Connected`
    /// when the socket opens.
    pub async fn connect(&self, url: impl Into<String>) {
        let mut link = self.link.lock().await;
        self.teardown(&mut link).await;

        let url = url.into();
        tracing::info!(url = %url, "connecting");
        self.store.set_connection(ConnectionState::Connecting);

        let cancel = CancellationToken::new();
        let worker = LinkWorker {
            connector: Arc::clone(&self.connector),
            store: Arc::clone(&self.store),
            outbound: Arc::clone(&self.outbound),
            url,
            reconnect_delay: self.config.reconnect_delay(),
            heartbeat_interval: self.config.heartbeat_interval(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());

        *link = Some(Link { cancel, task });
    }

    /// Close the socket and stop reconnecting.
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        self.teardown(&mut link).await;
        self.store.set_connection(ConnectionState::Disconnected);
        tracing::info!("disconnected");
    }

    /// Update the local active flag, and tell the server when the socket is open.
    ///
    /// Never blocks and never fails: with no open socket the change stays local.
    pub fn set_active(&self, active: bool) {
        self.store.set_active(active);

        if self.store.connection() != ConnectionState::Connected {
            tracing::debug!(active, "socket not open, active flag kept local");
            return;
        }

        let sender = self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sender {
            Some(tx) => {
                if tx.send(ClientMessage::set_active(active)).is_err() {
                    tracing::warn!(active, "socket went away before set_active was queued");
                }
            }
            None => tracing::debug!(active, "no outbound channel, active flag kept local"),
        }
    }

    /// Stop the current link, if any, and drop what it was showing.
    async fn teardown(&self, link: &mut Option<Link>) {
        let Some(Link { cancel, task }) = link.take() else {
            return;
        };
        cancel.cancel();
        if let Err(e) = task.await {
            if e.is_panic() {
                tracing::error!("link task panicked: {e}");
            }
        }
        self.store.set_connection(ConnectionState::Disconnected);
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.cancel.cancel();
        }
    }
}

/// How a single socket session ended.
enum SessionEnd {
    Cancelled,
    Closed,
    Failed(TransportError),
}

/// State moved into the link task.
struct LinkWorker<C: Connector> {
    connector: Arc<C>,
    store: Arc<SyncStore>,
    outbound: OutboundSlot,
    url: String,
    reconnect_delay: Duration,
    heartbeat_interval: Duration,
    cancel: CancellationToken,
}

impl<C: Connector> LinkWorker<C> {
    async fn run(self) {
        loop {
            self.store.set_connection(ConnectionState::Connecting);

            let attempt = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                result = self.connector.connect(&self.url) => result,
            };

            match attempt {
                Ok(socket) => {
                    tracing::info!(url = %self.url, "connected");
                    match self.run_session(socket).await {
                        SessionEnd::Cancelled => return,
                        SessionEnd::Closed => tracing::info!(url = %self.url, "socket closed"),
                        SessionEnd::Failed(e) => {
                            tracing::warn!(url = %self.url, error = %e, "socket error");
                        }
                    }
                }
                Err(e) => tracing::warn!(url = %self.url, error = %e, "connection attempt failed"),
            }

            self.store.set_connection(ConnectionState::Disconnected);

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(self.reconnect_delay) => {
                    tracing::info!(
                        url = %self.url,
                        delay_ms = self.reconnect_delay.as_millis(),
                        "reconnecting"
                    );
                }
            }
        }
    }

    async fn run_session(&self, socket: Socket) -> SessionEnd {
        let Socket {
            mut outbound,
            mut inbound,
        } = socket;

        // The sender is in place before `Connected` is published, so an
        // observer reacting to that change can already send.
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx.clone());
        self.store.set_connection(ConnectionState::Connected);

        let heartbeat = self.cancel.child_token();
        let _stop_heartbeat = heartbeat.clone().drop_guard();
        tokio::spawn(heartbeat_loop(tx, self.heartbeat_interval, heartbeat));

        let end = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break SessionEnd::Cancelled,
                Some(msg) = rx.recv() => {
                    if let Err(e) = send(&mut outbound, &msg).await {
                        // Recovery comes from the close that follows, not from resending.
                        tracing::warn!(error = %e, "failed to send {msg:?}");
                    }
                }
                next = inbound.next() => match next {
                    Some(Ok(text)) => self.handle_text(&text),
                    Some(Err(e)) => break SessionEnd::Failed(e),
                    None => break SessionEnd::Closed,
                },
            }
        };

        self.outbound.lock().unwrap_or_else(PoisonError::into_inner).take();
        match tokio::time::timeout(CLOSE_TIMEOUT, outbound.close()).await {
            Ok(Err(e)) => tracing::debug!(error = %e, "close handshake failed"),
            Err(_) => tracing::debug!("close handshake timed out"),
            Ok(Ok(())) => {}
        }
        end
    }

    fn handle_text(&self, text: &str) {
        match protocol::decode(text) {
            Ok(inbound) => self.store.apply(inbound),
            Err(DecodeError::UnknownType(kind)) => {
                tracing::warn!(kind = %kind, "ignoring unknown message type");
            }
            Err(e) => tracing::warn!(error = %e, "dropping message"),
        }
    }
}

async fn send(
    outbound: &mut crate::connector::Outbound,
    msg: &ClientMessage,
) -> Result<(), TransportError> {
    let json = msg.to_json()?;
    outbound.send(json).await
}

/// Queue a ping every `period` until cancelled. Replies are not awaited.
async fn heartbeat_loop(
    tx: mpsc::UnboundedSender<ClientMessage>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if tx.send(ClientMessage::ping()).is_err() {
                    break;
                }
                tracing::trace!("heartbeat ping queued");
            }
        }
    }
}
