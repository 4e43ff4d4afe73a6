use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use herald_core::ids::ConnectionId;
use herald_core::{Transport, TransportError};

/// One open socket as seen by the hub.
struct Peer {
    tx: mpsc::Sender<String>,
    last_seen: AtomicU64,
}

impl Peer {
    fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            tx,
            last_seen: AtomicU64::new(now_secs()),
        }
    }

    fn touch(&self) {
        self.last_seen.store(now_secs(), Ordering::Relaxed);
    }

    fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_seen.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Every open WebSocket, keyed by the connection id the server assigned.
///
/// Pushes go through a bounded per-socket queue drained by that socket's
/// writer task, so a slow client never blocks a dispatch.
pub struct ConnectionHub {
    peers: DashMap<ConnectionId, Arc<Peer>>,
    max_send_queue: usize,
    client_timeout: Duration,
}

impl ConnectionHub {
    pub fn new(max_send_queue: usize, client_timeout: Duration) -> Self {
        Self {
            peers: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
            client_timeout,
        }
    }

    /// Add a socket under a fresh id and return the queue its writer drains.
    pub fn attach(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let _ = self.peers.insert(id.clone(), Arc::new(Peer::new(tx)));
        (id, rx)
    }

    /// Forget a socket. Returns false if it was already gone.
    pub fn detach(&self, id: &ConnectionId) -> bool {
        self.peers.remove(id).is_some()
    }

    /// Note inbound traffic (any frame, including pongs) from a socket.
    pub fn touch(&self, id: &ConnectionId) {
        if let Some(peer) = self.peers.get(id) {
            peer.touch();
        }
    }

    #[cfg(test)]
    fn contains(&self, id: &ConnectionId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }

    /// Detach sockets silent for longer than the client timeout and return
    /// their ids. Dropping a peer's sender ends its writer task.
    pub fn reap_dead(&self) -> Vec<ConnectionId> {
        let dead: Vec<ConnectionId> = self
            .peers
            .iter()
            .filter(|entry| !entry.value().is_alive(self.client_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        dead.into_iter()
            .filter(|id| self.detach(id))
            .inspect(|id| tracing::info!(connection_id = %id, "reaped silent connection"))
            .collect()
    }

    #[cfg(test)]
    fn backdate(&self, id: &ConnectionId, secs: u64) {
        if let Some(peer) = self.peers.get(id) {
            peer.last_seen.store(now_secs().saturating_sub(secs), Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl Transport for ConnectionHub {
    async fn push(
        &self,
        connection_id: &ConnectionId,
        message: String,
    ) -> Result<(), TransportError> {
        let tx = match self.peers.get(connection_id) {
            Some(peer) => peer.tx.clone(),
            None => return Err(TransportError::Gone(connection_id.clone())),
        };
        match tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    msg_len = msg.len(),
                    "send queue full, dropping message"
                );
                Err(TransportError::Backpressure(connection_id.clone()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(TransportError::Closed(connection_id.clone()))
            }
        }
    }
}

/// Answers text frames arriving on a socket.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// Returns the reply to send back on the same socket, if any.
    async fn on_text(&self, connection_id: &ConnectionId, text: String) -> Option<String>;
}

/// Run one socket until either side closes, the peer is reaped or the
/// server shuts down.
///
/// The writer drains the peer's queue and pings every `heartbeat`. The
/// reader handles text frames inline, so every frame is answered before the
/// caller's disconnect handling runs.
pub async fn drive_socket(
    socket: WebSocket,
    connection_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    hub: Arc<ConnectionHub>,
    handler: Arc<dyn FrameHandler>,
    heartbeat: Duration,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_id = connection_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                    tracing::trace!(connection_id = %writer_id, "sent ping");
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let reader_id = connection_id.clone();
    let reader_hub = Arc::clone(&hub);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            reader_hub.touch(&reader_id);
            match msg {
                WsMessage::Text(text) => {
                    let reply = handler.on_text(&reader_id, text.as_str().to_owned()).await;
                    if let Some(reply) = reply {
                        if let Err(e) = reader_hub.push(&reader_id, reply).await {
                            tracing::warn!(
                                connection_id = %reader_id,
                                error = %e,
                                "failed to queue reply"
                            );
                        }
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
        () = shutdown.cancelled() => {
            writer.abort();
            reader.abort();
        }
    }
}

/// Periodically reap silent sockets and hand each id to `on_dead`.
pub fn start_sweep_task<F, Fut>(
    hub: Arc<ConnectionHub>,
    interval: Duration,
    shutdown: CancellationToken,
    on_dead: F,
) -> JoinHandle<()>
where
    F: Fn(ConnectionId) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let dead = hub.reap_dead();
                    if !dead.is_empty() {
                        tracing::info!(removed = dead.len(), "dead connection sweep");
                    }
                    for id in dead {
                        on_dead(id).await;
                    }
                }
                () = shutdown.cancelled() => break,
            }
        }
    })
}
