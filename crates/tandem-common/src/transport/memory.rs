//! In-process transport for tests and demos.
//!
//! `MemoryTransport` is handed to a channel; the paired `MemoryServer` plays
//! the server: it sees what clients send, pushes broadcasts, answers pings
//! (unless told to go quiet) and can drop every connection at once.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use n0_future::stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Connection, IncomingMessage, OutgoingMessage, Transport};
use crate::error::TransportError;
use crate::identity::SessionKey;

struct Link {
    to_client: mpsc::UnboundedSender<IncomingMessage>,
    closed: CancellationToken,
}

struct Shared {
    links: Mutex<Vec<Link>>,
    connects: AtomicUsize,
    pings: AtomicUsize,
    auto_pong: AtomicBool,
    refuse: AtomicBool,
    inbox: mpsc::UnboundedSender<(SessionKey, OutgoingMessage)>,
}

/// Client side of the in-memory transport.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

/// Server side of the in-memory transport.
pub struct MemoryServer {
    shared: Arc<Shared>,
    inbox: mpsc::UnboundedReceiver<(SessionKey, OutgoingMessage)>,
}

impl MemoryTransport {
    /// Create a transport and the server handle that drives it.
    pub fn new() -> (Self, MemoryServer) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            links: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            auto_pong: AtomicBool::new(true),
            refuse: AtomicBool::new(false),
            inbox: inbox_tx,
        });
        (
            Self {
                shared: shared.clone(),
            },
            MemoryServer {
                shared,
                inbox: inbox_rx,
            },
        )
    }
}

impl Transport for MemoryTransport {
    async fn connect(&self, key: &SessionKey) -> Result<Connection, TransportError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                url: format!("memory://{key}"),
                source: "connection refused".into(),
            });
        }

        let (client_tx, client_rx) = mpsc::unbounded_channel::<OutgoingMessage>();
        let (server_tx, server_rx) = mpsc::unbounded_channel::<IncomingMessage>();
        let closed = CancellationToken::new();

        if let Ok(mut links) = self.shared.links.lock() {
            links.push(Link {
                to_client: server_tx.clone(),
                closed: closed.clone(),
            });
        }

        tokio::spawn(serve_link(
            self.shared.clone(),
            key.clone(),
            client_rx,
            server_tx,
            closed,
        ));

        tracing::debug!(%key, "memory transport connected");

        let events = stream::unfold(server_rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        Ok(Connection {
            sender: client_tx,
            events: Box::pin(events),
        })
    }
}

/// Per-connection server loop: answers pings, forwards everything else to the inbox.
async fn serve_link(
    shared: Arc<Shared>,
    key: SessionKey,
    mut from_client: mpsc::UnboundedReceiver<OutgoingMessage>,
    to_client: mpsc::UnboundedSender<IncomingMessage>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            msg = from_client.recv() => {
                let Some(msg) = msg else { break };
                if msg.ping {
                    shared.pings.fetch_add(1, Ordering::SeqCst);
                    if shared.auto_pong.load(Ordering::SeqCst) {
                        let _ = to_client.send(IncomingMessage::pong());
                    }
                    continue;
                }
                if shared.inbox.send((key.clone(), msg)).is_err() {
                    break;
                }
            }
        }
    }
    tracing::trace!(%key, "memory link closed");
}

impl MemoryServer {
    /// Push a message to every live connection.
    pub fn broadcast(&self, message: IncomingMessage) {
        if let Ok(mut links) = self.shared.links.lock() {
            links.retain(|link| link.to_client.send(message.clone()).is_ok());
        }
    }

    /// Whether pings are answered. Turning this off makes connections look stale.
    pub fn set_auto_pong(&self, enabled: bool) {
        self.shared.auto_pong.store(enabled, Ordering::SeqCst);
    }

    /// Make subsequent connection attempts fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Close every live connection from the server side.
    pub fn drop_connections(&self) {
        if let Ok(mut links) = self.shared.links.lock() {
            for link in links.drain(..) {
                link.closed.cancel();
            }
        }
    }

    /// Number of connection attempts so far, including refused ones.
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> usize {
        self.shared.pings.load(Ordering::SeqCst)
    }

    pub fn live_connections(&self) -> usize {
        self.shared
            .links
            .lock()
            .map(|mut links| {
                links.retain(|link| !link.to_client.is_closed());
                links.len()
            })
            .unwrap_or(0)
    }

    /// Wait for the next non-ping message from any client.
    pub async fn recv(&mut self) -> Option<(SessionKey, OutgoingMessage)> {
        self.inbox.recv().await
    }

    /// Take a non-ping message if one is already queued.
    pub fn try_recv(&mut self) -> Option<(SessionKey, OutgoingMessage)> {
        self.inbox.try_recv().ok()
    }
}
