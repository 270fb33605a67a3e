//! WebSocket transport for the session server.
//!
//! Each connection is split into a reader task (text frames decoded as JSON,
//! protocol pings answered) and a writer task (outgoing messages encoded as
//! JSON text frames).

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use n0_future::stream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::{Connection, IncomingMessage, OutgoingMessage, Transport};
use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::identity::SessionKey;

/// Messages sent to the writer task by the reader.
enum WriteCommand {
    Pong(Bytes),
}

/// Connects to `{server_url}{session_id}/{user_id}/session_ws`.
#[derive(Debug, Clone)]
pub struct WsTransport {
    server_url: String,
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            connect_timeout: SyncConfig::default().connect_timeout(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.server_url.clone()).with_connect_timeout(config.connect_timeout())
    }

    /// Bound on the TCP connect plus WebSocket handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The socket URL for one client in one session.
    pub fn session_url(&self, key: &SessionKey) -> Result<Url, TransportError> {
        let raw = format!("{}{}/{}/session_ws", self.server_url, key.session_id, key.user_id);
        Url::parse(&raw).map_err(|source| TransportError::InvalidUrl { url: raw, source })
    }
}

impl Transport for WsTransport {
    async fn connect(&self, key: &SessionKey) -> Result<Connection, TransportError> {
        let url = self.session_url(key)?;
        info!(%url, "connecting session socket");

        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::ConnectTimeout {
                    url: url.to_string(),
                    timeout: self.connect_timeout,
                })?
                .map_err(|e| TransportError::Connect {
                    url: url.to_string(),
                    source: Box::new(e),
                })?;
        info!(%key, "session socket connected");

        let (write, read) = ws_stream.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel::<OutgoingMessage>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<IncomingMessage>();
        let (write_tx, write_rx) = mpsc::unbounded_channel::<WriteCommand>();

        tokio::spawn(run_writer(write, out_rx, write_rx));
        tokio::spawn(run_reader(read, event_tx, write_tx));

        let events = stream::unfold(event_rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        Ok(Connection {
            sender: out_tx,
            events: Box::pin(events),
        })
    }
}

async fn run_reader<S>(
    mut read: S,
    event_tx: mpsc::UnboundedSender<IncomingMessage>,
    write_tx: mpsc::UnboundedSender<WriteCommand>,
) where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match IncomingMessage::from_json(&text) {
                Ok(message) => {
                    if event_tx.send(message).is_err() {
                        debug!("session event receiver dropped, stopping reader");
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = ?e, text = %text.as_str(), "failed to decode session message");
                    metrics::counter!("tandem_malformed_messages_total").increment(1);
                }
            },
            Ok(Message::Ping(data)) => {
                if write_tx.send(WriteCommand::Pong(data)).is_err() {
                    return;
                }
            }
            Ok(Message::Close(_)) => {
                info!("session socket closed by server");
                return;
            }
            Ok(_) => {
                // Ignore binary, pong, etc.
            }
            Err(e) => {
                warn!(error = %e, "session socket read error");
                return;
            }
        }
    }
}

async fn run_writer<S>(
    mut write: S,
    mut out_rx: mpsc::UnboundedReceiver<OutgoingMessage>,
    mut write_rx: mpsc::UnboundedReceiver<WriteCommand>,
) where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    loop {
        tokio::select! {
            biased;

            cmd = write_rx.recv() => {
                match cmd {
                    Some(WriteCommand::Pong(data)) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "failed to send pong");
                            return;
                        }
                    }
                    // Reader is gone, the socket is dead.
                    None => return,
                }
            }

            msg = out_rx.recv() => {
                let Some(msg) = msg else {
                    // Connection handle dropped: close politely.
                    let _ = write.send(Message::Close(None)).await;
                    return;
                };
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = ?e, "failed to encode session message");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    warn!(error = %e, "failed to send session message");
                    return;
                }
                trace!(ping = msg.ping, "sent session message");
            }
        }
    }
}
