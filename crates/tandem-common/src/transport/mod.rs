//! Session transport layer.
//!
//! This module provides the plumbing between a session channel and the server:
//! - `Transport`: opens a `Connection` for a `SessionKey`
//! - `MemoryTransport`: in-process transport driven by a `MemoryServer` handle
//! - `WsTransport`: WebSocket transport for the session server
//! - `messages`: the JSON wire protocol

mod memory;
mod messages;
mod websocket;

use std::future::Future;

use n0_future::boxed::BoxStream;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::identity::SessionKey;

pub use memory::{MemoryServer, MemoryTransport};
pub use messages::{
    ExecutionOutput, IncomingMessage, OutgoingMessage, RemoteUpdate, StateReport, UserState,
};
pub use websocket::WsTransport;

/// One live connection to the session server.
///
/// Dropping both halves closes the connection. The event stream ends when the
/// server side goes away.
pub struct Connection {
    pub sender: mpsc::UnboundedSender<OutgoingMessage>,
    /// Decoded inbound messages; undecodable frames are dropped before this point.
    pub events: BoxStream<IncomingMessage>,
}

impl Connection {
    pub fn send(&self, message: OutgoingMessage) -> Result<(), TransportError> {
        self.sender
            .send(message)
            .map_err(|_| TransportError::Closed)
    }
}

/// Opens connections to the session server.
pub trait Transport: Send + Sync + 'static {
    /// Connect the given client to the given session.
    fn connect(
        &self,
        key: &SessionKey,
    ) -> impl Future<Output = Result<Connection, TransportError>> + Send;
}
