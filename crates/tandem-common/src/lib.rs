//! tandem-common: everything a session shares with the outside world.
//!
//! This crate provides:
//! - `transport`: the JSON wire protocol and the `Transport` seam, with
//!   in-memory and WebSocket implementations
//! - `bootstrap`: the one-shot initial session fetch
//! - `config`: `SyncConfig` tunables from defaults, environment or file
//! - `identity`: `UserId` and `SessionKey`
//! - `telemetry` (feature `telemetry`): tracing subscriber and prometheus recorder

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod identity;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod transport;

pub use bootstrap::{HttpBootstrap, InitialSession, SessionBootstrap};
pub use config::{FileStore, Loader, Saver, SyncConfig};
pub use error::{BootstrapError, ConfigError, ProtocolError, TransportError};
pub use identity::{SessionKey, UserId};
pub use transport::{
    Connection, ExecutionOutput, IncomingMessage, MemoryServer, MemoryTransport, OutgoingMessage,
    RemoteUpdate, StateReport, Transport, UserState, WsTransport,
};
