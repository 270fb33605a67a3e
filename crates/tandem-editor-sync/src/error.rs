//! Error types for session sync.

use miette::Diagnostic;
use smol_str::SmolStr;
use tandem_common::{BootstrapError, ConfigError, ProtocolError, TransportError};
use thiserror::Error;

/// Errors surfaced by a sync session or its channel handle.
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum SyncError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Bootstrap(#[from] BootstrapError),

    /// The channel task has stopped, either after `shutdown` or because its
    /// consumer went away.
    #[error("session channel is closed")]
    #[diagnostic(code(tandem::sync::channel_closed))]
    ChannelClosed,

    /// The initial session fetch failed; nothing can be shown for this session.
    #[error("session {session_id} is invalid")]
    #[diagnostic(
        code(tandem::sync::session_invalid),
        help("check the session id or create a new session")
    )]
    SessionInvalid { session_id: SmolStr },
}
