//! Error types for tandem sessions.

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

/// Failures of the bidirectional session channel.
///
/// These never reach the applier or the presence tracker: the channel logs
/// them and falls back to its reconnect policy.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum TransportError {
    #[error("failed to connect to {url}")]
    #[diagnostic(code(tandem::transport::connect))]
    Connect {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("timed out connecting to {url} after {}ms", .timeout.as_millis())]
    #[diagnostic(
        code(tandem::transport::connect_timeout),
        help("raise connect_timeout_ms if the server is slow to accept")
    )]
    ConnectTimeout {
        url: String,
        timeout: std::time::Duration,
    },

    #[error("failed to send message")]
    #[diagnostic(code(tandem::transport::send))]
    Send(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("connection closed")]
    #[diagnostic(code(tandem::transport::closed))]
    Closed,

    #[error("invalid session url: {url}")]
    #[diagnostic(
        code(tandem::transport::invalid_url),
        help("server_url must be an absolute ws:// or wss:// URL ending in '/'")
    )]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// JSON encode/decode failures for wire messages.
#[derive(Debug, Error, Diagnostic)]
pub enum ProtocolError {
    #[error("failed to encode message")]
    #[diagnostic(code(tandem::protocol::encode))]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode message")]
    #[diagnostic(code(tandem::protocol::decode))]
    Decode(#[source] serde_json::Error),
}

/// Configuration errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}")]
    #[diagnostic(code(config::missing_file))]
    MissingFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported configuration format: {path}")]
    #[diagnostic(code(config::format), help("use a .json or .toml file"))]
    UnsupportedFormat { path: String },

    #[error("failed to parse configuration: {message}")]
    #[diagnostic(code(config::parse))]
    Parse { message: String },

    #[error("invalid configuration value for {field}: {message}")]
    #[diagnostic(code(config::invalid))]
    InvalidValue { field: &'static str, message: String },
}

/// Errors fetching the initial session state.
#[derive(Debug, Error, Diagnostic)]
pub enum BootstrapError {
    #[error("session request failed")]
    #[diagnostic(code(tandem::bootstrap::request))]
    Request(#[source] reqwest::Error),

    #[error("invalid bootstrap url: {url}")]
    #[diagnostic(code(tandem::bootstrap::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("session {session_id} is invalid")]
    #[diagnostic(
        code(tandem::bootstrap::session_invalid),
        help("the session may have expired; start a new one")
    )]
    SessionInvalid {
        session_id: SmolStr,
        #[source]
        source: Box<BootstrapError>,
    },
}
