//! Channel connection states.

use std::fmt;

/// Connection lifecycle of a session channel.
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`, cycling through
/// reconnects. UI can use this to show a "reconnecting" indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelState {
    /// No live connection: not started yet, lost, refused or shut down.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Messages flow in both directions.
    Connected,
}

impl ChannelState {
    /// Returns true if reports can currently reach the server.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true while a connection attempt is in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(label)
    }
}
