//! Connection lifecycle states.

use std::fmt;

/// Where the client sits in its connect/reconnect lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket and no retry scheduled
    #[default]
    Disconnected,
    /// A socket is being opened
    Connecting,
    /// The socket is open
    Connected,
    /// Waiting for the retry timer after an abnormal close
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}
