//! Client event monitoring.
//!
//! Every notification the runtime thread delivers to listeners is mirrored
//! as a [`ClientEvent`] on monitor channels, so Rust callers can observe the
//! client lifecycle without installing listeners.

use std::fmt;
use std::time::Duration;

/// Why a connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed on request (`close` / `sync_close`).
    Normal,
    /// Link dropped and no reconnection is allowed.
    Drop,
}

/// Client lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Link to the server is open.
    Open,

    /// Connecting failed and the reconnect policy gave up.
    Fail,

    /// Connection closed; no further events follow for this connection.
    Close(CloseReason),

    /// A reconnection attempt is scheduled after `delay`.
    Reconnect { attempt: u32, delay: Duration },

    /// Namespace joined.
    SocketOpen(String),

    /// Namespace left or disconnected by the server.
    SocketClose(String),

    /// Server refused a namespace join.
    SocketError { nsp: String, message: String },
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Connection open"),
            Self::Fail => write!(f, "Connection failed"),
            Self::Close(reason) => write!(f, "Connection closed ({reason:?})"),
            Self::Reconnect { attempt, delay } => {
                write!(f, "Reconnect attempt {attempt} in {}ms", delay.as_millis())
            }
            Self::SocketOpen(nsp) => write!(f, "Namespace {nsp} open"),
            Self::SocketClose(nsp) => write!(f, "Namespace {nsp} closed"),
            Self::SocketError { nsp, message } => {
                write!(f, "Namespace {nsp} error: {message}")
            }
        }
    }
}

/// Handle for receiving client events.
pub type ClientMonitor = flume::Receiver<ClientEvent>;

/// Sending half of a monitor channel.
pub type ClientEventSender = flume::Sender<ClientEvent>;

/// Creates a new monitoring channel pair.
#[must_use]
pub fn create_monitor() -> (ClientEventSender, ClientMonitor) {
    flume::unbounded()
}
