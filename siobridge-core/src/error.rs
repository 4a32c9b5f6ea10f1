/// siobridge Error Types
///
/// Errors raised inside the client runtime. None of these cross the C
/// boundary: the runtime turns them into fail/close notifications.

use std::io;
use thiserror::Error;

use crate::endpoint::EndpointError;

/// Main error type for client runtime operations
#[derive(Error, Debug)]
pub enum SioError {
    /// IO error while spawning the runtime thread or talking to a transport
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Connection URI could not be parsed
    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// Nothing is listening at the requested endpoint
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// An in-process endpoint name is already bound
    #[error("Endpoint already bound: {0}")]
    AddrInUse(String),

    /// No transport is registered for the endpoint scheme
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// The link to the peer was closed
    #[error("Link closed")]
    LinkClosed,
}

/// Result type alias for client runtime operations
pub type Result<T> = std::result::Result<T, SioError>;

impl SioError {
    /// Create a connection refused error
    pub fn connection_refused(endpoint: impl Into<String>) -> Self {
        Self::ConnectionRefused(endpoint.into())
    }

    /// Create an unsupported transport error
    pub fn unsupported_transport(scheme: impl Into<String>) -> Self {
        Self::UnsupportedTransport(scheme.into())
    }

    /// Check if retrying the same endpoint can succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionRefused
            ),
            Self::ConnectionRefused(_) | Self::LinkClosed => true,
            Self::Endpoint(_) | Self::AddrInUse(_) | Self::UnsupportedTransport(_) => false,
        }
    }

    /// Check if this is a connection error
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionRefused(_) | Self::LinkClosed)
    }
}
