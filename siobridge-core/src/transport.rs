//! Transport seam.
//!
//! A transport turns an [`Endpoint`] into a [`Link`]: a pair of channels
//! carrying already-decoded [`Packet`]s. Framing, handshakes and TLS live
//! behind this trait; the client runtime only ever sees packets.

use flume::{Receiver, Sender};

use crate::endpoint::Endpoint;
use crate::error::{Result, SioError};
use crate::inproc;
use crate::options::ClientOptions;
use crate::value::ValueRef;

/// Decoded socket.io packet.
#[derive(Debug, Clone)]
pub enum Packet {
    /// Client: join request. Server: join acknowledgement.
    Connect { nsp: String },
    /// Leave a namespace (either direction).
    Disconnect { nsp: String },
    /// Server refused a join.
    ConnectError { nsp: String, message: String },
    /// Named event with its arguments.
    Event {
        nsp: String,
        name: String,
        args: Vec<ValueRef>,
    },
}

impl Packet {
    /// Namespace the packet belongs to.
    #[must_use]
    pub fn nsp(&self) -> &str {
        match self {
            Self::Connect { nsp }
            | Self::Disconnect { nsp }
            | Self::ConnectError { nsp, .. }
            | Self::Event { nsp, .. } => nsp,
        }
    }
}

/// An open connection as seen by the client runtime.
///
/// The link is considered dropped once `rx` reports disconnection or a send
/// on `tx` fails.
#[derive(Debug)]
pub struct Link {
    pub tx: Sender<Packet>,
    pub rx: Receiver<Packet>,
}

/// Opens links to endpoints.
pub trait Transport: Send + Sync + 'static {
    /// Open a link. Called on the runtime thread; may block.
    fn open(&self, endpoint: &Endpoint, options: &ClientOptions) -> Result<Link>;
}

/// Default transport: in-process endpoints only.
///
/// Remote schemes are rejected with [`SioError::UnsupportedTransport`]; plug
/// a network transport in with `Client::with_transport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InprocTransport;

impl Transport for InprocTransport {
    fn open(&self, endpoint: &Endpoint, _options: &ClientOptions) -> Result<Link> {
        match endpoint {
            Endpoint::Inproc(name) => inproc::connect(name),
            Endpoint::Remote { scheme, .. } => {
                Err(SioError::unsupported_transport(scheme.as_str()))
            }
        }
    }
}
