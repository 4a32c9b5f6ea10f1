//! In-process transport.
//!
//! An [`InprocServer`] binds a name in a global registry; clients connecting
//! to `inproc://name` get a [`Link`] whose other end is handed to the server
//! as a [`ServerConnection`]. Packets move through `flume` channels without
//! any encoding.
//!
//! # Usage
//!
//! ```rust,no_run
//! use siobridge_core::inproc::InprocServer;
//! use siobridge_core::value::Value;
//! use std::time::Duration;
//!
//! # fn example() -> siobridge_core::error::Result<()> {
//! let server = InprocServer::bind("inproc://chat")?;
//!
//! // ... a client connects to "inproc://chat" and opens "/" ...
//! if let Some(conn) = server.accept_timeout(Duration::from_secs(1)) {
//!     let nsp = conn.accept_namespace(Duration::from_secs(1));
//!     assert_eq!(nsp.as_deref(), Some("/"));
//!     conn.emit("/", "greeting", Value::string("hello"))?;
//! }
//! # Ok(())
//! # }
//! ```

use dashmap::DashMap;
use flume::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{Result, SioError};
use crate::transport::{Link, Packet};
use crate::value::ValueRef;

/// Global registry of bound inproc endpoints
static INPROC_REGISTRY: once_cell::sync::Lazy<DashMap<String, Sender<ServerConnection>>> =
    once_cell::sync::Lazy::new(DashMap::new);

const PREFIX: &str = "inproc://";

/// Server side of an inproc endpoint.
///
/// Unbinds its name on drop.
#[derive(Debug)]
pub struct InprocServer {
    name: String,
    incoming: Receiver<ServerConnection>,
}

impl InprocServer {
    /// Bind to an inproc endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint doesn't start with `inproc://`, the
    /// name is empty, or the name is already bound.
    pub fn bind(endpoint: &str) -> Result<Self> {
        let name = validate_and_extract_name(endpoint)?;
        let (tx, rx) = flume::unbounded();

        match INPROC_REGISTRY.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(SioError::AddrInUse(endpoint.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }

        debug!("[INPROC] Bound {}", endpoint);
        Ok(Self {
            name: name.to_string(),
            incoming: rx,
        })
    }

    /// Wait up to `timeout` for the next client connection.
    #[must_use]
    pub fn accept_timeout(&self, timeout: Duration) -> Option<ServerConnection> {
        self.incoming.recv_timeout(timeout).ok()
    }

    /// Bound name without the `inproc://` prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for InprocServer {
    fn drop(&mut self) {
        INPROC_REGISTRY.remove(&self.name);
        debug!("[INPROC] Unbound {}{}", PREFIX, self.name);
    }
}

/// Server end of one client link.
///
/// Dropping it (or calling [`ServerConnection::disconnect`]) drops the
/// client's link.
#[derive(Debug)]
pub struct ServerConnection {
    tx: Sender<Packet>,
    rx: Receiver<Packet>,
}

impl ServerConnection {
    /// Send a packet to the client.
    ///
    /// # Errors
    ///
    /// Returns [`SioError::LinkClosed`] if the client dropped its link.
    pub fn send(&self, packet: Packet) -> Result<()> {
        self.tx.send(packet).map_err(|_| SioError::LinkClosed)
    }

    /// Emit a single-argument event on `nsp`.
    pub fn emit(&self, nsp: &str, name: &str, arg: ValueRef) -> Result<()> {
        self.emit_args(nsp, name, vec![arg])
    }

    /// Emit an event with any number of arguments on `nsp`.
    pub fn emit_args(&self, nsp: &str, name: &str, args: Vec<ValueRef>) -> Result<()> {
        self.send(Packet::Event {
            nsp: nsp.to_string(),
            name: name.to_string(),
            args,
        })
    }

    /// Wait up to `timeout` for the next packet from the client.
    ///
    /// Returns `None` on timeout or when the client dropped its link.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Packet> {
        match self.rx.recv_timeout(timeout) {
            Ok(packet) => {
                trace!("[INPROC] Server received {:?}", packet);
                Some(packet)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Wait for a namespace join request and acknowledge it.
    ///
    /// Packets other than `Connect` received meanwhile are discarded.
    #[must_use]
    pub fn accept_namespace(&self, timeout: Duration) -> Option<String> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let packet = self.rx.recv_deadline(deadline).ok()?;
            if let Packet::Connect { nsp } = packet {
                self.send(Packet::Connect { nsp: nsp.clone() }).ok()?;
                return Some(nsp);
            }
            trace!("[INPROC] Skipping {:?} while waiting for a join", packet);
        }
    }

    /// Refuse a pending namespace join.
    pub fn reject_namespace(&self, timeout: Duration, message: &str) -> Option<String> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Packet::Connect { nsp } = self.rx.recv_deadline(deadline).ok()? {
                self.send(Packet::ConnectError {
                    nsp: nsp.clone(),
                    message: message.to_string(),
                })
                .ok()?;
                return Some(nsp);
            }
        }
    }

    /// Drop the link.
    pub fn disconnect(self) {
        debug!("[INPROC] Server dropped a connection");
    }
}

/// Connect to a bound inproc name (without prefix).
pub(crate) fn connect(name: &str) -> Result<Link> {
    let server = INPROC_REGISTRY
        .get(name)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| SioError::connection_refused(format!("{PREFIX}{name}")))?;

    let (client_tx, server_rx) = flume::unbounded();
    let (server_tx, client_rx) = flume::unbounded();

    server
        .send(ServerConnection {
            tx: server_tx,
            rx: server_rx,
        })
        .map_err(|_| SioError::connection_refused(format!("{PREFIX}{name}")))?;

    debug!("[INPROC] Connected to {}{}", PREFIX, name);
    Ok(Link {
        tx: client_tx,
        rx: client_rx,
    })
}

/// List all currently bound inproc endpoints (names without prefix).
pub fn list_inproc_endpoints() -> Vec<String> {
    INPROC_REGISTRY
        .iter()
        .map(|entry| entry.key().clone())
        .collect()
}

fn validate_and_extract_name(endpoint: &str) -> Result<&str> {
    let name = endpoint.strip_prefix(PREFIX).ok_or_else(|| {
        SioError::Endpoint(crate::endpoint::EndpointError::InvalidScheme(
            endpoint.to_string(),
        ))
    })?;

    if name.is_empty() {
        return Err(SioError::Endpoint(
            crate::endpoint::EndpointError::InvalidInprocName(
                "inproc name cannot be empty".to_string(),
            ),
        ));
    }

    Ok(name)
}
