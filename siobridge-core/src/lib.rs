//! siobridge Core
//!
//! Safe building blocks behind the siobridge C boundary:
//! - Dynamic message values (`value`)
//! - Endpoint parsing (`endpoint`)
//! - Client options and reconnect backoff (`options`, `reconnect`)
//! - Lifecycle events and monitors (`monitor`)
//! - Transport seam and in-process transport (`transport`, `inproc`)
//! - Client runtime and namespace sockets (`client`, `socket`)
//! - Error types (`error`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]

pub mod client;
pub mod endpoint;
pub mod error;
pub mod inproc;
pub mod monitor;
pub mod options;
pub mod reconnect;
pub mod socket;
pub mod transport;
pub mod value;

pub use client::{Client, ListenerKind};
pub use error::{Result, SioError};
pub use inproc::InprocServer;
pub use monitor::{ClientEvent, CloseReason};
pub use options::ClientOptions;
pub use socket::{Event, Socket};
pub use transport::Transport;
pub use value::{Value, ValueKind, ValueRef};

// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::client::{Client, ListenerKind};
    pub use crate::endpoint::Endpoint;
    pub use crate::inproc::{InprocServer, ServerConnection};
    pub use crate::monitor::{ClientEvent, ClientMonitor, CloseReason};
    pub use crate::options::ClientOptions;
    pub use crate::reconnect::ReconnectState;
    pub use crate::socket::{Event, ListenerId, Socket};
    pub use crate::transport::{InprocTransport, Link, Packet, Transport};
    pub use crate::value::{Value, ValueKind, ValueRef};
}
