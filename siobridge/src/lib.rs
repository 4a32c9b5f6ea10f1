//! # siobridge
//!
//! A flat, handle-based C ABI over a socket.io-style realtime client.
//!
//! ## Architecture
//!
//! - **`siobridge-core`**: value tree, client runtime, transports (safe Rust)
//! - **`siobridge`**: the boundary (this crate)
//!   - [`registry`]: value handles and who destroys them
//!   - [`session`]: one client plus its six notification slots
//!   - [`channel`]: per-namespace event handlers
//!   - [`ffi`]: the `sio_*` entry points declared in `include/sio_bridge.h`
//!
//! ## Threading
//!
//! Every callback runs on the client's runtime thread (`sio-client`). No
//! boundary lock is held while a callback runs, so callbacks may call any
//! `sio_*` function, including `sio_socket_off` on their own event and
//! `sio_client_destroy` on their own client (which then closes without
//! waiting).
//!
//! ## Values in callbacks
//!
//! The message handle passed to an event callback is valid until the
//! callback returns. Push it into a container to keep it; otherwise it is
//! released automatically.
//!
//! ```rust,no_run
//! use siobridge::channel::Channel;
//! use siobridge::session::Session;
//! use siobridge::Value;
//!
//! let session = Session::new();
//! let chat = Channel::new(session.socket("/chat"));
//! session.connect("inproc://chat-server");
//! chat.emit("message", Value::string("hello"));
//! ```

#![warn(clippy::all)]

pub mod callback;
pub mod channel;
pub mod dev_tracing;
pub mod ffi;
pub mod handle;
pub mod registry;
pub mod session;

pub use channel::Channel;
pub use handle::Handle;
pub use registry::ValueRegistry;
pub use session::Session;
pub use siobridge_core::value::{Value, ValueKind, ValueRef};
