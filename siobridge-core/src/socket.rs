//! Namespace sockets.
//!
//! A [`Socket`] is one namespace multiplexed over the client's link. It keeps
//! at most one listener per event name and buffers emits until the runtime
//! thread has joined the namespace.

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

use crate::client::{Command, Shared};
use crate::value::{Value, ValueRef};

/// Listener invoked on the runtime thread for each matching event.
pub type EventListener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Identifies one `on` registration so it can be removed without
/// clobbering a later registration for the same name.
pub type ListenerId = u64;

/// Inbound event delivered to an [`EventListener`].
#[derive(Debug, Clone)]
pub struct Event {
    nsp: String,
    name: String,
    args: Vec<ValueRef>,
}

impl Event {
    #[must_use]
    pub fn new(nsp: impl Into<String>, name: impl Into<String>, args: Vec<ValueRef>) -> Self {
        Self {
            nsp: nsp.into(),
            name: name.into(),
            args,
        }
    }

    #[must_use]
    pub fn nsp(&self) -> &str {
        &self.nsp
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn args(&self) -> &[ValueRef] {
        &self.args
    }

    /// First argument, or a `Null` node when the event carries none.
    #[must_use]
    pub fn message(&self) -> ValueRef {
        self.args.first().cloned().unwrap_or_else(Value::null)
    }
}

/// Normalize a namespace name: empty becomes `/`, a missing leading slash
/// is added.
#[must_use]
pub fn normalize_namespace(nsp: &str) -> String {
    if nsp.is_empty() {
        "/".to_string()
    } else if nsp.starts_with('/') {
        nsp.to_string()
    } else {
        format!("/{nsp}")
    }
}

/// One namespace of a [`Client`](crate::client::Client).
pub struct Socket {
    nsp: String,
    client: Weak<Shared>,
    listeners: RwLock<HashMap<String, (ListenerId, EventListener)>>,
    next_listener: AtomicU64,
    pending: Mutex<VecDeque<(String, Vec<ValueRef>)>>,
}

impl Socket {
    pub(crate) fn new(nsp: String, client: Weak<Shared>) -> Self {
        Self {
            nsp,
            client,
            listeners: RwLock::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Normalized namespace name.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.nsp
    }

    /// Register `listener` for `event`, replacing any previous one.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .insert(event.to_string(), (id, Arc::new(listener)));
        trace!("[SOCKET] {} listening for '{}' (#{})", self.nsp, event, id);
        id
    }

    /// Remove the listener for `event`. Returns true if one was registered.
    pub fn off(&self, event: &str) -> bool {
        self.listeners.write().remove(event).is_some()
    }

    /// Remove the listener for `event` only if it is still registration `id`.
    pub fn off_listener(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        match listeners.get(event) {
            Some((current, _)) if *current == id => {
                listeners.remove(event);
                true
            }
            _ => false,
        }
    }

    /// True while registration `id` is the listener for `event`.
    #[must_use]
    pub fn is_listening(&self, event: &str, id: ListenerId) -> bool {
        self.listeners
            .read()
            .get(event)
            .is_some_and(|(current, _)| *current == id)
    }

    /// Remove every listener.
    pub fn off_all(&self) {
        self.listeners.write().clear();
    }

    /// Emit `event` with `args`.
    ///
    /// The packet is queued and sent by the runtime thread once the namespace
    /// is joined; emits made while disconnected go out after the next join.
    pub fn emit(&self, event: &str, args: Vec<ValueRef>) {
        self.pending.lock().push_back((event.to_string(), args));
        trace!("[SOCKET] {} queued '{}'", self.nsp, event);
        if let Some(shared) = self.client.upgrade() {
            shared.send_command(Command::Flush(self.nsp.clone()));
        }
    }

    /// Leave the namespace. The client forgets this socket, so it is not
    /// rejoined after a reconnect.
    pub fn close(&self) {
        if let Some(shared) = self.client.upgrade() {
            shared.forget_socket(&self.nsp);
            shared.send_command(Command::Leave(self.nsp.clone()));
        }
    }

    /// Number of emits waiting for the namespace to be joined.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub(crate) fn take_pending(&self) -> VecDeque<(String, Vec<ValueRef>)> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Deliver `event` to its listener, if any. The listener runs with no
    /// lock held, so it may call `on`/`off` on this socket.
    pub(crate) fn dispatch(&self, event: &Event) {
        let listener = self
            .listeners
            .read()
            .get(event.name())
            .map(|(_, listener)| Arc::clone(listener));

        match listener {
            Some(listener) => listener(event),
            None => trace!("[SOCKET] {} dropped '{}' (no listener)", self.nsp, event.name()),
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("nsp", &self.nsp)
            .field("listeners", &self.listeners.read().len())
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}
