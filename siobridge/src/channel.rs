//! Channel: C event handlers on one namespace socket.
//!
//! The handler table is written by caller threads (`on` / `off`) and read by
//! the runtime thread, so it sits behind a mutex that is only held for the
//! lookup or mutation. Delivery copies the (callback, context) pair out,
//! unlocks, wraps the payload in a transient value handle, invokes the
//! callback and releases the handle.
//!
//! Closing a channel waits for a delivery in flight on the runtime thread,
//! unless it is that delivery's own callback doing the closing.

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use std::ffi::{c_char, c_void, CString};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{trace, warn};

use siobridge_core::socket::{Event, ListenerId, Socket};
use siobridge_core::value::ValueRef;

use crate::callback::{EventCallback, UserData};
use crate::registry::ValueRegistry;

type RawEventCallback = unsafe extern "C" fn(*const c_char, *mut c_void, *mut c_void);

#[derive(Clone, Copy)]
struct EventHandler {
    callback: RawEventCallback,
    user_data: UserData,
}

#[derive(Default)]
struct InFlight {
    active: usize,
    closed: bool,
    thread: Option<ThreadId>,
}

/// State shared with the socket listeners this channel installs.
#[derive(Default)]
struct Delivery {
    handlers: Mutex<HashMap<String, EventHandler>>,
    in_flight: Mutex<InFlight>,
    idle: Condvar,
}

/// Marks one delivery as running until dropped.
struct Entered<'a>(&'a Delivery);

impl<'a> Entered<'a> {
    fn enter(delivery: &'a Delivery) -> Option<Self> {
        let mut state = delivery.in_flight.lock();
        if state.closed {
            return None;
        }
        state.active += 1;
        state.thread = Some(thread::current().id());
        Some(Self(delivery))
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        let mut state = self.0.in_flight.lock();
        state.active -= 1;
        if state.active == 0 {
            state.thread = None;
            self.0.idle.notify_all();
        }
    }
}

/// Channel behind a `sio_socket_handle`.
pub struct Channel {
    socket: Arc<Socket>,
    delivery: Arc<Delivery>,
    /// Socket listeners installed by this channel, by event name.
    subscriptions: Mutex<HashMap<String, ListenerId>>,
}

impl Channel {
    #[must_use]
    pub fn new(socket: Arc<Socket>) -> Self {
        Self {
            socket,
            delivery: Arc::new(Delivery::default()),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.socket.namespace()
    }

    #[must_use]
    pub fn socket(&self) -> &Arc<Socket> {
        &self.socket
    }

    /// Emit `event` with a single value.
    pub fn emit(&self, event: &str, value: ValueRef) {
        self.socket.emit(event, vec![value]);
    }

    /// Register or replace the handler for `event`. A `None` callback
    /// removes it.
    pub fn on(&self, event: &str, callback: EventCallback, user_data: UserData) {
        let Some(callback) = callback else {
            self.off(event);
            return;
        };
        if self.is_closed() {
            warn!("[CHANNEL] {} closed, handler for '{}' ignored", self.namespace(), event);
            return;
        }

        self.delivery
            .handlers
            .lock()
            .insert(event.to_string(), EventHandler { callback, user_data });

        let delivery = Arc::clone(&self.delivery);
        let id = self
            .socket
            .on(event, move |event: &Event| deliver(&delivery, event));
        self.subscriptions.lock().insert(event.to_string(), id);
        trace!("[CHANNEL] {} handler set for '{}'", self.namespace(), event);
    }

    /// Remove the handler for `event` and detach its socket listener.
    pub fn off(&self, event: &str) {
        self.delivery.handlers.lock().remove(event);
        let id = self.subscriptions.lock().remove(event);
        if let Some(id) = id {
            self.socket.off_listener(event, id);
        }
    }

    /// Number of handlers that still receive events.
    ///
    /// Another channel on the same namespace registering the same event
    /// takes the socket listener over; such handlers are dropped here.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.prune();
        self.delivery.handlers.lock().len()
    }

    /// Detach every handler. Blocks until a delivery running on another
    /// thread has returned; no callback of this channel starts afterwards.
    pub fn close(&self) {
        {
            let mut state = self.delivery.in_flight.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }

        self.delivery.handlers.lock().clear();
        let subscriptions: Vec<(String, ListenerId)> =
            self.subscriptions.lock().drain().collect();
        for (event, id) in subscriptions {
            self.socket.off_listener(&event, id);
        }

        let current = thread::current().id();
        let mut state = self.delivery.in_flight.lock();
        while state.active > 0 && state.thread != Some(current) {
            self.delivery.idle.wait(&mut state);
        }
        trace!("[CHANNEL] {} closed", self.namespace());
    }

    fn is_closed(&self) -> bool {
        self.delivery.in_flight.lock().closed
    }

    fn prune(&self) {
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|event, id| {
            let current = self.socket.is_listening(event, *id);
            if !current {
                trace!("[CHANNEL] '{}' taken over by another channel", event);
                self.delivery.handlers.lock().remove(event.as_str());
            }
            current
        });
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

fn deliver(delivery: &Delivery, event: &Event) {
    let Some(_entered) = Entered::enter(delivery) else {
        return;
    };
    let handler = delivery.handlers.lock().get(event.name()).copied();
    let Some(handler) = handler else {
        trace!("[CHANNEL] No handler for '{}'", event.name());
        return;
    };

    let Ok(name) = CString::new(event.name()) else {
        warn!("[CHANNEL] Event name with NUL byte dropped");
        return;
    };

    let registry = ValueRegistry::global();
    let message = registry.insert(event.message());
    unsafe { (handler.callback)(name.as_ptr(), message.into_ptr(), handler.user_data.as_ptr()) };
    registry.release(message);
}
