//! Client session: one [`Client`] plus its C notification slots.

use std::ffi::{c_char, c_uint, c_void, CString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use siobridge_core::client::{Client, ListenerKind};
use siobridge_core::options::ClientOptions;
use siobridge_core::socket::Socket;

use crate::callback::{
    CloseCallback, ConnectCallback, FailCallback, ReconnectCallback, SocketListenerCallback,
    UserData,
};

/// Session behind a `sio_client_handle`.
///
/// Each slot holds at most one (callback, context) pair. Setting a slot
/// swaps one `Arc` in the client, so a delivery in flight sees either the
/// old pair or the new one.
pub struct Session {
    client: Client,
    shut_down: AtomicBool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    #[must_use]
    pub fn with_options(options: ClientOptions) -> Self {
        Self::from_client(Client::with_options(options))
    }

    /// Wrap an already configured client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            shut_down: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Start connecting. The outcome arrives through the open / fail slots.
    pub fn connect(&self, uri: &str) {
        if let Err(e) = self.client.connect(uri) {
            error!("[SESSION] Could not start the runtime thread: {}", e);
        }
    }

    pub fn close(&self) {
        self.client.close();
    }

    pub fn sync_close(&self) {
        self.client.sync_close();
    }

    #[must_use]
    pub fn opened(&self) -> bool {
        self.client.opened()
    }

    /// Namespace socket, shared by every channel on the same namespace.
    #[must_use]
    pub fn socket(&self, nsp: &str) -> Arc<Socket> {
        self.client.socket(nsp)
    }

    pub fn set_reconnect_attempts(&self, attempts: Option<u32>) {
        self.client
            .update_options(|options| options.reconnect_attempts = attempts);
    }

    pub fn set_reconnect_delay(&self, delay: Duration) {
        self.client
            .update_options(|options| options.reconnect_delay = delay);
    }

    pub fn set_reconnect_delay_max(&self, delay: Duration) {
        self.client
            .update_options(|options| options.reconnect_delay_max = delay);
    }

    pub fn set_open_listener(&self, callback: ConnectCallback, user_data: UserData) {
        match callback {
            Some(callback) => self
                .client
                .set_open_listener(move || unsafe { callback(user_data.as_ptr()) }),
            None => self.client.clear_listener(ListenerKind::Open),
        }
    }

    pub fn set_fail_listener(&self, callback: FailCallback, user_data: UserData) {
        match callback {
            Some(callback) => self
                .client
                .set_fail_listener(move || unsafe { callback(user_data.as_ptr()) }),
            None => self.client.clear_listener(ListenerKind::Fail),
        }
    }

    pub fn set_close_listener(&self, callback: CloseCallback, user_data: UserData) {
        match callback {
            Some(callback) => self.client.set_close_listener(move |reason| {
                debug!("[SESSION] Close ({:?})", reason);
                unsafe { callback(user_data.as_ptr()) }
            }),
            None => self.client.clear_listener(ListenerKind::Close),
        }
    }

    pub fn set_reconnect_listener(&self, callback: ReconnectCallback, user_data: UserData) {
        match callback {
            Some(callback) => self.client.set_reconnect_listener(move |attempt, delay| {
                let delay_ms = c_uint::try_from(delay.as_millis()).unwrap_or(c_uint::MAX);
                unsafe { callback(attempt, delay_ms, user_data.as_ptr()) }
            }),
            None => self.client.clear_listener(ListenerKind::Reconnect),
        }
    }

    pub fn set_socket_open_listener(&self, callback: SocketListenerCallback, user_data: UserData) {
        match callback {
            Some(callback) => self.client.set_socket_open_listener(move |nsp| {
                notify_namespace(callback, nsp, user_data);
            }),
            None => self.client.clear_listener(ListenerKind::SocketOpen),
        }
    }

    pub fn set_socket_close_listener(&self, callback: SocketListenerCallback, user_data: UserData) {
        match callback {
            Some(callback) => self.client.set_socket_close_listener(move |nsp| {
                notify_namespace(callback, nsp, user_data);
            }),
            None => self.client.clear_listener(ListenerKind::SocketClose),
        }
    }

    /// Stop the connection and empty every slot.
    ///
    /// From any thread but the runtime thread this waits for the runtime
    /// thread to exit, so no notification fires after it returns. From a
    /// callback the slots are emptied first and the close is only requested.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.client.is_runtime_thread() {
            warn!("[SESSION] Destroyed from its own callback, closing without waiting");
            self.client.clear_listeners();
            self.client.close();
        } else {
            self.client.sync_close();
            self.client.clear_listeners();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn notify_namespace(
    callback: unsafe extern "C" fn(*const c_char, *mut c_void),
    nsp: &str,
    user_data: UserData,
) {
    // Namespaces are normalized names and never hold NUL bytes
    let Ok(nsp) = CString::new(nsp) else {
        return;
    };
    unsafe { callback(nsp.as_ptr(), user_data.as_ptr()) }
}
