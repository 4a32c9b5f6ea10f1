//! `sio_socket_*`: channel handles.

use once_cell::sync::Lazy;
use std::ffi::{c_char, c_void};
use std::sync::Arc;
use tracing::{debug, warn};

use super::client::session;
use super::{guard, str_arg};
use crate::callback::{EventCallback, UserData};
use crate::channel::Channel;
use crate::handle::{Handle, HandleTable};
use crate::registry::ValueRegistry;

pub(crate) static CHANNELS: Lazy<HandleTable<Channel>> = Lazy::new(HandleTable::new);

fn channel(socket: *mut c_void) -> Option<Arc<Channel>> {
    let channel = Handle::from_ptr(socket).and_then(|handle| CHANNELS.get(handle));
    if channel.is_none() && !socket.is_null() {
        warn!("[FFI] Unknown socket handle {:p}", socket);
    }
    channel
}

/// Channel for namespace `nsp` (NULL or "" for `/`). Every call returns a
/// new handle; handles for the same namespace share one socket.
///
/// # Safety
///
/// `nsp` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sio_client_get_socket(client: *mut c_void, nsp: *const c_char) -> *mut c_void {
    guard("sio_client_get_socket", std::ptr::null_mut(), || {
        let Some(session) = session(client) else {
            return std::ptr::null_mut();
        };
        let nsp = str_arg(nsp).unwrap_or_default();
        let channel = Channel::new(session.socket(&nsp));
        let namespace = channel.namespace().to_string();
        let handle = CHANNELS.insert(channel);
        debug!("[FFI] Socket {} for {}", handle, namespace);
        handle.into_ptr()
    })
}

/// Drop every handler this handle registered and free it. Returns once a
/// handler running on the runtime thread has finished, unless called from
/// that handler.
#[no_mangle]
pub extern "C" fn sio_socket_destroy(socket: *mut c_void) {
    guard("sio_socket_destroy", (), || {
        let Some(handle) = Handle::from_ptr(socket) else {
            return;
        };
        match CHANNELS.remove(handle) {
            Some(channel) => channel.close(),
            None => warn!("[FFI] sio_socket_destroy of unknown socket {}", handle),
        }
    });
}

/// Emit `event` carrying `msg`. The caller keeps ownership of `msg`.
///
/// # Safety
///
/// `event` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sio_socket_emit(socket: *mut c_void, event: *const c_char, msg: *mut c_void) {
    guard("sio_socket_emit", (), || {
        let Some(channel) = channel(socket) else {
            return;
        };
        let Some(event) = str_arg(event) else {
            warn!("[FFI] sio_socket_emit with NULL event name");
            return;
        };
        let value = Handle::from_ptr(msg).and_then(|handle| ValueRegistry::global().value(handle));
        match value {
            Some(value) => channel.emit(&event, value),
            None => warn!("[FFI] sio_socket_emit('{}') without a valid message, dropped", event),
        }
    });
}

/// Register (or replace) the handler for `event`; a NULL callback removes it.
///
/// # Safety
///
/// `event` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sio_socket_on(
    socket: *mut c_void,
    event: *const c_char,
    callback: EventCallback,
    user_data: *mut c_void,
) {
    guard("sio_socket_on", (), || {
        let Some(channel) = channel(socket) else {
            return;
        };
        match str_arg(event) {
            Some(event) => channel.on(&event, callback, UserData(user_data)),
            None => warn!("[FFI] sio_socket_on with NULL event name"),
        }
    });
}

/// Remove the handler for `event`. Later events of that name are dropped.
///
/// # Safety
///
/// `event` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sio_socket_off(socket: *mut c_void, event: *const c_char) {
    guard("sio_socket_off", (), || {
        let Some(channel) = channel(socket) else {
            return;
        };
        if let Some(event) = str_arg(event) {
            channel.off(&event);
        }
    });
}
