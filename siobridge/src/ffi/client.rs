//! `sio_client_*`: session handles.

use once_cell::sync::Lazy;
use std::ffi::{c_char, c_int, c_uint, c_void};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{guard, str_arg};
use crate::callback::{
    CloseCallback, ConnectCallback, FailCallback, ReconnectCallback, SocketListenerCallback,
    UserData,
};
use crate::handle::{Handle, HandleTable};
use crate::session::Session;

pub(crate) static SESSIONS: Lazy<HandleTable<Session>> = Lazy::new(HandleTable::new);

pub(crate) fn session(client: *mut c_void) -> Option<Arc<Session>> {
    let session = Handle::from_ptr(client).and_then(|handle| SESSIONS.get(handle));
    if session.is_none() && !client.is_null() {
        warn!("[FFI] Unknown client handle {:p}", client);
    }
    session
}

#[no_mangle]
pub extern "C" fn sio_client_create() -> *mut c_void {
    guard("sio_client_create", std::ptr::null_mut(), || {
        let handle = SESSIONS.insert(Session::new());
        debug!("[FFI] Client {} created", handle);
        handle.into_ptr()
    })
}

/// Close the connection (waiting for the runtime thread unless called from
/// one of this client's callbacks) and free the client. No callback of this
/// client fires after it returns.
#[no_mangle]
pub extern "C" fn sio_client_destroy(client: *mut c_void) {
    guard("sio_client_destroy", (), || {
        let Some(handle) = Handle::from_ptr(client) else {
            return;
        };
        match SESSIONS.remove(handle) {
            Some(session) => {
                session.shutdown();
                debug!("[FFI] Client {} destroyed", handle);
            }
            None => warn!("[FFI] sio_client_destroy of unknown client {}", handle),
        }
    });
}

/// Start connecting; the result is reported through the open / fail
/// listeners.
///
/// # Safety
///
/// `uri` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sio_client_connect(client: *mut c_void, uri: *const c_char) {
    guard("sio_client_connect", (), || {
        let Some(session) = session(client) else {
            return;
        };
        match str_arg(uri) {
            Some(uri) => session.connect(&uri),
            None => warn!("[FFI] sio_client_connect with NULL uri"),
        }
    });
}

#[no_mangle]
pub extern "C" fn sio_client_close(client: *mut c_void) {
    guard("sio_client_close", (), || {
        if let Some(session) = session(client) {
            session.close();
        }
    });
}

/// Close and wait until the close listener has run.
#[no_mangle]
pub extern "C" fn sio_client_sync_close(client: *mut c_void) {
    guard("sio_client_sync_close", (), || {
        if let Some(session) = session(client) {
            session.sync_close();
        }
    });
}

#[no_mangle]
pub extern "C" fn sio_client_opened(client: *mut c_void) -> c_int {
    guard("sio_client_opened", 0, || {
        session(client).map_or(0, |session| c_int::from(session.opened()))
    })
}

#[no_mangle]
pub extern "C" fn sio_client_set_open_listener(
    client: *mut c_void,
    callback: ConnectCallback,
    user_data: *mut c_void,
) {
    guard("sio_client_set_open_listener", (), || {
        if let Some(session) = session(client) {
            session.set_open_listener(callback, UserData(user_data));
        }
    });
}

#[no_mangle]
pub extern "C" fn sio_client_set_fail_listener(
    client: *mut c_void,
    callback: FailCallback,
    user_data: *mut c_void,
) {
    guard("sio_client_set_fail_listener", (), || {
        if let Some(session) = session(client) {
            session.set_fail_listener(callback, UserData(user_data));
        }
    });
}

#[no_mangle]
pub extern "C" fn sio_client_set_close_listener(
    client: *mut c_void,
    callback: CloseCallback,
    user_data: *mut c_void,
) {
    guard("sio_client_set_close_listener", (), || {
        if let Some(session) = session(client) {
            session.set_close_listener(callback, UserData(user_data));
        }
    });
}

#[no_mangle]
pub extern "C" fn sio_client_set_reconnect_listener(
    client: *mut c_void,
    callback: ReconnectCallback,
    user_data: *mut c_void,
) {
    guard("sio_client_set_reconnect_listener", (), || {
        if let Some(session) = session(client) {
            session.set_reconnect_listener(callback, UserData(user_data));
        }
    });
}

#[no_mangle]
pub extern "C" fn sio_client_set_socket_open_listener(
    client: *mut c_void,
    callback: SocketListenerCallback,
    user_data: *mut c_void,
) {
    guard("sio_client_set_socket_open_listener", (), || {
        if let Some(session) = session(client) {
            session.set_socket_open_listener(callback, UserData(user_data));
        }
    });
}

#[no_mangle]
pub extern "C" fn sio_client_set_socket_close_listener(
    client: *mut c_void,
    callback: SocketListenerCallback,
    user_data: *mut c_void,
) {
    guard("sio_client_set_socket_close_listener", (), || {
        if let Some(session) = session(client) {
            session.set_socket_close_listener(callback, UserData(user_data));
        }
    });
}

/// Attempt limit for the next connect; negative means unlimited, 0
/// disables reconnection.
#[no_mangle]
pub extern "C" fn sio_client_set_reconnect_attempts(client: *mut c_void, attempts: c_int) {
    guard("sio_client_set_reconnect_attempts", (), || {
        if let Some(session) = session(client) {
            session.set_reconnect_attempts(u32::try_from(attempts).ok());
        }
    });
}

/// Initial reconnect delay in milliseconds for the next connect.
#[no_mangle]
pub extern "C" fn sio_client_set_reconnect_delay(client: *mut c_void, delay_ms: c_uint) {
    guard("sio_client_set_reconnect_delay", (), || {
        if let Some(session) = session(client) {
            session.set_reconnect_delay(Duration::from_millis(u64::from(delay_ms)));
        }
    });
}

/// Reconnect delay cap in milliseconds for the next connect.
#[no_mangle]
pub extern "C" fn sio_client_set_reconnect_delay_max(client: *mut c_void, delay_ms: c_uint) {
    guard("sio_client_set_reconnect_delay_max", (), || {
        if let Some(session) = session(client) {
            session.set_reconnect_delay_max(Duration::from_millis(u64::from(delay_ms)));
        }
    });
}
