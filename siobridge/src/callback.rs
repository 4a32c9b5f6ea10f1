//! C callback types.
//!
//! Every callback receives the caller's context pointer as its last
//! argument. A `None` (NULL) callback clears the slot it is passed to.

use std::ffi::{c_char, c_uint, c_void};

/// `void (*)(void* user_data)`: open notification.
pub type ConnectCallback = Option<unsafe extern "C" fn(user_data: *mut c_void)>;

/// `void (*)(void* user_data)`: fail notification.
pub type FailCallback = Option<unsafe extern "C" fn(user_data: *mut c_void)>;

/// `void (*)(void* user_data)`: close notification.
pub type CloseCallback = Option<unsafe extern "C" fn(user_data: *mut c_void)>;

/// `void (*)(unsigned attempt, unsigned delay_ms, void* user_data)`.
pub type ReconnectCallback =
    Option<unsafe extern "C" fn(attempt: c_uint, delay_ms: c_uint, user_data: *mut c_void)>;

/// `void (*)(const char* nsp, void* user_data)`: namespace opened / closed.
pub type SocketListenerCallback =
    Option<unsafe extern "C" fn(nsp: *const c_char, user_data: *mut c_void)>;

/// `void (*)(const char* event, sio_message_handle msg, void* user_data)`.
///
/// `msg` is valid only until the callback returns.
pub type EventCallback = Option<
    unsafe extern "C" fn(event: *const c_char, msg: *mut c_void, user_data: *mut c_void),
>;

/// Caller context pointer, passed back untouched.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct UserData(pub *mut c_void);

// The pointer is only ever handed back to the caller's own callbacks; the
// caller is responsible for whatever it points to being usable from the
// runtime thread.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    #[must_use]
    pub const fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    #[inline]
    #[must_use]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }
}
