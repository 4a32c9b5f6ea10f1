//! `extern "C"` surface (`sio_*`).
//!
//! Handles travel as `void*`; NULL is the sentinel. Every entry point runs
//! inside [`guard`] so a panic never unwinds into C: the entry point logs it
//! and returns its documented default instead.

pub mod client;
pub mod socket;
pub mod value;

use std::borrow::Cow;
use std::ffi::{c_char, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

pub(crate) fn guard<T>(name: &'static str, default: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            error!("[FFI] {} panicked", name);
            default
        }
    }
}

/// C string argument, or `None` for NULL. Invalid UTF-8 is replaced.
///
/// # Safety
///
/// `ptr` must be NULL or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<Cow<'a, str>> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy())
    }
}

/// Install a `tracing` subscriber driven by `RUST_LOG`. No-op when
/// `RUST_LOG` is unset or a subscriber is already installed.
#[no_mangle]
pub extern "C" fn sio_init_logging() {
    guard("sio_init_logging", (), crate::dev_tracing::init_tracing);
}
