//! `sio_message_*`: value handles.

use std::ffi::{c_char, c_int, c_void};
use tracing::warn;

use siobridge_core::value::{Value, ValueKind, ValueRef};

use super::{guard, str_arg};
use crate::handle::{to_ptr, Handle};
use crate::registry::ValueRegistry;

fn registry() -> &'static ValueRegistry {
    ValueRegistry::global()
}

fn create(value: ValueRef) -> *mut c_void {
    registry().insert(value).into_ptr()
}

fn lookup(msg: *mut c_void) -> Option<ValueRef> {
    Handle::from_ptr(msg).and_then(|handle| registry().value(handle))
}

#[no_mangle]
pub extern "C" fn sio_message_create_null() -> *mut c_void {
    guard("sio_message_create_null", std::ptr::null_mut(), || {
        create(Value::null())
    })
}

/// Returns NULL if `value` is NULL.
///
/// # Safety
///
/// `value` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sio_message_create_string(value: *const c_char) -> *mut c_void {
    guard("sio_message_create_string", std::ptr::null_mut(), || {
        match str_arg(value) {
            Some(value) => create(Value::string(value.into_owned())),
            None => {
                warn!("[FFI] sio_message_create_string with NULL string");
                std::ptr::null_mut()
            }
        }
    })
}

#[no_mangle]
pub extern "C" fn sio_message_create_integer(value: i64) -> *mut c_void {
    guard("sio_message_create_integer", std::ptr::null_mut(), || {
        create(Value::integer(value))
    })
}

#[no_mangle]
pub extern "C" fn sio_message_create_double(value: f64) -> *mut c_void {
    guard("sio_message_create_double", std::ptr::null_mut(), || {
        create(Value::double(value))
    })
}

#[no_mangle]
pub extern "C" fn sio_message_create_boolean(value: c_int) -> *mut c_void {
    guard("sio_message_create_boolean", std::ptr::null_mut(), || {
        create(Value::boolean(value != 0))
    })
}

#[no_mangle]
pub extern "C" fn sio_message_create_array() -> *mut c_void {
    guard("sio_message_create_array", std::ptr::null_mut(), || {
        create(Value::array())
    })
}

#[no_mangle]
pub extern "C" fn sio_message_create_object() -> *mut c_void {
    guard("sio_message_create_object", std::ptr::null_mut(), || {
        create(Value::object())
    })
}

/// Copies `len` bytes from `data`. Returns NULL if `data` is NULL and `len`
/// is not zero.
///
/// # Safety
///
/// `data` must be NULL or valid for reads of `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn sio_message_create_binary(data: *const u8, len: usize) -> *mut c_void {
    guard("sio_message_create_binary", std::ptr::null_mut(), || {
        if data.is_null() {
            if len != 0 {
                warn!("[FFI] sio_message_create_binary with NULL data");
                return std::ptr::null_mut();
            }
            return create(Value::binary(bytes::Bytes::new()));
        }
        let bytes = std::slice::from_raw_parts(data, len);
        create(Value::binary(bytes::Bytes::copy_from_slice(bytes)))
    })
}

/// Destroy a caller-owned handle and everything it owns. NULL is ignored.
#[no_mangle]
pub extern "C" fn sio_message_destroy(msg: *mut c_void) {
    guard("sio_message_destroy", (), || {
        if let Some(handle) = Handle::from_ptr(msg) {
            registry().destroy(handle);
        }
    });
}

#[no_mangle]
pub extern "C" fn sio_message_get_type(msg: *mut c_void) -> ValueKind {
    guard("sio_message_get_type", ValueKind::Null, || {
        Handle::from_ptr(msg).map_or(ValueKind::Null, |handle| registry().kind(handle))
    })
}

/// NULL unless `msg` is a string. The pointer stays valid until the next
/// `sio_message_get_string` / `sio_message_object_key` on `msg` or until
/// `msg` is destroyed.
#[no_mangle]
pub extern "C" fn sio_message_get_string(msg: *mut c_void) -> *const c_char {
    guard("sio_message_get_string", std::ptr::null(), || {
        Handle::from_ptr(msg).map_or(std::ptr::null(), |handle| registry().string_ptr(handle))
    })
}

#[no_mangle]
pub extern "C" fn sio_message_get_integer(msg: *mut c_void) -> i64 {
    guard("sio_message_get_integer", 0, || {
        lookup(msg).map_or(0, |value| value.get_integer())
    })
}

#[no_mangle]
pub extern "C" fn sio_message_get_double(msg: *mut c_void) -> f64 {
    guard("sio_message_get_double", 0.0, || {
        lookup(msg).map_or(0.0, |value| value.get_double())
    })
}

#[no_mangle]
pub extern "C" fn sio_message_get_boolean(msg: *mut c_void) -> c_int {
    guard("sio_message_get_boolean", 0, || {
        lookup(msg).map_or(0, |value| c_int::from(value.get_boolean()))
    })
}

/// Bytes of a binary value, valid until `msg` is destroyed. NULL (and a
/// length of 0) unless `msg` is binary.
///
/// # Safety
///
/// `out_len` must be NULL or valid for a `size_t` write.
#[no_mangle]
pub unsafe extern "C" fn sio_message_get_binary(msg: *mut c_void, out_len: *mut usize) -> *const u8 {
    guard("sio_message_get_binary", std::ptr::null(), || {
        let (ptr, len) = Handle::from_ptr(msg)
            .and_then(|handle| registry().binary(handle))
            .unwrap_or((std::ptr::null(), 0));
        if !out_len.is_null() {
            *out_len = len;
        }
        ptr
    })
}

/// Append `msg` to `array`; `array` takes over destroying `msg`. No-op
/// unless `array` is an array.
#[no_mangle]
pub extern "C" fn sio_message_array_push(array: *mut c_void, msg: *mut c_void) {
    guard("sio_message_array_push", (), || {
        if let (Some(array), Some(msg)) = (Handle::from_ptr(array), Handle::from_ptr(msg)) {
            registry().push(array, msg);
        }
    });
}

#[no_mangle]
pub extern "C" fn sio_message_array_size(array: *mut c_void) -> usize {
    guard("sio_message_array_size", 0, || {
        lookup(array).map_or(0, |value| value.array_len())
    })
}

/// New caller-owned view of element `index`, or NULL.
#[no_mangle]
pub extern "C" fn sio_message_array_get(array: *mut c_void, index: usize) -> *mut c_void {
    guard("sio_message_array_get", std::ptr::null_mut(), || {
        to_ptr(Handle::from_ptr(array).and_then(|array| registry().array_get(array, index)))
    })
}

/// Store `msg` under `key`; `obj` takes over destroying `msg`. No-op unless
/// `obj` is an object.
///
/// # Safety
///
/// `key` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sio_message_object_set(obj: *mut c_void, key: *const c_char, msg: *mut c_void) {
    guard("sio_message_object_set", (), || {
        let (Some(obj), Some(msg)) = (Handle::from_ptr(obj), Handle::from_ptr(msg)) else {
            return;
        };
        match str_arg(key) {
            Some(key) => {
                registry().set(obj, &key, msg);
            }
            None => warn!("[FFI] sio_message_object_set with NULL key"),
        }
    });
}

/// New caller-owned view of member `key`, or NULL.
///
/// # Safety
///
/// `key` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sio_message_object_get(obj: *mut c_void, key: *const c_char) -> *mut c_void {
    guard("sio_message_object_get", std::ptr::null_mut(), || {
        let (Some(obj), Some(key)) = (Handle::from_ptr(obj), str_arg(key)) else {
            return std::ptr::null_mut();
        };
        to_ptr(registry().object_get(obj, &key))
    })
}

/// # Safety
///
/// `key` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sio_message_object_has(obj: *mut c_void, key: *const c_char) -> c_int {
    guard("sio_message_object_has", 0, || {
        match (lookup(obj), str_arg(key)) {
            (Some(value), Some(key)) => c_int::from(value.object_has(&key)),
            _ => 0,
        }
    })
}

#[no_mangle]
pub extern "C" fn sio_message_object_size(obj: *mut c_void) -> usize {
    guard("sio_message_object_size", 0, || {
        lookup(obj).map_or(0, |value| value.object_len())
    })
}

/// Key number `index` in sorted key order, or NULL. Same lifetime as
/// `sio_message_get_string`.
#[no_mangle]
pub extern "C" fn sio_message_object_key(obj: *mut c_void, index: usize) -> *const c_char {
    guard("sio_message_object_key", std::ptr::null(), || {
        Handle::from_ptr(obj).map_or(std::ptr::null(), |obj| {
            registry().object_key_ptr(obj, index)
        })
    })
}
