//! Opaque handles and the tables behind them.
//!
//! Every object handed across the C boundary is identified by a [`Handle`]:
//! a non-zero integer drawn from one process-wide counter and surfaced to C
//! as `void*`. Ids are never reused, so a stale handle misses its table
//! instead of aliasing a newer object, and handles of different kinds never
//! collide. The null pointer is the sentinel ("no object").

use dashmap::DashMap;
use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_HANDLE: AtomicUsize = AtomicUsize::new(1);

/// Opaque object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroUsize);

impl Handle {
    /// Allocate a fresh id.
    #[must_use]
    pub fn next() -> Self {
        let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroUsize::new(id).unwrap_or(NonZeroUsize::MIN))
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0.get()
    }

    /// Handle carried by a C pointer; `None` for the sentinel.
    #[inline]
    #[must_use]
    pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
        NonZeroUsize::new(ptr as usize).map(Self)
    }

    #[inline]
    #[must_use]
    pub fn into_ptr(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// C pointer for an optional handle; null for `None`.
#[inline]
#[must_use]
pub fn to_ptr(handle: Option<Handle>) -> *mut c_void {
    handle.map_or(std::ptr::null_mut(), Handle::into_ptr)
}

/// Handle-indexed table of shared objects.
///
/// Lookups clone the `Arc` out of the map so no shard lock is held while
/// the caller uses the object.
pub struct HandleTable<T> {
    entries: DashMap<Handle, Arc<T>>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, item: T) -> Handle {
        let handle = Handle::next();
        self.entries.insert(handle, Arc::new(item));
        handle
    }

    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<Arc<T>> {
        self.entries.get(&handle).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, handle: Handle) -> Option<Arc<T>> {
        self.entries.remove(&handle).map(|(_, item)| item)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
