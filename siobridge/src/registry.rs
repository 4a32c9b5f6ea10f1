//! Ownership registry for value handles.
//!
//! Each live value handle maps to an entry holding the value node, who is
//! responsible for destroying the handle, and the handles it owns in turn.
//!
//! - `push` / `set` store the child node inside the container and move
//!   destruction of the child handle to the container.
//! - `array_get` / `object_get` return a fresh caller-owned handle that
//!   aliases the stored node (a view): destroying it never touches the
//!   container.
//! - `destroy` removes a caller-owned handle and, iteratively, every handle
//!   it owns.
//!
//! Misuse the registry can detect (unknown handle, double destroy,
//! destroying a handle a container owns) is logged and ignored.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::ffi::{c_char, CString};
use std::sync::Arc;
use tracing::{trace, warn};

use siobridge_core::value::{ValueKind, ValueRef};

use crate::handle::Handle;

static GLOBAL: Lazy<ValueRegistry> = Lazy::new(ValueRegistry::new);

/// Who destroys a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// The caller must destroy it.
    Caller,
    /// Destroyed together with the container handle.
    Container(Handle),
}

struct Entry {
    value: ValueRef,
    owner: Owner,
    children: SmallVec<[Handle; 4]>,
    /// Backing buffer for the last string handed out for this handle.
    text: Option<CString>,
}

impl Entry {
    fn new(value: ValueRef) -> Self {
        Self {
            value,
            owner: Owner::Caller,
            children: SmallVec::new(),
            text: None,
        }
    }

    fn hand_out(&mut self, text: &str) -> *const c_char {
        self.text.insert(to_cstring(text)).as_ptr()
    }
}

/// C view of `s`, cut at the first interior NUL.
fn to_cstring(s: &str) -> CString {
    let bytes = s.as_bytes();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    CString::new(&bytes[..end]).unwrap_or_default()
}

/// Handle-indexed value table.
pub struct ValueRegistry {
    entries: DashMap<Handle, Entry>,
}

impl Default for ValueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Registry shared by the C boundary.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Register `value` under a fresh caller-owned handle.
    pub fn insert(&self, value: ValueRef) -> Handle {
        let handle = Handle::next();
        trace!("[REGISTRY] {} created ({})", handle, value.kind());
        self.entries.insert(handle, Entry::new(value));
        handle
    }

    /// Node behind `handle`.
    #[must_use]
    pub fn value(&self, handle: Handle) -> Option<ValueRef> {
        self.entries.get(&handle).map(|entry| ValueRef::clone(&entry.value))
    }

    /// Kind of the node behind `handle`; `Null` for unknown handles.
    #[must_use]
    pub fn kind(&self, handle: Handle) -> ValueKind {
        self.entries
            .get(&handle)
            .map_or(ValueKind::Null, |entry| entry.value.kind())
    }

    #[must_use]
    pub fn owner(&self, handle: Handle) -> Option<Owner> {
        self.entries.get(&handle).map(|entry| entry.owner)
    }

    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Number of live handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append `child` to `array`. Returns false if nothing was stored.
    pub fn push(&self, array: Handle, child: Handle) -> bool {
        let Some(node) = self.value(child) else {
            warn!("[REGISTRY] push of unknown handle {}", child);
            return false;
        };
        let Some(container) = self.value(array) else {
            warn!("[REGISTRY] push into unknown handle {}", array);
            return false;
        };
        if !container.push(node) {
            trace!("[REGISTRY] push into {} ({}) ignored", array, container.kind());
            return false;
        }
        self.adopt(array, child);
        true
    }

    /// Store `child` under `key` in `object`. Returns false if nothing was
    /// stored.
    pub fn set(&self, object: Handle, key: &str, child: Handle) -> bool {
        let Some(node) = self.value(child) else {
            warn!("[REGISTRY] set of unknown handle {}", child);
            return false;
        };
        let Some(container) = self.value(object) else {
            warn!("[REGISTRY] set into unknown handle {}", object);
            return false;
        };
        let displaced = match container.object_replace(key, ValueRef::clone(&node)) {
            Ok(displaced) => displaced,
            Err(_) => {
                trace!("[REGISTRY] set into {} ({}) ignored", object, container.kind());
                return false;
            }
        };
        if let Some(old) = displaced {
            if !Arc::ptr_eq(&old, &node) && !container.holds(&old) {
                self.release_displaced(object, &old);
            }
        }
        self.adopt(object, child);
        true
    }

    /// Destroy the handles `object` owned for a node that was just replaced.
    fn release_displaced(&self, object: Handle, old: &ValueRef) {
        let Some(children) = self.entries.get(&object).map(|entry| entry.children.clone()) else {
            return;
        };
        let stale: SmallVec<[Handle; 4]> = children
            .into_iter()
            .filter(|child| {
                self.entries
                    .get(child)
                    .is_some_and(|entry| Arc::ptr_eq(&entry.value, old))
            })
            .collect();
        if stale.is_empty() {
            return;
        }
        if let Some(mut entry) = self.entries.get_mut(&object) {
            entry.children.retain(|child| !stale.contains(child));
        }
        for handle in stale {
            trace!("[REGISTRY] {} replaced in {}", handle, object);
            self.remove_tree(handle);
        }
    }

    /// Move destruction of `child` to `parent` unless a container already
    /// owns it.
    fn adopt(&self, parent: Handle, child: Handle) {
        {
            let Some(mut entry) = self.entries.get_mut(&child) else {
                return;
            };
            match entry.owner {
                Owner::Caller => entry.owner = Owner::Container(parent),
                Owner::Container(owner) => {
                    trace!("[REGISTRY] {} stays owned by {}, aliased into {}", child, owner, parent);
                    return;
                }
            }
        }
        if let Some(mut entry) = self.entries.get_mut(&parent) {
            entry.children.push(child);
        }
    }

    /// View of element `index` of `array`.
    pub fn array_get(&self, array: Handle, index: usize) -> Option<Handle> {
        let node = self.value(array)?.array_get(index)?;
        Some(self.insert(node))
    }

    /// View of the member `key` of `object`.
    pub fn object_get(&self, object: Handle, key: &str) -> Option<Handle> {
        let node = self.value(object)?.object_get(key)?;
        Some(self.insert(node))
    }

    /// C string for a string handle; null on mismatch.
    ///
    /// The pointer stays valid until the next string or key retrieval on
    /// the same handle, or until the handle is destroyed.
    #[must_use]
    pub fn string_ptr(&self, handle: Handle) -> *const c_char {
        let Some(mut entry) = self.entries.get_mut(&handle) else {
            return std::ptr::null();
        };
        let value = ValueRef::clone(&entry.value);
        match value.get_string() {
            Some(text) => entry.hand_out(text),
            None => std::ptr::null(),
        }
    }

    /// C string for key number `index` of an object handle, in key order;
    /// null on mismatch or out of range. Same lifetime as
    /// [`ValueRegistry::string_ptr`].
    #[must_use]
    pub fn object_key_ptr(&self, handle: Handle, index: usize) -> *const c_char {
        let Some(mut entry) = self.entries.get_mut(&handle) else {
            return std::ptr::null();
        };
        let key = entry.value.object_key(index);
        match key {
            Some(key) => entry.hand_out(&key),
            None => std::ptr::null(),
        }
    }

    /// Bytes of a binary handle; valid until the handle is destroyed.
    #[must_use]
    pub fn binary(&self, handle: Handle) -> Option<(*const u8, usize)> {
        let entry = self.entries.get(&handle)?;
        entry
            .value
            .get_binary()
            .map(|bytes| (bytes.as_ptr(), bytes.len()))
    }

    /// Destroy a caller-owned handle and every handle it owns.
    ///
    /// Returns false, leaving the registry untouched, for unknown handles
    /// and handles owned by a container.
    pub fn destroy(&self, handle: Handle) -> bool {
        match self.owner(handle) {
            None => {
                warn!("[REGISTRY] destroy of unknown or destroyed handle {}", handle);
                false
            }
            Some(Owner::Container(parent)) => {
                warn!("[REGISTRY] destroy of {} ignored, owned by {}", handle, parent);
                false
            }
            Some(Owner::Caller) => {
                self.remove_tree(handle);
                true
            }
        }
    }

    /// Release a transient handle after a callback returned.
    ///
    /// Quiet counterpart of [`ValueRegistry::destroy`]: a handle the
    /// callback moved into a container, or destroyed itself, is left alone.
    pub fn release(&self, handle: Handle) {
        if self.owner(handle) == Some(Owner::Caller) {
            self.remove_tree(handle);
        }
    }

    fn remove_tree(&self, root: Handle) {
        let mut pending: SmallVec<[Handle; 8]> = SmallVec::new();
        pending.push(root);
        while let Some(handle) = pending.pop() {
            if let Some((_, entry)) = self.entries.remove(&handle) {
                trace!("[REGISTRY] {} destroyed", handle);
                pending.extend(entry.children);
            }
        }
    }
}
