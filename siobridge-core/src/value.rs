//! Dynamic message values.
//!
//! A [`Value`] is one node of a message tree. Nodes are shared through
//! [`ValueRef`] (`Arc<Value>`), so the same node can sit inside a container
//! and be held by an independent reference at the same time. Containers use
//! interior mutability; the tag of a node never changes.
//!
//! Every accessor is total: asking a node for the wrong kind of payload
//! yields a default (`None`, `0`, `0.0`, `false`) instead of an error.
//!
//! ```
//! use siobridge_core::value::{Value, ValueKind};
//!
//! let obj = Value::object();
//! obj.object_set("x", Value::integer(42));
//! obj.object_set("y", Value::string("hi"));
//!
//! assert_eq!(obj.kind(), ValueKind::Object);
//! assert_eq!(obj.object_get("x").map(|v| v.get_integer()), Some(42));
//! assert!(!obj.object_has("z"));
//! ```

use bytes::Bytes;
use hashbrown::HashSet;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared reference to a value node.
pub type ValueRef = Arc<Value>;

/// Tag of a [`Value`].
///
/// Discriminants are part of the C ABI (`sio_message_type`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null = 0,
    String = 1,
    Integer = 2,
    Double = 3,
    Boolean = 4,
    Array = 5,
    Object = 6,
    Binary = 7,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// Child storage of a container node.
pub struct Children<T> {
    items: RwLock<T>,
    /// Set once this node has been stored inside another container. A node
    /// that was never nested has no ancestors, so nothing can close a cycle
    /// through it.
    nested: AtomicBool,
}

impl<T> Children<T> {
    fn new(items: T) -> Self {
        Self {
            items: RwLock::new(items),
            nested: AtomicBool::new(false),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.items.read()
    }

    pub fn read_recursive(&self) -> RwLockReadGuard<'_, T> {
        self.items.read_recursive()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.items.write()
    }

    fn get_mut(&mut self) -> &mut T {
        self.items.get_mut()
    }
}

/// One node of a message tree.
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    /// Ordered children.
    Array(Children<Vec<ValueRef>>),
    /// Keyed children. Key order carries no meaning; a sorted map keeps
    /// traversal deterministic.
    Object(Children<BTreeMap<String, ValueRef>>),
    Binary(Bytes),
}

impl Value {
    /// Create a `Null` node.
    #[must_use]
    pub fn null() -> ValueRef {
        Arc::new(Self::Null)
    }

    /// Create a `String` node.
    #[must_use]
    pub fn string(s: impl Into<String>) -> ValueRef {
        Arc::new(Self::String(s.into()))
    }

    /// Create an `Integer` node.
    #[must_use]
    pub fn integer(v: i64) -> ValueRef {
        Arc::new(Self::Integer(v))
    }

    /// Create a `Double` node.
    #[must_use]
    pub fn double(v: f64) -> ValueRef {
        Arc::new(Self::Double(v))
    }

    /// Create a `Boolean` node.
    #[must_use]
    pub fn boolean(v: bool) -> ValueRef {
        Arc::new(Self::Boolean(v))
    }

    /// Create an empty `Array` node.
    #[must_use]
    pub fn array() -> ValueRef {
        Arc::new(Self::Array(Children::new(Vec::new())))
    }

    /// Create an empty `Object` node.
    #[must_use]
    pub fn object() -> ValueRef {
        Arc::new(Self::Object(Children::new(BTreeMap::new())))
    }

    /// Create a `Binary` node.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> ValueRef {
        Arc::new(Self::Binary(data.into()))
    }

    /// Tag of this node.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::String(_) => ValueKind::String,
            Self::Integer(_) => ValueKind::Integer,
            Self::Double(_) => ValueKind::Double,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Array(_) => ValueKind::Array,
            Self::Object(_) => ValueKind::Object,
            Self::Binary(_) => ValueKind::Binary,
        }
    }

    #[must_use]
    pub fn get_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn get_integer(&self) -> i64 {
        match self {
            Self::Integer(v) => *v,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_double(&self) -> f64 {
        match self {
            Self::Double(v) => *v,
            _ => 0.0,
        }
    }

    #[must_use]
    pub const fn get_boolean(&self) -> bool {
        match self {
            Self::Boolean(v) => *v,
            _ => false,
        }
    }

    #[must_use]
    pub fn get_binary(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Append `child` to an array node.
    ///
    /// Returns `false` (and leaves the node untouched) when this node is not
    /// an array or when the insertion would create a cycle.
    pub fn push(&self, child: ValueRef) -> bool {
        let Self::Array(items) = self else {
            return false;
        };
        if self.would_cycle(&child) {
            return false;
        }
        child.mark_nested();
        items.write().push(child);
        true
    }

    /// Number of elements of an array node, `0` for any other kind.
    #[must_use]
    pub fn array_len(&self) -> usize {
        match self {
            Self::Array(items) => items.read().len(),
            _ => 0,
        }
    }

    /// Element `index` of an array node.
    #[must_use]
    pub fn array_get(&self, index: usize) -> Option<ValueRef> {
        match self {
            Self::Array(items) => items.read().get(index).cloned(),
            _ => None,
        }
    }

    /// Insert or replace `key` in an object node.
    ///
    /// Same rules as [`Value::push`]: wrong kind or cycle returns `false`.
    pub fn object_set(&self, key: impl Into<String>, child: ValueRef) -> bool {
        self.object_replace(key, child).is_ok()
    }

    /// Insert or replace `key` in an object node, returning the node it
    /// displaced.
    ///
    /// # Errors
    ///
    /// Hands `child` back when this node is not an object or when the
    /// insertion would create a cycle.
    pub fn object_replace(
        &self,
        key: impl Into<String>,
        child: ValueRef,
    ) -> Result<Option<ValueRef>, ValueRef> {
        let Self::Object(map) = self else {
            return Err(child);
        };
        if self.would_cycle(&child) {
            return Err(child);
        }
        child.mark_nested();
        Ok(map.write().insert(key.into(), child))
    }

    #[must_use]
    pub fn object_get(&self, key: &str) -> Option<ValueRef> {
        match self {
            Self::Object(map) => map.read().get(key).cloned(),
            _ => None,
        }
    }

    #[must_use]
    pub fn object_has(&self, key: &str) -> bool {
        match self {
            Self::Object(map) => map.read().contains_key(key),
            _ => false,
        }
    }

    /// Number of keys of an object node, `0` for any other kind.
    #[must_use]
    pub fn object_len(&self) -> usize {
        match self {
            Self::Object(map) => map.read().len(),
            _ => 0,
        }
    }

    /// Key at position `index` in sorted key order.
    #[must_use]
    pub fn object_key(&self, index: usize) -> Option<String> {
        match self {
            Self::Object(map) => map.read().keys().nth(index).cloned(),
            _ => None,
        }
    }

    /// True if `node` is stored directly in this array or object.
    #[must_use]
    pub fn holds(&self, node: &ValueRef) -> bool {
        match self {
            Self::Array(items) => items.read().iter().any(|c| Arc::ptr_eq(c, node)),
            Self::Object(map) => map.read().values().any(|c| Arc::ptr_eq(c, node)),
            _ => false,
        }
    }

    /// Returns true if `target` is this node or is reachable from it.
    ///
    /// Walks the tree with an explicit stack, visiting each shared node once.
    #[must_use]
    pub fn contains(&self, target: &Value) -> bool {
        if std::ptr::eq(self, target) {
            return true;
        }
        let mut visited: HashSet<*const Value> = HashSet::new();
        let mut pending = Vec::new();
        self.collect_children(&mut pending);
        while let Some(node) = pending.pop() {
            if std::ptr::eq(&*node, target) {
                return true;
            }
            if node.is_container() && visited.insert(Arc::as_ptr(&node)) {
                node.collect_children(&mut pending);
            }
        }
        false
    }

    const fn is_container(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    fn is_nested(&self) -> bool {
        match self {
            Self::Array(items) => items.nested.load(Ordering::Acquire),
            Self::Object(map) => map.nested.load(Ordering::Acquire),
            _ => false,
        }
    }

    fn mark_nested(&self) {
        match self {
            Self::Array(items) => items.nested.store(true, Ordering::Release),
            Self::Object(map) => map.nested.store(true, Ordering::Release),
            _ => {}
        }
    }

    fn collect_children(&self, out: &mut Vec<ValueRef>) {
        match self {
            Self::Array(items) => out.extend(items.read_recursive().iter().cloned()),
            Self::Object(map) => out.extend(map.read_recursive().values().cloned()),
            _ => {}
        }
    }

    fn take_children(&mut self, out: &mut Vec<ValueRef>) {
        match self {
            Self::Array(items) => out.append(items.get_mut()),
            Self::Object(map) => out.extend(std::mem::take(map.get_mut()).into_values()),
            _ => {}
        }
    }

    /// Only a nested container can be reached from `child`; leaves and
    /// top-level containers skip the walk.
    fn would_cycle(&self, child: &ValueRef) -> bool {
        let cycle = std::ptr::eq(self, &**child)
            || (child.is_container() && self.is_nested() && child.contains(self));
        if cycle {
            tracing::warn!("[VALUE] Rejected insertion that would make a {} contain itself", self.kind());
        }
        cycle
    }
}

impl Drop for Value {
    // Unlinks uniquely owned descendants one at a time so that dropping a
    // deep tree does not recurse.
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(node) = pending.pop() {
            if let Some(mut node) = Arc::into_inner(node) {
                node.take_children(&mut pending);
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Binary(a), Self::Binary(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => {
                if std::ptr::eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read_recursive(), b.read_recursive());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (Self::Object(a), Self::Object(b)) => {
                if std::ptr::eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read_recursive(), b.read_recursive());
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| ka == kb && va == vb)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::String(s) => f.debug_tuple("String").field(s).finish(),
            Self::Integer(v) => f.debug_tuple("Integer").field(v).finish(),
            Self::Double(v) => f.debug_tuple("Double").field(v).finish(),
            Self::Boolean(v) => f.debug_tuple("Boolean").field(v).finish(),
            Self::Array(items) => f.debug_list().entries(items.read_recursive().iter()).finish(),
            Self::Object(map) => f.debug_map().entries(map.read_recursive().iter()).finish(),
            Self::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Self::Binary(b)
    }
}

#[cfg(feature = "serde")]
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Double(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(arr) => Self::Array(Children::new(
                arr.into_iter().map(|v| Arc::new(Self::from(v))).collect(),
            )),
            serde_json::Value::Object(obj) => Self::Object(Children::new(
                obj.into_iter()
                    .map(|(k, v)| (k, Arc::new(Self::from(v))))
                    .collect(),
            )),
        }
    }
}

#[cfg(feature = "serde")]
impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Integer(i) => serde_json::json!(i),
            Value::Double(d) => serde_json::json!(d),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Array(items) => serde_json::Value::Array(
                items.read_recursive().iter().map(|c| Self::from(&**c)).collect(),
            ),
            Value::Object(map) => serde_json::Value::Object(
                map.read_recursive()
                    .iter()
                    .map(|(k, c)| (k.clone(), Self::from(&**c)))
                    .collect(),
            ),
            Value::Binary(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::json!(byte)).collect(),
            ),
        }
    }
}
