//! In-memory value tree exchanged with the marshaling layer.
//!
//! Containers (`List`, `Map`) are shared and interior-mutable, the same way
//! records in a dynamic object model are: cloning a `Value` clones the handle,
//! not the contents, and a container may end up (directly or indirectly)
//! containing itself. The codec detects such cycles; `Debug` and `PartialEq`
//! here are guarded against them.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// A record as a field-name → value mapping, in field order.
pub type Row = IndexMap<String, Value>;

/// A structured record that can expose itself as plain data.
///
/// The codec encodes such records through [`PlainForm::plain_form`],
/// re-encoding the result recursively.
pub trait PlainForm: fmt::Debug + Send + Sync {
    /// Name of the record type, for diagnostics.
    fn type_name(&self) -> &str;

    fn plain_form(&self) -> Value;
}

/// Shared handle to a list.
#[derive(Clone, Default)]
pub struct SharedList(Arc<RwLock<Vec<Value>>>);

/// Shared handle to a string-keyed map.
#[derive(Clone, Default)]
pub struct SharedMap(Arc<RwLock<IndexMap<String, Value>>>);

macro_rules! shared_container {
    ($name:ident, $inner:ty) => {
        impl $name {
            pub fn new(inner: $inner) -> Self {
                $name(Arc::new(RwLock::new(inner)))
            }

            /// Returns a read guard over the contents.
            pub fn read(&self) -> RwLockReadGuard<'_, $inner> {
                self.0.read().unwrap_or_else(PoisonError::into_inner)
            }

            /// Identity of the underlying allocation.
            pub fn id(&self) -> usize {
                Arc::as_ptr(&self.0) as *const () as usize
            }

            pub fn ptr_eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }

            pub fn len(&self) -> usize {
                self.read().len()
            }

            pub fn is_empty(&self) -> bool {
                self.read().is_empty()
            }
        }
    };
}

shared_container!(SharedList, Vec<Value>);
shared_container!(SharedMap, IndexMap<String, Value>);

impl SharedList {
    pub fn push(&self, value: Value) {
        self.0.write().unwrap_or_else(PoisonError::into_inner).push(value);
    }

    /// Copies the elements out.
    pub fn to_vec(&self) -> Vec<Value> {
        self.read().clone()
    }
}

impl SharedMap {
    /// Inserts an entry, returning the previous value for the key.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }
}

/// A leaf of a foreign type, encodable only through a registered converter.
#[derive(Clone)]
pub struct OpaqueLeaf {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl OpaqueLeaf {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        OpaqueLeaf {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }
}

impl fmt::Debug for OpaqueLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({})", self.type_name)
    }
}

/// A value in a record or row.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Date and time without an offset.
    LocalDateTime(NaiveDateTime),
    /// Date and time with an offset.
    DateTime(DateTime<FixedOffset>),
    Decimal(Decimal),
    /// Unordered collection. Encoded as a list in stored order.
    Set(Vec<Value>),
    List(SharedList),
    Map(SharedMap),
    Record(Arc<dyn PlainForm>),
    Opaque(OpaqueLeaf),
}

impl Value {
    /// Creates a list value.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(SharedList::new(items.into_iter().collect()))
    }

    /// Creates a map value from entries, preserving their order.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(SharedMap::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Creates an unordered collection value.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(items.into_iter().collect())
    }

    /// Wraps a structured record.
    pub fn record(record: impl PlainForm + 'static) -> Self {
        Value::Record(Arc::new(record))
    }

    /// Wraps a foreign leaf.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Opaque(OpaqueLeaf::new(value))
    }

    /// Converts any serializable value through its JSON data model.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Value::from)
    }

    /// Inserts into a map value. Returns false if this is not a map.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> bool {
        match self {
            Value::Map(map) => {
                map.insert(key, value);
                true
            }
            _ => false,
        }
    }

    /// Appends to a list value. Returns false if this is not a list.
    pub fn push(&self, value: Value) -> bool {
        match self {
            Value::List(list) => {
                list.push(value);
                true
            }
            _ => false,
        }
    }

    /// Looks up a key in a map value.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Looks up an index in a list value.
    pub fn at(&self, index: usize) -> Option<Value> {
        match self {
            Value::List(list) => list.read().get(index).cloned(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    /// Returns true for date/time leaves.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Value::Date(_) | Value::Time(_) | Value::LocalDateTime(_) | Value::DateTime(_)
        )
    }

    /// Name of the value's kind, for diagnostics.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::UInt(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::LocalDateTime(_) | Value::DateTime(_) => "datetime",
            Value::Decimal(_) => "decimal",
            Value::Set(_) => "set",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record(record) => record.type_name(),
            Value::Opaque(leaf) => leaf.type_name(),
        }
    }
}

thread_local! {
    static FORMATTING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
    static COMPARING: RefCell<HashSet<(usize, usize)>> = RefCell::new(HashSet::new());
}

/// Marks a container as being formatted on this thread until dropped.
struct FormatGuard(usize);

impl FormatGuard {
    fn enter(id: usize) -> Option<Self> {
        FORMATTING
            .with(|set| set.borrow_mut().insert(id))
            .then_some(FormatGuard(id))
    }
}

impl Drop for FormatGuard {
    fn drop(&mut self) {
        FORMATTING.with(|set| set.borrow_mut().remove(&self.0));
    }
}

/// Marks a pair of containers as being compared on this thread until dropped.
struct CompareGuard(usize, usize);

impl CompareGuard {
    fn enter(a: usize, b: usize) -> Option<Self> {
        COMPARING
            .with(|set| set.borrow_mut().insert((a, b)))
            .then_some(CompareGuard(a, b))
    }
}

impl Drop for CompareGuard {
    fn drop(&mut self) {
        COMPARING.with(|set| set.borrow_mut().remove(&(self.0, self.1)));
    }
}

impl fmt::Debug for SharedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_guard) = FormatGuard::enter(self.id()) else {
            return f.write_str("[...]");
        };
        f.debug_list().entries(self.read().iter()).finish()
    }
}

impl fmt::Debug for SharedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_guard) = FormatGuard::enter(self.id()) else {
            return f.write_str("{...}");
        };
        f.debug_map().entries(self.read().iter()).finish()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "{b:?}"),
            Value::Int(i) => write!(f, "{i:?}"),
            Value::UInt(u) => write!(f, "{u:?}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Value::Uuid(u) => write!(f, "Uuid({u})"),
            Value::Date(d) => write!(f, "Date({d})"),
            Value::Time(t) => write!(f, "Time({t})"),
            Value::LocalDateTime(dt) => write!(f, "LocalDateTime({dt})"),
            Value::DateTime(dt) => write!(f, "DateTime({})", dt.to_rfc3339()),
            Value::Decimal(d) => write!(f, "Decimal({d})"),
            Value::Set(items) => f.debug_set().entries(items.iter()).finish(),
            Value::List(list) => fmt::Debug::fmt(list, f),
            Value::Map(map) => fmt::Debug::fmt(map, f),
            Value::Record(record) => fmt::Debug::fmt(record, f),
            Value::Opaque(leaf) => fmt::Debug::fmt(leaf, f),
        }
    }
}

/// Compares two containers. A pair already under comparison further up the
/// stack is taken as equal, so cyclic graphs compare in bounded time.
/// Contents are copied out first so no lock is held while recursing.
fn compare_shared<T: PartialEq>(a: usize, b: usize, contents: impl FnOnce() -> (T, T)) -> bool {
    if a == b {
        return true;
    }
    match CompareGuard::enter(a, b) {
        Some(_guard) => {
            let (left, right) = contents();
            left == right
        }
        None => true,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Int(a), Value::UInt(b)) | (Value::UInt(b), Value::Int(a)) => {
                u64::try_from(*a).is_ok_and(|a| a == *b)
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::LocalDateTime(a), Value::LocalDateTime(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.contains(x))
            }
            (Value::List(a), Value::List(b)) => {
                a.ptr_eq(b) || compare_shared(a.id(), b.id(), || (a.to_vec(), b.to_vec()))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.ptr_eq(b)
                    || compare_shared(a.id(), b.id(), || (a.read().clone(), b.read().clone()))
            }
            (Value::Record(a), Value::Record(b)) => {
                Arc::ptr_eq(a, b) || a.plain_form() == b.plain_form()
            }
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            _ => false,
        }
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => UInt,
    u16 => UInt,
    u32 => UInt,
    u64 => UInt,
    f32 => Float,
    f64 => Float,
    String => String,
    &str => String,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => LocalDateTime,
    DateTime<FixedOffset> => DateTime,
    Decimal => Decimal,
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v.fixed_offset())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into))
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::list(items.into_iter().map(Value::from)),
            serde_json::Value::Object(entries) => {
                Value::map(entries.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}
