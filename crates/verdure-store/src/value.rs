//! The tagged value held by a [`Store`](crate::Store).
//!
//! Each typed reader on the store corresponds to one variant here. A
//! value of any other type can still be stored through
//! [`Value::any`] and read back with [`Value::downcast_ref`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A value stored in a session's scratch store.
#[derive(Clone)]
pub enum Value {
    /// A string.
    String(String),
    /// A boolean.
    Bool(bool),
    /// A pointer-sized signed integer.
    Int(isize),
    /// A 64-bit signed integer.
    Int64(i64),
    /// A 64-bit float.
    Float64(f64),
    /// A span of time.
    Duration(Duration),
    /// A point in time.
    Time(DateTime<Utc>),
    /// A nested map of values.
    StringMap(HashMap<String, Value>),
    /// A map of strings.
    StringMapString(HashMap<String, String>),
    /// A list of strings.
    StringSlice(Vec<String>),
    /// Anything else.
    Any(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wraps an arbitrary value.
    pub fn any<T: Any + Send + Sync>(value: T) -> Self {
        Self::Any(Arc::new(value))
    }

    /// Returns a reference to the wrapped value if this is an
    /// [`Any`](Self::Any) holding a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Any(inner) => inner.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Returns the name of the variant, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Int64(_) => "int64",
            Self::Float64(_) => "float64",
            Self::Duration(_) => "duration",
            Self::Time(_) => "time",
            Self::StringMap(_) => "string_map",
            Self::StringMapString(_) => "string_map_string",
            Self::StringSlice(_) => "string_slice",
            Self::Any(_) => "any",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) => f.debug_tuple("String").field(v).finish(),
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Self::Int64(v) => f.debug_tuple("Int64").field(v).finish(),
            Self::Float64(v) => f.debug_tuple("Float64").field(v).finish(),
            Self::Duration(v) => f.debug_tuple("Duration").field(v).finish(),
            Self::Time(v) => f.debug_tuple("Time").field(v).finish(),
            Self::StringMap(v) => f.debug_tuple("StringMap").field(v).finish(),
            Self::StringMapString(v) => {
                f.debug_tuple("StringMapString").field(v).finish()
            }
            Self::StringSlice(v) => {
                f.debug_tuple("StringSlice").field(v).finish()
            }
            Self::Any(_) => f.write_str("Any(..)"),
        }
    }
}

/// Values compare by content; two `Any` values are equal only if they
/// share the same allocation.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Duration(a), Self::Duration(b)) => a == b,
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::StringMap(a), Self::StringMap(b)) => a == b,
            (Self::StringMapString(a), Self::StringMapString(b)) => a == b,
            (Self::StringSlice(a), Self::StringSlice(b)) => a == b,
            (Self::Any(a), Self::Any(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<isize> for Value {
    fn from(v: isize) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Self::Duration(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Time(v)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Self::StringMap(v)
    }
}

impl From<HashMap<String, String>> for Value {
    fn from(v: HashMap<String, String>) -> Self {
        Self::StringMapString(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::StringSlice(v)
    }
}
