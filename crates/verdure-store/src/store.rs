//! The store itself: a lock-guarded map from keys to [`Value`]s.
//!
//! Handler callbacks for one session run on that session's read loop,
//! but application code may touch the same store from any task (for
//! example from a broadcast filter). Every operation therefore takes the
//! lock for the duration of a single map access and never across an
//! `.await`.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{StoreError, Value};

/// Per-session scratch storage.
#[derive(Debug, Default)]
pub struct Store {
    values: RwLock<HashMap<String, Value>>,
}

/// Generates a typed reader that returns the zero value when the key is
/// absent or holds a different variant.
macro_rules! typed_getter {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&self, key: &str) -> $ty {
            match self.get(key) {
                Some(Value::$variant(v)) => v,
                Some(other) => {
                    tracing::debug!(
                        key,
                        expected = stringify!($variant),
                        found = other.type_name(),
                        "store value has a different type"
                    );
                    <$ty>::default()
                }
                None => <$ty>::default(),
            }
        }
    };
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    /// Returns [`StoreError::KeyNotFound`] if nothing is stored there.
    pub fn must_get(&self, key: &str) -> Result<Value, StoreError> {
        self.get(key)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_owned()))
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.write().insert(key.into(), value.into());
    }

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    /// Returns [`StoreError::KeyNotFound`] if nothing is stored there.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::KeyNotFound(key.to_owned()))
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Returns all keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    typed_getter!(
        /// Returns the string under `key`, or `""`.
        get_string, String, String
    );
    typed_getter!(
        /// Returns the bool under `key`, or `false`.
        get_bool, Bool, bool
    );
    typed_getter!(
        /// Returns the int under `key`, or `0`.
        get_int, Int, isize
    );
    typed_getter!(
        /// Returns the 64-bit int under `key`, or `0`.
        get_int64, Int64, i64
    );
    typed_getter!(
        /// Returns the float under `key`, or `0.0`.
        get_float64, Float64, f64
    );
    typed_getter!(
        /// Returns the duration under `key`, or zero.
        get_duration, Duration, Duration
    );
    typed_getter!(
        /// Returns the time under `key`, or the Unix epoch.
        get_time, Time, DateTime<Utc>
    );
    typed_getter!(
        /// Returns the map under `key`, or an empty map.
        get_string_map, StringMap, HashMap<String, Value>
    );
    typed_getter!(
        /// Returns the string map under `key`, or an empty map.
        get_string_map_string, StringMapString, HashMap<String, String>
    );
    typed_getter!(
        /// Returns the string list under `key`, or an empty list.
        get_string_slice, StringSlice, Vec<String>
    );
}
