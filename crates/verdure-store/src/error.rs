//! Error types for the store.

/// Errors that can occur when accessing a session store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No value is stored under the key.
    #[error("key not found in session store: {0}")]
    KeyNotFound(String),
}
