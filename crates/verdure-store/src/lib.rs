//! Per-session scratch storage for Verdure.
//!
//! Every session carries a [`Store`]: a small, thread-safe map from
//! string keys to tagged [`Value`]s. Handlers use it to remember things
//! about a connection (a user name, a join time, a room list) between
//! callbacks.
//!
//! # Typed readers
//!
//! The store offers one reader per value type (`get_string`, `get_int`,
//! `get_time`, ...). A reader returns the stored value if the key holds
//! that type and the type's zero value otherwise, so handler code can
//! read optional fields without matching on [`Value`].

mod error;
mod store;
mod value;

pub use error::StoreError;
pub use store::Store;
pub use value::Value;
