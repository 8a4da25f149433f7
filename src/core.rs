//! Core traits for persisted dictionaries.
use crate::error::AppResult;
use serde_yaml::{Mapping, Value};

/// An associative container whose contents are mirrored to durable storage.
///
/// Lookups never touch storage. Mutations update the in-memory contents at once
/// and leave it to the implementation to decide when the backing copy catches up;
/// [`PersistentMapping::flush`] forces it to catch up before returning.
pub trait PersistentMapping: Send + Sync {
    /// Returns a copy of the value stored under `key`.
    fn get(&self, key: &Value) -> Option<Value>;

    /// Inserts or replaces one entry.
    fn set(&self, key: Value, value: Value) -> AppResult<()>;

    /// Removes `key`, returning its value. Fails with a key error when absent.
    fn delete(&self, key: &Value) -> AppResult<Value>;

    /// Applies all entries, or none of them if any entry is rejected.
    fn update(&self, entries: Mapping) -> AppResult<()>;

    /// Removes and returns the most recently inserted entry.
    fn pop_item(&self) -> AppResult<(Value, Value)>;

    /// Keys in insertion order.
    fn keys(&self) -> Vec<Value>;

    /// Number of entries.
    fn len(&self) -> usize;

    /// True when there are no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `key` is present.
    fn contains_key(&self, key: &Value) -> bool;

    /// Writes the current contents to storage before returning.
    fn flush(&self) -> AppResult<()>;

    /// Replaces the in-memory contents with what storage holds.
    fn reload(&self) -> AppResult<()>;
}
