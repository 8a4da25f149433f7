//! Storage-backed dictionary.
//!
//! A dictionary that writes its contents to a YAML file.
//!
//! - Contents must be JSON serializable.
//! - Contents are stored in a single human-readable YAML file.
//! - The file is synced shortly after the dictionary is last updated.
//!
//! Reads and writes go to an in-memory cache and never wait for the disk. Every
//! mutation pushes a sync deadline `delay` into the future; when the dictionary
//! has been quiet for `delay`, a background agent writes the whole cache once.
//! A burst of updates therefore costs one write. Call [`StoredDict::flush`] (or use
//! [`StoredDict::scoped`] / [`StoredDict::with_flush`]) when the file must be
//! current.
//!
//! # Example
//!
//! ```no_run
//! use rust_bits::stored_dict::StoredDict;
//! use std::time::Duration;
//!
//! let md = StoredDict::builder(".re_md_dict.yml")
//!     .delay(Duration::from_millis(200))
//!     .title("unit testing")
//!     .open()?;
//!
//! md.set("a", "b")?;
//! assert_eq!(md.get("a").and_then(|v| v.as_str().map(String::from)), Some("b".into()));
//! md.flush()?;
//! # Ok::<(), rust_bits::error::BitsError>(())
//! ```

mod agent;
pub mod format;
pub mod validate;

use crate::core::PersistentMapping;
use crate::error::{AppResult, BitsError};
use agent::Shared;
use serde::{Serialize, Serializer};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Default time since the last update before contents are written.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Dictionary that syncs to storage.
///
/// The background agent's thread handle is owned per instance and is never part
/// of the dictionary's serialized form.
pub struct StoredDict {
    inner: Arc<Shared>,
    test_serializable: bool,
}

/// Options for opening a [`StoredDict`].
#[derive(Debug, Clone)]
pub struct StoredDictBuilder {
    path: PathBuf,
    delay: Duration,
    title: Option<String>,
    serializable: bool,
}

impl StoredDictBuilder {
    /// Time since the last update before contents are written. Default: 5 s.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Comment written at the top of the file. Default: `Written by StoredDict.`
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Whether new entries are checked for JSON compatibility. Default: true.
    pub fn serializable(mut self, enabled: bool) -> Self {
        self.serializable = enabled;
        self
    }

    /// Opens the dictionary, loading any existing contents.
    pub fn open(self) -> AppResult<StoredDict> {
        let title = self
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Written by StoredDict.".to_string());
        let cache = format::load(&self.path)?;
        debug!(
            file = %self.path.display(),
            entries = cache.len(),
            delay_s = self.delay.as_secs_f64(),
            "opened stored dictionary"
        );
        Ok(StoredDict {
            inner: Arc::new(Shared::new(self.path, title, self.delay, cache)),
            test_serializable: self.serializable,
        })
    }
}

impl StoredDict {
    /// Opens `path` with default options.
    ///
    /// A missing or empty file gives an empty dictionary. A file that exists but
    /// cannot be parsed is an error.
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Self::builder(path).open()
    }

    /// Starts building a dictionary stored at `path`.
    pub fn builder(path: impl AsRef<Path>) -> StoredDictBuilder {
        StoredDictBuilder {
            path: path.as_ref().to_path_buf(),
            delay: DEFAULT_DELAY,
            title: None,
            serializable: true,
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Comment written at the top of the file.
    pub fn title(&self) -> &str {
        &self.inner.title
    }

    /// Quiet period before a background write.
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Unique key of this instance, used to name its sync agent.
    pub fn sync_key(&self) -> u64 {
        self.inner.key
    }

    /// True while a background write is pending or running.
    pub fn sync_in_progress(&self) -> bool {
        self.inner.sync_in_progress()
    }

    /// Number of writes to the backing file since this instance was opened.
    pub fn write_count(&self) -> u64 {
        self.inner.write_count()
    }

    /// Copy of the value for `key`.
    pub fn get(&self, key: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        self.inner.cache.lock().get(&key).cloned()
    }

    /// Copy of the value for `key`, or `default` when absent.
    pub fn get_or(&self, key: impl Into<Value>, default: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| default.into())
    }

    /// Value for `key`, failing with a key error when absent.
    pub fn try_get(&self, key: impl Into<Value>) -> AppResult<Value> {
        let key = key.into();
        self.get(key.clone())
            .ok_or_else(|| BitsError::KeyNotFound(validate::describe(&key)))
    }

    /// Inserts or replaces `key`.
    ///
    /// The value is visible to readers at once; the file follows after the delay.
    /// A value that is not JSON serializable is rejected and nothing changes.
    pub fn set(&self, key: impl Into<Value>, value: impl Serialize) -> AppResult<()> {
        let key = key.into();
        let value = self.admit(&key, value)?;
        self.inner.cache.lock().insert(key, value);
        self.inner.schedule_sync();
        Ok(())
    }

    /// Applies every entry, or none if any entry is rejected.
    ///
    /// Entries are checked in iteration order and the first rejected one is
    /// reported.
    pub fn update<I, K, V>(&self, entries: I) -> AppResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Serialize,
    {
        let admitted = entries
            .into_iter()
            .map(|(key, value)| {
                let key = key.into();
                let value = self.admit(&key, value)?;
                Ok((key, value))
            })
            .collect::<AppResult<Vec<_>>>()?;

        if admitted.is_empty() {
            return Ok(());
        }
        {
            let mut cache = self.inner.cache.lock();
            for (key, value) in admitted {
                cache.insert(key, value);
            }
        }
        self.inner.schedule_sync();
        Ok(())
    }

    /// Removes `key`, returning its value.
    pub fn delete(&self, key: impl Into<Value>) -> AppResult<Value> {
        let key = key.into();
        let removed = self.inner.cache.lock().shift_remove(&key);
        let value = removed.ok_or_else(|| BitsError::KeyNotFound(validate::describe(&key)))?;
        self.inner.schedule_sync();
        Ok(value)
    }

    /// Removes and returns the most recently inserted entry.
    pub fn pop_item(&self) -> AppResult<(Value, Value)> {
        let entry = {
            let mut cache = self.inner.cache.lock();
            let last = cache.keys().last().cloned();
            last.and_then(|key| cache.shift_remove(&key).map(|value| (key, value)))
        };
        let entry = entry.ok_or(BitsError::EmptyStore)?;
        self.inner.schedule_sync();
        Ok(entry)
    }

    /// True when `key` is present.
    pub fn contains_key(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        self.inner.cache.lock().contains_key(&key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.cache.lock().len()
    }

    /// True when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<Value> {
        self.inner.cache.lock().keys().cloned().collect()
    }

    /// Iterates over a copy of the entries, in insertion order.
    ///
    /// Mutations made while iterating are not observed.
    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> {
        self.snapshot().into_iter()
    }

    /// Copy of all entries in insertion order.
    pub fn snapshot(&self) -> Mapping {
        self.inner.cache.lock().clone()
    }

    /// Writes the contents to the backing file now.
    ///
    /// A pending background write is told to stop waiting; this returns once a
    /// write reflecting every earlier mutation has completed. Write errors are
    /// returned to the caller.
    pub fn flush(&self) -> AppResult<()> {
        self.inner.flush()
    }

    /// Replaces the contents with what the backing file holds.
    pub fn reload(&self) -> AppResult<()> {
        debug!(file = %self.path().display(), "reload()");
        let contents = format::load(self.path())?;
        *self.inner.cache.lock() = contents;
        Ok(())
    }

    /// Guard that flushes when it goes out of scope.
    pub fn scoped(&self) -> FlushGuard<'_> {
        FlushGuard {
            store: self,
            armed: true,
        }
    }

    /// Runs `f` with this dictionary, then flushes, whether or not `f` panics.
    pub fn with_flush<R>(&self, f: impl FnOnce(&StoredDict) -> R) -> AppResult<R> {
        let guard = self.scoped();
        let result = f(&guard);
        guard.finish()?;
        Ok(result)
    }

    fn admit(&self, key: &Value, value: impl Serialize) -> AppResult<Value> {
        let value = validate::to_value(key, value)?;
        if self.test_serializable {
            validate::check_entry(key, &value)?;
        }
        Ok(value)
    }
}

/// Flushes a [`StoredDict`] when dropped.
///
/// Dropping the guard logs a failed flush; call [`FlushGuard::finish`] to receive
/// the error instead.
pub struct FlushGuard<'a> {
    store: &'a StoredDict,
    armed: bool,
}

impl FlushGuard<'_> {
    /// Flushes now and returns the outcome.
    pub fn finish(mut self) -> AppResult<()> {
        self.armed = false;
        self.store.flush()
    }
}

impl Deref for FlushGuard<'_> {
    type Target = StoredDict;

    fn deref(&self) -> &StoredDict {
        self.store
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.store.flush() {
                error!(file = %self.store.path().display(), error = %e, "flush on scope exit failed");
            }
        }
    }
}

impl PersistentMapping for StoredDict {
    fn get(&self, key: &Value) -> Option<Value> {
        StoredDict::get(self, key.clone())
    }

    fn set(&self, key: Value, value: Value) -> AppResult<()> {
        StoredDict::set(self, key, value)
    }

    fn delete(&self, key: &Value) -> AppResult<Value> {
        StoredDict::delete(self, key.clone())
    }

    fn update(&self, entries: Mapping) -> AppResult<()> {
        StoredDict::update(self, entries)
    }

    fn pop_item(&self) -> AppResult<(Value, Value)> {
        StoredDict::pop_item(self)
    }

    fn keys(&self) -> Vec<Value> {
        StoredDict::keys(self)
    }

    fn len(&self) -> usize {
        StoredDict::len(self)
    }

    fn contains_key(&self, key: &Value) -> bool {
        StoredDict::contains_key(self, key.clone())
    }

    fn flush(&self) -> AppResult<()> {
        StoredDict::flush(self)
    }

    fn reload(&self) -> AppResult<()> {
        StoredDict::reload(self)
    }
}

impl Serialize for StoredDict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl fmt::Display for StoredDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(text) => write!(f, "<StoredDict {text}>"),
            Err(_) => write!(f, "<StoredDict {snapshot:?}>"),
        }
    }
}

impl fmt::Debug for StoredDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
