//! # Rust BITS Storage Library
//!
//! Persistent, human-readable storage for instrument session state. The central
//! type is [`StoredDict`], an insertion-ordered dictionary that mirrors itself to a
//! YAML file shortly after it was last changed. Around it sit the pieces a session
//! needs to use one: configuration loading, logging setup and run metadata.
//!
//! ## Crate Structure
//!
//! - **`stored_dict`**: `StoredDict`, its file format, value checks and the
//!   background sync agent that writes debounced snapshots.
//! - **`core`**: The `PersistentMapping` trait implemented by storage-backed maps.
//! - **`config`**: YAML/TOML configuration loaders and the instrument
//!   configuration (`IConfig`) with its version check.
//! - **`metadata`**: `RunMetadata`, the run engine's metadata kept in a
//!   `StoredDict` located by the instrument configuration.
//! - **`logging`**: `tracing-subscriber` setup driven by the configuration.
//! - **`error`**: The `BitsError` enum used across the crate.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod stored_dict;

pub use crate::config::IConfig;
pub use crate::core::PersistentMapping;
pub use crate::error::{AppResult, BitsError};
pub use crate::metadata::RunMetadata;
pub use crate::stored_dict::{FlushGuard, StoredDict};
