//! Configuration file loading.
//!
//! Instrument configuration (`iconfig.yml` and friends) may be written in YAML or
//! TOML. Both are read into the same value model, a [`serde_yaml::Mapping`], so the
//! rest of the crate never cares which syntax a file used. Stored dictionaries read
//! their backing files through [`load_config_yaml`].

pub mod iconfig;

pub use iconfig::{check_iconfig_version, IConfig, ICONFIG_MINIMUM_VERSION};

use crate::error::{AppResult, BitsError};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Loads a YAML configuration file.
///
/// The file must exist. An empty document (or one holding only comments) loads as
/// an empty mapping; any other top-level value than a mapping is a format error.
pub fn load_config_yaml(path: &Path) -> AppResult<Mapping> {
    let text = read_existing(path)?;
    parse_yaml(&text, path)
}

/// Loads a YAML or TOML configuration file, chosen by extension.
pub fn load_config(path: &Path) -> AppResult<Mapping> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "yml" | "yaml" => load_config_yaml(path),
        "toml" => {
            let text = read_existing(path)?;
            parse_toml(&text, path)
        }
        other => Err(BitsError::UnsupportedFormat(format!(".{other}"))),
    }
}

fn read_existing(path: &Path) -> AppResult<String> {
    if !path.exists() {
        return Err(BitsError::ConfigNotFound(path.to_path_buf()));
    }
    debug!(file = %path.display(), "reading configuration");
    Ok(fs::read_to_string(path)?)
}

fn has_content(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#') && line != "---"
    })
}

fn parse_yaml(text: &str, path: &Path) -> AppResult<Mapping> {
    if !has_content(text) {
        return Ok(Mapping::new());
    }
    let document: Value = serde_yaml::from_str(text).map_err(|e| BitsError::ConfigFormat {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    match document {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        other => Err(BitsError::ConfigFormat {
            path: path.to_path_buf(),
            reason: format!("expected a mapping at top level, found {other:?}"),
        }),
    }
}

fn parse_toml(text: &str, path: &Path) -> AppResult<Mapping> {
    let table: toml::Table = toml::from_str(text).map_err(|e| BitsError::ConfigFormat {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    match serde_yaml::to_value(&table) {
        Ok(Value::Mapping(mapping)) => Ok(mapping),
        Ok(_) => Ok(Mapping::new()),
        Err(e) => Err(BitsError::ConfigFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}
