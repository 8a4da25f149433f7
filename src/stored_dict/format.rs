//! On-disk representation of a stored dictionary.
//!
//! A stored dictionary file is UTF-8 YAML preceded by `#` comment lines:
//!
//! ```text
//! # Written by StoredDict.
//! # Dictionary contents written: 2025-01-29 14:30:22.123456
//!
//! a: b
//! bee: queen
//! ```
//!
//! An empty dictionary is written as `{}` so that a flushed file is never
//! mistaken for a missing one. Files are replaced through a temporary sibling and
//! a rename, so readers see either the previous snapshot or the new one.

use crate::config::load_config_yaml;
use crate::error::{AppResult, BitsError};
use chrono::Local;
use serde_yaml::Mapping;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const TIMESTAMP_LABEL: &str = "Dictionary contents written:";

/// Renders the full file text for `contents`.
pub fn render(contents: &Mapping, title: Option<&str>) -> AppResult<String> {
    let body = serde_yaml::to_string(contents).map_err(|e| BitsError::Serialization {
        key: "*".to_string(),
        reason: e.to_string(),
    })?;

    let mut text = String::new();
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        for line in title.lines() {
            let _ = writeln!(text, "# {line}");
        }
    }
    let _ = writeln!(
        text,
        "# {TIMESTAMP_LABEL} {}",
        Local::now().format("%Y-%m-%d %H:%M:%S%.6f")
    );
    text.push('\n');
    text.push_str(&body);
    Ok(text)
}

/// Writes `contents` to `path`, replacing any previous file.
pub fn dump(path: &Path, contents: &Mapping, title: Option<&str>) -> AppResult<()> {
    debug!(file = %path.display(), entries = contents.len(), "dump()");
    let text = render(contents, title)?;
    write_replace(path, text.as_bytes())?;
    Ok(())
}

/// Reads a dictionary from `path`.
///
/// A missing file, an empty file and a file holding only comments all load as an
/// empty mapping.
pub fn load(path: &Path) -> AppResult<Mapping> {
    debug!(file = %path.display(), "load()");
    if !path.exists() {
        return Ok(Mapping::new());
    }
    load_config_yaml(path)
}

/// Reads the title comment from the header of an existing file.
///
/// Returns `None` when the file is missing or carries no title lines above the
/// timestamp line.
pub fn read_title(path: &Path) -> AppResult<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    let lines: Vec<&str> = text
        .lines()
        .map_while(|line| line.strip_prefix('#'))
        .take_while(|line| !line.trim_start().starts_with(TIMESTAMP_LABEL))
        .map(|line| line.strip_prefix(' ').unwrap_or(line))
        .collect();
    if lines.is_empty() {
        return Ok(None);
    }
    Ok(Some(lines.join("\n")))
}

fn write_replace(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp = temp_path(path)?;
    fs::write(&temp, bytes)?;
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    Ok(())
}

fn temp_path(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' does not name a file", path.display()),
        )
    })?;
    let temp_name = format!(
        ".{}.{}.tmp",
        name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    );
    Ok(path.with_file_name(temp_name))
}
