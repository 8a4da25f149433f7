//! Persistent run metadata.
//!
//! The run engine keeps metadata (`scan_id`, proposal, sample, ...) that must
//! survive a restart of the session. [`RunMetadata`] backs it with a
//! [`StoredDict`] whose location and delay come from the instrument configuration:
//!
//! ```yaml
//! RUN_ENGINE:
//!   MD_PATH: .re_md_dict.yml   # relative to the iconfig directory
//!   MD_DELAY: 5                # seconds
//!   DEFAULT_METADATA:
//!     beamline_id: demo
//! ```

use crate::config::IConfig;
use crate::error::{AppResult, BitsError};
use crate::stored_dict::{StoredDict, DEFAULT_DELAY};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default file name for the run metadata dictionary.
pub const DEFAULT_MD_PATH: &str = ".re_md_dict.yml";

/// Key of the run counter.
pub const SCAN_ID: &str = "scan_id";

/// Run engine metadata stored on disk.
#[derive(Debug)]
pub struct RunMetadata {
    store: StoredDict,
}

impl RunMetadata {
    /// Opens the metadata dictionary described by `iconfig`.
    ///
    /// Applies `RUN_ENGINE.DEFAULT_METADATA` and records this crate's version under
    /// `versions`.
    pub fn open(iconfig: &IConfig) -> AppResult<Self> {
        let path = md_path(iconfig);
        let delay = md_delay(iconfig)?;
        let title = match iconfig.instrument_folder() {
            Some(folder) => format!("Run metadata for {folder}"),
            None => "Run metadata".to_string(),
        };

        let store = StoredDict::builder(&path)
            .delay(delay)
            .title(title)
            .open()?;

        match iconfig.lookup(&["RUN_ENGINE", "DEFAULT_METADATA"]) {
            Some(Value::Mapping(defaults)) => store.update(defaults.clone())?,
            Some(Value::Null) | None => {}
            Some(other) => warn!(
                found = ?other,
                "RUN_ENGINE.DEFAULT_METADATA is not a mapping, ignored"
            ),
        }

        let mut versions = store
            .get("versions")
            .and_then(|v| v.as_mapping().cloned())
            .unwrap_or_default();
        versions.insert("rust_bits".into(), env!("CARGO_PKG_VERSION").into());
        store.set("versions", versions)?;

        info!(
            file = %path.display(),
            entries = store.len(),
            "run metadata ready"
        );
        Ok(Self { store })
    }

    /// Opens the metadata dictionary at an explicit location.
    pub fn at(path: impl AsRef<Path>, delay: Duration) -> AppResult<Self> {
        let store = StoredDict::builder(path)
            .delay(delay)
            .title("Run metadata")
            .open()?;
        Ok(Self { store })
    }

    /// The backing dictionary.
    pub fn store(&self) -> &StoredDict {
        &self.store
    }

    /// Current `scan_id`, if one has been recorded.
    pub fn scan_id(&self) -> Option<u64> {
        self.store.get(SCAN_ID).and_then(|v| v.as_u64())
    }

    /// Records `scan_id`.
    pub fn set_scan_id(&self, scan_id: u64) -> AppResult<()> {
        self.store.set(SCAN_ID, scan_id)
    }

    /// Increments `scan_id` (starting from 0) and returns the new value.
    pub fn next_scan_id(&self) -> AppResult<u64> {
        let next = self.scan_id().unwrap_or(0) + 1;
        self.set_scan_id(next)?;
        Ok(next)
    }

    /// Copy of all metadata.
    pub fn snapshot(&self) -> Mapping {
        self.store.snapshot()
    }

    /// Hands back the dictionary.
    pub fn into_inner(self) -> StoredDict {
        self.store
    }
}

fn md_path(iconfig: &IConfig) -> PathBuf {
    let configured = iconfig
        .lookup(&["RUN_ENGINE", "MD_PATH"])
        .and_then(Value::as_str)
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_MD_PATH);
    let path = PathBuf::from(configured);
    if path.is_absolute() {
        return path;
    }
    match (iconfig.source(), iconfig.instrument_path()) {
        (Some(_), Some(base)) => base.join(path),
        _ => path,
    }
}

fn md_delay(iconfig: &IConfig) -> AppResult<Duration> {
    let Some(value) = iconfig.lookup(&["RUN_ENGINE", "MD_DELAY"]) else {
        return Ok(DEFAULT_DELAY);
    };
    value
        .as_f64()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| {
            BitsError::Configuration(format!(
                "RUN_ENGINE.MD_DELAY must be a non-negative number of seconds, found {value:?}"
            ))
        })
}
