//! Instrument configuration (`iconfig.yml`): built-in defaults, the file's
//! location keys and the minimum-version check.

use super::load_config;
use crate::error::{AppResult, BitsError};
use serde_yaml::{Mapping, Value};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::info;

/// Oldest `ICONFIG_VERSION` this crate accepts.
pub const ICONFIG_MINIMUM_VERSION: &str = "2.0.0";

/// Key recording the file a configuration was loaded from.
pub const ICONFIG_PATH: &str = "ICONFIG_PATH";
/// Key recording the directory holding the configuration file.
pub const INSTRUMENT_PATH: &str = "INSTRUMENT_PATH";
/// Key recording the name of that directory.
pub const INSTRUMENT_FOLDER: &str = "INSTRUMENT_FOLDER";

/// Instrument configuration.
///
/// Holds the merged contents of an `iconfig.yml` (or `.toml`) file over the
/// built-in defaults. Each session owns its own `IConfig`; nothing here is global.
///
/// # Example
///
/// ```no_run
/// use rust_bits::config::IConfig;
/// use std::path::Path;
///
/// let iconfig = IConfig::load(Path::new("instrument/configs/iconfig.yml"))?;
/// println!("catalog: {:?}", iconfig.get_str("DATABROKER_CATALOG"));
/// # Ok::<(), rust_bits::error::BitsError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IConfig {
    values: Mapping,
    source: Option<PathBuf>,
}

impl Default for IConfig {
    fn default() -> Self {
        Self {
            values: Self::defaults(),
            source: None,
        }
    }
}

impl IConfig {
    /// Built-in default configuration.
    pub fn defaults() -> Mapping {
        let mut metadata = Mapping::new();
        metadata.insert("beamline_id".into(), "instrument".into());
        metadata.insert(
            "instrument_name".into(),
            "Most Glorious Scientific Instrument".into(),
        );
        metadata.insert("proposal_id".into(), "commissioning".into());
        metadata.insert("databroker_catalog".into(), "temp".into());

        let mut run_engine = Mapping::new();
        run_engine.insert("DEFAULT_METADATA".into(), Value::Mapping(metadata));

        let mut values = Mapping::new();
        values.insert("ICONFIG_VERSION".into(), ICONFIG_MINIMUM_VERSION.into());
        values.insert("DATABROKER_CATALOG".into(), "temp".into());
        values.insert("RUN_ENGINE".into(), Value::Mapping(run_engine));
        values.insert("XMODE_DEBUG_LEVEL".into(), "Plain".into());
        values
    }

    /// Loads and validates a configuration file.
    ///
    /// Top-level keys from the file replace the defaults. The file location is
    /// recorded under `ICONFIG_PATH`, `INSTRUMENT_PATH` and `INSTRUMENT_FOLDER`.
    pub fn load(path: &Path) -> AppResult<Self> {
        let loaded = load_config(path)?;
        check_iconfig_version(&loaded, path)?;

        let mut config = Self::from_mapping(loaded);
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        let folder = parent
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        config
            .values
            .insert(ICONFIG_PATH.into(), path.display().to_string().into());
        config
            .values
            .insert(INSTRUMENT_PATH.into(), parent.display().to_string().into());
        config.values.insert(INSTRUMENT_FOLDER.into(), folder.into());
        config.source = Some(path.to_path_buf());

        info!(file = %path.display(), "Successfully loaded configuration");
        Ok(config)
    }

    /// Builds a configuration from an in-memory mapping merged over the defaults.
    pub fn from_mapping(values: Mapping) -> Self {
        let mut config = Self::default();
        config.update(values);
        config
    }

    /// Replaces top-level keys with those in `updates`.
    pub fn update(&mut self, updates: Mapping) {
        for (key, value) in updates {
            self.values.insert(key, value);
        }
    }

    /// Top-level value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Top-level string value for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Top-level path value for `key`.
    ///
    /// Relative paths are resolved against the configuration file's directory
    /// when the configuration was loaded from a file.
    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        let path = PathBuf::from(self.get_str(key)?);
        if path.is_absolute() || self.source.is_none() {
            return Some(path);
        }
        Some(match self.instrument_path() {
            Some(base) => base.join(path),
            None => path,
        })
    }

    /// Top-level mapping for `key`.
    pub fn section(&self, key: &str) -> Option<&Mapping> {
        self.get(key).and_then(Value::as_mapping)
    }

    /// Nested lookup, e.g. `lookup(&["RUN_ENGINE", "MD_PATH"])`.
    pub fn lookup(&self, keys: &[&str]) -> Option<&Value> {
        let (first, rest) = keys.split_first()?;
        rest.iter()
            .try_fold(self.get(first)?, |value, key| value.get(*key))
    }

    /// The file this configuration was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Directory holding the configuration file.
    pub fn instrument_path(&self) -> Option<PathBuf> {
        self.get_str(INSTRUMENT_PATH).map(PathBuf::from)
    }

    /// Name of the directory holding the configuration file.
    pub fn instrument_folder(&self) -> Option<&str> {
        self.get_str(INSTRUMENT_FOLDER).filter(|name| !name.is_empty())
    }

    /// Declared `ICONFIG_VERSION`.
    pub fn version(&self) -> Option<String> {
        self.get("ICONFIG_VERSION").and_then(version_text)
    }

    /// All values.
    pub fn as_mapping(&self) -> &Mapping {
        &self.values
    }
}

/// Fails unless `config` declares an `ICONFIG_VERSION` of at least
/// [`ICONFIG_MINIMUM_VERSION`].
pub fn check_iconfig_version(config: &Mapping, path: &Path) -> AppResult<()> {
    let found = config.get("ICONFIG_VERSION").and_then(version_text);
    let recent_enough = found
        .as_deref()
        .is_some_and(|version| compare_versions(version, ICONFIG_MINIMUM_VERSION) != Ordering::Less);
    if recent_enough {
        return Ok(());
    }
    Err(BitsError::IConfigVersion {
        found,
        minimum: ICONFIG_MINIMUM_VERSION.to_string(),
        path: path.to_path_buf(),
    })
}

fn version_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Compares dotted versions numerically, component by component.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("2.0.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("2.10.0", "2.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.9", "2.0.0"), Ordering::Less);
        assert_eq!(compare_versions("2", "2.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_version_check() {
        let path = Path::new("iconfig.yml");
        let mut config = Mapping::new();
        assert!(check_iconfig_version(&config, path).is_err());

        config.insert("ICONFIG_VERSION".into(), "1.0.0".into());
        assert!(matches!(
            check_iconfig_version(&config, path),
            Err(BitsError::IConfigVersion { found: Some(v), .. }) if v == "1.0.0"
        ));

        config.insert("ICONFIG_VERSION".into(), "2.1.0".into());
        assert!(check_iconfig_version(&config, path).is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = IConfig::default();
        assert_eq!(config.version().as_deref(), Some("2.0.0"));
        assert_eq!(config.get_str("DATABROKER_CATALOG"), Some("temp"));
        assert_eq!(
            config
                .lookup(&["RUN_ENGINE", "DEFAULT_METADATA", "beamline_id"])
                .and_then(Value::as_str),
            Some("instrument")
        );
        assert!(config.source().is_none());
        assert!(config.instrument_folder().is_none());
    }

    #[test]
    fn test_load_records_location() {
        let dir = tempdir().unwrap();
        let configs = dir.path().join("configs");
        fs::create_dir(&configs).unwrap();
        let path = configs.join("iconfig.yml");
        fs::write(
            &path,
            "ICONFIG_VERSION: 2.0.0\nDATABROKER_CATALOG: production\nUSE_BLUESKY_MAGICS: true\n",
        )
        .unwrap();

        let config = IConfig::load(&path).unwrap();
        assert_eq!(config.get_str("DATABROKER_CATALOG"), Some("production"));
        assert_eq!(config.get("USE_BLUESKY_MAGICS"), Some(&Value::Bool(true)));
        assert_eq!(config.get_str("XMODE_DEBUG_LEVEL"), Some("Plain"));
        assert_eq!(config.instrument_folder(), Some("configs"));
        assert_eq!(config.instrument_path(), Some(configs.clone()));
        assert_eq!(config.source(), Some(path.as_path()));
    }

    #[test]
    fn test_get_path_resolves_against_config_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("iconfig.yml");
        fs::write(
            &path,
            "ICONFIG_VERSION: 2.0.0\nMD_FILE: md.yml\nABS_FILE: /opt/abs.yml\n",
        )
        .unwrap();

        let config = IConfig::load(&path).unwrap();
        assert_eq!(config.get_path("MD_FILE"), Some(dir.path().join("md.yml")));
        assert_eq!(config.get_path("ABS_FILE"), Some(PathBuf::from("/opt/abs.yml")));
        assert_eq!(config.get_path("ABSENT"), None);

        let mut values = Mapping::new();
        values.insert("MD_FILE".into(), "md.yml".into());
        let in_memory = IConfig::from_mapping(values);
        assert_eq!(in_memory.get_path("MD_FILE"), Some(PathBuf::from("md.yml")));
    }

    #[test]
    fn test_load_rejects_old_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("iconfig.yml");
        fs::write(&path, "ICONFIG_VERSION: 1.0.0\n").unwrap();
        assert!(matches!(
            IConfig::load(&path),
            Err(BitsError::IConfigVersion { .. })
        ));
    }
}
