use anyhow::Result;
use rust_bits::config::IConfig;
use rust_bits::metadata::{RunMetadata, DEFAULT_MD_PATH};
use rust_bits::stored_dict::format;
use serde_yaml::Value;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_iconfig(dir: &Path, body: &str) -> Result<std::path::PathBuf> {
    let configs = dir.join("demo_instrument");
    fs::create_dir_all(&configs)?;
    let path = configs.join("iconfig.yml");
    fs::write(&path, format!("ICONFIG_VERSION: 2.0.0\n{body}"))?;
    Ok(path)
}

#[test]
fn test_metadata_lives_next_to_iconfig() -> Result<()> {
    let dir = tempdir()?;
    let iconfig_path = write_iconfig(
        dir.path(),
        "RUN_ENGINE:\n  MD_PATH: md.yml\n  MD_DELAY: 0.2\n  DEFAULT_METADATA:\n    beamline_id: demo\n",
    )?;
    let iconfig = IConfig::load(&iconfig_path)?;

    let md = RunMetadata::open(&iconfig)?;
    let expected = dir.path().join("demo_instrument").join("md.yml");
    assert_eq!(md.store().path(), expected.as_path());
    assert_eq!(md.store().title(), "Run metadata for demo_instrument");
    assert_eq!(md.store().get("beamline_id"), Some(Value::from("demo")));
    assert_eq!(
        md.store()
            .get("versions")
            .and_then(|v| v.get("rust_bits").cloned()),
        Some(Value::from(env!("CARGO_PKG_VERSION")))
    );

    md.store().flush()?;
    let text = fs::read_to_string(&expected)?;
    assert!(text.starts_with("# Run metadata for demo_instrument\n"));
    Ok(())
}

#[test]
fn test_scan_id_survives_restart() -> Result<()> {
    let dir = tempdir()?;
    let iconfig_path = write_iconfig(dir.path(), "RUN_ENGINE:\n  MD_DELAY: 60\n")?;
    let iconfig = IConfig::load(&iconfig_path)?;

    {
        let md = RunMetadata::open(&iconfig)?;
        assert_eq!(md.scan_id(), None);
        md.set_scan_id(100)?;
        assert_eq!(md.next_scan_id()?, 101);
        md.into_inner().flush()?;
    }

    let md = RunMetadata::open(&iconfig)?;
    assert_eq!(md.scan_id(), Some(101));
    let on_disk = format::load(md.store().path())?;
    assert_eq!(on_disk.get("scan_id"), Some(&Value::from(101)));
    Ok(())
}

#[test]
#[serial]
fn test_default_location_is_working_directory() -> Result<()> {
    let dir = tempdir()?;
    let previous = env::current_dir()?;
    env::set_current_dir(dir.path())?;

    let outcome = (|| -> Result<()> {
        let md = RunMetadata::open(&IConfig::default())?;
        assert_eq!(md.store().path(), Path::new(DEFAULT_MD_PATH));
        assert_eq!(md.store().title(), "Run metadata");
        assert_eq!(md.store().get("proposal_id"), Some(Value::from("commissioning")));
        md.store().flush()?;
        assert!(dir.path().join(DEFAULT_MD_PATH).exists());
        Ok(())
    })();

    env::set_current_dir(previous)?;
    outcome
}
