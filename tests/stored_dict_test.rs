use anyhow::Result;
use rust_bits::stored_dict::{format, StoredDict};
use rust_bits::{BitsError, PersistentMapping};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const DELAY: Duration = Duration::from_millis(200);

fn open_test_store(path: &Path) -> Result<StoredDict> {
    Ok(StoredDict::builder(path)
        .delay(DELAY)
        .title("unit testing")
        .open()?)
}

#[test]
fn test_set_is_visible_at_once_and_flush_writes_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("md.yml");
    let md = open_test_store(&path)?;

    md.set("a", "b")?;
    assert_eq!(md.get("a"), Some(Value::from("b")));

    md.flush()?;
    let text = fs::read_to_string(&path)?;
    assert!(text.lines().next().unwrap_or_default().contains("unit testing"));
    let on_disk = format::load(&path)?;
    assert_eq!(on_disk.get("a"), Some(&Value::from("b")));
    Ok(())
}

#[test]
fn test_file_lags_until_delay_passes() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("md.yml");
    let md = open_test_store(&path)?;

    md.set("bee", "bumble")?;
    md.flush()?;
    md.set("bee", "queen")?;

    let early = format::load(&path)?;
    assert_eq!(early.get("bee"), Some(&Value::from("bumble")));

    thread::sleep(DELAY * 3);
    let late = format::load(&path)?;
    assert_eq!(late.get("bee"), Some(&Value::from("queen")));
    Ok(())
}

#[test]
fn test_burst_of_updates_is_written_once() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("md.yml");
    let md = open_test_store(&path)?;

    md.set("a", "b")?;
    md.set("c", "d")?;
    md.update([("e", "f"), ("g", "h")])?;
    assert!(md.sync_in_progress());
    assert_eq!(md.write_count(), 0);

    thread::sleep(DELAY * 3);
    assert!(!md.sync_in_progress());
    assert_eq!(md.write_count(), 1);

    let on_disk = format::load(&path)?;
    assert_eq!(on_disk, md.snapshot());
    let keys: Vec<_> = on_disk.keys().filter_map(Value::as_str).collect();
    assert_eq!(keys, ["a", "c", "e", "g"]);
    Ok(())
}

#[test]
fn test_each_mutation_extends_the_deadline() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("md.yml");
    let md = StoredDict::builder(&path)
        .delay(Duration::from_millis(300))
        .open()?;

    for i in 0..5 {
        md.set("count", i)?;
        thread::sleep(Duration::from_millis(100));
    }
    assert_eq!(md.write_count(), 0);
    assert!(!path.exists());

    thread::sleep(Duration::from_millis(900));
    assert_eq!(md.write_count(), 1);
    assert_eq!(format::load(&path)?.get("count"), Some(&Value::from(4)));
    Ok(())
}

#[test]
fn test_rejected_values_leave_store_unchanged() -> Result<()> {
    let dir = tempdir()?;
    let md = open_test_store(&dir.path().join("md.yml"))?;
    md.set("keep", 1)?;

    let bad: Value = serde_yaml::from_str("!Device {name: m1}")?;
    let err = md.set("motor", bad.clone()).unwrap_err();
    assert!(matches!(err, BitsError::Serialization { .. }));

    let mut batch = Mapping::new();
    batch.insert("ok".into(), 2.into());
    batch.insert("motor".into(), bad);
    assert!(md.update(batch).is_err());

    assert_eq!(md.len(), 1);
    assert!(!md.contains_key("motor"));
    assert!(!md.contains_key("ok"));
    Ok(())
}

#[test]
fn test_flush_matches_cache() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("md.yml");
    let md = StoredDict::builder(&path)
        .delay(Duration::from_secs(30))
        .open()?;

    md.update([("x", vec![1, 2, 3])])?;
    md.set(7, 3.5)?;
    md.set(true, Value::Null)?;
    md.flush()?;
    assert_eq!(format::load(&path)?, md.snapshot());

    md.delete("x")?;
    md.flush()?;
    assert_eq!(format::load(&path)?, md.snapshot());
    Ok(())
}

#[test]
fn test_pop_on_empty_store_is_key_error() -> Result<()> {
    let dir = tempdir()?;
    let md = open_test_store(&dir.path().join("md.yml"))?;
    let err = md.pop_item().unwrap_err();
    assert!(err.is_key_error());
    Ok(())
}

#[test]
fn test_open_missing_path_gives_empty_store() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("never").join("written.yml");
    let md = StoredDict::open(&path)?;
    assert!(md.is_empty());
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_reopen_sees_previous_contents() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("md.yml");
    {
        let md = open_test_store(&path)?;
        md.with_flush(|md| md.update([("scan_id", 12), ("plan", 3)]))??;
    }
    let md = open_test_store(&path)?;
    assert_eq!(md.get("scan_id"), Some(Value::from(12)));
    assert_eq!(md.keys(), vec![Value::from("scan_id"), Value::from("plan")]);
    Ok(())
}

#[test]
fn test_shared_across_threads() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("md.yml");
    let md = Arc::new(open_test_store(&path)?);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let md = Arc::clone(&md);
            thread::spawn(move || -> rust_bits::AppResult<()> {
                for i in 0..25 {
                    md.set(format!("t{t}_{i}"), i)?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread panicked")?;
    }

    md.flush()?;
    assert_eq!(md.len(), 100);
    assert_eq!(format::load(&path)?.len(), 100);
    Ok(())
}

#[test]
fn test_works_through_trait_object() -> Result<()> {
    let dir = tempdir()?;
    let md = open_test_store(&dir.path().join("md.yml"))?;
    let mapping: &dyn PersistentMapping = &md;

    mapping.set("k".into(), "v".into())?;
    assert_eq!(mapping.get(&"k".into()), Some(Value::from("v")));
    assert!(mapping.contains_key(&"k".into()));
    assert_eq!(mapping.delete(&"k".into())?, Value::from("v"));
    assert!(mapping.is_empty());
    Ok(())
}
