//! Configuration Store Integration Tests

use anyhow::Result;
use serde_yaml::{Mapping, Value};
use std::fs;
use tempfile::TempDir;
use yamlcfg::config::Node;
use yamlcfg::{ConfigError, ConfigStore, LoadOptions};

const BASIC_YAML: &str = "foo:\n  bar: 1\n  baz: 2\n";

fn basic_store(dir: &TempDir) -> Result<ConfigStore> {
    let path = dir.path().join("basic.yaml");
    fs::write(&path, BASIC_YAML)?;
    Ok(ConfigStore::load(&path)?)
}

#[test]
fn test_update_and_dump() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = basic_store(&dir)?;
    let path = dir.path().join("basic.yaml");

    assert_eq!(config.version(), 1);
    assert_eq!(config.value("_version")?, &Value::from(1));
    assert_eq!(config.value("foo")?["bar"], Value::from(1));
    assert_eq!(config.value("foo")?["baz"], Value::from(2));

    let foo = config.value_mut("foo")?;
    let mut bar = Mapping::new();
    bar.insert("test".into(), 10.into());
    foo["bar"] = Value::Mapping(bar);
    foo["baz"] = 3.into();
    assert_eq!(config.value("foo")?["bar"]["test"], Value::from(10));
    assert_eq!(config.value("foo")?["baz"], Value::from(3));

    let yaml = config.dump(None)?;
    assert_eq!(yaml, "_version: 2\nfoo:\n  bar:\n    test: 10\n  baz: 3\n");

    let yaml = config.dump(None)?;
    assert_eq!(yaml, "_version: 3\nfoo:\n  bar:\n    test: 10\n  baz: 3\n");

    let written = config.dump(Some(&path))?;
    assert_eq!(fs::read_to_string(&path)?, written);

    let reloaded = ConfigStore::load(&path)?;
    assert_eq!(reloaded.version(), 4);
    assert_eq!(reloaded.value("foo")?["bar"]["test"], Value::from(10));
    assert_eq!(reloaded.value("foo")?["baz"], Value::from(3));
    Ok(())
}

#[test]
fn test_flatten() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = basic_store(&dir)?;

    config.set("tar", "test");
    config.set("var", "variation");

    let flat = config.flatten(None)?;
    let pairs: Vec<(&str, &Value)> = flat.iter().map(|e| (e.key.as_str(), &e.value)).collect();
    assert_eq!(
        pairs,
        vec![
            ("foo-bar", &Value::from(1)),
            ("foo-baz", &Value::from(2)),
            ("tar", &Value::from("test")),
            ("var", &Value::from("variation")),
        ]
    );
    assert_eq!(flat.get("foo-baz"), Some(&Value::from(2)));
    assert!(!flat.contains_key("_version"));
    Ok(())
}

#[test]
fn test_flatten_subtree() -> Result<()> {
    let dir = TempDir::new()?;
    let config = basic_store(&dir)?;

    let flat = config.flatten(Some("foo"))?;
    assert_eq!(flat.len(), 2);
    assert_eq!(flat.get("bar"), Some(&Value::from(1)));
    Ok(())
}

#[test]
fn test_index_access_and_defaults() -> Result<()> {
    let mut config = ConfigStore::empty();
    config.set("key", 1);

    assert_eq!(config.get_or("key", 0), Value::from(1));
    assert_eq!(config.get_or("not_exists", 0), Value::from(0));
    assert_eq!(config.get_or_empty("not_exists"), Value::from(""));
    assert!(config.get("not_exists").is_none());

    match config.value("not_exists") {
        Err(ConfigError::MissingKey(key)) => assert_eq!(key, "not_exists"),
        other => panic!("expected MissingKey, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_get_path() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("nested.yaml");
    fs::write(&path, "db:\n  replicas:\n    - host: a\n    - host: b\n")?;
    let config = ConfigStore::load(&path)?;

    assert_eq!(config.get_path(&["db", "replicas", "1", "host"]).as_str(), Some("b"));
    assert!(matches!(config.get_path(&["db"]), Node::Mapping(_)));
    assert!(config.get_path(&["db", "missing"]).is_absent());
    Ok(())
}

#[test]
fn test_reload_picks_up_changes() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = basic_store(&dir)?;
    config.set("transient", true);

    fs::write(dir.path().join("basic.yaml"), "foo:\n  bar: 5\n")?;
    config.reload()?;

    assert_eq!(config.value("foo")?["bar"], Value::from(5));
    assert!(!config.contains("transient"));
    assert_eq!(config.version(), 1);
    Ok(())
}

#[test]
fn test_folder_store_with_options() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("a.yaml"), "shared: 1\n")?;
    fs::write(dir.path().join("b.yaml"), "shared: 2\n")?;

    assert!(matches!(
        ConfigStore::load(dir.path()),
        Err(ConfigError::Parse { .. })
    ));

    let config = ConfigStore::load_with(dir.path(), LoadOptions::per_file())?;
    assert_eq!(config.value("shared")?, &Value::from(2));
    assert_eq!(config.source_path(), Some(dir.path()));
    Ok(())
}
