//! Configuration Store
//!
//! [`ConfigStore`] owns one merged [`ConfigTree`] plus the path it was loaded
//! from. It is a plain value: hosts create it and pass it where it is needed.
//! The process-wide accessor in [`super::global`] wraps one instance for code
//! that expects a singleton.

use super::error::ConfigError;
use super::loader::{ConfigLoader, LoadOptions};
use super::types::{lookup, ConfigTree, Flattened, Node, VERSION_KEY};
use crate::Result;
use serde_yaml::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Version given to trees that do not carry one
pub const INITIAL_VERSION: u64 = 1;

/// Loaded configuration with versioned dumps
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigStore {
    source_path: Option<PathBuf>,
    options: LoadOptions,
    tree: ConfigTree,
}

impl ConfigStore {
    /// Empty store at version 1
    pub fn empty() -> Self {
        let mut tree = ConfigTree::new();
        tree.insert(VERSION_KEY.into(), INITIAL_VERSION.into());
        Self {
            source_path: None,
            options: LoadOptions::default(),
            tree,
        }
    }

    /// Load a file or folder with default options
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, LoadOptions::default())
    }

    /// Load a file or folder
    pub fn load_with(path: impl AsRef<Path>, options: LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());
        let tree = ConfigLoader::load_with(path, &options)?;
        Ok(Self {
            source_path: Some(path.to_path_buf()),
            options,
            tree: with_version(tree)?,
        })
    }

    /// Wrap an already built tree
    pub fn from_tree(tree: ConfigTree) -> Result<Self> {
        Ok(Self {
            source_path: None,
            options: LoadOptions::default(),
            tree: with_version(tree)?,
        })
    }

    /// Store loaded from `path`, or an empty one
    pub fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::empty()),
        }
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    pub fn into_tree(self) -> ConfigTree {
        self.tree
    }

    /// Current dump revision
    pub fn version(&self) -> u64 {
        self.tree
            .get(VERSION_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(INITIAL_VERSION)
    }

    /// Top-level value, if present
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.tree.get(key)
    }

    /// Top-level value or `default`
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        match self.tree.get(key) {
            Some(value) => value.clone(),
            None => default.into(),
        }
    }

    /// Top-level value or the empty string
    pub fn get_or_empty(&self, key: &str) -> Value {
        self.get_or(key, "")
    }

    /// Top-level value, failing when absent
    pub fn value(&self, key: &str) -> Result<&Value> {
        self.tree
            .get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.tree.get_mut(key)
    }

    /// Mutable top-level value, failing when absent
    pub fn value_mut(&mut self, key: &str) -> Result<&mut Value> {
        self.tree
            .get_mut(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tree.contains_key(key)
    }

    /// Set or replace a top-level key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.tree.insert(Value::String(key.into()), value.into())
    }

    /// Remove a top-level key, keeping the order of the others
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.tree.shift_remove(key)
    }

    /// Walk nested mappings and sequences. Sequence segments are indices.
    pub fn get_path<S: AsRef<str>>(&self, segments: &[S]) -> Node<'_> {
        lookup(&self.tree, segments)
    }

    /// Flatten the whole tree, or the subtree under one top-level key
    pub fn flatten(&self, key: Option<&str>) -> Result<Flattened> {
        match key {
            Some(key) => Ok(Flattened::from_value(self.value(key)?)),
            None => Ok(Flattened::from_tree(&self.tree)),
        }
    }

    /// Bump `_version`, serialize the whole tree and optionally write it out.
    ///
    /// The version is bumped on every call, whether or not a file is written.
    pub fn dump(&mut self, filename: Option<&Path>) -> Result<String> {
        let current = self.version();
        let next = current
            .checked_add(1)
            .ok_or_else(|| ConfigError::InvalidVersion(format!("{} cannot be bumped", current)))?;
        self.tree.insert(VERSION_KEY.into(), next.into());
        debug!("Dumping configuration at version {}", next);

        let rendered = serde_yaml::to_string(&self.tree)
            .map_err(|e| ConfigError::parse("<dump>", e))?;

        if let Some(path) = filename {
            fs::write(path, &rendered).map_err(|e| ConfigError::io(path, e))?;
            info!("Configuration version {} written to {}", next, path.display());
        }
        Ok(rendered)
    }

    /// Re-read the tree from the source path
    pub fn reload(&mut self) -> Result<()> {
        let path = self.source_path.clone().ok_or(ConfigError::NoSource)?;
        info!("Reloading configuration from {}", path.display());
        let tree = ConfigLoader::load_with(&path, &self.options)?;
        self.tree = with_version(tree)?;
        Ok(())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_yaml::to_string(&self.tree).map_err(|_| fmt::Error)?;
        write!(f, "conf:{}", rendered)
    }
}

/// Validate `_version`, or put version 1 first when missing
fn with_version(tree: ConfigTree) -> Result<ConfigTree> {
    let Some(value) = tree.get(VERSION_KEY) else {
        let mut versioned = ConfigTree::with_capacity(tree.len() + 1);
        versioned.insert(VERSION_KEY.into(), INITIAL_VERSION.into());
        versioned.extend(tree);
        return Ok(versioned);
    };

    if value.as_u64().map_or(true, |v| v < INITIAL_VERSION) {
        let rendered = serde_yaml::to_string(value).unwrap_or_default();
        return Err(ConfigError::InvalidVersion(rendered.trim_end().to_string()));
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(src: &str) -> ConfigStore {
        ConfigStore::from_tree(serde_yaml::from_str(src).unwrap()).unwrap()
    }

    #[test]
    fn test_empty_store() {
        let s = ConfigStore::empty();
        assert_eq!(s.version(), 1);
        assert!(s.source_path().is_none());
        assert!(s.contains("_version"));
    }

    #[test]
    fn test_get_default_and_missing() {
        let mut s = ConfigStore::empty();
        s.set("key", 1);
        assert_eq!(s.get_or("key", 0), Value::from(1));
        assert_eq!(s.get_or("not_exists", 0), Value::from(0));
        assert_eq!(s.get_or_empty("not_exists"), Value::from(""));
        assert!(matches!(s.value("not_exists"), Err(ConfigError::MissingKey(k)) if k == "not_exists"));
    }

    #[test]
    fn test_contains() {
        let mut s = ConfigStore::empty();
        s.set("key", 1);
        assert!(s.contains("key"));
        assert!(!s.contains("not_exists"));
    }

    #[test]
    fn test_dump_bumps_version_and_orders_version_first() {
        let mut s = store("foo:\n  bar: 1\n  baz: 2\n");
        let first = s.dump(None).unwrap();
        assert_eq!(first, "_version: 2\nfoo:\n  bar: 1\n  baz: 2\n");
        let second = s.dump(None).unwrap();
        assert_eq!(second, "_version: 3\nfoo:\n  bar: 1\n  baz: 2\n");
        assert_eq!(s.version(), 3);
    }

    #[test]
    fn test_nested_mutation_then_dump() {
        let mut s = store("foo:\n  bar: 1\n  baz: 2\n");
        let foo = s.value_mut("foo").unwrap();
        let mut bar = serde_yaml::Mapping::new();
        bar.insert("test".into(), 10.into());
        foo["bar"] = Value::Mapping(bar);
        foo["baz"] = 3.into();

        assert_eq!(s.get_path(&["foo", "bar", "test"]).as_scalar(), Some(&Value::from(10)));
        let dumped = s.dump(None).unwrap();
        assert_eq!(dumped, "_version: 2\nfoo:\n  bar:\n    test: 10\n  baz: 3\n");
    }

    #[test]
    fn test_flatten_subtree_and_missing_key() {
        let s = store("foo:\n  bar: 1\n  baz: 2\ntar: test\n");
        let flat = s.flatten(Some("foo")).unwrap();
        let keys: Vec<_> = flat.keys().collect();
        assert_eq!(keys, vec!["bar", "baz"]);
        assert!(matches!(s.flatten(Some("nope")), Err(ConfigError::MissingKey(_))));
    }

    #[test]
    fn test_invalid_version_rejected() {
        let tree = serde_yaml::from_str("_version: abc\n").unwrap();
        assert!(matches!(ConfigStore::from_tree(tree), Err(ConfigError::InvalidVersion(_))));
    }

    #[test]
    fn test_non_positive_versions_rejected() {
        for raw in ["_version: 0\n", "_version: -3\n", "_version: 1.5\n", "_version: two\n"] {
            let tree: ConfigTree = serde_yaml::from_str(raw).unwrap();
            assert!(
                matches!(ConfigStore::from_tree(tree), Err(ConfigError::InvalidVersion(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_dump_at_max_version_fails_without_bumping() {
        let mut s = store("_version: 18446744073709551615\na: 1\n");
        assert_eq!(s.version(), u64::MAX);
        let err = s.dump(None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVersion(_)));
        assert_eq!(s.version(), u64::MAX);
    }

    #[test]
    fn test_existing_version_kept() {
        let s = store("a: 1\n_version: 7\n");
        assert_eq!(s.version(), 7);
    }

    #[test]
    fn test_reload_without_source_fails() {
        let mut s = ConfigStore::empty();
        assert!(matches!(s.reload(), Err(ConfigError::NoSource)));
    }

    #[test]
    fn test_remove_and_display() {
        let mut s = store("a: 1\nb: 2\n");
        assert_eq!(s.remove("a"), Some(Value::from(1)));
        assert_eq!(s.to_string(), "conf:_version: 1\nb: 2\n");
    }
}
