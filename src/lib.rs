//! yamlcfg Library
//!
//! Hierarchical YAML configuration for host applications.
//!
//! A configuration source is a single YAML file or a folder of them. Folder
//! files are concatenated into one document by default so anchors defined in
//! one file can be used from another. Plain scalars starting with `${VAR}` are
//! filled from the environment and `!join [...]` sequences are concatenated
//! into one string.
//!
//! ```no_run
//! use yamlcfg::ConfigStore;
//!
//! let mut store = ConfigStore::load("config/")?;
//! let mode = store.get_or("mode", "dev");
//! let flat = store.flatten(None)?;
//! let yaml = store.dump(Some("snapshot.yaml".as_ref()))?;
//! # Ok::<(), yamlcfg::ConfigError>(())
//! ```

pub mod config;

pub use config::global;
pub use config::{ConfigError, ConfigLoader, ConfigStore, ConfigTree, ConfigWatcher, LoadOptions};

/// Common result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
