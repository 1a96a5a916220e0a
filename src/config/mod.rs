//! Configuration Module
//!
//! Handles loading, merging, inspecting and dumping YAML configuration.

pub mod error;
pub mod global;
pub mod loader;
pub mod store;
pub mod tags;
pub mod types;
pub mod watcher;

pub use error::ConfigError;
pub use loader::{ConfigLoader, LoadOptions};
pub use store::ConfigStore;
pub use tags::TagResolver;
pub use types::*;
pub use watcher::ConfigWatcher;
