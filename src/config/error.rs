//! Configuration Errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the loader, the store and the watcher
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("{config} - keys required by the template are missing: {}", .missing.join(", "))]
    TemplateMismatch { config: String, missing: Vec<String> },

    #[error("A configuration store is already live; clear it before creating another")]
    SingletonViolation,

    #[error("Missing configuration key: {0}")]
    MissingKey(String),

    #[error("Store has no source path to reload from")]
    NoSource,

    #[error("Invalid _version field: {0}")]
    InvalidVersion(String),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl ConfigError {
    /// Build a parse error from the underlying YAML diagnostic
    pub(crate) fn parse(origin: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ConfigError::Parse {
            origin: origin.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }

    /// Keys reported by a template mismatch, empty for every other error
    pub fn missing_keys(&self) -> &[String] {
        match self {
            ConfigError::TemplateMismatch { missing, .. } => missing,
            _ => &[],
        }
    }
}
