//! Configuration Loader
//!
//! Turns a YAML file, or a folder of YAML files, into one [`ConfigTree`].
//!
//! Folders are merged with one of two strategies:
//!
//! - **concatenate** (default): files are sorted by base name and their bytes
//!   joined into a single document before parsing, so an anchor defined in
//!   `a.yaml` can be aliased from `b.yaml`. The files must be fragments of one
//!   global mapping; a top-level key defined twice is a parse error.
//! - **per-file**: every file is parsed on its own and its top-level keys are
//!   shallow-merged into the result, later files replacing earlier ones.

use super::error::ConfigError;
use super::tags::{kind_of, TagResolver};
use super::types::{is_reserved, ConfigTree};
use crate::Result;
use serde_yaml::Value;
use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use walkdir::{DirEntry, WalkDir};

/// Extensions picked up by folder discovery, in discovery order
pub const YAML_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Extension of template files placed next to their config
pub const TEMPLATE_EXTENSION: &str = "template";

/// Loader behaviour for folder sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Concatenate folder files into one document before parsing
    pub concatenate: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { concatenate: true }
    }
}

impl LoadOptions {
    pub fn per_file() -> Self {
        Self { concatenate: false }
    }
}

/// Loads and merges YAML configuration sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a file or folder with default options
    pub fn load(path: impl AsRef<Path>) -> Result<ConfigTree> {
        Self::load_with(path, &LoadOptions::default())
    }

    /// Load a file or folder
    pub fn load_with(path: impl AsRef<Path>, options: &LoadOptions) -> Result<ConfigTree> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        if path.is_file() {
            Self::load_from_file(path)
        } else {
            Self::load_from_folder(path, options.concatenate)
        }
    }

    /// Load a single YAML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<ConfigTree> {
        Self::read_yaml_file(path.as_ref())
    }

    /// Load every `*.yaml` / `*.yml` file below `folder`
    pub fn load_from_folder(folder: impl AsRef<Path>, concatenate: bool) -> Result<ConfigTree> {
        let folder = folder.as_ref();
        if !folder.is_dir() {
            return Err(ConfigError::NotFound(folder.to_path_buf()));
        }

        let files = Self::discover(folder)?;
        debug!("Discovered {} YAML files under {}", files.len(), folder.display());

        if files.is_empty() {
            return Ok(ConfigTree::new());
        }

        if concatenate {
            info!("Loading configuration folder {} by concatenation", folder.display());
            Self::load_concatenated(files)
        } else {
            info!("Loading configuration folder {} file by file", folder.display());
            Self::load_per_file(&files)
        }
    }

    /// Recursively list YAML files. Hidden entries are skipped and `.yaml`
    /// files come before `.yml` files.
    ///
    /// Symlinked directories are not descended into; symlinks to files are kept.
    pub fn discover(folder: &Path) -> Result<Vec<PathBuf>> {
        let walker = WalkDir::new(folder)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        let mut found = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(folder).to_path_buf();
                ConfigError::io(path, e.into())
            })?;
            let file_type = entry.file_type();
            if file_type.is_file() || (file_type.is_symlink() && entry.path().is_file()) {
                found.push(entry.into_path());
            }
        }

        let mut ordered = Vec::with_capacity(found.len());
        for ext in YAML_EXTENSIONS {
            ordered.extend(
                found
                    .iter()
                    .filter(|p| p.extension() == Some(OsStr::new(ext)))
                    .cloned(),
            );
        }
        Ok(ordered)
    }

    fn load_concatenated(mut files: Vec<PathBuf>) -> Result<ConfigTree> {
        // Stable sort: equal base names keep discovery order
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut buffer = Vec::new();
        for file in &files {
            let bytes = Self::read_bytes(file)?;
            if !buffer.is_empty() && !buffer.ends_with(b"\n") {
                buffer.push(b'\n');
            }
            buffer.extend_from_slice(&bytes);
            debug!("Appended {} ({} bytes)", file.display(), bytes.len());
        }

        let origin = format!("<concatenation of {} files>", files.len());
        Self::read_yaml_bytes(&buffer, &origin)
    }

    fn load_per_file(files: &[PathBuf]) -> Result<ConfigTree> {
        let mut merged = ConfigTree::new();
        for file in files {
            let tree = Self::read_yaml_file(file)?;
            debug!("Merging {} top-level keys from {}", tree.len(), file.display());
            for (key, value) in tree {
                merged.insert(key, value);
            }
        }
        Ok(merged)
    }

    /// Read and parse one file
    pub fn read_yaml_file(path: &Path) -> Result<ConfigTree> {
        let bytes = Self::read_bytes(path)?;
        info!("Loading configuration file {}", path.display());
        Self::read_yaml_bytes(&bytes, &path.display().to_string())
    }

    /// Parse YAML text with the tag extensions applied
    pub fn read_yaml_str(content: &str) -> Result<ConfigTree> {
        Self::read_yaml_bytes(content.as_bytes(), "<string>")
    }

    fn read_yaml_bytes(bytes: &[u8], origin: &str) -> Result<ConfigTree> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ConfigTree::new());
        }

        let resolver = TagResolver::new().map_err(|e| ConfigError::parse(origin, e))?;

        let content = std::str::from_utf8(bytes).map_err(|e| ConfigError::parse(origin, e))?;
        let marked = resolver.mark_env_scalars(content).map_err(|e| {
            error!("Malformed YAML in {}", origin);
            ConfigError::parse(origin, e)
        })?;

        let raw: Value = serde_yaml::from_str(&marked).map_err(|e| {
            error!("Malformed YAML in {}", origin);
            ConfigError::parse(origin, e)
        })?;
        let mut resolved = resolver
            .resolve(raw)
            .map_err(|e| ConfigError::parse(origin, e))?;
        resolved
            .apply_merge()
            .map_err(|e| ConfigError::parse(origin, e))?;

        match resolved {
            Value::Mapping(tree) => Ok(tree),
            Value::Null => Ok(ConfigTree::new()),
            other => Err(ConfigError::parse(
                origin,
                format!("top-level document must be a mapping, found {}", kind_of(&other)),
            )),
        }
    }

    fn read_bytes(path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
            _ => ConfigError::io(path, e),
        })
    }

    /// Default template location: `<config without extension>.template`
    pub fn template_path_for(config_path: &Path) -> PathBuf {
        config_path.with_extension(TEMPLATE_EXTENSION)
    }

    /// Check that every key of the template is present in the config.
    ///
    /// Extra keys in the config are allowed, sequence order is ignored and
    /// reserved (`_`-prefixed) template keys are skipped.
    pub fn check_template_match(
        config_path: impl AsRef<Path>,
        template_path: Option<&Path>,
    ) -> Result<bool> {
        let config_path = config_path.as_ref();
        let template_path = template_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::template_path_for(config_path));

        if !template_path.is_file() {
            return Err(ConfigError::NotFound(template_path));
        }

        let config = Value::Mapping(Self::read_yaml_file(config_path)?);
        let template = Value::Mapping(Self::read_yaml_file(&template_path)?);

        let mut missing = Vec::new();
        collect_missing(&config, &template, "", &mut missing);

        if missing.is_empty() {
            debug!("{} matches template {}", config_path.display(), template_path.display());
            Ok(true)
        } else {
            let config_name = config_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| config_path.display().to_string());
            Err(ConfigError::TemplateMismatch {
                config: config_name,
                missing,
            })
        }
    }
}

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map_or(false, |name| name.starts_with('.'))
}

/// Record template keys absent from `config`, as dotted paths
fn collect_missing(config: &Value, template: &Value, prefix: &str, missing: &mut Vec<String>) {
    match template {
        Value::Mapping(expected) => {
            let actual = config.as_mapping();
            for (key, expected_child) in expected {
                let Some(key) = key.as_str() else { continue };
                if is_reserved(key) {
                    continue;
                }
                let path = child_path(prefix, key);
                match actual.and_then(|m| m.get(key)) {
                    Some(actual_child) => collect_missing(actual_child, expected_child, &path, missing),
                    None => missing.push(path),
                }
            }
        }
        Value::Sequence(expected) => {
            let candidates = config.as_sequence().map(Vec::as_slice).unwrap_or_default();
            for (idx, expected_item) in expected.iter().enumerate() {
                let path = format!("{}[{}]", prefix, idx);
                // Any config element may satisfy a template element
                let best = candidates
                    .iter()
                    .map(|candidate| {
                        let mut local = Vec::new();
                        collect_missing(candidate, expected_item, &path, &mut local);
                        local
                    })
                    .min_by_key(Vec::len);
                match best {
                    Some(local) => missing.extend(local),
                    None => collect_missing(&Value::Null, expected_item, &path, missing),
                }
            }
        }
        Value::Tagged(tagged) => collect_missing(config, &tagged.value, prefix, missing),
        _ => {}
    }
}
