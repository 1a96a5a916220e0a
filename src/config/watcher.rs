//! Configuration File Watcher
//!
//! Notices edits to a store's source file or folder so the host can reload.

use super::error::ConfigError;
use super::loader::YAML_EXTENSIONS;
use super::store::ConfigStore;
use crate::Result;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Pause after a change so the writer can finish
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Watches the source of a configuration store
pub struct ConfigWatcher {
    source_path: PathBuf,
    is_folder: bool,
    events: Receiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Watch a config file or folder
    pub fn new(source_path: impl AsRef<Path>) -> Result<Self> {
        let source_path = source_path.as_ref().to_path_buf();
        if !source_path.exists() {
            return Err(ConfigError::NotFound(source_path));
        }

        let (sender, events) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(sender, NotifyConfig::default())?;

        let is_folder = source_path.is_dir();
        if is_folder {
            watcher.watch(&source_path, RecursiveMode::Recursive)?;
            info!("Started watching configuration folder: {}", source_path.display());
        } else {
            // Editors often replace files, so watch the directory instead
            let parent = source_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
            info!("Started watching configuration file: {}", source_path.display());
        }

        Ok(Self {
            source_path,
            is_folder,
            events,
            _watcher: watcher,
        })
    }

    /// Watch the source a store was loaded from
    pub fn for_store(store: &ConfigStore) -> Result<Self> {
        let path = store.source_path().ok_or(ConfigError::NoSource)?;
        Self::new(path)
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Block until a relevant change arrives. Returns `false` on timeout.
    ///
    /// Consumes the pending events; follow up with [`ConfigStore::reload`].
    pub fn wait_for_change(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => {
                    if self.handle_event(event?) {
                        self.settle();
                        return Ok(true);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Ok(false)
                }
            }
        }
    }

    /// Reload `store` if a relevant change is pending. Never blocks.
    pub fn apply(&self, store: &mut ConfigStore) -> Result<bool> {
        let mut changed = false;
        loop {
            match self.events.try_recv() {
                Ok(event) => changed |= self.handle_event(event?),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if !changed {
            return Ok(false);
        }

        if let Err(e) = store.reload() {
            error!("Failed to reload configuration, keeping current config: {}", e);
            return Err(e);
        }
        info!("Configuration reloaded from {}", self.source_path.display());
        Ok(true)
    }

    fn handle_event(&self, event: Event) -> bool {
        debug!("File event: {:?}", event);

        if !event.paths.iter().any(|path| self.is_relevant(path)) {
            return false;
        }

        match event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => true,
            EventKind::Remove(_) if self.is_folder => true,
            EventKind::Remove(_) => {
                warn!("Configuration file was removed: {}", self.source_path.display());
                false
            }
            _ => {
                debug!("Ignoring file event type: {:?}", event.kind);
                false
            }
        }
    }

    fn is_relevant(&self, path: &Path) -> bool {
        if self.is_folder {
            path.extension()
                .and_then(OsStr::to_str)
                .map_or(false, |ext| YAML_EXTENSIONS.contains(&ext))
        } else {
            path.file_name() == self.source_path.file_name()
        }
    }

    /// Wait out the burst of events a single save produces
    fn settle(&self) {
        std::thread::sleep(SETTLE_DELAY);
        while self.events.try_recv().is_ok() {}
    }
}
