//! Process-wide Configuration Store
//!
//! Compatibility layer for hosts that want a single live [`ConfigStore`]
//! reachable from anywhere. New code should prefer building a `ConfigStore`
//! and passing it explicitly.
//!
//! At most one store is live at a time. [`get_instance`] returns it, creating
//! it on first use; [`init`] insists on creating it and fails with
//! [`ConfigError::SingletonViolation`] while another one is live; [`clear`]
//! forgets the live store so the next call builds a fresh one.

use super::error::ConfigError;
use super::store::ConfigStore;
use crate::Result;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info};

/// Handle to the live store
pub type SharedStore = Arc<RwLock<ConfigStore>>;

static LIVE: Mutex<Option<SharedStore>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<SharedStore>> {
    LIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Return the live store, creating it from `path` (or empty) if there is none.
///
/// `path` is ignored when a store is already live.
pub fn get_instance(path: Option<&Path>) -> Result<SharedStore> {
    let mut live = slot();
    if let Some(store) = live.as_ref() {
        return Ok(Arc::clone(store));
    }

    let store = Arc::new(RwLock::new(ConfigStore::open(path)?));
    *live = Some(Arc::clone(&store));
    debug!("Created live configuration store");
    Ok(store)
}

/// Alias of [`get_instance`]
pub fn get(path: Option<&Path>) -> Result<SharedStore> {
    get_instance(path)
}

/// Create the live store, failing if one already exists
pub fn init(path: Option<&Path>) -> Result<SharedStore> {
    let mut live = slot();
    if live.is_some() {
        return Err(ConfigError::SingletonViolation);
    }

    let store = Arc::new(RwLock::new(ConfigStore::open(path)?));
    *live = Some(Arc::clone(&store));
    if let Some(path) = path {
        info!("Live configuration store loaded from {}", path.display());
    }
    Ok(store)
}

/// Make an already built store the live one
pub fn install(store: ConfigStore) -> Result<SharedStore> {
    let mut live = slot();
    if live.is_some() {
        return Err(ConfigError::SingletonViolation);
    }

    let store = Arc::new(RwLock::new(store));
    *live = Some(Arc::clone(&store));
    Ok(store)
}

/// Forget the live store. Existing handles stay usable.
pub fn clear() {
    if slot().take().is_some() {
        debug!("Cleared live configuration store");
    }
}

pub fn is_live() -> bool {
    slot().is_some()
}
