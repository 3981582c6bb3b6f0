//! Key/value persistence port used by the play-limit tracker, the offline
//! leaderboard and preferences.
//!
//! In the browser this is `window.localStorage`; natively (and in tests) an
//! in-memory map stands in. Callers treat every [`StorageError`] as "nothing
//! stored" so a broken or full storage never stops a game.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::config::SOUND_ENABLED_KEY;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Storage could not be reached (private mode, sandboxed iframe, ...).
    #[error("storage unavailable")]
    Unavailable,
    /// A write was refused, usually a quota problem.
    #[error("storage write rejected: {0}")]
    WriteRejected(String),
    /// Stored text did not parse as the expected shape.
    #[error("corrupt value under '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// In-memory store. Share between components with `Rc<MemoryStore>`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// `window.localStorage`.
#[cfg(target_arch = "wasm32")]
pub struct BrowserStorage {
    inner: web_sys::Storage,
}

#[cfg(target_arch = "wasm32")]
impl BrowserStorage {
    pub fn local() -> Result<Self, StorageError> {
        web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .map(|inner| Self { inner })
            .ok_or(StorageError::Unavailable)
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for BrowserStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner
            .get_item(key)
            .map_err(|_| StorageError::Unavailable)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner
            .set_item(key, value)
            .map_err(|e| StorageError::WriteRejected(format!("{e:?}")))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner
            .remove_item(key)
            .map_err(|_| StorageError::Unavailable)
    }
}

/// Persisted player preferences.
pub struct Preferences<S> {
    store: S,
}

impl<S: KeyValueStore> Preferences<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Sound is on unless it was explicitly stored as `"false"`.
    pub fn sound_enabled(&self) -> bool {
        !matches!(self.store.get(SOUND_ENABLED_KEY), Ok(Some(v)) if v == "false")
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        if let Err(e) = self
            .store
            .set(SOUND_ENABLED_KEY, if enabled { "true" } else { "false" })
        {
            tracing::warn!("[PREFS] could not persist sound setting: {e}");
        }
    }

    /// Flip the sound setting and return the new value.
    pub fn toggle_sound(&self) -> bool {
        let enabled = !self.sound_enabled();
        self.set_sound_enabled(enabled);
        enabled
    }
}
