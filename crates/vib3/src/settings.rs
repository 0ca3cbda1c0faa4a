use std::{collections::BTreeMap, path::PathBuf};

use tracing::debug;

use crate::document::{self, DocumentError};

/// Flat key/value deployment configuration.
pub(crate) type Settings = BTreeMap<String, String>;

/// Deployment configuration document persisted as a single JSON object.
///
/// Values are free-form strings and are never validated. The document is
/// updated with a read-modify-write cycle and assumes a single writer.
pub(crate) struct SettingsStore {
    /// Document path.
    path: PathBuf,
}

impl SettingsStore {
    /// Create new [`SettingsStore`] backed by the file at `path`.
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the whole document, which is empty if the file doesn't exist yet.
    pub(crate) fn load(&self) -> Result<Settings, DocumentError> {
        document::load(&self.path)
    }

    /// Get a single value.
    pub(crate) fn get(&self, key: &str) -> Result<Option<String>, DocumentError> {
        Ok(self.load()?.remove(key))
    }

    /// Insert or replace a single value.
    ///
    /// The file is left untouched if the key already holds the same value.
    pub(crate) fn set(&self, key: &str, value: &str) -> Result<(), DocumentError> {
        let mut settings = self.load()?;

        if settings.get(key).map(String::as_str) == Some(value) {
            debug!(key, "value unchanged");
            return Ok(());
        }

        settings.insert(key.to_owned(), value.to_owned());
        document::store(&self.path, &settings)
    }
}
