//! services/api/src/adapters/preferences.rs
//!
//! Stores the preference blob as a small JSON file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use lumina_core::ports::{PortError, PortResult, PreferenceStore};
use lumina_core::Preferences;
use tracing::warn;

pub const PREFERENCES_FILE: &str = "lumina_settings.json";

/// A `PreferenceStore` backed by `<dir>/lumina_settings.json`.
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(PREFERENCES_FILE),
        }
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load(&self) -> PortResult<Option<Preferences>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PortError::Unexpected(e.to_string())),
        };
        // A damaged file falls back to defaults instead of blocking startup.
        match serde_json::from_str(&raw) {
            Ok(preferences) => Ok(Some(preferences)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable preferences");
                Ok(None)
            }
        }
    }

    fn save(&self, preferences: &Preferences) -> PortResult<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| PortError::Unexpected(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(preferences)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| PortError::Unexpected(e.to_string()))
    }
}
