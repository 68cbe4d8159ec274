use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

pub const DETECTOR_KEY_RF: &str = "rf";
const RF_URL: &str = "https://wildbookiarepository.azureedge.net/models/rf.v3.zip";

/// Identifies one family of downloadable model artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelKey(String);

impl ModelKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub key: ModelKey,
    /// Directory name under the models base directory
    pub subdir: String,
    /// Canonical download location, without credentials
    pub url: String,
    /// Expected SHA-256 of the downloaded file, when known
    #[serde(default)]
    pub checksum: Option<String>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model key '{0}' is declared more than once")]
    DuplicateKey(ModelKey),
    #[error("subdirectory '{subdir}' is used by more than one model (last: '{key}')")]
    DuplicateSubdir { key: ModelKey, subdir: String },
    #[error("model '{key}' has an invalid subdirectory '{subdir}'")]
    InvalidSubdir { key: ModelKey, subdir: String },
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelRegistry {
    /// The models the detection pipeline ships with.
    pub fn builtin() -> Self {
        Self {
            entries: vec![ModelEntry {
                key: ModelKey::new(DETECTOR_KEY_RF),
                subdir: "rf".to_string(),
                url: RF_URL.to_string(),
                checksum: None,
            }],
        }
    }

    /// Built-in entries with `overrides` applied. An override with a built-in
    /// key replaces that entry; any other key is appended.
    pub fn with_overrides(overrides: &[ModelEntry]) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin();
        let mut seen = HashSet::new();

        for entry in overrides {
            if !seen.insert(entry.key.clone()) {
                return Err(RegistryError::DuplicateKey(entry.key.clone()));
            }
            match registry.entries.iter_mut().find(|e| e.key == entry.key) {
                Some(existing) => *existing = entry.clone(),
                None => registry.entries.push(entry.clone()),
            }
        }

        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let mut subdirs = HashSet::new();
        for entry in &self.entries {
            if !is_plain_dir_name(&entry.subdir) {
                return Err(RegistryError::InvalidSubdir {
                    key: entry.key.clone(),
                    subdir: entry.subdir.clone(),
                });
            }
            if !subdirs.insert(entry.subdir.as_str()) {
                return Err(RegistryError::DuplicateSubdir {
                    key: entry.key.clone(),
                    subdir: entry.subdir.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|e| e.key.as_str() == key)
    }

    pub fn list(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn subdirs(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.subdir.as_str())
    }
}

/// One normal path component that is not hidden (staging directories are).
fn is_plain_dir_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\'])
}
