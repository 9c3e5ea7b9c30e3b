//! Per-type registry index (`<base>/<type>/registry.json`).
//!
//! The index is a denormalized summary of every registered version so that
//! listings do not need to open each `metadata.json`. It is rewritten
//! wholesale on every mutation; callers serialize writers per type.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::metadata::{ArtifactMetadata, ArtifactStatus, MetadataError};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),
}

impl RegistryError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        RegistryError::Io { path: path.to_path_buf(), source }
    }

    /// True when the underlying cause is a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::Io { source, .. } if source.kind() == ErrorKind::NotFound)
    }
}

/// Summary row for one `name:version` in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub version: String,
    pub status: ArtifactStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub file_path: PathBuf,
    pub memory_requirement_mb: u64,
}

impl From<&ArtifactMetadata> for IndexEntry {
    fn from(meta: &ArtifactMetadata) -> Self {
        Self {
            name: meta.name.clone(),
            version: meta.version.clone(),
            status: meta.status,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            file_path: meta.file_path.clone(),
            memory_requirement_mb: meta.memory_requirement_mb,
        }
    }
}

/// The `{"models": {...}}` document for one artifact type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryIndex {
    #[serde(default)]
    pub models: BTreeMap<String, IndexEntry>,
}

impl RegistryIndex {
    /// Read the index, failing on a missing or malformed file.
    pub fn read(path: &Path) -> Result<Self, RegistryError> {
        read_json(path)
    }

    /// Read the index, treating a missing or corrupt file as empty.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::read(path) {
            Ok(index) => index,
            Err(e) if e.is_not_found() => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "registry index unreadable, treating as empty");
                Self::default()
            }
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), RegistryError> {
        write_json_atomic(path, self)
    }

    /// Insert or replace the summary row for `meta`.
    pub fn upsert(&mut self, meta: &ArtifactMetadata) {
        self.models.insert(meta.index_key(), IndexEntry::from(meta));
    }

    pub fn remove(&mut self, key: &str) -> Option<IndexEntry> {
        self.models.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.models.contains_key(key)
    }

    /// Split every key into `(name, version)`. Keys without ':' are skipped.
    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.models.keys().filter_map(|key| key.split_once(':'))
    }

    /// All versions registered under `name`, in index order.
    pub fn versions_of(&self, name: &str) -> Vec<String> {
        self.keys()
            .filter(|(n, _)| *n == name)
            .map(|(_, v)| v.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, RegistryError> {
    let content = std::fs::read_to_string(path).map_err(|e| RegistryError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| RegistryError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write pretty JSON to a `.tmp` sibling, then rename over `path`.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), RegistryError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| RegistryError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);

    std::fs::write(&tmp_path, json).map_err(|e| RegistryError::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| RegistryError::io(path, e))?;
    Ok(())
}
