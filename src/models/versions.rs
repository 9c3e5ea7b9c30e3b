//! Filesystem-backed artifact version registry.
//!
//! Layout under the base path:
//!
//! ```text
//! <base>/<type>/registry.json                   index of every name:version
//! <base>/<type>/<name>/<version>/metadata.json  full ArtifactMetadata
//! ```
//!
//! "Not found" is never an error here: lookups return `None`, mutations
//! return `false`, and the cause is logged. Writers to the same type's
//! index are serialized by a per-type lock so no update is lost.

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::index::{read_json, write_json_atomic, RegistryError, RegistryIndex};
use super::metadata::{
    build_metadata, compute_file_hash, model_key, ArtifactMetadata, ArtifactStatus, ArtifactType,
    NewArtifact, RuntimeConfig,
};

pub const REGISTRY_FILE: &str = "registry.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Reasons an artifact file no longer matches its registered record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Artifact metadata not found: {0}")]
    MetadataNotFound(String),

    #[error("Artifact file not found: {}", .0.display())]
    FileMissing(PathBuf),

    #[error("File size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("File hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Error calculating hash: {0}")]
    Hash(String),
}

/// Aggregate on-disk footprint of every registered artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageInfo {
    pub total_artifacts: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub base_path: PathBuf,
}

/// Durable CRUD over artifact metadata.
pub struct VersionManager {
    base_path: PathBuf,
    cache: DashMap<String, ArtifactMetadata>,
    type_locks: [Mutex<()>; 3],
}

impl VersionManager {
    /// Open (and lay out, if needed) a registry rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let manager = Self {
            base_path: base_path.into(),
            cache: DashMap::new(),
            type_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
        };
        manager.initialize()?;
        Ok(manager)
    }

    /// Ensure every type directory and an empty index exist. Idempotent.
    pub fn initialize(&self) -> Result<(), RegistryError> {
        for model_type in ArtifactType::ALL {
            let dir = self.type_dir(model_type);
            std::fs::create_dir_all(&dir).map_err(|e| RegistryError::io(&dir, e))?;

            let registry = self.registry_path(model_type);
            if !registry.exists() {
                let _guard = self.lock_type(model_type);
                if !registry.exists() {
                    RegistryIndex::default().write(&registry)?;
                }
            }
        }
        debug!(path = %self.base_path.display(), "registry layout initialized");
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn type_dir(&self, model_type: ArtifactType) -> PathBuf {
        self.base_path.join(model_type.as_str())
    }

    pub fn registry_path(&self, model_type: ArtifactType) -> PathBuf {
        self.type_dir(model_type).join(REGISTRY_FILE)
    }

    pub fn artifact_dir(&self, model_type: ArtifactType, name: &str, version: &str) -> PathBuf {
        self.type_dir(model_type).join(name).join(version)
    }

    fn metadata_path(&self, model_type: ArtifactType, name: &str, version: &str) -> PathBuf {
        self.artifact_dir(model_type, name, version).join(METADATA_FILE)
    }

    fn lock_type(&self, model_type: ArtifactType) -> MutexGuard<'_, ()> {
        let slot = match model_type {
            ArtifactType::Parser => 0,
            ArtifactType::Prioritizer => 1,
            ArtifactType::Insights => 2,
        };
        self.type_locks[slot].lock()
    }

    /// Persist `metadata` and index it. Returns false on any failure.
    pub fn register(&self, metadata: &ArtifactMetadata) -> bool {
        let key = metadata.model_key();
        match self.try_register(metadata) {
            Ok(()) => {
                info!(model_key = %key, "registered artifact");
                true
            }
            Err(e) => {
                error!(model_key = %key, error = %e, "failed to register artifact");
                false
            }
        }
    }

    fn try_register(&self, metadata: &ArtifactMetadata) -> Result<(), RegistryError> {
        check_identity(&metadata.name, &metadata.version)?;
        metadata.validate()?;

        let dir = self.artifact_dir(metadata.model_type, &metadata.name, &metadata.version);
        std::fs::create_dir_all(&dir).map_err(|e| RegistryError::io(&dir, e))?;

        let _guard = self.lock_type(metadata.model_type);
        write_json_atomic(&dir.join(METADATA_FILE), metadata)?;

        let registry = self.registry_path(metadata.model_type);
        let mut index = load_for_update(&registry)?;
        index.upsert(metadata);
        index.write(&registry)?;

        self.cache.insert(metadata.model_key(), metadata.clone());
        Ok(())
    }

    /// Hash `request.file_path` and register the resulting metadata.
    pub fn register_from_file(&self, request: NewArtifact) -> bool {
        let key = model_key(request.model_type, &request.name, &request.version);
        match build_metadata(request) {
            Ok(metadata) => self.register(&metadata),
            Err(e) => {
                error!(model_key = %key, error = %e, "failed to build artifact metadata");
                false
            }
        }
    }

    /// Cache-first metadata lookup.
    pub fn get_metadata(
        &self,
        model_type: ArtifactType,
        name: &str,
        version: &str,
    ) -> Option<ArtifactMetadata> {
        let key = model_key(model_type, name, version);
        if let Some(cached) = self.cache.get(&key) {
            return Some(cached.clone());
        }
        if check_identity(name, version).is_err() {
            return None;
        }

        let path = self.metadata_path(model_type, name, version);
        let metadata: ArtifactMetadata = match read_json(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => return None,
            Err(e) => {
                warn!(model_key = %key, error = %e, "failed to load artifact metadata");
                return None;
            }
        };
        if let Err(e) = metadata.validate() {
            warn!(model_key = %key, error = %e, "stored artifact metadata is invalid");
            return None;
        }

        self.cache.insert(key, metadata.clone());
        Some(metadata)
    }

    /// Every resolvable artifact of `model_type`, or of all types.
    pub fn list_artifacts(&self, model_type: Option<ArtifactType>) -> Vec<ArtifactMetadata> {
        let types = match model_type {
            Some(t) => vec![t],
            None => ArtifactType::ALL.to_vec(),
        };

        let mut artifacts = Vec::new();
        for t in types {
            let index = RegistryIndex::load_or_default(&self.registry_path(t));
            for (name, version) in index.keys() {
                match self.get_metadata(t, name, version) {
                    Some(metadata) => artifacts.push(metadata),
                    None => {
                        warn!(model_key = %model_key(t, name, version), "indexed artifact has no readable metadata");
                    }
                }
            }
        }
        artifacts
    }

    /// Versions of `name`, sorted descending lexicographically ("v2" > "v10").
    pub fn list_versions(&self, model_type: ArtifactType, name: &str) -> Vec<String> {
        let index = RegistryIndex::load_or_default(&self.registry_path(model_type));
        let mut versions = index.versions_of(name);
        versions.sort_by(|a, b| b.cmp(a));
        versions
    }

    pub fn latest_version(&self, model_type: ArtifactType, name: &str) -> Option<String> {
        self.list_versions(model_type, name).into_iter().next()
    }

    /// Remove the index entry, the version directory, and the cache entry.
    pub fn delete_version(&self, model_type: ArtifactType, name: &str, version: &str) -> bool {
        let key = model_key(model_type, name, version);
        match self.try_delete(model_type, name, version) {
            Ok(true) => {
                info!(model_key = %key, "deleted artifact version");
                true
            }
            Ok(false) => {
                warn!(model_key = %key, "artifact version not found in registry");
                false
            }
            Err(e) => {
                error!(model_key = %key, error = %e, "failed to delete artifact version");
                false
            }
        }
    }

    fn try_delete(
        &self,
        model_type: ArtifactType,
        name: &str,
        version: &str,
    ) -> Result<bool, RegistryError> {
        check_identity(name, version)?;
        let index_key = format!("{}:{}", name, version);

        let _guard = self.lock_type(model_type);
        let registry = self.registry_path(model_type);
        let mut index = load_for_update(&registry)?;
        if index.remove(&index_key).is_none() {
            return Ok(false);
        }
        index.write(&registry)?;

        let dir = self.artifact_dir(model_type, name, version);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RegistryError::io(&dir, e)),
        }

        self.cache.remove(&model_key(model_type, name, version));
        Ok(true)
    }

    /// Set `status`, bump `updated_at`, and persist both copies.
    pub fn update_status(
        &self,
        model_type: ArtifactType,
        name: &str,
        version: &str,
        status: ArtifactStatus,
    ) -> bool {
        let key = model_key(model_type, name, version);
        let Some(mut metadata) = self.get_metadata(model_type, name, version) else {
            warn!(model_key = %key, "cannot update status of unknown artifact");
            return false;
        };
        metadata.status = status;
        metadata.updated_at = Utc::now();

        match self.try_update(&metadata) {
            Ok(()) => {
                info!(model_key = %key, status = %status, "updated artifact status");
                true
            }
            Err(e) => {
                error!(model_key = %key, error = %e, "failed to update artifact status");
                false
            }
        }
    }

    fn try_update(&self, metadata: &ArtifactMetadata) -> Result<(), RegistryError> {
        let _guard = self.lock_type(metadata.model_type);
        let path = self.metadata_path(metadata.model_type, &metadata.name, &metadata.version);
        write_json_atomic(&path, metadata)?;

        let registry = self.registry_path(metadata.model_type);
        let mut index = load_for_update(&registry)?;
        if let Some(entry) = index.models.get_mut(&metadata.index_key()) {
            entry.status = metadata.status;
            entry.updated_at = metadata.updated_at;
            index.write(&registry)?;
        }

        self.cache.insert(metadata.model_key(), metadata.clone());
        Ok(())
    }

    /// Check the artifact file's existence, size, and hash against the record.
    pub fn validate_integrity(
        &self,
        model_type: ArtifactType,
        name: &str,
        version: &str,
    ) -> Result<(), IntegrityError> {
        let metadata = self
            .get_metadata(model_type, name, version)
            .ok_or_else(|| IntegrityError::MetadataNotFound(model_key(model_type, name, version)))?;
        verify_file(&metadata)
    }

    /// Runtime configuration seeded with identity and the stored config map.
    pub fn get_config(
        &self,
        model_type: ArtifactType,
        name: &str,
        version: &str,
    ) -> Option<RuntimeConfig> {
        let metadata = self.get_metadata(model_type, name, version)?;
        match RuntimeConfig::from_overrides(model_type, name, version, &metadata.config) {
            Ok(config) => Some(config),
            Err(e) => {
                error!(model_key = %metadata.model_key(), error = %e, "failed to build runtime config");
                None
            }
        }
    }

    /// Count every indexed artifact and sum the sizes of files still on disk.
    pub fn storage_info(&self) -> StorageInfo {
        let mut total_artifacts = 0;
        let mut total_size_bytes = 0u64;

        for model_type in ArtifactType::ALL {
            let index = RegistryIndex::load_or_default(&self.registry_path(model_type));
            for entry in index.models.values() {
                total_artifacts += 1;
                if let Ok(stat) = std::fs::metadata(&entry.file_path) {
                    total_size_bytes += stat.len();
                }
            }
        }

        let mb = total_size_bytes as f64 / (1024.0 * 1024.0);
        StorageInfo {
            total_artifacts,
            total_size_bytes,
            total_size_mb: (mb * 100.0).round() / 100.0,
            base_path: self.base_path.clone(),
        }
    }
}

/// Missing index means empty; a corrupt one must not be silently overwritten.
fn load_for_update(path: &Path) -> Result<RegistryIndex, RegistryError> {
    match RegistryIndex::read(path) {
        Ok(index) => Ok(index),
        Err(e) if e.is_not_found() => Ok(RegistryIndex::default()),
        Err(e) => Err(e),
    }
}

fn verify_file(metadata: &ArtifactMetadata) -> Result<(), IntegrityError> {
    let path = &metadata.file_path;
    let stat = std::fs::metadata(path).map_err(|_| IntegrityError::FileMissing(path.clone()))?;

    if stat.len() != metadata.file_size_bytes {
        return Err(IntegrityError::SizeMismatch {
            expected: metadata.file_size_bytes,
            actual: stat.len(),
        });
    }

    let actual = compute_file_hash(path).map_err(|e| IntegrityError::Hash(e.to_string()))?;
    if !actual.eq_ignore_ascii_case(&metadata.file_hash) {
        return Err(IntegrityError::HashMismatch {
            expected: metadata.file_hash.clone(),
            actual,
        });
    }
    Ok(())
}

/// Names and versions become path components; reject anything that could
/// escape the type directory or break `name:version` keys.
pub(crate) fn check_identity(name: &str, version: &str) -> Result<(), RegistryError> {
    let component_ok = |s: &str| {
        let mut components = Path::new(s).components();
        matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none()
            && !s.contains(&['/', '\\'][..])
    };

    if name.is_empty() || name.contains(':') || !component_ok(name) {
        return Err(RegistryError::InvalidIdentity(format!("artifact name {name:?}")));
    }
    if version.is_empty() || !component_ok(version) {
        return Err(RegistryError::InvalidIdentity(format!("artifact version {version:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_identity_accepts_plain_names() {
        assert!(check_identity("default", "v1").is_ok());
        assert!(check_identity("fast-parser", "2024.01.15").is_ok());
    }

    #[test]
    fn test_check_identity_rejects_traversal() {
        assert!(check_identity("..", "v1").is_err());
        assert!(check_identity("default", "../../etc").is_err());
        assert!(check_identity("a/b", "v1").is_err());
        assert!(check_identity("a:b", "v1").is_err());
        assert!(check_identity("", "v1").is_err());
        assert!(check_identity("default", "").is_err());
        assert!(check_identity("default", ".").is_err());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = VersionManager::new(dir.path()).unwrap();
        for t in ArtifactType::ALL {
            let content = std::fs::read_to_string(manager.registry_path(t)).unwrap();
            assert!(content.contains("\"models\""));
        }
        manager.initialize().unwrap();
        VersionManager::new(dir.path()).unwrap();
    }

    #[test]
    fn test_integrity_error_messages() {
        let err = IntegrityError::SizeMismatch { expected: 10, actual: 12 };
        assert_eq!(err.to_string(), "File size mismatch: expected 10, got 12");
        let err = IntegrityError::MetadataNotFound("task_parser:x:v1".into());
        assert!(err.to_string().contains("task_parser:x:v1"));
    }
}
