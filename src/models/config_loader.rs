//! Declarative model document loading and reconciliation.
//!
//! The document declares which artifact name/version combinations should
//! exist, with what settings:
//!
//! ```json
//! {
//!   "model_definitions": {
//!     "task_parser": {
//!       "default": {
//!         "versions": { "v1": { "source": "mock", "memory_requirement_mb": 128 } },
//!         "default_version": "v1"
//!       }
//!     }
//!   },
//!   "global_config": { "cache_enabled": true }
//! }
//! ```
//!
//! A missing file, or one that is not a JSON object, degrades to a built-in
//! default that declares a single mock parser, so the service stays
//! operable. Below the top level the document is kept as raw JSON and each
//! definition is decoded on its own, so one mistyped entry only affects
//! its own key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use super::index::{read_json, RegistryError};
use super::metadata::{model_key, ArtifactType, NewArtifact, RuntimeConfig};
use super::versions::{check_identity, VersionManager};

/// Placeholder file written for `source == "mock"` versions.
pub const MOCK_ARTIFACT_FILE: &str = "model.json";

/// Fixed so the placeholder's hash is reproducible across runs.
const MOCK_CREATED_AT: &str = "2024-01-01T00:00:00";

/// Top-level declarative document.
///
/// Both sections stay raw: `model_definitions` maps type, then name, to a
/// definition object, and `global_config` is a flat object of overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_definitions: Option<Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub global_config: Value,
}

impl ModelDocument {
    /// Every declared `(type, name, definition)` in document order. Type
    /// sections that are not objects are skipped here and reported by
    /// [`ConfigLoader::validate`].
    fn declared(&self) -> Vec<(&str, &str, &Value)> {
        let Some(definitions) = self.model_definitions.as_ref().and_then(Value::as_object) else {
            return Vec::new();
        };
        definitions
            .iter()
            .filter_map(|(type_str, models)| Some((type_str, models.as_object()?)))
            .flat_map(|(type_str, models)| {
                models
                    .iter()
                    .map(move |(name, raw)| (type_str.as_str(), name.as_str(), raw))
            })
            .collect()
    }

    fn definition(&self, model_type: ArtifactType, name: &str) -> Option<&Value> {
        self.model_definitions
            .as_ref()?
            .get(model_type.as_str())?
            .get(name)
    }
}

/// One named artifact and its declared versions.
///
/// Built leniently from the raw definition: a `versions` value that is not
/// an object or a `default_version` that is not a string reads as absent.
/// Version entries stay raw until [`ModelDefinition::version`] decodes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelDefinition {
    pub versions: Option<BTreeMap<String, Value>>,
    pub default_version: Option<String>,
}

impl ModelDefinition {
    pub fn from_value(raw: &Value) -> Self {
        Self {
            versions: raw.get("versions").and_then(Value::as_object).map(|versions| {
                versions
                    .iter()
                    .map(|(version, entry)| (version.clone(), entry.clone()))
                    .collect()
            }),
            default_version: raw
                .get("default_version")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    /// Decode one declared version. `None` when it is not declared.
    pub fn version(&self, version: &str) -> Option<Result<VersionDefinition, serde_json::Error>> {
        self.versions
            .as_ref()?
            .get(version)
            .map(VersionDefinition::from_value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionDefinition {
    #[serde(default, alias = "model_source")]
    pub source: Option<String>,
    #[serde(default)]
    pub memory_requirement_mb: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "model_id")]
    pub source_id: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl VersionDefinition {
    pub fn from_value(raw: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(raw)
    }
}

/// Listing row returned by [`ConfigLoader::list_available`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableModel {
    pub name: String,
    pub versions: Vec<String>,
    pub default_version: Option<String>,
}

/// Loads the declarative document and reconciles it into a registry.
pub struct ConfigLoader {
    path: PathBuf,
    document: RwLock<ModelDocument>,
}

impl ConfigLoader {
    /// Create a loader for `path` and load it immediately.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let loader = Self {
            path: path.into(),
            document: RwLock::new(default_document()),
        };
        loader.load();
        loader
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the document. When the file is missing or is not a JSON
    /// object, install the built-in default and return false.
    pub fn load(&self) -> bool {
        match read_json::<ModelDocument>(&self.path) {
            Ok(document) => {
                *self.document.write() = document;
                info!(path = %self.path.display(), "loaded model configuration");
                true
            }
            Err(e) => {
                if e.is_not_found() {
                    warn!(path = %self.path.display(), "model config file not found, using defaults");
                } else {
                    error!(path = %self.path.display(), error = %e, "failed to load model config, using defaults");
                }
                *self.document.write() = default_document();
                false
            }
        }
    }

    pub fn reload(&self) -> bool {
        self.load()
    }

    /// Snapshot of the currently loaded document.
    pub fn document(&self) -> ModelDocument {
        self.document.read().clone()
    }

    /// Global overrides. Empty when the section is absent or not an object.
    pub fn global_config(&self) -> Map<String, Value> {
        match &self.document.read().global_config {
            Value::Object(global) => global.clone(),
            _ => Map::new(),
        }
    }

    pub fn get_definition(&self, model_type: ArtifactType, name: &str) -> Option<ModelDefinition> {
        let document = self.document.read();
        document
            .definition(model_type, name)
            .map(ModelDefinition::from_value)
    }

    /// Decoded version entry. An entry that fails to decode reads as absent.
    pub fn get_version_definition(
        &self,
        model_type: ArtifactType,
        name: &str,
        version: &str,
    ) -> Option<VersionDefinition> {
        match self.get_definition(model_type, name)?.version(version)? {
            Ok(version_def) => Some(version_def),
            Err(e) => {
                warn!(model_key = %model_key(model_type, name, version), error = %e, "invalid version entry");
                None
            }
        }
    }

    pub fn get_default_version(&self, model_type: ArtifactType, name: &str) -> Option<String> {
        self.get_definition(model_type, name)?.default_version
    }

    /// Declared names per type. Types with no declarations map to an empty list.
    pub fn list_available(
        &self,
        model_type: Option<ArtifactType>,
    ) -> BTreeMap<ArtifactType, Vec<AvailableModel>> {
        let mut available: BTreeMap<ArtifactType, Vec<AvailableModel>> = match model_type {
            Some(t) => [(t, Vec::new())].into(),
            None => ArtifactType::ALL.iter().map(|t| (*t, Vec::new())).collect(),
        };
        let document = self.document.read();

        for (type_str, name, raw) in document.declared() {
            let Ok(t) = type_str.parse::<ArtifactType>() else {
                continue;
            };
            if let Some(models) = available.get_mut(&t) {
                let definition = ModelDefinition::from_value(raw);
                models.push(AvailableModel {
                    name: name.to_string(),
                    versions: definition
                        .versions
                        .map(|v| v.into_keys().collect())
                        .unwrap_or_default(),
                    default_version: definition.default_version,
                });
            }
        }

        available
    }

    /// Merge global config, then the version's config, then identity.
    pub fn build_config(
        &self,
        model_type: ArtifactType,
        name: &str,
        version: &str,
    ) -> Option<RuntimeConfig> {
        let version_def = self.get_version_definition(model_type, name, version)?;
        let mut merged = self.global_config();
        merged.extend(version_def.config);

        match RuntimeConfig::from_overrides(model_type, name, version, &merged) {
            Ok(config) => Some(config),
            Err(e) => {
                error!(model_key = %model_key(model_type, name, version), error = %e, "failed to build config");
                None
            }
        }
    }

    /// Bring the registry in line with every declared version.
    ///
    /// Already-registered versions report true without rewriting. Mock
    /// versions get a placeholder file and are registered. Entries that
    /// fail to decode, and anything that needs an external provisioning
    /// step, report false.
    pub fn reconcile(&self, versions: &VersionManager) -> BTreeMap<String, bool> {
        let document = self.document();
        let mut results = BTreeMap::new();

        for (type_str, name, raw) in document.declared() {
            let model_type = match type_str.parse::<ArtifactType>() {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "skipping unknown artifact type");
                    continue;
                }
            };
            let definition = ModelDefinition::from_value(raw);

            for (version, entry) in definition.versions.iter().flatten() {
                let key = model_key(model_type, name, version);
                let ok = if versions.get_metadata(model_type, name, version).is_some() {
                    info!(model_key = %key, "artifact already registered");
                    true
                } else {
                    match VersionDefinition::from_value(entry) {
                        Err(e) => {
                            error!(model_key = %key, error = %e, "invalid version entry");
                            false
                        }
                        Ok(version_def) if version_def.source.as_deref() == Some("mock") => {
                            match create_mock(versions, model_type, name, version, &version_def) {
                                Ok(registered) => registered,
                                Err(e) => {
                                    error!(model_key = %key, error = %e, "failed to create mock artifact");
                                    false
                                }
                            }
                        }
                        Ok(_) => {
                            info!(model_key = %key, "skipping artifact that needs a provisioned file");
                            false
                        }
                    }
                };
                results.insert(key, ok);
            }
        }

        results
    }

    /// Structural check of the loaded document. Collects every problem.
    pub fn validate(&self) -> Vec<String> {
        let document = self.document.read();
        let mut errors = Vec::new();

        if !matches!(document.global_config, Value::Null | Value::Object(_)) {
            errors.push("Invalid 'global_config' section: expected an object".to_string());
        }

        let Some(definitions) = document.model_definitions.as_ref() else {
            errors.push("Missing 'model_definitions' section".to_string());
            return errors;
        };
        let Some(definitions) = definitions.as_object() else {
            errors.push("Invalid 'model_definitions' section: expected an object".to_string());
            return errors;
        };

        for (type_str, models) in definitions {
            if type_str.parse::<ArtifactType>().is_err() {
                errors.push(format!("Invalid model type: {}", type_str));
                continue;
            }
            let Some(models) = models.as_object() else {
                errors.push(format!("Invalid definitions for {}: expected an object", type_str));
                continue;
            };

            for (name, raw) in models {
                if !raw.is_object() {
                    errors.push(format!("Invalid definition for {}/{}: expected an object", type_str, name));
                    continue;
                }
                let versions = match raw.get("versions") {
                    None | Some(Value::Null) => {
                        errors.push(format!("Missing versions for {}/{}", type_str, name));
                        continue;
                    }
                    Some(Value::Object(versions)) => versions,
                    Some(_) => {
                        errors.push(format!("Invalid versions for {}/{}: expected an object", type_str, name));
                        continue;
                    }
                };

                match raw.get("default_version") {
                    None | Some(Value::Null) => {
                        errors.push(format!("Missing default_version for {}/{}", type_str, name))
                    }
                    Some(Value::String(default)) if !versions.contains_key(default) => {
                        errors.push(format!(
                            "Default version '{}' not found in versions for {}/{}",
                            default, type_str, name
                        ))
                    }
                    Some(Value::String(_)) => {}
                    Some(_) => errors.push(format!(
                        "Invalid default_version for {}/{}: expected a string",
                        type_str, name
                    )),
                }

                for (version, entry) in versions {
                    let version_def = match VersionDefinition::from_value(entry) {
                        Ok(version_def) => version_def,
                        Err(e) => {
                            errors.push(format!(
                                "Invalid version entry for {}/{}:{}: {}",
                                type_str, name, version, e
                            ));
                            continue;
                        }
                    };
                    if version_def.source.is_none() {
                        errors.push(format!("Missing source for {}/{}:{}", type_str, name, version));
                    }
                    if version_def.memory_requirement_mb.is_none() {
                        errors.push(format!(
                            "Missing memory_requirement_mb for {}/{}:{}",
                            type_str, name, version
                        ));
                    }
                }
            }
        }

        errors
    }
}

fn create_mock(
    versions: &VersionManager,
    model_type: ArtifactType,
    name: &str,
    version: &str,
    version_def: &VersionDefinition,
) -> Result<bool, RegistryError> {
    check_identity(name, version)?;

    let dir = versions.artifact_dir(model_type, name, version);
    std::fs::create_dir_all(&dir).map_err(|e| RegistryError::io(&dir, e))?;

    let file_path = dir.join(MOCK_ARTIFACT_FILE);
    let placeholder = json!({
        "type": "mock_model",
        "name": name,
        "version": version,
        "model_type": model_type.as_str(),
        "created_at": MOCK_CREATED_AT,
    });
    let body = serde_json::to_string_pretty(&placeholder).map_err(|e| RegistryError::Json {
        path: file_path.clone(),
        source: e,
    })?;
    std::fs::write(&file_path, body).map_err(|e| RegistryError::io(&file_path, e))?;

    let mut request = NewArtifact::new(model_type, name, version, file_path)
        .source(version_def.source.clone().unwrap_or_else(|| "mock".to_string()))
        .memory_mb(version_def.memory_requirement_mb.unwrap_or(128))
        .description(
            version_def
                .description
                .clone()
                .unwrap_or_else(|| format!("Mock {} model", model_type)),
        )
        .config(version_def.config.clone());
    if let Some(source_id) = &version_def.source_id {
        request = request.source_id(source_id.clone());
    }

    Ok(versions.register_from_file(request))
}

/// One mock parser (`default/v1`, 128 MB) plus minimal global settings.
pub fn default_document() -> ModelDocument {
    ModelDocument {
        model_definitions: Some(json!({
            "task_parser": {
                "default": {
                    "versions": {
                        "v1": {
                            "source": "mock",
                            "memory_requirement_mb": 128,
                            "description": "Mock task parsing model",
                            "config": { "max_length": 512, "temperature": 0.7 }
                        }
                    },
                    "default_version": "v1"
                }
            }
        })),
        global_config: json!({
            "cache_enabled": true,
            "cache_size": 100,
            "timeout_seconds": 30
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_document_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().join("missing.json"));
        assert_eq!(loader.document(), default_document());
        assert!(loader.validate().is_empty());
        assert_eq!(
            loader.get_default_version(ArtifactType::Parser, "default").as_deref(),
            Some("v1")
        );
    }

    #[test]
    fn test_version_entry_accepts_legacy_source_key() {
        let definition = ModelDefinition::from_value(&json!({
            "versions": { "v1": { "model_source": "mock", "memory_requirement_mb": 64 } },
            "default_version": "v1"
        }));
        let version = definition.version("v1").unwrap().unwrap();
        assert_eq!(version.source.as_deref(), Some("mock"));
        assert_eq!(version.memory_requirement_mb, Some(64));
        assert!(definition.version("v2").is_none());
    }

    #[test]
    fn test_mistyped_definition_reads_leniently() {
        let definition = ModelDefinition::from_value(&json!({
            "versions": ["v1"],
            "default_version": 1
        }));
        assert_eq!(definition, ModelDefinition::default());

        let entry = VersionDefinition::from_value(&json!({ "source": "mock", "memory_requirement_mb": -5 }));
        assert!(entry.is_err());
    }

    #[test]
    fn test_non_object_document_installs_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let loader = ConfigLoader::new(&path);
        assert!(!loader.reload());
        assert_eq!(loader.document(), default_document());
    }
}
