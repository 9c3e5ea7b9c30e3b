//! Artifact metadata, runtime configuration, and content hashing.
//!
//! Metadata is the persisted record for one (type, name, version) artifact.
//! Structural invariants (hash shape, accuracy range, sampling ranges) are
//! checked when a value is built or read back from disk, never later.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Read size used when streaming a file through the digest.
const HASH_CHUNK_SIZE: usize = 4096;

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Artifact file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file_hash must be 64 hex characters")]
    InvalidHash,

    #[error("accuracy_score must be between 0.0 and 1.0, got {0}")]
    InvalidAccuracy(f64),

    #[error("temperature must be in (0.0, 2.0], got {0}")]
    InvalidTemperature(f64),

    #[error("top_p must be in (0.0, 1.0], got {0}")]
    InvalidTopP(f64),

    #[error("Invalid runtime config: {0}")]
    InvalidConfig(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown artifact type: {0}")]
pub struct UnknownArtifactType(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown artifact status: {0}")]
pub struct UnknownArtifactStatus(pub String);

/// The three heuristic families served as versioned artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArtifactType {
    #[serde(rename = "task_parser")]
    Parser,
    #[serde(rename = "prioritizer")]
    Prioritizer,
    #[serde(rename = "insights")]
    Insights,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 3] = [
        ArtifactType::Parser,
        ArtifactType::Prioritizer,
        ArtifactType::Insights,
    ];

    /// On-disk and wire name (also the registry directory name).
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Parser => "task_parser",
            ArtifactType::Prioritizer => "prioritizer",
            ArtifactType::Insights => "insights",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = UnknownArtifactType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task_parser" | "parser" => Ok(ArtifactType::Parser),
            "prioritizer" => Ok(ArtifactType::Prioritizer),
            "insights" => Ok(ArtifactType::Insights),
            other => Err(UnknownArtifactType(other.to_string())),
        }
    }
}

/// Persisted lifecycle status of a registered artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    #[default]
    Available,
    Loading,
    Error,
    Deprecated,
}

impl ArtifactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStatus::Available => "available",
            ArtifactStatus::Loading => "loading",
            ArtifactStatus::Error => "error",
            ArtifactStatus::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactStatus {
    type Err = UnknownArtifactStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "available" => Ok(ArtifactStatus::Available),
            "loading" => Ok(ArtifactStatus::Loading),
            "error" => Ok(ArtifactStatus::Error),
            "deprecated" => Ok(ArtifactStatus::Deprecated),
            _ => Err(UnknownArtifactStatus(s.to_string())),
        }
    }
}

/// Persisted record for one registered artifact version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub version: String,
    pub model_type: ArtifactType,
    #[serde(default)]
    pub description: Option<String>,

    pub file_path: PathBuf,
    pub file_size_bytes: u64,
    /// Hex-encoded SHA-256 of the artifact file.
    pub file_hash: String,
    /// Provenance tag such as "local", "mock", or an external provider.
    #[serde(alias = "model_source")]
    pub source: String,
    #[serde(default, alias = "model_id")]
    pub source_id: Option<String>,

    pub memory_requirement_mb: u64,
    #[serde(default)]
    pub inference_time_ms: Option<u64>,
    #[serde(default)]
    pub accuracy_score: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: ArtifactStatus,

    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl ArtifactMetadata {
    /// Registry index key (`name:version`).
    pub fn index_key(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }

    /// Process-wide key (`type:name:version`).
    pub fn model_key(&self) -> String {
        model_key(self.model_type, &self.name, &self.version)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if !is_valid_hash(&self.file_hash) {
            return Err(MetadataError::InvalidHash);
        }
        if let Some(score) = self.accuracy_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(MetadataError::InvalidAccuracy(score));
            }
        }
        Ok(())
    }

    /// Attach an accuracy score, rejecting values outside [0, 1].
    pub fn with_accuracy_score(mut self, score: f64) -> Result<Self, MetadataError> {
        if !(0.0..=1.0).contains(&score) {
            return Err(MetadataError::InvalidAccuracy(score));
        }
        self.accuracy_score = Some(score);
        Ok(self)
    }
}

/// Build the `type:name:version` key used by the lifecycle table.
pub fn model_key(model_type: ArtifactType, name: &str, version: &str) -> String {
    format!("{}:{}:{}", model_type.as_str(), name, version)
}

/// Split a `type:name:version` key. Names may not contain ':' but versions may.
pub fn parse_model_key(key: &str) -> Option<(ArtifactType, String, String)> {
    let (type_str, rest) = key.split_once(':')?;
    let (name, version) = rest.split_once(':')?;
    let model_type = type_str.parse().ok()?;
    Some((model_type, name.to_string(), version.to_string()))
}

fn is_valid_hash(hash: &str) -> bool {
    hash.len() == HASH_HEX_LEN && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Stream a file through SHA-256 and return the lowercase hex digest.
pub fn compute_file_hash(path: &Path) -> Result<String, MetadataError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => MetadataError::NotFound(path.to_path_buf()),
        _ => MetadataError::Io { path: path.to_path_buf(), source: e },
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| MetadataError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Registration request for an artifact backed by a file on disk.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub model_type: ArtifactType,
    pub name: String,
    pub version: String,
    pub file_path: PathBuf,
    pub source: String,
    pub memory_requirement_mb: u64,
    pub description: Option<String>,
    pub source_id: Option<String>,
    pub config: Map<String, Value>,
}

impl NewArtifact {
    pub fn new(
        model_type: ArtifactType,
        name: impl Into<String>,
        version: impl Into<String>,
        file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model_type,
            name: name.into(),
            version: version.into(),
            file_path: file_path.into(),
            source: "local".to_string(),
            memory_requirement_mb: 512,
            description: None,
            source_id: None,
            config: Map::new(),
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn memory_mb(mut self, memory_mb: u64) -> Self {
        self.memory_requirement_mb = memory_mb;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }
}

/// Stat and hash the artifact file, stamping both timestamps with now.
pub fn build_metadata(request: NewArtifact) -> Result<ArtifactMetadata, MetadataError> {
    let path = request.file_path.as_path();
    let stat = std::fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => MetadataError::NotFound(path.to_path_buf()),
        _ => MetadataError::Io { path: path.to_path_buf(), source: e },
    })?;
    let file_hash = compute_file_hash(path)?;
    let now = Utc::now();

    Ok(ArtifactMetadata {
        name: request.name,
        version: request.version,
        model_type: request.model_type,
        description: request.description,
        file_path: request.file_path,
        file_size_bytes: stat.len(),
        file_hash,
        source: request.source,
        source_id: request.source_id,
        memory_requirement_mb: request.memory_requirement_mb,
        inference_time_ms: None,
        accuracy_score: None,
        created_at: now,
        updated_at: now,
        status: ArtifactStatus::Available,
        dependencies: Vec::new(),
        config: request.config,
    })
}

mod defaults {
    pub fn device() -> String {
        "cpu".to_string()
    }
    pub fn precision() -> String {
        "float32".to_string()
    }
    pub fn max_length() -> u32 {
        512
    }
    pub fn temperature() -> f64 {
        0.7
    }
    pub fn top_p() -> f64 {
        0.9
    }
    pub fn top_k() -> u32 {
        50
    }
    pub fn cache_enabled() -> bool {
        true
    }
    pub fn cache_size() -> usize {
        100
    }
    pub fn cache_ttl_seconds() -> u64 {
        3600
    }
    pub fn batch_size() -> usize {
        1
    }
    pub fn timeout_seconds() -> u64 {
        30
    }
}

/// Effective settings for one loaded artifact.
///
/// Never persisted: rebuilt from global defaults plus the artifact's stored
/// `config` map whenever it is needed. Keys that are not named fields are
/// kept in `custom_params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub model_type: ArtifactType,
    pub name: String,
    pub version: String,

    #[serde(default = "defaults::device")]
    pub device: String,
    #[serde(default = "defaults::precision")]
    pub precision: String,
    #[serde(default)]
    pub max_memory_mb: Option<u64>,

    #[serde(default = "defaults::max_length")]
    pub max_length: u32,
    #[serde(default = "defaults::temperature")]
    pub temperature: f64,
    #[serde(default = "defaults::top_p")]
    pub top_p: f64,
    #[serde(default = "defaults::top_k")]
    pub top_k: u32,

    #[serde(default = "defaults::cache_enabled")]
    pub cache_enabled: bool,
    #[serde(default = "defaults::cache_size")]
    pub cache_size: usize,
    #[serde(default = "defaults::cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
    #[serde(default = "defaults::timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(flatten)]
    pub custom_params: Map<String, Value>,
}

impl RuntimeConfig {
    /// Defaults seeded with identity only.
    pub fn new(model_type: ArtifactType, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            model_type,
            name: name.into(),
            version: version.into(),
            device: defaults::device(),
            precision: defaults::precision(),
            max_memory_mb: None,
            max_length: defaults::max_length(),
            temperature: defaults::temperature(),
            top_p: defaults::top_p(),
            top_k: defaults::top_k(),
            cache_enabled: defaults::cache_enabled(),
            cache_size: defaults::cache_size(),
            cache_ttl_seconds: defaults::cache_ttl_seconds(),
            batch_size: defaults::batch_size(),
            timeout_seconds: defaults::timeout_seconds(),
            custom_params: Map::new(),
        }
    }

    /// Overlay `overrides` on the defaults, then stamp identity and validate.
    ///
    /// An explicit `custom_params` object is flattened first so that named
    /// keys in `overrides` win over a custom parameter of the same name.
    pub fn from_overrides(
        model_type: ArtifactType,
        name: &str,
        version: &str,
        overrides: &Map<String, Value>,
    ) -> Result<Self, MetadataError> {
        let mut merged = Map::new();
        if let Some(Value::Object(custom)) = overrides.get("custom_params") {
            for (key, value) in custom {
                merged.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in overrides {
            if key != "custom_params" {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged.insert("model_type".into(), Value::String(model_type.as_str().to_string()));
        merged.insert("name".into(), Value::String(name.to_string()));
        merged.insert("version".into(), Value::String(version.to_string()));

        let config: RuntimeConfig = serde_json::from_value(Value::Object(merged))
            .map_err(|e| MetadataError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks for the sampling knobs.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if !(self.temperature > 0.0 && self.temperature <= 2.0) {
            return Err(MetadataError::InvalidTemperature(self.temperature));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(MetadataError::InvalidTopP(self.top_p));
        }
        Ok(())
    }
}
