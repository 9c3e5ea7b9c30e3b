//! Artifact registry and lifecycle.
//!
//! Durable versioned metadata on disk, declarative reconciliation, and the
//! in-memory load/unload table that fronts the analyzers.

pub mod config_loader;
pub mod index;
pub mod lifecycle;
pub mod metadata;
pub mod result_cache;
pub mod stats;
pub mod versions;
pub mod worker;

pub use config_loader::{
    default_document, AvailableModel, ConfigLoader, ModelDefinition, ModelDocument,
    VersionDefinition, MOCK_ARTIFACT_FILE,
};
pub use index::{IndexEntry, RegistryError, RegistryIndex};
pub use lifecycle::{
    CacheReport, DefaultArtifact, LifecycleManager, LifecycleSettings, LoadedArtifact,
    LoadedSummary, MemoryUsage, UNRESOLVED_VERSION,
};
pub use metadata::{
    build_metadata, compute_file_hash, model_key, parse_model_key, ArtifactMetadata,
    ArtifactStatus, ArtifactType, MetadataError, NewArtifact, RuntimeConfig,
};
pub use result_cache::{CacheStats, EntryPoint, ResultCache};
pub use stats::{LatencyStats, PerformanceTracker, SAMPLE_WINDOW};
pub use versions::{IntegrityError, StorageInfo, VersionManager, METADATA_FILE, REGISTRY_FILE};
pub use worker::{BlockingPool, PoolError};
