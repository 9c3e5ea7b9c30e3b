//! In-memory load/unload state machine over the [`VersionManager`].
//!
//! An artifact key (`type:name:version`) is unloaded until [`LifecycleManager::load`]
//! succeeds. Loading verifies the artifact file against its recorded size
//! and hash, marks the stored status LOADING, builds the runtime config and
//! settles back to AVAILABLE. Integrity or config failure marks it ERROR
//! and never creates an in-memory entry.
//!
//! Each key has its own async mutex: loads of different keys proceed in
//! parallel, concurrent loads of one key are serialized and later callers
//! observe the first caller's result. A key's mutex is dropped from the
//! table once no caller holds it.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex as KeyLock, RwLock};
use tracing::{debug, error, info, warn};

use crate::analysis::{
    fallback, AnalyzerError, InsightReport, ParsedTask, PrioritizationResult, TaskAnalyzer,
};
use crate::telemetry::{self, ProcessingSpan, SpanExt};

use super::metadata::{
    model_key, parse_model_key, ArtifactMetadata, ArtifactStatus, ArtifactType, RuntimeConfig,
};
use super::result_cache::{CacheStats, EntryPoint, ResultCache};
use super::stats::{LatencyStats, PerformanceTracker};
use super::versions::{IntegrityError, VersionManager};
use super::worker::{BlockingPool, PoolError};

/// Version label used for samples when the default artifact could not be loaded.
pub const UNRESOLVED_VERSION: &str = "latest";

#[derive(Error, Debug)]
enum LoadError {
    #[error("Artifact metadata not found: {0}")]
    NotFound(String),

    #[error("Integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Runtime configuration unavailable for {0}")]
    ConfigUnavailable(String),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// The artifact an entry point serves by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultArtifact {
    pub name: String,
    /// `None` resolves to the latest registered version on each request.
    pub version: Option<String>,
}

impl Default for DefaultArtifact {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            version: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Result-cache capacity per entry point. Zero disables caching.
    pub cache_size: usize,
    /// Blocking worker permits. Zero uses the CPU count.
    pub worker_threads: usize,
    pub parser: DefaultArtifact,
    pub prioritizer: DefaultArtifact,
    pub insights: DefaultArtifact,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            cache_size: 100,
            worker_threads: 2,
            parser: DefaultArtifact::default(),
            prioritizer: DefaultArtifact::default(),
            insights: DefaultArtifact::default(),
        }
    }
}

impl LifecycleSettings {
    pub fn default_for(&self, model_type: ArtifactType) -> &DefaultArtifact {
        match model_type {
            ArtifactType::Parser => &self.parser,
            ArtifactType::Prioritizer => &self.prioritizer,
            ArtifactType::Insights => &self.insights,
        }
    }
}

/// A loaded artifact: its record, its runtime config, and when it loaded.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub metadata: ArtifactMetadata,
    pub config: RuntimeConfig,
    pub loaded_at: DateTime<Utc>,
}

/// Listing row for [`LifecycleManager::list_loaded`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedSummary {
    pub model_type: ArtifactType,
    pub name: String,
    pub version: String,
    pub loaded_at: DateTime<Utc>,
    pub memory_usage_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub count: usize,
    pub total_mb: u64,
    pub avg_mb: f64,
}

/// Result-cache statistics per entry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheReport {
    pub parsing: CacheStats,
    pub prioritization: CacheStats,
    pub insights: CacheStats,
}

struct ServingArtifact<'a> {
    entry_point: EntryPoint,
    model_type: ArtifactType,
    name: &'a str,
    version: String,
}

pub struct LifecycleManager {
    versions: Arc<VersionManager>,
    analyzer: Arc<dyn TaskAnalyzer>,
    settings: LifecycleSettings,
    loaded: RwLock<HashMap<String, LoadedArtifact>>,
    load_locks: DashMap<String, Arc<KeyLock<()>>>,
    stats: PerformanceTracker,
    parsing_cache: Mutex<ResultCache>,
    prioritization_cache: Mutex<ResultCache>,
    insights_cache: Mutex<ResultCache>,
    pool: BlockingPool,
}

impl LifecycleManager {
    pub fn new(
        versions: Arc<VersionManager>,
        analyzer: Arc<dyn TaskAnalyzer>,
        settings: LifecycleSettings,
    ) -> Self {
        let cache_size = settings.cache_size;
        let pool = BlockingPool::new(settings.worker_threads);
        Self {
            versions,
            analyzer,
            settings,
            loaded: RwLock::new(HashMap::new()),
            load_locks: DashMap::new(),
            stats: PerformanceTracker::new(),
            parsing_cache: Mutex::new(ResultCache::new(cache_size)),
            prioritization_cache: Mutex::new(ResultCache::new(cache_size)),
            insights_cache: Mutex::new(ResultCache::new(cache_size)),
            pool,
        }
    }

    pub fn versions(&self) -> &Arc<VersionManager> {
        &self.versions
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Load an artifact, resolving the latest version when `version` is None.
    /// Idempotent: an already-loaded key returns true without touching disk.
    pub async fn load(&self, model_type: ArtifactType, name: &str, version: Option<&str>) -> bool {
        if self.pool.is_closed() {
            warn!(model_type = %model_type, name, "load rejected after shutdown");
            return false;
        }

        let version = match version {
            Some(v) => v.to_string(),
            None => match self.versions.latest_version(model_type, name) {
                Some(v) => v,
                None => {
                    error!(model_type = %model_type, name, "no versions registered");
                    telemetry::record_load(model_type, "error");
                    return false;
                }
            },
        };
        let key = model_key(model_type, name, &version);

        if self.loaded.read().await.contains_key(&key) {
            debug!(model_key = %key, "artifact already loaded");
            return true;
        }

        // Cloned while the shard is held, so the prune below never races a new waiter.
        let lock = self
            .load_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeyLock::new(())))
            .clone();
        let loaded = {
            let _guard = lock.lock().await;
            self.load_exclusive(model_type, name, &version, &key).await
        };

        drop(lock);
        self.load_locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        loaded
    }

    /// Second half of [`load`](Self::load), run while holding the key's mutex.
    async fn load_exclusive(
        &self,
        model_type: ArtifactType,
        name: &str,
        version: &str,
        key: &str,
    ) -> bool {
        if self.loaded.read().await.contains_key(key) {
            debug!(model_key = %key, "artifact loaded by a concurrent caller");
            return true;
        }

        match self.load_locked(model_type, name, version).await {
            Ok(artifact) => {
                let memory_mb = artifact.metadata.memory_requirement_mb;
                let active = {
                    let mut loaded = self.loaded.write().await;
                    loaded.insert(key.to_string(), artifact);
                    loaded.len()
                };
                let memory_bytes = memory_mb.saturating_mul(1024 * 1024);
                telemetry::record_model_memory(model_type, version, memory_bytes);
                telemetry::record_active_models(active);
                telemetry::record_load(model_type, "success");
                info!(model_key = %key, memory_mb, "loaded artifact");
                true
            }
            Err(e) => {
                telemetry::record_load(model_type, "error");
                error!(model_key = %key, error = %e, "failed to load artifact");
                false
            }
        }
    }

    async fn load_locked(
        &self,
        model_type: ArtifactType,
        name: &str,
        version: &str,
    ) -> Result<LoadedArtifact, LoadError> {
        let key = model_key(model_type, name, version);
        let metadata = self
            .versions
            .get_metadata(model_type, name, version)
            .ok_or_else(|| LoadError::NotFound(key.clone()))?;

        let versions = Arc::clone(&self.versions);
        let (owned_name, owned_version) = (name.to_string(), version.to_string());
        let integrity = self
            .pool
            .run(move || versions.validate_integrity(model_type, &owned_name, &owned_version))
            .await?;
        if let Err(e) = integrity {
            self.versions
                .update_status(model_type, name, version, ArtifactStatus::Error);
            return Err(e.into());
        }

        self.versions
            .update_status(model_type, name, version, ArtifactStatus::Loading);

        let Some(config) = self.versions.get_config(model_type, name, version) else {
            self.versions
                .update_status(model_type, name, version, ArtifactStatus::Error);
            return Err(LoadError::ConfigUnavailable(key));
        };

        self.versions
            .update_status(model_type, name, version, ArtifactStatus::Available);
        let metadata = self
            .versions
            .get_metadata(model_type, name, version)
            .unwrap_or(metadata);

        Ok(LoadedArtifact {
            metadata,
            config,
            loaded_at: Utc::now(),
        })
    }

    /// Drop the in-memory entry and its latency samples.
    pub async fn unload(&self, model_type: ArtifactType, name: &str, version: &str) -> bool {
        let key = model_key(model_type, name, version);
        let (removed, active) = {
            let mut loaded = self.loaded.write().await;
            let removed = loaded.remove(&key);
            (removed, loaded.len())
        };

        if removed.is_none() {
            warn!(model_key = %key, "artifact not loaded");
            return false;
        }

        self.stats.remove(&key);
        telemetry::record_model_memory(model_type, version, 0);
        telemetry::record_active_models(active);
        info!(model_key = %key, "unloaded artifact");
        true
    }

    pub async fn is_loaded(&self, model_type: ArtifactType, name: &str, version: &str) -> bool {
        self.loaded
            .read()
            .await
            .contains_key(&model_key(model_type, name, version))
    }

    pub async fn get_loaded(
        &self,
        model_type: ArtifactType,
        name: &str,
        version: &str,
    ) -> Option<LoadedArtifact> {
        self.loaded
            .read()
            .await
            .get(&model_key(model_type, name, version))
            .cloned()
    }

    /// Loaded artifacts ordered by key.
    pub async fn list_loaded(&self) -> Vec<LoadedSummary> {
        let loaded = self.loaded.read().await;
        let ordered: BTreeMap<&String, &LoadedArtifact> = loaded.iter().collect();
        ordered
            .into_values()
            .map(|artifact| LoadedSummary {
                model_type: artifact.metadata.model_type,
                name: artifact.metadata.name.clone(),
                version: artifact.metadata.version.clone(),
                loaded_at: artifact.loaded_at,
                memory_usage_mb: artifact.metadata.memory_requirement_mb,
            })
            .collect()
    }

    pub async fn process_parsing(&self, text: &str) -> ParsedTask {
        let input = Value::String(text.to_string());
        self.process(
            EntryPoint::Parsing,
            &input,
            |analyzer| analyzer.parse_task(text),
            |_| fallback::parsed_task(text),
        )
        .await
    }

    pub async fn process_prioritization(&self, tasks: &[Value]) -> PrioritizationResult {
        let input = Value::Array(tasks.to_vec());
        self.process(
            EntryPoint::Prioritization,
            &input,
            |analyzer| analyzer.prioritize_tasks(tasks),
            |_| fallback::prioritization(tasks),
        )
        .await
    }

    pub async fn process_insights(&self, history: &[Value]) -> InsightReport {
        let input = Value::Array(history.to_vec());
        self.process(
            EntryPoint::Insights,
            &input,
            |analyzer| analyzer.generate_insights(history),
            fallback::insight_report,
        )
        .await
    }

    async fn process<T, R, F>(&self, entry_point: EntryPoint, input: &Value, run: R, fallback: F) -> T
    where
        T: Serialize + DeserializeOwned,
        R: FnOnce(&dyn TaskAnalyzer) -> Result<T, AnalyzerError>,
        F: FnOnce(&AnalyzerError) -> T,
    {
        let model_type = entry_point.artifact_type();
        let target = self.settings.default_for(model_type);
        let version = self.resolve_serving_version(model_type, target).await;

        let serving = ServingArtifact {
            entry_point,
            model_type,
            name: &target.name,
            version,
        };
        self.execute(&serving, input, run, fallback)
    }

    /// Configured or latest version if it loads, otherwise [`UNRESOLVED_VERSION`].
    async fn resolve_serving_version(&self, model_type: ArtifactType, target: &DefaultArtifact) -> String {
        let version = target
            .version
            .clone()
            .or_else(|| self.versions.latest_version(model_type, &target.name));

        if let Some(version) = version {
            if self.load(model_type, &target.name, Some(&version)).await {
                return version;
            }
        }
        debug!(model_type = %model_type, name = %target.name, "default artifact unavailable");
        UNRESOLVED_VERSION.to_string()
    }

    fn execute<T, R, F>(&self, serving: &ServingArtifact<'_>, input: &Value, run: R, fallback: F) -> T
    where
        T: Serialize + DeserializeOwned,
        R: FnOnce(&dyn TaskAnalyzer) -> Result<T, AnalyzerError>,
        F: FnOnce(&AnalyzerError) -> T,
    {
        let entry_point = serving.entry_point;
        let key = model_key(serving.model_type, serving.name, &serving.version);
        let span = ProcessingSpan::new(entry_point.as_str(), &key);
        let _enter = span.enter();

        let cache_key = ResultCache::key(entry_point, input, serving.name, &serving.version);
        let cached = self.cache_for(entry_point).lock().get(&cache_key);
        if let Some(value) = cached {
            match serde_json::from_value::<T>(value) {
                Ok(result) => {
                    span.record("cached", true);
                    span.record("status", "ok");
                    debug!(model_key = %key, entry_point = entry_point.as_str(), "served from cache");
                    return result;
                }
                Err(e) => warn!(model_key = %key, error = %e, "discarding undecodable cached result"),
            }
        }

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(&*self.analyzer)))
            .unwrap_or_else(|payload| {
                Err(AnalyzerError::Failed(format!(
                    "analyzer panicked: {}",
                    panic_message(&*payload)
                )))
            });
        let elapsed = start.elapsed();
        let latency_ms = elapsed.as_secs_f64() * 1000.0;
        span.record("cached", false);
        span.record_result(&outcome);
        span.record_latency_ms(latency_ms);

        match outcome {
            Ok(result) => {
                self.stats.record(&key, latency_ms);
                telemetry::record_inference(serving.model_type, &serving.version, "success", elapsed);
                match serde_json::to_value(&result) {
                    Ok(value) => self.cache_for(entry_point).lock().put(cache_key, value),
                    Err(e) => warn!(model_key = %key, error = %e, "result not cacheable"),
                }
                info!(model_key = %key, entry_point = entry_point.as_str(), latency_ms, "processing completed");
                result
            }
            Err(e) => {
                telemetry::record_inference(serving.model_type, &serving.version, "error", elapsed);
                error!(model_key = %key, entry_point = entry_point.as_str(), error = %e, "analysis failed, returning fallback");
                fallback(&e)
            }
        }
    }

    fn cache_for(&self, entry_point: EntryPoint) -> &Mutex<ResultCache> {
        match entry_point {
            EntryPoint::Parsing => &self.parsing_cache,
            EntryPoint::Prioritization => &self.prioritization_cache,
            EntryPoint::Insights => &self.insights_cache,
        }
    }

    /// Latency summary per key, from the rolling sample windows.
    pub fn performance_stats(&self) -> BTreeMap<String, LatencyStats> {
        self.stats.snapshot()
    }

    /// Unload every artifact loaded more than `max_age_days` ago. An age
    /// reaching past the earliest representable time unloads nothing.
    pub async fn cleanup_stale(&self, max_age_days: u32) -> usize {
        let max_age = chrono::Duration::days(i64::from(max_age_days));
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            debug!(max_age_days, "max age exceeds the calendar range, nothing is stale");
            return 0;
        };
        self.cleanup_loaded_before(cutoff).await
    }

    /// Unload every artifact whose `loaded_at` is earlier than `cutoff`.
    pub async fn cleanup_loaded_before(&self, cutoff: DateTime<Utc>) -> usize {
        let stale: Vec<String> = self
            .loaded
            .read()
            .await
            .iter()
            .filter(|(_, artifact)| artifact.loaded_at < cutoff)
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in stale {
            if let Some((model_type, name, version)) = parse_model_key(&key) {
                if self.unload(model_type, &name, &version).await {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            info!(removed, "cleaned up stale artifacts");
        }
        removed
    }

    pub async fn memory_usage(&self) -> MemoryUsage {
        let loaded = self.loaded.read().await;
        let count = loaded.len();
        let total_mb = loaded
            .values()
            .map(|artifact| artifact.metadata.memory_requirement_mb)
            .fold(0u64, u64::saturating_add);
        MemoryUsage {
            count,
            total_mb,
            avg_mb: if count == 0 {
                0.0
            } else {
                total_mb as f64 / count as f64
            },
        }
    }

    pub fn cache_stats(&self) -> CacheReport {
        CacheReport {
            parsing: self.parsing_cache.lock().stats(),
            prioritization: self.prioritization_cache.lock().stats(),
            insights: self.insights_cache.lock().stats(),
        }
    }

    pub fn clear_caches(&self) {
        self.parsing_cache.lock().clear();
        self.prioritization_cache.lock().clear();
        self.insights_cache.lock().clear();
        info!("cleared result caches");
    }

    /// Unload everything and close the worker pool. Later loads return false.
    pub async fn shutdown(&self) {
        info!("shutting down lifecycle manager");
        self.pool.close();

        let keys: Vec<String> = self.loaded.read().await.keys().cloned().collect();
        for key in keys {
            if let Some((model_type, name, version)) = parse_model_key(&key) {
                self.unload(model_type, &name, &version).await;
            }
        }
        self.clear_caches();
        info!("lifecycle manager shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool.is_closed()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewArtifact;

    struct FallbackAnalyzer;

    impl TaskAnalyzer for FallbackAnalyzer {
        fn parse_task(&self, text: &str) -> Result<ParsedTask, AnalyzerError> {
            Ok(fallback::parsed_task(text))
        }

        fn prioritize_tasks(&self, tasks: &[Value]) -> Result<PrioritizationResult, AnalyzerError> {
            Ok(fallback::prioritization(tasks))
        }

        fn generate_insights(&self, _history: &[Value]) -> Result<InsightReport, AnalyzerError> {
            Err(AnalyzerError::Failed("unused".to_string()))
        }
    }

    fn lifecycle(dir: &std::path::Path) -> LifecycleManager {
        let versions = Arc::new(VersionManager::new(dir.join("models")).unwrap());
        LifecycleManager::new(versions, Arc::new(FallbackAnalyzer), LifecycleSettings::default())
    }

    #[tokio::test]
    async fn test_failed_loads_leave_no_key_locks() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = lifecycle(dir.path());

        for i in 0..64 {
            let version = format!("missing-{}", i);
            assert!(!lifecycle.load(ArtifactType::Parser, "default", Some(&version)).await);
        }
        assert!(lifecycle.load_locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_key_locks_pruned_after_concurrent_loads() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = Arc::new(lifecycle(dir.path()));
        let file = dir.path().join("weights.bin");
        std::fs::write(&file, b"weights").unwrap();
        assert!(lifecycle
            .versions()
            .register_from_file(NewArtifact::new(ArtifactType::Insights, "default", "v1", file)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                tokio::spawn(async move {
                    lifecycle
                        .load(ArtifactType::Insights, "default", Some("v1"))
                        .await
                })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            assert!(result.unwrap());
        }

        assert!(lifecycle.is_loaded(ArtifactType::Insights, "default", "v1").await);
        assert!(lifecycle.load_locks.is_empty());
    }
}
