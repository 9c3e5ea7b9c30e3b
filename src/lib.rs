//! Task AI core
//!
//! Versioned artifact registry and lifecycle manager behind the task
//! analysis service. Artifacts stand in for models: a file plus metadata,
//! verified by size and SHA-256 before it is loaded.
//!
//! # Components
//!
//! - **Version Manager**: durable per-type registry under `<models_root>/<type>/`
//! - **Config Loader**: declarative document reconciled into the registry
//! - **Lifecycle Manager**: in-memory load/unload table, result caching and
//!   latency bookkeeping in front of the external analyzers
//!
//! Components are constructed explicitly by [`Service::new`] and shared by
//! `Arc`; there is no process-global state.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod models;
pub mod telemetry;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use analysis::TaskAnalyzer;
use config::EnvConfig;
use models::{ConfigLoader, LifecycleManager, LifecycleSettings, RegistryError, VersionManager};

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub models_path: PathBuf,
    pub model_config_path: PathBuf,
    pub lifecycle: LifecycleSettings,
    pub model_max_age_days: u32,
    pub auto_cleanup: bool,
}

impl ServiceConfig {
    pub fn new(models_path: impl Into<PathBuf>, model_config_path: impl Into<PathBuf>) -> Self {
        Self {
            models_path: models_path.into(),
            model_config_path: model_config_path.into(),
            lifecycle: LifecycleSettings::default(),
            model_max_age_days: 30,
            auto_cleanup: true,
        }
    }
}

impl From<&EnvConfig> for ServiceConfig {
    fn from(env: &EnvConfig) -> Self {
        Self {
            models_path: env.models_path.clone(),
            model_config_path: env.model_config_path.clone(),
            lifecycle: env.lifecycle.clone(),
            model_max_age_days: env.model_max_age_days,
            auto_cleanup: env.auto_cleanup,
        }
    }
}

/// Outcome of [`Service::bootstrap`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct BootstrapReport {
    pub reconciled: BTreeMap<String, bool>,
    pub validation_errors: Vec<String>,
    pub cleaned_up: usize,
}

/// The task AI core instance.
pub struct Service {
    config: ServiceConfig,
    pub versions: Arc<VersionManager>,
    pub config_loader: Arc<ConfigLoader>,
    pub lifecycle: Arc<LifecycleManager>,
}

impl Service {
    /// Open the registry and load the declarative document.
    pub fn new(config: ServiceConfig, analyzer: Arc<dyn TaskAnalyzer>) -> Result<Self, RegistryError> {
        let versions = Arc::new(VersionManager::new(config.models_path.clone())?);
        let config_loader = Arc::new(ConfigLoader::new(config.model_config_path.clone()));
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&versions),
            analyzer,
            config.lifecycle.clone(),
        ));

        Ok(Self {
            config,
            versions,
            config_loader,
            lifecycle,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Reconcile declared artifacts and, if enabled, sweep stale loads.
    pub async fn bootstrap(&self) -> BootstrapReport {
        let validation_errors = self.config_loader.validate();
        for error in &validation_errors {
            warn!(error = %error, "model configuration problem");
        }

        let reconciled = self.config_loader.reconcile(&self.versions);
        let ok = reconciled.values().filter(|ok| **ok).count();
        info!(reconciled = ok, declared = reconciled.len(), "reconciled declared artifacts");

        let cleaned_up = if self.config.auto_cleanup {
            self.lifecycle
                .cleanup_stale(self.config.model_max_age_days)
                .await
        } else {
            0
        };

        BootstrapReport {
            reconciled,
            validation_errors,
            cleaned_up,
        }
    }

    pub async fn shutdown(&self) {
        self.lifecycle.shutdown().await;
    }
}
