//! Service configuration loading from environment variables.
//!
//! All configuration values are loaded from `TASK_AI_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TASK_AI_MODELS_PATH` | `./models` | Registry root directory |
//! | `TASK_AI_MODEL_CONFIG` | `./config/models.json` | Declarative model document |
//! | `TASK_AI_CACHE_SIZE` | 100 | Result-cache entries per entry point (0 disables) |
//! | `TASK_AI_WORKER_THREADS` | 2 | Blocking worker permits (0 = CPU count) |
//! | `TASK_AI_MODEL_MAX_AGE_DAYS` | 30 | Stale-load sweep cutoff (days) |
//! | `TASK_AI_AUTO_CLEANUP` | true | Run the stale sweep at bootstrap |
//! | `TASK_AI_PARSER_MODEL` | `default` | Parser artifact name |
//! | `TASK_AI_PARSER_VERSION` | latest | Parser artifact version |
//! | `TASK_AI_PRIORITIZER_MODEL` | `default` | Prioritizer artifact name |
//! | `TASK_AI_PRIORITIZER_VERSION` | latest | Prioritizer artifact version |
//! | `TASK_AI_INSIGHTS_MODEL` | `default` | Insights artifact name |
//! | `TASK_AI_INSIGHTS_VERSION` | latest | Insights artifact version |
//! | `TASK_AI_LOG_FORMAT` | `json` | `json` or `pretty` |
//! | `TASK_AI_LOG_LEVEL` | `info` | Log filter directive |

use std::path::PathBuf;

use serde::Serialize;

use crate::models::{DefaultArtifact, LifecycleSettings};
use crate::telemetry::{LogConfig, LogFormat};

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub models_path: PathBuf,
    pub model_config_path: PathBuf,
    pub cache_size: usize,
    pub worker_threads: usize,
    pub model_max_age_days: u32,
    pub auto_cleanup: bool,
    pub parser_model: String,
    pub parser_version: Option<String>,
    pub prioritizer_model: String,
    pub prioritizer_version: Option<String>,
    pub insights_model: String,
    pub insights_version: Option<String>,
    pub log_format: String,
    pub log_level: String,
}

/// All service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub models_path: PathBuf,
    pub model_config_path: PathBuf,
    pub lifecycle: LifecycleSettings,
    pub model_max_age_days: u32,
    pub auto_cleanup: bool,
    pub log: LogConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            models_path: PathBuf::from("./models"),
            model_config_path: PathBuf::from("./config/models.json"),
            lifecycle: LifecycleSettings::default(),
            model_max_age_days: 30,
            auto_cleanup: true,
            log: LogConfig::default(),
        }
    }
}

fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Roughly a century; longer ages would reach past the calendar range.
const MAX_MODEL_AGE_DAYS: u32 = 36_500;

fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Accepts true/false, 1/0, yes/no, on/off. Anything else yields `default`.
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Non-empty trimmed value, if set.
fn parse_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(parse_string(key).unwrap_or_else(|| default.to_string()))
}

fn load_default_artifact(model_key: &str, version_key: &str) -> DefaultArtifact {
    DefaultArtifact {
        name: parse_string(model_key).unwrap_or_else(|| "default".to_string()),
        version: parse_string(version_key),
    }
}

fn load_lifecycle_settings() -> LifecycleSettings {
    LifecycleSettings {
        cache_size: parse_usize("TASK_AI_CACHE_SIZE", 100),
        worker_threads: parse_usize("TASK_AI_WORKER_THREADS", 2),
        parser: load_default_artifact("TASK_AI_PARSER_MODEL", "TASK_AI_PARSER_VERSION"),
        prioritizer: load_default_artifact(
            "TASK_AI_PRIORITIZER_MODEL",
            "TASK_AI_PRIORITIZER_VERSION",
        ),
        insights: load_default_artifact("TASK_AI_INSIGHTS_MODEL", "TASK_AI_INSIGHTS_VERSION"),
    }
}

fn load_log_config() -> LogConfig {
    let format = parse_string("TASK_AI_LOG_FORMAT")
        .and_then(|f| f.parse::<LogFormat>().ok())
        .unwrap_or_default();
    let level = parse_string("TASK_AI_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
    LogConfig {
        format,
        level,
        output_path: None,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let max_age_days = parse_u32("TASK_AI_MODEL_MAX_AGE_DAYS", 30).clamp(1, MAX_MODEL_AGE_DAYS);

    EnvConfig {
        models_path: parse_path("TASK_AI_MODELS_PATH", "./models"),
        model_config_path: parse_path("TASK_AI_MODEL_CONFIG", "./config/models.json"),
        lifecycle: load_lifecycle_settings(),
        model_max_age_days: max_age_days,
        auto_cleanup: parse_bool("TASK_AI_AUTO_CLEANUP", true),
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let lifecycle = &self.lifecycle;
        EffectiveConfig {
            models_path: self.models_path.clone(),
            model_config_path: self.model_config_path.clone(),
            cache_size: lifecycle.cache_size,
            worker_threads: lifecycle.worker_threads,
            model_max_age_days: self.model_max_age_days,
            auto_cleanup: self.auto_cleanup,
            parser_model: lifecycle.parser.name.clone(),
            parser_version: lifecycle.parser.version.clone(),
            prioritizer_model: lifecycle.prioritizer.name.clone(),
            prioritizer_version: lifecycle.prioritizer.version.clone(),
            insights_model: lifecycle.insights.name.clone(),
            insights_version: lifecycle.insights.version.clone(),
            log_format: match self.log.format {
                LogFormat::Json => "json".to_string(),
                LogFormat::Pretty => "pretty".to_string(),
            },
            log_level: self.log.level.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "TASK_AI_MODELS_PATH",
        "TASK_AI_MODEL_CONFIG",
        "TASK_AI_CACHE_SIZE",
        "TASK_AI_WORKER_THREADS",
        "TASK_AI_MODEL_MAX_AGE_DAYS",
        "TASK_AI_AUTO_CLEANUP",
        "TASK_AI_PARSER_MODEL",
        "TASK_AI_PARSER_VERSION",
        "TASK_AI_PRIORITIZER_MODEL",
        "TASK_AI_PRIORITIZER_VERSION",
        "TASK_AI_INSIGHTS_MODEL",
        "TASK_AI_INSIGHTS_VERSION",
        "TASK_AI_LOG_FORMAT",
        "TASK_AI_LOG_LEVEL",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.models_path, PathBuf::from("./models"));
        assert_eq!(cfg.model_config_path, PathBuf::from("./config/models.json"));
        assert_eq!(cfg.lifecycle.cache_size, 100);
        assert_eq!(cfg.lifecycle.worker_threads, 2);
        assert_eq!(cfg.model_max_age_days, 30);
        assert!(cfg.auto_cleanup);
        assert_eq!(cfg.lifecycle.parser, DefaultArtifact::default());
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TASK_AI_MODELS_PATH", "/srv/models");
        std::env::set_var("TASK_AI_CACHE_SIZE", "0");
        std::env::set_var("TASK_AI_AUTO_CLEANUP", "off");
        std::env::set_var("TASK_AI_PARSER_MODEL", "fast");
        std::env::set_var("TASK_AI_PARSER_VERSION", "v3");
        std::env::set_var("TASK_AI_LOG_FORMAT", "pretty");
        let cfg = load();
        assert_eq!(cfg.models_path, PathBuf::from("/srv/models"));
        assert_eq!(cfg.lifecycle.cache_size, 0);
        assert!(!cfg.auto_cleanup);
        assert_eq!(cfg.lifecycle.parser.name, "fast");
        assert_eq!(cfg.lifecycle.parser.version.as_deref(), Some("v3"));
        assert_eq!(cfg.lifecycle.insights.version, None);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TASK_AI_CACHE_SIZE", "lots");
        std::env::set_var("TASK_AI_AUTO_CLEANUP", "maybe");
        std::env::set_var("TASK_AI_LOG_FORMAT", "xml");
        std::env::set_var("TASK_AI_PARSER_VERSION", "   ");
        let cfg = load();
        assert_eq!(cfg.lifecycle.cache_size, 100);
        assert!(cfg.auto_cleanup);
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.lifecycle.parser.version, None);
        clear_env_vars();
    }

    #[test]
    fn test_max_age_has_floor() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TASK_AI_MODEL_MAX_AGE_DAYS", "0");
        let cfg = load();
        assert_eq!(cfg.model_max_age_days, 1);
        clear_env_vars();
    }

    #[test]
    fn test_max_age_has_ceiling() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TASK_AI_MODEL_MAX_AGE_DAYS", "4294967295");
        let cfg = load();
        assert_eq!(cfg.model_max_age_days, MAX_MODEL_AGE_DAYS);
        clear_env_vars();
    }

    #[test]
    fn test_effective_config_reflects_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TASK_AI_INSIGHTS_VERSION", "2024-06-01");
        let eff = load().effective_config();
        assert_eq!(eff.insights_version.as_deref(), Some("2024-06-01"));
        assert_eq!(eff.log_format, "json");
        assert_eq!(eff.parser_model, "default");

        let json = serde_json::to_value(&eff).unwrap();
        assert_eq!(json["cache_size"], 100);
        clear_env_vars();
    }
}
