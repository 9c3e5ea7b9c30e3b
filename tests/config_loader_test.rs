//! Tests for ConfigLoader - declarative document parsing, validation and
//! reconciliation into a registry.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use task_ai_core::models::{
    default_document, model_key, ArtifactType, ConfigLoader, VersionManager, MOCK_ARTIFACT_FILE,
};

fn write_document(dir: &Path, doc: &Value) -> PathBuf {
    let path = dir.join("models.json");
    std::fs::write(&path, serde_json::to_string_pretty(doc).unwrap()).unwrap();
    path
}

fn full_document() -> Value {
    json!({
        "model_definitions": {
            "task_parser": {
                "default": {
                    "versions": {
                        "v1": {
                            "source": "mock",
                            "memory_requirement_mb": 128,
                            "config": { "max_length": 256, "temperature": 0.2 }
                        }
                    },
                    "default_version": "v1"
                }
            },
            "prioritizer": {
                "default": {
                    "versions": {
                        "v1": { "source": "mock", "memory_requirement_mb": 64 },
                        "v2": { "source": "huggingface", "memory_requirement_mb": 512, "source_id": "acme/prio" }
                    },
                    "default_version": "v1"
                }
            }
        },
        "global_config": { "temperature": 0.9, "timeout_seconds": 10, "batch_size": 4 }
    })
}

#[test]
fn test_missing_file_installs_default_document() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ConfigLoader::new(dir.path().join("absent.json"));

    assert!(!loader.load());
    assert_eq!(loader.document(), default_document());
    assert_eq!(loader.global_config()["cache_size"], 100);
}

#[test]
fn test_malformed_file_installs_default_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models.json");
    std::fs::write(&path, "{ \"model_definitions\": ").unwrap();

    let loader = ConfigLoader::new(path);
    assert!(!loader.reload());
    assert_eq!(loader.document(), default_document());
}

#[test]
fn test_reload_picks_up_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models.json");
    let loader = ConfigLoader::new(path.clone());
    assert!(loader.get_definition(ArtifactType::Prioritizer, "default").is_none());

    write_document(dir.path(), &full_document());
    assert!(loader.reload());
    assert_eq!(
        loader.get_default_version(ArtifactType::Prioritizer, "default").as_deref(),
        Some("v1")
    );
    let v2 = loader
        .get_version_definition(ArtifactType::Prioritizer, "default", "v2")
        .unwrap();
    assert_eq!(v2.source_id.as_deref(), Some("acme/prio"));
}

#[test]
fn test_validate_missing_definitions_section() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_document(dir.path(), &json!({ "global_config": {} }));
    let loader = ConfigLoader::new(path);
    assert_eq!(loader.validate(), vec!["Missing 'model_definitions' section".to_string()]);
}

#[test]
fn test_validate_collects_every_problem() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_document(
        dir.path(),
        &json!({
            "model_definitions": {
                "widgets": {},
                "task_parser": {
                    "default": {
                        "versions": { "v1": { "source": "mock", "memory_requirement_mb": 128 } },
                        "default_version": "v7"
                    },
                    "bare": { "default_version": "v1" },
                    "partial": {
                        "versions": { "v1": {} }
                    }
                }
            }
        }),
    );
    let errors = ConfigLoader::new(path).validate();

    assert!(errors.contains(&"Invalid model type: widgets".to_string()));
    assert!(errors
        .iter()
        .any(|e| e.contains("v7") && e.contains("task_parser/default")));
    assert!(errors.contains(&"Missing versions for task_parser/bare".to_string()));
    assert!(errors.contains(&"Missing default_version for task_parser/partial".to_string()));
    assert!(errors.contains(&"Missing source for task_parser/partial:v1".to_string()));
    assert!(errors.contains(&"Missing memory_requirement_mb for task_parser/partial:v1".to_string()));
    assert_eq!(errors.len(), 6);
}

#[test]
fn test_list_available_covers_every_type() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ConfigLoader::new(write_document(dir.path(), &full_document()));

    let all = loader.list_available(None);
    assert_eq!(all.len(), 3);
    assert!(all[&ArtifactType::Insights].is_empty());

    let prioritizers = &all[&ArtifactType::Prioritizer];
    assert_eq!(prioritizers.len(), 1);
    assert_eq!(prioritizers[0].name, "default");
    assert_eq!(prioritizers[0].versions, vec!["v1", "v2"]);
    assert_eq!(prioritizers[0].default_version.as_deref(), Some("v1"));

    let parsers_only = loader.list_available(Some(ArtifactType::Parser));
    assert_eq!(parsers_only.len(), 1);
    assert_eq!(parsers_only[&ArtifactType::Parser][0].versions, vec!["v1"]);
}

#[test]
fn test_build_config_layers_global_then_version() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ConfigLoader::new(write_document(dir.path(), &full_document()));

    let config = loader
        .build_config(ArtifactType::Parser, "default", "v1")
        .unwrap();
    assert_eq!(config.model_type, ArtifactType::Parser);
    assert_eq!(config.name, "default");
    assert_eq!(config.version, "v1");
    assert_eq!(config.temperature, 0.2);
    assert_eq!(config.max_length, 256);
    assert_eq!(config.timeout_seconds, 10);
    assert_eq!(config.batch_size, 4);

    let config = loader
        .build_config(ArtifactType::Prioritizer, "default", "v1")
        .unwrap();
    assert_eq!(config.temperature, 0.9);

    assert!(loader
        .build_config(ArtifactType::Prioritizer, "default", "v9")
        .is_none());
}

#[test]
fn test_reconcile_registers_mocks_and_skips_provisioned() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ConfigLoader::new(write_document(dir.path(), &full_document()));
    let registry = VersionManager::new(dir.path().join("models")).unwrap();

    let results = loader.reconcile(&registry);
    assert_eq!(results.len(), 3);
    assert_eq!(results[&model_key(ArtifactType::Parser, "default", "v1")], true);
    assert_eq!(results[&model_key(ArtifactType::Prioritizer, "default", "v1")], true);
    assert_eq!(results[&model_key(ArtifactType::Prioritizer, "default", "v2")], false);

    let parser = registry
        .get_metadata(ArtifactType::Parser, "default", "v1")
        .unwrap();
    assert_eq!(parser.source, "mock");
    assert_eq!(parser.memory_requirement_mb, 128);
    assert_eq!(parser.description.as_deref(), Some("Mock task_parser model"));
    assert_eq!(parser.config["max_length"], 256);

    let runtime = registry
        .get_config(ArtifactType::Parser, "default", "v1")
        .unwrap();
    assert_eq!(runtime.max_length, 256);
}

#[test]
fn test_reconcile_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ConfigLoader::new(write_document(dir.path(), &full_document()));
    let registry = VersionManager::new(dir.path().join("models")).unwrap();

    let first = loader.reconcile(&registry);
    let before = registry
        .get_metadata(ArtifactType::Parser, "default", "v1")
        .unwrap();

    let second = loader.reconcile(&registry);
    let after = registry
        .get_metadata(ArtifactType::Parser, "default", "v1")
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(before.created_at, after.created_at);
    assert_eq!(before.file_hash, after.file_hash);
}

#[test]
fn test_mock_placeholder_contents() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ConfigLoader::new(dir.path().join("absent.json"));
    let registry = VersionManager::new(dir.path().join("models")).unwrap();

    let results = loader.reconcile(&registry);
    assert_eq!(
        results.into_iter().collect::<Vec<_>>(),
        vec![("task_parser:default:v1".to_string(), true)]
    );

    let placeholder_path = registry
        .artifact_dir(ArtifactType::Parser, "default", "v1")
        .join(MOCK_ARTIFACT_FILE);
    let placeholder: Value =
        serde_json::from_str(&std::fs::read_to_string(&placeholder_path).unwrap()).unwrap();
    assert_eq!(placeholder["type"], "mock_model");
    assert_eq!(placeholder["name"], "default");
    assert_eq!(placeholder["version"], "v1");
    assert_eq!(placeholder["model_type"], "task_parser");
    assert_eq!(placeholder["created_at"], "2024-01-01T00:00:00");

    let metadata = registry
        .get_metadata(ArtifactType::Parser, "default", "v1")
        .unwrap();
    assert_eq!(metadata.file_path, placeholder_path);
    assert!(registry
        .validate_integrity(ArtifactType::Parser, "default", "v1")
        .is_ok());
}

#[test]
fn test_reconcile_skips_unknown_types_and_bad_identities() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ConfigLoader::new(write_document(
        dir.path(),
        &json!({
            "model_definitions": {
                "widgets": {
                    "default": { "versions": { "v1": { "source": "mock" } }, "default_version": "v1" }
                },
                "insights": {
                    "..": { "versions": { "v1": { "source": "mock" } }, "default_version": "v1" }
                }
            }
        }),
    ));
    let registry = VersionManager::new(dir.path().join("models")).unwrap();

    let results = loader.reconcile(&registry);
    assert_eq!(results.len(), 1);
    assert_eq!(results.values().next(), Some(&false));
    assert!(registry.list_artifacts(None).is_empty());
}

#[test]
fn test_mistyped_sibling_does_not_hide_valid_definitions() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_document(
        dir.path(),
        &json!({
            "model_definitions": {
                "prioritizer": {
                    "good": {
                        "versions": { "v1": { "source": "mock", "memory_requirement_mb": 64 } },
                        "default_version": "v1"
                    },
                    "bad": {
                        "versions": {
                            "v1": { "source": "mock", "memory_requirement_mb": "lots" },
                            "v2": { "source": "mock", "memory_requirement_mb": 32 }
                        },
                        "default_version": "v2"
                    }
                }
            }
        }),
    );
    let loader = ConfigLoader::new(path);
    assert!(loader.reload());

    let errors = loader.validate();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Invalid version entry for prioritizer/bad:v1"));

    let registry = VersionManager::new(dir.path().join("models")).unwrap();
    let results = loader.reconcile(&registry);
    assert_eq!(results.len(), 3);
    assert_eq!(results.get("prioritizer:good:v1"), Some(&true));
    assert_eq!(results.get("prioritizer:bad:v1"), Some(&false));
    assert_eq!(results.get("prioritizer:bad:v2"), Some(&true));
    assert!(!results.contains_key("task_parser:default:v1"));
    assert!(registry
        .get_metadata(ArtifactType::Parser, "default", "v1")
        .is_none());

    assert!(loader
        .get_version_definition(ArtifactType::Prioritizer, "bad", "v1")
        .is_none());
    assert_eq!(
        loader.get_default_version(ArtifactType::Prioritizer, "bad").as_deref(),
        Some("v2")
    );
}

#[test]
fn test_validate_reports_mistyped_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_document(
        dir.path(),
        &json!({
            "model_definitions": {
                "task_parser": {
                    "listed": { "versions": ["v1"], "default_version": "v1" },
                    "numbered": {
                        "versions": { "v1": { "source": "mock", "memory_requirement_mb": 16 } },
                        "default_version": 1
                    },
                    "scalar": "mock"
                },
                "insights": []
            },
            "global_config": [1, 2]
        }),
    );
    let loader = ConfigLoader::new(path);
    let errors = loader.validate();

    assert!(errors.contains(&"Invalid 'global_config' section: expected an object".to_string()));
    assert!(errors.contains(&"Invalid definitions for insights: expected an object".to_string()));
    assert!(errors.contains(&"Invalid versions for task_parser/listed: expected an object".to_string()));
    assert!(errors.contains(&"Invalid default_version for task_parser/numbered: expected a string".to_string()));
    assert!(errors.contains(&"Invalid definition for task_parser/scalar: expected an object".to_string()));
    assert_eq!(errors.len(), 5);
    assert!(loader.global_config().is_empty());

    let registry = VersionManager::new(dir.path().join("models")).unwrap();
    let results = loader.reconcile(&registry);
    assert_eq!(results.len(), 1);
    assert_eq!(results.get("task_parser:numbered:v1"), Some(&true));
}
