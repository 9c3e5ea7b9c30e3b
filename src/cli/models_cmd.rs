// Copyright 2024-2026 Task AI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Models CLI subcommands: list, versions, show, register, status, delete,
//! verify, storage.
//!
//! Each command opens the registry directly and returns a process exit code.

use std::path::PathBuf;

use crate::cli::{flag_value, open_registry, parse_arg, positional, truncate};
use crate::cli::{EXIT_FAILURE, EXIT_OK, EXIT_USAGE};
use crate::config::EnvConfig;
use crate::models::{ArtifactMetadata, ArtifactStatus, ArtifactType, NewArtifact, VersionManager};

/// Dispatch `models <subcommand> [args...]`.
pub fn run(subcommand: &str, args: &[String], env: &EnvConfig) -> i32 {
    let registry = match open_registry(env) {
        Ok(registry) => registry,
        Err(code) => return code,
    };
    match dispatch(&registry, subcommand, args) {
        Ok(code) | Err(code) => code,
    }
}

fn dispatch(registry: &VersionManager, subcommand: &str, args: &[String]) -> Result<i32, i32> {
    let code = match subcommand {
        "list" => {
            let model_type = match args.first() {
                Some(_) => Some(parse_arg::<ArtifactType>(args, 0, "type")?),
                None => None,
            };
            run_list(registry, model_type)
        }
        "versions" => run_versions(
            registry,
            parse_arg(args, 0, "type")?,
            positional(args, 1, "name")?,
        ),
        "show" => run_show(
            registry,
            parse_arg(args, 0, "type")?,
            positional(args, 1, "name")?,
            positional(args, 2, "version")?,
        ),
        "register" => {
            let mut request = NewArtifact::new(
                parse_arg(args, 0, "type")?,
                positional(args, 1, "name")?,
                positional(args, 2, "version")?,
                PathBuf::from(positional(args, 3, "file")?),
            );
            if let Some(memory) = flag_value(args, "--memory") {
                let memory_mb = memory.parse::<u64>().map_err(|e| {
                    eprintln!("Invalid --memory: {}", e);
                    EXIT_USAGE
                })?;
                request = request.memory_mb(memory_mb);
            }
            if let Some(source) = flag_value(args, "--source") {
                request = request.source(source);
            }
            run_register(registry, request)
        }
        "status" => run_status(
            registry,
            parse_arg(args, 0, "type")?,
            positional(args, 1, "name")?,
            positional(args, 2, "version")?,
            parse_arg(args, 3, "status")?,
        ),
        "delete" => run_delete(
            registry,
            parse_arg(args, 0, "type")?,
            positional(args, 1, "name")?,
            positional(args, 2, "version")?,
        ),
        "verify" => run_verify(
            registry,
            parse_arg(args, 0, "type")?,
            positional(args, 1, "name")?,
            positional(args, 2, "version")?,
        ),
        "storage" => run_storage(registry),
        other => {
            eprintln!("Unknown models subcommand: {}", other);
            EXIT_USAGE
        }
    };
    Ok(code)
}

pub fn run_list(registry: &VersionManager, model_type: Option<ArtifactType>) -> i32 {
    print_artifacts(&registry.list_artifacts(model_type));
    EXIT_OK
}

/// Format and print artifacts to stdout.
pub fn print_artifacts(artifacts: &[ArtifactMetadata]) {
    if artifacts.is_empty() {
        println!("No artifacts registered.");
        return;
    }

    println!(
        "{:<12} {:<24} {:<14} {:<11} {:>12} {:>10}",
        "TYPE", "NAME", "VERSION", "STATUS", "MEMORY (MB)", "SOURCE"
    );
    println!("{}", "-".repeat(88));

    for a in artifacts {
        println!(
            "{:<12} {:<24} {:<14} {:<11} {:>12} {:>10}",
            a.model_type.as_str(),
            truncate(&a.name, 23),
            truncate(&a.version, 13),
            a.status.as_str(),
            a.memory_requirement_mb,
            truncate(&a.source, 10),
        );
    }

    println!("{}", "-".repeat(88));
    println!("{} artifact(s)", artifacts.len());
}

pub fn run_versions(registry: &VersionManager, model_type: ArtifactType, name: &str) -> i32 {
    let versions = registry.list_versions(model_type, name);
    if versions.is_empty() {
        eprintln!("No versions registered for {}/{}", model_type, name);
        return EXIT_FAILURE;
    }
    for (i, version) in versions.iter().enumerate() {
        if i == 0 {
            println!("{}  (latest)", version);
        } else {
            println!("{}", version);
        }
    }
    EXIT_OK
}

pub fn run_show(registry: &VersionManager, model_type: ArtifactType, name: &str, version: &str) -> i32 {
    let Some(metadata) = registry.get_metadata(model_type, name, version) else {
        eprintln!("Artifact not found: {}/{}:{}", model_type, name, version);
        return EXIT_FAILURE;
    };
    match serde_json::to_string_pretty(&metadata) {
        Ok(json) => {
            println!("{}", json);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error formatting metadata: {}", e);
            EXIT_FAILURE
        }
    }
}

pub fn run_register(registry: &VersionManager, request: NewArtifact) -> i32 {
    let label = format!("{}/{}:{}", request.model_type, request.name, request.version);
    if registry.register_from_file(request) {
        println!("Registered {}", label);
        EXIT_OK
    } else {
        eprintln!("Failed to register {}; see logs for the cause", label);
        EXIT_FAILURE
    }
}

pub fn run_status(
    registry: &VersionManager,
    model_type: ArtifactType,
    name: &str,
    version: &str,
    status: ArtifactStatus,
) -> i32 {
    if registry.update_status(model_type, name, version, status) {
        println!("{}/{}:{} is now {}", model_type, name, version, status);
        EXIT_OK
    } else {
        eprintln!("Failed to update status of {}/{}:{}", model_type, name, version);
        EXIT_FAILURE
    }
}

pub fn run_delete(registry: &VersionManager, model_type: ArtifactType, name: &str, version: &str) -> i32 {
    if registry.delete_version(model_type, name, version) {
        println!("Deleted {}/{}:{}", model_type, name, version);
        EXIT_OK
    } else {
        eprintln!("Artifact not found: {}/{}:{}", model_type, name, version);
        EXIT_FAILURE
    }
}

pub fn run_verify(registry: &VersionManager, model_type: ArtifactType, name: &str, version: &str) -> i32 {
    match registry.validate_integrity(model_type, name, version) {
        Ok(()) => {
            println!("{}/{}:{}: integrity validated", model_type, name, version);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("{}/{}:{}: {}", model_type, name, version, e);
            EXIT_FAILURE
        }
    }
}

pub fn run_storage(registry: &VersionManager) -> i32 {
    let info = registry.storage_info();
    println!("Base path:       {}", info.base_path.display());
    println!("Artifacts:       {}", info.total_artifacts);
    println!("Total size:      {} bytes ({:.2} MB)", info.total_size_bytes, info.total_size_mb);
    EXIT_OK
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn registry_with_artifact() -> (tempfile::TempDir, VersionManager, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let registry = VersionManager::new(dir.path().join("models")).unwrap();
        let file = dir.path().join("parser.bin");
        std::fs::write(&file, b"parser weights").unwrap();
        (dir, registry, file)
    }

    #[test]
    fn test_register_then_show_verify_delete() {
        let (_dir, registry, file) = registry_with_artifact();
        let register = args(&[
            "task_parser",
            "default",
            "v1",
            file.to_str().unwrap(),
            "--memory",
            "256",
        ]);
        assert_eq!(dispatch(&registry, "register", &register), Ok(EXIT_OK));

        let metadata = registry
            .get_metadata(ArtifactType::Parser, "default", "v1")
            .unwrap();
        assert_eq!(metadata.memory_requirement_mb, 256);

        let id = args(&["task_parser", "default", "v1"]);
        assert_eq!(dispatch(&registry, "show", &id), Ok(EXIT_OK));
        assert_eq!(dispatch(&registry, "verify", &id), Ok(EXIT_OK));
        assert_eq!(dispatch(&registry, "delete", &id), Ok(EXIT_OK));
        assert_eq!(dispatch(&registry, "show", &id), Ok(EXIT_FAILURE));
    }

    #[test]
    fn test_verify_detects_modified_file() {
        let (_dir, registry, file) = registry_with_artifact();
        assert!(registry.register_from_file(NewArtifact::new(
            ArtifactType::Insights,
            "default",
            "v1",
            file.clone(),
        )));
        std::fs::write(&file, b"parser weightz").unwrap();
        assert_eq!(
            run_verify(&registry, ArtifactType::Insights, "default", "v1"),
            EXIT_FAILURE
        );
    }

    #[test]
    fn test_usage_errors() {
        let (_dir, registry, _file) = registry_with_artifact();
        assert_eq!(dispatch(&registry, "show", &args(&["task_parser"])), Err(EXIT_USAGE));
        assert_eq!(dispatch(&registry, "list", &args(&["widgets"])), Err(EXIT_USAGE));
        assert_eq!(
            dispatch(&registry, "status", &args(&["task_parser", "default", "v1", "retired"])),
            Err(EXIT_USAGE)
        );
        assert_eq!(dispatch(&registry, "frobnicate", &[]), Ok(EXIT_USAGE));
    }

    #[test]
    fn test_versions_and_storage() {
        let (_dir, registry, file) = registry_with_artifact();
        for version in ["v1", "v2"] {
            assert!(registry.register_from_file(NewArtifact::new(
                ArtifactType::Prioritizer,
                "default",
                version,
                file.clone(),
            )));
        }
        assert_eq!(run_versions(&registry, ArtifactType::Prioritizer, "default"), EXIT_OK);
        assert_eq!(run_versions(&registry, ArtifactType::Prioritizer, "missing"), EXIT_FAILURE);
        assert_eq!(run_storage(&registry), EXIT_OK);
        assert_eq!(run_list(&registry, None), EXIT_OK);
    }

    #[test]
    fn test_print_artifacts_empty() {
        // Smoke-test: must not panic.
        print_artifacts(&[]);
    }
}
