// Copyright 2024-2026 Task AI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, list, validate, init.
//!
//! `show` reads only the environment. The others read the declarative model
//! document at `TASK_AI_MODEL_CONFIG`.

use crate::cli::{open_registry, parse_arg, EXIT_FAILURE, EXIT_OK, EXIT_USAGE};
use crate::config::{EffectiveConfig, EnvConfig};
use crate::models::{ArtifactType, ConfigLoader, VersionManager};

/// Dispatch `config <subcommand> [args...]`.
pub fn run(subcommand: &str, args: &[String], env: &EnvConfig) -> i32 {
    match subcommand {
        "show" => {
            run_show(env);
            EXIT_OK
        }
        "list" => {
            let model_type = match args.first() {
                Some(_) => match parse_arg::<ArtifactType>(args, 0, "type") {
                    Ok(t) => Some(t),
                    Err(code) => return code,
                },
                None => None,
            };
            run_list(&ConfigLoader::new(env.model_config_path.clone()), model_type)
        }
        "validate" => run_validate(&ConfigLoader::new(env.model_config_path.clone())),
        "init" => match open_registry(env) {
            Ok(registry) => run_init(&registry, &ConfigLoader::new(env.model_config_path.clone())),
            Err(code) => code,
        },
        other => {
            eprintln!("Unknown config subcommand: {}", other);
            EXIT_USAGE
        }
    }
}

/// Print effective config as key-value pairs to stdout.
pub fn run_show(env: &EnvConfig) {
    print_config(&env.effective_config());
}

fn print_config(cfg: &EffectiveConfig) {
    println!("TASK_AI_MODELS_PATH={}", cfg.models_path.display());
    println!("TASK_AI_MODEL_CONFIG={}", cfg.model_config_path.display());
    println!("TASK_AI_CACHE_SIZE={}", cfg.cache_size);
    println!("TASK_AI_WORKER_THREADS={}", cfg.worker_threads);
    println!("TASK_AI_MODEL_MAX_AGE_DAYS={}", cfg.model_max_age_days);
    println!("TASK_AI_AUTO_CLEANUP={}", cfg.auto_cleanup);
    println!("TASK_AI_PARSER_MODEL={}", cfg.parser_model);
    println!("TASK_AI_PARSER_VERSION={}", version_or_latest(&cfg.parser_version));
    println!("TASK_AI_PRIORITIZER_MODEL={}", cfg.prioritizer_model);
    println!("TASK_AI_PRIORITIZER_VERSION={}", version_or_latest(&cfg.prioritizer_version));
    println!("TASK_AI_INSIGHTS_MODEL={}", cfg.insights_model);
    println!("TASK_AI_INSIGHTS_VERSION={}", version_or_latest(&cfg.insights_version));
    println!("TASK_AI_LOG_FORMAT={}", cfg.log_format);
    println!("TASK_AI_LOG_LEVEL={}", cfg.log_level);
}

fn version_or_latest(version: &Option<String>) -> &str {
    version.as_deref().unwrap_or("latest")
}

/// Print declared artifacts as JSON.
pub fn run_list(loader: &ConfigLoader, model_type: Option<ArtifactType>) -> i32 {
    match serde_json::to_string_pretty(&loader.list_available(model_type)) {
        Ok(json) => {
            println!("{}", json);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error formatting model list: {}", e);
            EXIT_FAILURE
        }
    }
}

/// Validate the model document.
///
/// Returns 0 if valid, 1 on structural problems, 2 if the document could
/// not be read at all.
pub fn run_validate(loader: &ConfigLoader) -> i32 {
    if !loader.reload() {
        eprintln!(
            "ERROR: could not read {}; the built-in default document is in effect",
            loader.path().display()
        );
        return EXIT_USAGE;
    }

    let errors = loader.validate();
    if errors.is_empty() {
        println!("Configuration is valid.");
        EXIT_OK
    } else {
        for error in &errors {
            eprintln!("ERROR: {}", error);
        }
        eprintln!("{} problem(s) found", errors.len());
        EXIT_FAILURE
    }
}

/// Reconcile declared artifacts into the registry.
///
/// Returns 0 when every declared version is registered, 1 otherwise.
pub fn run_init(registry: &VersionManager, loader: &ConfigLoader) -> i32 {
    let results = loader.reconcile(registry);
    if results.is_empty() {
        println!("No artifacts declared.");
        return EXIT_OK;
    }

    for (key, ok) in &results {
        println!("{:<48} {}", key, if *ok { "ok" } else { "not reconciled" });
    }
    if results.values().all(|ok| *ok) {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}
