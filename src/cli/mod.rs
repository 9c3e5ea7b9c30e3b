// Copyright 2024-2026 Task AI Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for registry and configuration commands.
//!
//! Operates directly on the registry directory and the declarative model
//! document named by the `TASK_AI_*` environment. No running service is
//! required.
//!
//! ## Usage
//!
//! ```bash
//! task-ai-cli models list              # All registered artifacts
//! task-ai-cli models verify task_parser default v1
//! task-ai-cli config validate          # Check the model document
//! task-ai-cli config init              # Reconcile declared artifacts
//! ```

pub mod config_cmd;
pub mod models_cmd;

use std::str::FromStr;

use crate::config::EnvConfig;
use crate::models::VersionManager;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Open the registry at `env.models_path`, or report and return the exit code.
pub fn open_registry(env: &EnvConfig) -> Result<VersionManager, i32> {
    VersionManager::new(env.models_path.clone()).map_err(|e| {
        eprintln!("Error opening registry at {}: {}", env.models_path.display(), e);
        EXIT_FAILURE
    })
}

/// Positional argument `index`, or a usage error naming `what`.
pub(crate) fn positional<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str, i32> {
    args.get(index).map(String::as_str).ok_or_else(|| {
        eprintln!("Missing argument: <{}>", what);
        EXIT_USAGE
    })
}

/// Parse a positional argument with `FromStr`, reporting failures as usage errors.
pub(crate) fn parse_arg<T>(args: &[String], index: usize, what: &str) -> Result<T, i32>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    positional(args, index, what)?.parse::<T>().map_err(|e| {
        eprintln!("Invalid <{}>: {}", what, e);
        EXIT_USAGE
    })
}

/// Value following `flag`, if present.
pub(crate) fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
