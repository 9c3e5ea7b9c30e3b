//! task-ai-cli entry point.
//!
//! Registry and model-document maintenance without a running service.
//!
//! ## CLI Subcommands
//!
//! - `task-ai-cli models ...` - Inspect and edit the artifact registry
//! - `task-ai-cli config ...` - Inspect, validate and apply the model document

use std::process::ExitCode;

use task_ai_core::cli::{config_cmd, models_cmd, EXIT_USAGE};
use task_ai_core::config as task_config;
use task_ai_core::telemetry::init_logging;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let rest = args.get(3..).unwrap_or(&[]);

    let env = task_config::load();
    if let Err(e) = init_logging(&env.log) {
        eprintln!("Logging disabled: {}", e);
    }

    let code = match command {
        "models" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("list");
            let code = models_cmd::run(subcommand, rest, &env);
            if code == EXIT_USAGE {
                print_command_help("models");
            }
            code
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            let code = config_cmd::run(subcommand, rest, &env);
            if code == EXIT_USAGE && subcommand != "validate" {
                print_command_help("config");
            }
            code
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            0
        }
        "version" | "--version" | "-V" => {
            println!("task-ai-cli {}", env!("CARGO_PKG_VERSION"));
            0
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            EXIT_USAGE
        }
    };

    ExitCode::from(code as u8)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "task-ai-cli - Task AI artifact registry tool v{}

USAGE:
    task-ai-cli <COMMAND> [SUBCOMMAND] [ARGS]

COMMANDS:
    models       Inspect and edit the artifact registry
    config       Inspect, validate and apply the model document
    version      Show version information
    help         Show this help message

EXAMPLES:
    task-ai-cli models list
    task-ai-cli models verify task_parser default v1
    task-ai-cli config validate
    task-ai-cli config init

ENVIRONMENT:
    TASK_AI_MODELS_PATH    Registry root (default: ./models)
    TASK_AI_MODEL_CONFIG   Model document (default: ./config/models.json)
    TASK_AI_LOG_LEVEL      Log filter (default: info)
    TASK_AI_LOG_FORMAT     json or pretty (default: json)

EXIT CODES:
    0  Success
    1  Failure
    2  Usage or configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "models" => {
            eprintln!(
                "task-ai-cli models - Manage registered artifacts

USAGE:
    task-ai-cli models <SUBCOMMAND> [ARGS]

SUBCOMMANDS:
    list [TYPE]                                  List registered artifacts
    versions <TYPE> <NAME>                       List versions, latest first
    show <TYPE> <NAME> <VERSION>                 Print stored metadata
    register <TYPE> <NAME> <VERSION> <FILE>      Hash and register a file
        [--memory MB] [--source SOURCE]
    status <TYPE> <NAME> <VERSION> <STATUS>      Set available|loading|error|deprecated
    delete <TYPE> <NAME> <VERSION>               Remove a version and its directory
    verify <TYPE> <NAME> <VERSION>               Check file size and hash
    storage                                      Summarize disk usage

TYPES:
    task_parser, prioritizer, insights

NOTE:
    Versions sort lexicographically: v2 is newer than v10. Use zero-padded
    or date-based version strings.
"
            );
        }
        "config" => {
            eprintln!(
                "task-ai-cli config - Manage configuration

USAGE:
    task-ai-cli config <SUBCOMMAND> [ARGS]

SUBCOMMANDS:
    show           Show effective TASK_AI_* settings
    list [TYPE]    List artifacts declared in the model document
    validate       Check the model document structure
    init           Register every declared mock artifact
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'task-ai-cli help' for general usage.",
                command
            );
        }
    }
}
