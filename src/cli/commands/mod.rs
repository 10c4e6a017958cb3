//! CLI command implementations

mod convert;
mod map;
mod validate;


use crate::cli::logging::init_tracing;
use crate::cli::LogLevel;
use crate::config::{Cli, Command};

/// Execute a CLI command based on the parsed arguments
pub fn run_command(cli: Cli) -> Result<(), String> {
    // Configure output based on verbose/quiet flags
    let log_level = LogLevel::from_flags(cli.verbose, cli.quiet);
    init_tracing(log_level);

    match cli.command {
        Command::Convert(args) => convert::run_convert(args, log_level),
        Command::Map(args) => map::run_map(args, log_level),
        Command::ValidateConfig(args) => validate::run_validate_config(args, log_level),
    }
}
