//! Validate-config command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{ConfigValidator, ConvertConfig, ValidateConfigArgs};

/// Format a run configuration as a summary string
pub fn format_config_summary(config: &ConvertConfig) -> String {
    let roles: Vec<String> = config.output.roles.iter().map(ToString::to_string).collect();
    let mut lines = vec![
        format!("  Checkpoint: {}", config.source.checkpoint_dir.display()),
        format!("  Model size: {}", config.source.model_size),
        format!("  Save dir: {}", config.save_dir().display()),
        format!("  Roles: {}", roles.join(", ")),
        format!("  Hash names: {}", config.output.hash_names),
    ];
    if config.check.enabled {
        lines.push(format!(
            "  Equivalence check: batch {}, seq {}, seed {}, rtol {:e}, atol {:e}",
            config.check.batch_size,
            config.check.seq_length,
            config.check.seed,
            config.check.rtol,
            config.check.atol
        ));
    }
    lines.join("\n")
}

pub fn run_validate_config(args: ValidateConfigArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Validating config: {}", args.config.display()),
    );

    let config = ConvertConfig::from_file(&args.config).map_err(|e| format!("Config error: {e}"))?;
    ConfigValidator::validate(&config).map_err(|e| format!("Validation failed: {e}"))?;

    log(level, LogLevel::Normal, "Configuration is valid");
    log(level, LogLevel::Verbose, &format_config_summary(&config));
    Ok(())
}
