//! Convert command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::ConvertArgs;
use crate::convert::{run_conversion, ConversionOutcome};
use crate::source::{ArchitectureProvider, ElectraPresets, JsonArchitecture};

pub fn run_convert(args: ConvertArgs, level: LogLevel) -> Result<(), String> {
    let config = args.to_config().map_err(|e| e.to_string())?;

    log(
        level,
        LogLevel::Normal,
        &format!(
            "Converting {} ({})",
            config.source.checkpoint_dir.display(),
            config.source.model_size
        ),
    );

    let provider: Box<dyn ArchitectureProvider> = match &config.source.electra_config {
        Some(path) => Box::new(JsonArchitecture::new(path)),
        None => Box::new(ElectraPresets),
    };

    let outcome = run_conversion(&config, provider.as_ref())
        .map_err(|e| format!("[{}] {e}", e.code()))?;
    log_outcome(level, &outcome);
    Ok(())
}

fn log_outcome(level: LogLevel, outcome: &ConversionOutcome) {
    for summary in &outcome.summaries {
        log(
            level,
            LogLevel::Verbose,
            &format!(
                "  {}: {} copied, {} fused, {} tied, {} parameters",
                summary.role, summary.copied, summary.fused, summary.tied, summary.parameters
            ),
        );
    }
    log(
        level,
        LogLevel::Normal,
        &format!("Wrote {} files to {}", outcome.files.len(), outcome.save_dir.display()),
    );
    for file in &outcome.files {
        log(level, LogLevel::Normal, &format!("  {}", file.display()));
    }
}
