//! Map command implementation

use crate::checkpoint::Checkpoint;
use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::MapArgs;
use crate::mapping::{build_name_map, MapTarget, NameMap, RuleSet};

/// Render a name map as aligned `source -> target` lines.
pub fn format_name_map(map: &NameMap) -> String {
    let width = map.iter().map(|(source, _)| source.len()).max().unwrap_or(0);
    map.iter()
        .map(|(source, target)| {
            let target = match target {
                MapTarget::Param(name) => name.clone(),
                MapTarget::Fused => "(fused into attn_qkv)".to_string(),
                MapTarget::Tied => "(shared with disc)".to_string(),
            };
            format!("{source:<width$}  -> {target}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn run_map(args: MapArgs, level: LogLevel) -> Result<(), String> {
    let checkpoint =
        Checkpoint::open(&args.checkpoint_dir, args.model_size).map_err(|e| e.to_string())?;
    let map = build_name_map(&checkpoint.names(), args.role, &RuleSet::electra());

    if args.json {
        let json = serde_json::to_string_pretty(&map)
            .map_err(|e| format!("Failed to encode map: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    log(
        level,
        LogLevel::Normal,
        &format!("Name map for role {} ({} entries):", args.role, map.len()),
    );
    println!("{}", format_name_map(&map));
    Ok(())
}
