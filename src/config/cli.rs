//! CLI types - Cli, Command, and per-command argument structs

use super::run::ConvertConfig;
use super::source::ModelSize;
use crate::error::Result;
use crate::mapping::ConversionRole;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// convertir: ELECTRA checkpoint conversion
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "convertir")]
#[command(version)]
#[command(
    about = "Convert TF-style ELECTRA checkpoints into module-style parameter files"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Convert a checkpoint and write config, vocabulary and parameter files
    Convert(ConvertArgs),

    /// Print the source-to-target name map of one role
    Map(MapArgs),

    /// Validate a run configuration file without converting
    ValidateConfig(ValidateConfigArgs),
}

/// Arguments for the convert command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ConvertArgs {
    /// Checkpoint directory (required unless --config provides it)
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Size tier of the source model (small, base, large)
    #[arg(long)]
    pub model_size: Option<ModelSize>,

    /// JSON architecture file replacing the built-in presets
    #[arg(long)]
    pub electra_config: Option<PathBuf>,

    /// Output directory [default: <checkpoint dir name>_converted]
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// Accelerator index for forward passes
    #[arg(long)]
    pub gpu: Option<usize>,

    /// Verify source and target forward passes agree before writing
    #[arg(long)]
    pub test: bool,

    /// Roles to convert (backbone, disc, gen)
    #[arg(long, value_delimiter = ',')]
    pub roles: Option<Vec<ConversionRole>>,

    /// Seed for the equivalence check input
    #[arg(long)]
    pub seed: Option<u64>,

    /// YAML run configuration; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Keep plain output names instead of `<stem>-<hash8>.<ext>`
    #[arg(long)]
    pub no_hash_names: bool,
}

impl ConvertArgs {
    /// Merge the optional config file with flag overrides.
    pub fn to_config(&self) -> Result<ConvertConfig> {
        let mut config = match &self.config {
            Some(path) => ConvertConfig::from_file(path)?,
            None => ConvertConfig::minimal(
                self.checkpoint_dir.clone().unwrap_or_default(),
                self.model_size.unwrap_or_default(),
            ),
        };

        if let Some(dir) = &self.checkpoint_dir {
            config.source.checkpoint_dir = dir.clone();
        }
        if let Some(size) = self.model_size {
            config.source.model_size = size;
        }
        if let Some(path) = &self.electra_config {
            config.source.electra_config = Some(path.clone());
        }
        if let Some(dir) = &self.save_dir {
            config.output.save_dir = Some(dir.clone());
        }
        if let Some(roles) = &self.roles {
            config.output.roles = roles.clone();
        }
        if self.no_hash_names {
            config.output.hash_names = false;
        }
        if self.test {
            config.check.enabled = true;
        }
        if let Some(seed) = self.seed {
            config.check.seed = seed;
        }
        if self.gpu.is_some() {
            config.device.gpu = self.gpu;
        }
        Ok(config)
    }
}

/// Arguments for the map command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct MapArgs {
    /// Checkpoint directory
    #[arg(long)]
    pub checkpoint_dir: PathBuf,

    /// Size tier of the source model
    #[arg(long, default_value = "small")]
    pub model_size: ModelSize,

    /// Role whose view of the checkpoint is mapped
    #[arg(long, default_value = "backbone")]
    pub role: ConversionRole,

    /// Print JSON instead of aligned text
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the validate-config command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateConfigArgs {
    /// Path to YAML run configuration file
    pub config: PathBuf,
}
