//! End-to-end conversion run.
//!
//! Everything is converted and validated in memory first; files are written
//! only once every requested role is complete and, when enabled, the
//! equivalence check has passed.

use super::equivalence::{check_equivalence, EquivalenceReport, EquivalenceSettings};
use super::materialize::materialize;
use super::merge::merge_fused_projections;
use super::naming::{rename_with_hash, HashedFile};
use super::persist::{save_parameters, write_text};
use super::validate::CompletenessValidator;
use crate::checkpoint::{locate_vocab, Checkpoint, Vocab};
use crate::config::{translate, ConfigValidator, ConvertConfig, SourceConfig, TargetConfig};
use crate::error::{ConvertError, Result};
use crate::mapping::{build_name_map, ConversionRole, RuleSet, BACKBONE_PREFIX};
use crate::model::{ElectraDiscriminator, ElectraGenerator, ElectraModel, TargetModel};
use crate::source::ArchitectureProvider;
use serde::Serialize;
use std::path::PathBuf;

/// Target config file name before hashing.
pub const CONFIG_FILE: &str = "model.yml";

/// Target vocabulary file name before hashing.
pub const VOCAB_FILE: &str = "vocab.json";

/// What converting one role did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSummary {
    pub role: ConversionRole,
    /// Tensors copied by name
    pub copied: usize,
    /// Query/key/value source tensors fused
    pub fused: usize,
    /// Source tensors shared with the discriminator instead of copied
    pub tied: usize,
    /// Target parameter names, shared ones counted per name
    pub parameters: usize,
}

/// Fill one role's model from the checkpoint and prove it complete.
pub fn convert_role(
    role: ConversionRole,
    names: &[String],
    rules: &RuleSet,
    checkpoint: &Checkpoint,
    model: &dyn TargetModel,
) -> Result<RoleSummary> {
    let map = build_name_map(names, role, rules);
    let params = model.named_parameters();
    let prefix = model.backbone_prefix();
    let validator = CompletenessValidator::new(role, prefix)?;

    let copied = materialize(&map, checkpoint, &params)?;
    validator.check_pending(&params, &copied.touched)?;

    let merged = merge_fused_projections(role, checkpoint, &params, model.num_layers(), prefix)?;
    let filled = copied.touched.union(&merged.filled).cloned().collect();
    validator.check_complete(&params, &filled)?;
    validator.check_sources(&map, &merged.consumed)?;
    validator.check_tied_sources(&map, rules, checkpoint, &params)?;

    let summary = RoleSummary {
        role,
        copied: copied.consumed.len(),
        fused: merged.consumed.len(),
        tied: map.tied().count(),
        parameters: params.len(),
    };
    tracing::info!(
        %role,
        copied = summary.copied,
        fused = summary.fused,
        tied = summary.tied,
        parameters = summary.parameters,
        "role converted"
    );
    Ok(summary)
}

/// Converted, validated models held in memory.
#[derive(Debug)]
pub struct ConvertedModels {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub vocab: Vocab,
    pub backbone: Option<ElectraModel>,
    pub discriminator: Option<ElectraDiscriminator>,
    pub generator: Option<ElectraGenerator>,
    pub summaries: Vec<RoleSummary>,
    pub equivalence: Option<EquivalenceReport>,
}

impl ConvertedModels {
    /// The model converted for `role`, if it was requested.
    #[must_use]
    pub fn model(&self, role: ConversionRole) -> Option<&dyn TargetModel> {
        match role {
            ConversionRole::Backbone => self.backbone.as_ref().map(|m| m as &dyn TargetModel),
            ConversionRole::Discriminator => {
                self.discriminator.as_ref().map(|m| m as &dyn TargetModel)
            }
            ConversionRole::Generator => self.generator.as_ref().map(|m| m as &dyn TargetModel),
        }
    }
}

/// Files produced by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionOutcome {
    pub save_dir: PathBuf,
    pub summaries: Vec<RoleSummary>,
    /// Final paths, after renaming when enabled
    pub files: Vec<PathBuf>,
    /// Hash records, empty when renaming is disabled
    pub hashed: Vec<HashedFile>,
}

/// Read, convert, validate and optionally check equivalence, without writing.
pub fn convert_checkpoint(
    config: &ConvertConfig,
    provider: &dyn ArchitectureProvider,
) -> Result<ConvertedModels> {
    ConfigValidator::validate(config)?;
    if let Some(gpu) = config.device.gpu {
        tracing::warn!(gpu, "accelerator execution is not available, running on CPU");
    }

    let size = config.source.model_size;
    let dir = &config.source.checkpoint_dir;
    let checkpoint = Checkpoint::open(dir, size)?;
    let vocab = Vocab::from_file(locate_vocab(dir)?)?;
    let source = provider.architecture(size)?;
    let target = translate(&source, vocab.len())?;
    tracing::info!(
        checkpoint = %checkpoint.path().display(),
        variables = checkpoint.len(),
        vocab_size = vocab.len(),
        %size,
        "checkpoint loaded"
    );

    let backbone = if config.converts(ConversionRole::Backbone) {
        Some(ElectraModel::new(&target)?)
    } else {
        None
    };
    let discriminator = if config.converts(ConversionRole::Discriminator) {
        Some(ElectraDiscriminator::new(&target)?)
    } else {
        None
    };
    let generator = if config.converts(ConversionRole::Generator) {
        let disc = discriminator.as_ref().ok_or_else(|| ConvertError::ConfigValue {
            field: "output.roles".into(),
            message: "The generator shares its embeddings with the discriminator".into(),
            suggestion: "Add disc to the roles when converting gen".into(),
        })?;
        let mut gen = ElectraGenerator::new(&target.generator())?;
        gen.tie_embeddings(disc.backbone())?;
        Some(gen)
    } else {
        None
    };

    let names = checkpoint.names();
    let rules = RuleSet::electra();
    let mut converted = ConvertedModels {
        source,
        target,
        vocab,
        backbone,
        discriminator,
        generator,
        summaries: Vec::new(),
        equivalence: None,
    };

    for role in ConversionRole::ALL {
        if let Some(model) = converted.model(role) {
            let summary = convert_role(role, &names, &rules, &checkpoint, model)?;
            converted.summaries.push(summary);
        }
    }

    if let (Some(gen), Some(disc)) = (&converted.generator, &converted.discriminator) {
        CompletenessValidator::new(ConversionRole::Generator, BACKBONE_PREFIX)?
            .check_ties(&gen.named_parameters(), &disc.named_parameters())?;
    }

    if config.check.enabled {
        let model = converted
            .backbone
            .as_ref()
            .or_else(|| converted.discriminator.as_ref().map(ElectraDiscriminator::backbone));
        if let Some(model) = model {
            let settings = EquivalenceSettings::from(&config.check);
            let report = check_equivalence(&checkpoint, &converted.source, model, &settings)?;
            converted.equivalence = Some(report);
        }
    }

    Ok(converted)
}

/// Write config, vocabulary and parameter files into the save directory.
pub fn persist_outputs(
    converted: &ConvertedModels,
    config: &ConvertConfig,
) -> Result<ConversionOutcome> {
    let save_dir = config.save_dir();
    std::fs::create_dir_all(&save_dir)
        .map_err(|e| ConvertError::io(format!("creating {}", save_dir.display()), e))?;

    let mut written = Vec::new();
    let config_path = save_dir.join(CONFIG_FILE);
    write_text(&config_path, &converted.target.to_yaml()?)?;
    written.push(config_path);

    let vocab_path = save_dir.join(VOCAB_FILE);
    write_text(&vocab_path, &converted.vocab.to_json()?)?;
    written.push(vocab_path);

    for role in ConversionRole::ALL {
        if let Some(model) = converted.model(role) {
            let path = save_dir.join(format!("{}.safetensors", role.params_stem()));
            let count = save_parameters(&path, &model.named_parameters(), role)?;
            tracing::debug!(%role, tensors = count, path = %path.display(), "saved parameters");
            written.push(path);
        }
    }

    let mut files = Vec::with_capacity(written.len());
    let mut hashed = Vec::new();
    if config.output.hash_names {
        for path in written {
            let record = rename_with_hash(&path)?;
            files.push(record.path.clone());
            hashed.push(record);
        }
    } else {
        for path in &written {
            tracing::info!(path = %path.display(), "wrote");
        }
        files = written;
    }

    Ok(ConversionOutcome {
        save_dir,
        summaries: converted.summaries.clone(),
        files,
        hashed,
    })
}

/// Convert a checkpoint and write every output.
pub fn run_conversion(
    config: &ConvertConfig,
    provider: &dyn ArchitectureProvider,
) -> Result<ConversionOutcome> {
    let converted = convert_checkpoint(config, provider)?;
    persist_outputs(&converted, config)
}
