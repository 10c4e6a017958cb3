//! Completeness checks: no target slot left unfilled, no source tensor dropped.

use crate::checkpoint::Checkpoint;
use crate::error::{ConvertError, Result};
use crate::mapping::{ConversionRole, NameMap, RuleSet, BACKBONE_PREFIX};
use crate::model::{ParamDict, MLM_OUTPUT_WEIGHT, TIED_EMBEDDING_PARAMS, LAYER_SCOPE};
use regex::Regex;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Tracks what a role's conversion still owes its target model.
#[derive(Debug, Clone)]
pub struct CompletenessValidator {
    role: ConversionRole,
    pending_pattern: Regex,
    exempt: BTreeSet<String>,
}

impl CompletenessValidator {
    /// Validator for a model whose backbone lives under `backbone_prefix`.
    pub fn new(role: ConversionRole, backbone_prefix: &str) -> Result<Self> {
        let pattern = format!(
            r"^{}{}\.\d+\.attn_qkv\.(weight|bias)$",
            regex::escape(backbone_prefix),
            regex::escape(LAYER_SCOPE)
        );
        let pending_pattern = Regex::new(&pattern).map_err(|e| ConvertError::InvalidInput {
            message: format!("building leftover pattern {pattern}: {e}"),
        })?;
        Ok(Self {
            role,
            pending_pattern,
            exempt: exempt_names(role),
        })
    }

    #[must_use]
    pub fn exempt(&self) -> &BTreeSet<String> {
        &self.exempt
    }

    /// Target names not in `filled` and not exempt.
    pub fn leftover<'a>(
        &self,
        params: &'a ParamDict,
        filled: &BTreeSet<String>,
    ) -> Vec<&'a str> {
        params
            .keys()
            .filter(|name| !filled.contains(*name) && !self.exempt.contains(*name))
            .map(String::as_str)
            .collect()
    }

    /// Before fusing: everything still unfilled must be an `attn_qkv` slot.
    pub fn check_pending(&self, params: &ParamDict, filled: &BTreeSet<String>) -> Result<()> {
        let unexpected: Vec<String> = self
            .leftover(params, filled)
            .into_iter()
            .filter(|name| !self.pending_pattern.is_match(name))
            .map(str::to_string)
            .collect();
        if unexpected.is_empty() {
            Ok(())
        } else {
            Err(ConvertError::IncompleteConversion {
                role: self.role,
                reason: format!(
                    "only fused attention projections may remain unfilled (pattern {})",
                    self.pending_pattern.as_str()
                ),
                names: unexpected,
            })
        }
    }

    /// After fusing: nothing may remain.
    pub fn check_complete(&self, params: &ParamDict, filled: &BTreeSet<String>) -> Result<()> {
        let leftover: Vec<String> = self
            .leftover(params, filled)
            .into_iter()
            .map(str::to_string)
            .collect();
        if leftover.is_empty() {
            Ok(())
        } else {
            Err(ConvertError::IncompleteConversion {
                role: self.role,
                reason: "target parameters were never filled".into(),
                names: leftover,
            })
        }
    }

    /// Every fused source must have been read by the merger.
    pub fn check_sources(&self, map: &NameMap, consumed: &BTreeSet<String>) -> Result<()> {
        let dropped: Vec<String> = map
            .fused()
            .filter(|name| !consumed.contains(*name))
            .map(str::to_string)
            .collect();
        if dropped.is_empty() {
            Ok(())
        } else {
            Err(ConvertError::IncompleteConversion {
                role: self.role,
                reason: "source tensors were dropped".into(),
                names: dropped,
            })
        }
    }

    /// Tied sources are not copied, so they must already equal the shared slot.
    ///
    /// The slot was filled from the discriminator's tensor. A generator
    /// embedding that differs from it would be lost silently.
    pub fn check_tied_sources(
        &self,
        map: &NameMap,
        rules: &RuleSet,
        checkpoint: &Checkpoint,
        params: &ParamDict,
    ) -> Result<()> {
        let mut differing = Vec::new();
        for source in map.tied() {
            let target = rules.rewrite(&format!("{}{source}", self.role.target_prefix()));
            let tensor = checkpoint.get(source)?;
            let same = params.get(&target).is_some_and(|slot| {
                let slot = slot.borrow();
                slot.shape() == tensor.shape()
                    && slot
                        .iter()
                        .zip(tensor.iter())
                        .all(|(a, b)| a.to_bits() == b.to_bits())
            });
            if !same {
                differing.push(source.to_string());
            }
        }
        if differing.is_empty() {
            Ok(())
        } else {
            Err(ConvertError::IncompleteConversion {
                role: self.role,
                reason: "generator embeddings differ from the shared discriminator slots".into(),
                names: differing,
            })
        }
    }

    /// Each exempt generator slot must be the discriminator's own slot.
    ///
    /// The output projection is compared with the discriminator's word embedding.
    pub fn check_ties(&self, generator: &ParamDict, discriminator: &ParamDict) -> Result<()> {
        let word_embed = format!("{BACKBONE_PREFIX}word_embed.weight");
        let untied: Vec<String> = self
            .exempt
            .iter()
            .filter(|name| {
                let counterpart = if name.as_str() == MLM_OUTPUT_WEIGHT {
                    word_embed.as_str()
                } else {
                    name.as_str()
                };
                match (generator.get(*name), discriminator.get(counterpart)) {
                    (Some(g), Some(d)) => !Rc::ptr_eq(g, d),
                    _ => true,
                }
            })
            .cloned()
            .collect();
        if untied.is_empty() {
            Ok(())
        } else {
            Err(ConvertError::IncompleteConversion {
                role: self.role,
                reason: "generator slots are not shared with the discriminator".into(),
                names: untied,
            })
        }
    }
}

/// Generator names filled by sharing rather than copying.
fn exempt_names(role: ConversionRole) -> BTreeSet<String> {
    if role != ConversionRole::Generator {
        return BTreeSet::new();
    }
    TIED_EMBEDDING_PARAMS
        .iter()
        .map(|name| format!("{BACKBONE_PREFIX}{name}"))
        .chain(std::iter::once(MLM_OUTPUT_WEIGHT.to_string()))
        .collect()
}
