//! Source-name to target-name mapping for one conversion role.

use super::role::ConversionRole;
use super::rules::RuleSet;
use serde::Serialize;
use std::collections::BTreeMap;

/// Scope marking the three attention projections merged into `attn_qkv`.
pub const FUSED_MARKER: &str = "self/";

/// Generator embedding scope whose slots are shared with the discriminator.
pub const TIED_MARKER: &str = "generator/embeddings/";

/// Where a source tensor goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "lowercase")]
pub enum MapTarget {
    /// Copied into the named target parameter by the materializer
    Param(String),
    /// Query/key/value member, consumed by the fused-projection merger
    Fused,
    /// Shared by reference with the discriminator, never copied
    Tied,
}

impl MapTarget {
    #[must_use]
    pub fn param_name(&self) -> Option<&str> {
        match self {
            MapTarget::Param(name) => Some(name),
            MapTarget::Fused | MapTarget::Tied => None,
        }
    }
}

/// Mapping for one role, ordered by source name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameMap {
    role: ConversionRole,
    entries: BTreeMap<String, MapTarget>,
}

impl NameMap {
    #[must_use]
    pub fn role(&self) -> ConversionRole {
        self.role
    }

    #[must_use]
    pub fn get(&self, source: &str) -> Option<&MapTarget> {
        self.entries.get(source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MapTarget)> {
        self.entries.iter()
    }

    /// `(source, target)` pairs handled by direct copy.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(s, t)| t.param_name().map(|t| (s.as_str(), t)))
    }

    /// Source names left to the fused-projection merger.
    pub fn fused(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, t)| **t == MapTarget::Fused)
            .map(|(s, _)| s.as_str())
    }

    /// Source names shared by reference instead of copied.
    pub fn tied(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, t)| **t == MapTarget::Tied)
            .map(|(s, _)| s.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the name map for `role` over the given source names.
///
/// Names the role does not see are left out. Query/key/value members become
/// [`MapTarget::Fused`]; generator embeddings become [`MapTarget::Tied`]; every
/// other name is prefixed for the role and run through `rules`.
pub fn build_name_map<S: AsRef<str>>(
    names: &[S],
    role: ConversionRole,
    rules: &RuleSet,
) -> NameMap {
    let mut entries = BTreeMap::new();
    for name in names {
        let source = name.as_ref();
        if !role.accepts(source) {
            continue;
        }
        let target = if source.contains(FUSED_MARKER) {
            MapTarget::Fused
        } else if role == ConversionRole::Generator && source.contains(TIED_MARKER) {
            MapTarget::Tied
        } else {
            MapTarget::Param(rules.rewrite(&format!("{}{source}", role.target_prefix())))
        };
        entries.insert(source.to_string(), target);
    }
    NameMap { role, entries }
}
