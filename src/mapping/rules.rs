//! Ordered substring rewrite rules.
//!
//! Rules are applied in sequence and each one replaces every occurrence of its
//! pattern. Later rules see the output of earlier ones, so order is part of the
//! rule set's meaning: `embeddings/LayerNorm` must survive `layer_` and be
//! rewritten before the generic `LayerNorm` rule.

use serde::{Deserialize, Serialize};

/// A single `(pattern, replacement)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub pattern: String,
    pub replacement: String,
}

impl RewriteRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// Replace all occurrences of the pattern.
    #[must_use]
    pub fn apply(&self, name: &str) -> String {
        if self.pattern.is_empty() {
            return name.to_string();
        }
        name.replace(&self.pattern, &self.replacement)
    }
}

/// Built-in ELECTRA rules, in application order.
const ELECTRA_RULES: &[(&str, &str)] = &[
    ("backbone_model.discriminator_predictions/dense_1", "rtd_encoder.2"),
    ("backbone_model.discriminator_predictions/dense", "rtd_encoder.0"),
    ("backbone_model.generator_predictions/dense", "mlm_decoder.0"),
    ("backbone_model.generator_predictions/LayerNorm", "mlm_decoder.2"),
    ("backbone_model.generator_predictions/output_bias", "mlm_decoder.3.bias"),
    ("electra/", ""),
    ("generator/", ""),
    ("embeddings_project", "embed_factorized_proj"),
    ("embeddings/word_embeddings", "word_embed.weight"),
    ("embeddings/token_type_embeddings", "token_type_embed.weight"),
    ("embeddings/position_embeddings", "token_pos_embed._embed.weight"),
    ("layer_", "all_encoder_layers."),
    ("embeddings/LayerNorm", "embed_layer_norm"),
    ("attention/output/LayerNorm", "layer_norm"),
    ("attention/output/dense", "attention_proj"),
    ("output/LayerNorm", "ffn.layer_norm"),
    ("LayerNorm", "layer_norm"),
    ("intermediate/dense", "ffn.ffn_1"),
    ("output/dense", "ffn.ffn_2"),
    ("output/", ""),
    ("kernel", "weight"),
    ("/", "."),
];

/// An ordered list of rewrite rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<RewriteRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// The rule set for TF ELECTRA checkpoints.
    pub fn electra() -> Self {
        Self::new(
            ELECTRA_RULES
                .iter()
                .map(|(p, r)| RewriteRule::new(*p, *r))
                .collect(),
        )
    }

    /// Run every rule over `name` in order.
    #[must_use]
    pub fn rewrite(&self, name: &str) -> String {
        self.rules
            .iter()
            .fold(name.to_string(), |current, rule| rule.apply(&current))
    }

    #[must_use]
    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::electra()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_electra_rule_count() {
        assert_eq!(RuleSet::electra().len(), 22);
    }

    #[test]
    fn test_rewrite_embeddings() {
        let rules = RuleSet::electra();
        assert_eq!(
            rules.rewrite("electra/embeddings/word_embeddings"),
            "word_embed.weight"
        );
        assert_eq!(
            rules.rewrite("electra/embeddings/position_embeddings"),
            "token_pos_embed._embed.weight"
        );
        assert_eq!(
            rules.rewrite("electra/embeddings/LayerNorm/gamma"),
            "embed_layer_norm.gamma"
        );
        assert_eq!(
            rules.rewrite("electra/embeddings_project/kernel"),
            "embed_factorized_proj.weight"
        );
    }

    #[test]
    fn test_rewrite_encoder_layer() {
        let rules = RuleSet::electra();
        let cases = [
            (
                "electra/encoder/layer_3/attention/output/dense/kernel",
                "encoder.all_encoder_layers.3.attention_proj.weight",
            ),
            (
                "electra/encoder/layer_3/attention/output/LayerNorm/beta",
                "encoder.all_encoder_layers.3.layer_norm.beta",
            ),
            (
                "electra/encoder/layer_0/intermediate/dense/bias",
                "encoder.all_encoder_layers.0.ffn.ffn_1.bias",
            ),
            (
                "electra/encoder/layer_11/output/dense/kernel",
                "encoder.all_encoder_layers.11.ffn.ffn_2.weight",
            ),
            (
                "electra/encoder/layer_1/output/LayerNorm/gamma",
                "encoder.all_encoder_layers.1.ffn.layer_norm.gamma",
            ),
        ];
        for (source, target) in cases {
            assert_eq!(rules.rewrite(source), target, "rewriting {source}");
        }
    }

    #[test]
    fn test_rewrite_heads_with_prefix() {
        let rules = RuleSet::electra();
        assert_eq!(
            rules.rewrite("backbone_model.discriminator_predictions/dense_1/kernel"),
            "rtd_encoder.2.weight"
        );
        assert_eq!(
            rules.rewrite("backbone_model.discriminator_predictions/dense/bias"),
            "rtd_encoder.0.bias"
        );
        assert_eq!(
            rules.rewrite("backbone_model.generator_predictions/LayerNorm/gamma"),
            "mlm_decoder.2.gamma"
        );
        assert_eq!(
            rules.rewrite("backbone_model.generator_predictions/output_bias"),
            "mlm_decoder.3.bias"
        );
        assert_eq!(
            rules.rewrite("backbone_model.generator/encoder/layer_0/output/dense/bias"),
            "backbone_model.encoder.all_encoder_layers.0.ffn.ffn_2.bias"
        );
    }

    #[test]
    fn test_empty_pattern_is_noop() {
        let rule = RewriteRule::new("", "x");
        assert_eq!(rule.apply("abc"), "abc");
    }

    #[test]
    fn test_rule_set_serde() {
        let rules = RuleSet::new(vec![RewriteRule::new("a/", "b.")]);
        let yaml = serde_yaml::to_string(&rules).unwrap();
        let back: RuleSet = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, rules);
    }
}
