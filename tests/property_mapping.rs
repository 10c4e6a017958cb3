//! Property tests for name mapping and tensor reshaping
//!
//! Ensures the conversion primitives satisfy their invariants:
//! - Name maps depend only on the set of names and the role
//! - Double transposition restores a kernel bit for bit
//! - Rule order is part of a rule set's meaning
//! - Content-hash names keep the stem and extension

use convertir::convert::content_hash_name;
use convertir::mapping::{build_name_map, ConversionRole, MapTarget, RewriteRule, RuleSet};
use convertir::tensor::transpose_trailing;
use ndarray::{ArrayD, IxDyn};
use proptest::collection::vec;
use proptest::prelude::*;

// =============================================================================
// Strategy Helpers
// =============================================================================

/// Plausible TF variable names across all scopes.
fn source_name() -> impl Strategy<Value = String> {
    let scope = prop_oneof![Just("electra"), Just("generator")];
    let layer = 0usize..12;
    let leaf = prop_oneof![
        Just("attention/self/query/kernel"),
        Just("attention/self/key/bias"),
        Just("attention/output/dense/kernel"),
        Just("attention/output/LayerNorm/gamma"),
        Just("intermediate/dense/bias"),
        Just("output/dense/kernel"),
        Just("output/LayerNorm/beta"),
    ];
    prop_oneof![
        (scope.clone(), layer, leaf)
            .prop_map(|(s, l, leaf)| format!("{s}/encoder/layer_{l}/{leaf}")),
        scope.prop_map(|s| format!("{s}/embeddings/LayerNorm/gamma")),
        Just("discriminator_predictions/dense/kernel".to_string()),
        Just("generator_predictions/output_bias".to_string()),
        Just("generator/embeddings/word_embeddings".to_string()),
    ]
}

fn role() -> impl Strategy<Value = ConversionRole> {
    prop_oneof![
        Just(ConversionRole::Backbone),
        Just(ConversionRole::Discriminator),
        Just(ConversionRole::Generator),
    ]
}

/// A tensor of rank 2..=4 with arbitrary finite values.
fn kernel() -> impl Strategy<Value = ArrayD<f32>> {
    vec(1usize..5, 2..=4).prop_flat_map(|shape| {
        let len: usize = shape.iter().product();
        vec(-1e6f32..1e6, len)
            .prop_map(move |data| ArrayD::from_shape_vec(IxDyn(&shape), data).unwrap())
    })
}

// =============================================================================
// Name Map Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_name_map_is_order_independent(
        mut names in vec(source_name(), 1..40),
        role in role(),
        seed in any::<u64>()
    ) {
        let rules = RuleSet::electra();
        let first = build_name_map(&names, role, &rules);

        // deterministic shuffle driven by the seed
        let n = names.len();
        for i in (1..n).rev() {
            let j = (seed.rotate_left(i as u32) as usize) % (i + 1);
            names.swap(i, j);
        }
        let second = build_name_map(&names, role, &rules);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first, build_name_map(&names, role, &rules));
    }

    #[test]
    fn prop_role_filters_and_prefixes(names in vec(source_name(), 1..40), role in role()) {
        let map = build_name_map(&names, role, &RuleSet::electra());
        for (source, target) in map.iter() {
            prop_assert!(role.accepts(source));
            if let MapTarget::Param(name) = target {
                prop_assert!(!name.contains('/'), "{} -> {}", source, name);
                if role != ConversionRole::Backbone {
                    prop_assert!(
                        name.starts_with("backbone_model.")
                            || name.starts_with("rtd_encoder.")
                            || name.starts_with("mlm_decoder."),
                        "{} -> {}", source, name
                    );
                }
            }
        }
    }

    #[test]
    fn prop_qkv_members_are_always_fused(names in vec(source_name(), 1..40), role in role()) {
        let map = build_name_map(&names, role, &RuleSet::electra());
        for (source, target) in map.iter() {
            prop_assert_eq!(source.contains("attention/self/"), *target == MapTarget::Fused);
        }
    }

    // =========================================================================
    // Tensor Properties
    // =========================================================================

    #[test]
    fn prop_double_transpose_is_identity(t in kernel()) {
        let once = transpose_trailing(&t).unwrap();
        let twice = transpose_trailing(&once).unwrap();
        prop_assert_eq!(twice.shape(), t.shape());
        prop_assert!(twice.iter().zip(t.iter()).all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn prop_transpose_swaps_trailing_axes(t in kernel()) {
        let out = transpose_trailing(&t).unwrap();
        let r = t.ndim();
        prop_assert_eq!(out.shape()[r - 1], t.shape()[r - 2]);
        prop_assert_eq!(out.shape()[r - 2], t.shape()[r - 1]);
        prop_assert_eq!(&out.shape()[..r - 2], &t.shape()[..r - 2]);
    }

    #[test]
    fn prop_hash_name_keeps_stem_and_extension(
        stem in "[a-z_]{1,12}",
        ext in "[a-z]{1,12}",
        hash in "[0-9a-f]{64}"
    ) {
        let name = content_hash_name(&format!("{stem}.{ext}"), &hash).unwrap();
        prop_assert_eq!(name, format!("{}-{}.{}", stem, &hash[..8], ext));
    }
}

// =============================================================================
// Rule Order
// =============================================================================

#[test]
fn test_rule_order_changes_output() {
    let name = "electra/embeddings/LayerNorm/gamma";
    let rules = RuleSet::electra();
    assert_eq!(rules.rewrite(name), "embed_layer_norm.gamma");

    // the generic LayerNorm rule first turns the name into one that `layer_` matches
    let mut reordered: Vec<RewriteRule> = rules.rules().to_vec();
    let generic = reordered
        .iter()
        .position(|r| r.pattern == "LayerNorm")
        .unwrap();
    let rule = reordered.remove(generic);
    reordered.insert(0, rule);
    let reordered = RuleSet::new(reordered);

    let rewritten = reordered.rewrite(name);
    assert_ne!(rewritten, "embed_layer_norm.gamma");
    assert_eq!(rewritten, "embeddings.all_encoder_layers.norm.gamma");
}

#[test]
fn test_transpose_rejects_vectors() {
    assert!(transpose_trailing(&ArrayD::zeros(IxDyn(&[5]))).is_none());
}
