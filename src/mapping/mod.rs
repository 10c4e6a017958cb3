//! Name-mapping engine.
//!
//! Translates the flat, `/`-scoped source namespace into the dotted module-tree
//! namespace of the target models, one conversion role at a time.

mod name_map;
mod role;
mod rules;

pub use name_map::{build_name_map, MapTarget, NameMap, FUSED_MARKER, TIED_MARKER};
pub use role::{ConversionRole, BACKBONE_PREFIX};
pub use rules::{RewriteRule, RuleSet};
