//! Conversion engine: copy, fuse, validate, check, persist.

mod equivalence;
mod materialize;
mod merge;
pub mod naming;
mod persist;
mod pipeline;
mod validate;

pub use equivalence::{check_equivalence, EquivalenceReport, EquivalenceSettings};
pub use materialize::{is_kernel, materialize, Materialized};
pub use merge::{merge_fused_projections, source_prefix, Merged, PROJECTIONS};
pub use naming::{content_hash, content_hash_name, rename_with_hash, HashedFile};
pub use persist::{load_parameters, save_parameters, write_text};
pub use pipeline::{
    convert_checkpoint, convert_role, persist_outputs, run_conversion, ConversionOutcome,
    ConvertedModels, RoleSummary, CONFIG_FILE, VOCAB_FILE,
};
pub use validate::CompletenessValidator;
