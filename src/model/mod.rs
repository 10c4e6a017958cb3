//! Target model definitions consumed by the converter.
//!
//! Only what conversion and equivalence checking need: declared parameter
//! slots with final shapes, forward passes, and embedding tying.

mod electra;
mod inputs;
pub mod ops;
pub mod params;

pub use electra::{
    layer_prefix, ElectraDiscriminator, ElectraGenerator, ElectraModel, TargetModel, LAYER_SCOPE,
    MLM_OUTPUT_WEIGHT, TIED_EMBEDDING_PARAMS,
};
pub use inputs::{ForwardOutput, InputBatch};
pub use ops::Activation;
pub use params::{ParamDict, ParamSlot};
