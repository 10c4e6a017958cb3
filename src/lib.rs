//! Conversion of pretrained ELECTRA checkpoints into module-style parameter files.
//!
//! A source checkpoint stores TF-style variables (`electra/encoder/layer_3/...`).
//! The target models name their parameters by module path
//! (`encoder.all_encoder_layers.3.attn_qkv.weight`). This crate:
//! - reads the checkpoint and its vocabulary
//! - translates hyperparameters into the target config
//! - maps names per conversion role with ordered rewrite rules
//! - copies and transposes tensors, fusing query/key/value projections
//! - proves every target parameter was filled and every source tensor used
//! - optionally checks both forward passes agree on seeded input
//! - writes content-addressed config, vocabulary and parameter files
//!
//! # Example
//!
//! ```no_run
//! use convertir::config::{ConvertConfig, ModelSize};
//! use convertir::convert::run_conversion;
//! use convertir::source::ElectraPresets;
//!
//! let mut config = ConvertConfig::minimal("electra_small", ModelSize::Small);
//! config.check.enabled = true;
//! let outcome = run_conversion(&config, &ElectraPresets)?;
//! println!("wrote {} files", outcome.files.len());
//! # Ok::<(), convertir::ConvertError>(())
//! ```

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod mapping;
pub mod model;
pub mod source;
pub mod tensor;

pub use error::{ConvertError, Result};
