//! Error types with actionable diagnostics.
//!
//! Every failure in a conversion run is fatal: a partially converted parameter
//! set is never safe to persist, so nothing here is retried or recovered.
//! Each variant carries enough context to point a human at the mismatch
//! between the assumed and the actual checkpoint structure.

use crate::mapping::ConversionRole;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Errors that can occur while converting a checkpoint.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The source checkpoint or one of its assets could not be read.
    #[error("Failed to read checkpoint {path}: {message}\n  → Check that the directory holds electra_<size>.safetensors and a single vocabulary .txt file")]
    CheckpointRead { path: PathBuf, message: String },

    /// Tokenizer-derived and checkpoint-declared settings disagree.
    #[error("Configuration mismatch for '{field}': checkpoint declares {expected}, assets provide {actual}\n  → Make sure the vocabulary file belongs to this checkpoint")]
    ConfigMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// A configuration value is out of range or unknown.
    #[error("Invalid configuration value for '{field}': {message}\n  → {suggestion}")]
    ConfigValue {
        field: String,
        message: String,
        suggestion: String,
    },

    /// A run configuration file has invalid syntax.
    #[error("Invalid configuration syntax in {path}:\n  {message}\n  → Check YAML syntax at the indicated line")]
    ConfigParsing { path: PathBuf, message: String },

    /// A tensor does not have the shape its destination expects.
    #[error("Tensor shape mismatch for {name}: expected {expected:?}, got {actual:?}\n  → Check that the model size matches the checkpoint")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// One of the query/key/value projection tensors is absent.
    #[error("Missing attention projection for role {role}, layer {layer}: {name}")]
    MissingProjection {
        role: ConversionRole,
        layer: usize,
        name: String,
    },

    /// A mapped target name cannot receive its source tensor.
    #[error("Cannot place {source_name} into {target} for role {role}: {reason}\n  → The rewrite rules do not match this checkpoint layout")]
    UnmappedParameter {
        role: ConversionRole,
        source_name: String,
        target: String,
        reason: String,
    },

    /// Target parameters were left unfilled or source tensors were dropped.
    #[error("Incomplete conversion for role {role}: {reason}: {names:?}")]
    IncompleteConversion {
        role: ConversionRole,
        reason: String,
        names: Vec<String>,
    },

    /// Source and target forward passes disagree beyond tolerance.
    #[error("Equivalence check failed on {output}: max |diff| = {max_abs_diff:e} (rtol={rtol:e}, atol={atol:e})\n  → Outputs were not written")]
    EquivalenceCheckFailed {
        output: String,
        max_abs_diff: f32,
        rtol: f32,
        atol: f32,
    },

    /// Forward-pass input is outside the model's declared ranges.
    #[error("Invalid model input: {message}")]
    InvalidInput { message: String },

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization of an output artifact failed.
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl ConvertError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a checkpoint read error.
    pub fn checkpoint(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CheckpointRead {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check whether the user can fix this by changing inputs or flags.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::CheckpointRead { .. }
                | Self::ConfigMismatch { .. }
                | Self::ConfigValue { .. }
                | Self::ConfigParsing { .. }
                | Self::InvalidInput { .. }
        )
    }

    /// Get the error code for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CheckpointRead { .. } => "E001",
            Self::ConfigMismatch { .. } => "E010",
            Self::ConfigValue { .. } => "E011",
            Self::ConfigParsing { .. } => "E012",
            Self::ShapeMismatch { .. } => "E020",
            Self::MissingProjection { .. } => "E030",
            Self::UnmappedParameter { .. } => "E031",
            Self::IncompleteConversion { .. } => "E032",
            Self::EquivalenceCheckFailed { .. } => "E040",
            Self::InvalidInput { .. } => "E041",
            Self::Io { .. } => "E050",
            Self::Serialization { .. } => "E051",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn all_variants() -> Vec<ConvertError> {
        vec![
            ConvertError::checkpoint("/ckpt", "missing"),
            ConvertError::ConfigMismatch {
                field: "vocab_size".into(),
                expected: "50".into(),
                actual: "49".into(),
            },
            ConvertError::ConfigValue {
                field: "num_heads".into(),
                message: "must be positive".into(),
                suggestion: "use 4".into(),
            },
            ConvertError::ConfigParsing {
                path: "run.yaml".into(),
                message: "bad indent".into(),
            },
            ConvertError::ShapeMismatch {
                name: "w".into(),
                expected: vec![2, 3],
                actual: vec![3, 2],
            },
            ConvertError::MissingProjection {
                role: ConversionRole::Backbone,
                layer: 1,
                name: "q".into(),
            },
            ConvertError::UnmappedParameter {
                role: ConversionRole::Discriminator,
                source_name: "a".into(),
                target: "b".into(),
                reason: "unknown".into(),
            },
            ConvertError::IncompleteConversion {
                role: ConversionRole::Generator,
                reason: "unfilled".into(),
                names: vec!["x".into()],
            },
            ConvertError::EquivalenceCheckFailed {
                output: "pooled_output".into(),
                max_abs_diff: 0.5,
                rtol: 1e-3,
                atol: 1e-3,
            },
            ConvertError::InvalidInput {
                message: "token id".into(),
            },
            ConvertError::io(
                "writing",
                std::io::Error::new(std::io::ErrorKind::Other, "disk"),
            ),
            ConvertError::Serialization {
                message: "yaml".into(),
            },
        ]
    }

    #[test]
    fn test_error_codes_are_unique() {
        let errors = all_variants();
        let codes: HashSet<_> = errors.iter().map(ConvertError::code).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_all_error_codes_start_with_e() {
        for err in all_variants() {
            assert!(err.code().starts_with('E'));
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn test_config_mismatch_mentions_both_values() {
        let err = ConvertError::ConfigMismatch {
            field: "vocab_size".into(),
            expected: "50".into(),
            actual: "49".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("vocab_size"));
        assert!(msg.contains("50"));
        assert!(msg.contains("49"));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_missing_projection_names_role_and_layer() {
        let err = ConvertError::MissingProjection {
            role: ConversionRole::Generator,
            layer: 3,
            name: "generator/encoder/layer_3/attention/self/key/kernel".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("gen"));
        assert!(msg.contains("layer 3"));
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_io_error_constructor() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConvertError::io("reading vocab", io_err);
        assert!(matches!(err, ConvertError::Io { .. }));
        assert!(err.to_string().contains("reading vocab"));
    }
}
