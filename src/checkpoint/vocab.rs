//! Plain-text vocabulary assets.

use crate::error::{ConvertError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Special tokens recorded in the target vocabulary, keyed by role.
pub const SPECIAL_TOKENS: &[(&str, &str)] = &[
    ("unk_token", "[UNK]"),
    ("pad_token", "[PAD]"),
    ("cls_token", "[CLS]"),
    ("sep_token", "[SEP]"),
    ("mask_token", "[MASK]"),
];

/// Find the single `*.txt` vocabulary file in a checkpoint directory.
pub fn locate_vocab(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ConvertError::checkpoint(dir, format!("cannot list directory: {e}")))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConvertError::io(format!("listing {}", dir.display()), e))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            found.push(path);
        }
    }
    found.sort();

    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(ConvertError::checkpoint(dir, "no vocabulary .txt file found")),
        n => Err(ConvertError::checkpoint(
            dir,
            format!("expected exactly one vocabulary .txt file, found {n}: {found:?}"),
        )),
    }
}

/// Token list read from a one-token-per-line file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocab {
    tokens: Vec<String>,
}

/// Target vocabulary document.
#[derive(Debug, Clone, Serialize)]
pub struct TargetVocab<'a> {
    pub all_tokens: &'a [String],
    pub special_token_key_value: BTreeMap<&'static str, &'static str>,
}

impl Vocab {
    /// Read a vocabulary file; the line count is the vocabulary size.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConvertError::checkpoint(path, format!("cannot read vocabulary: {e}")))?;
        Ok(Self::from_lines(&content))
    }

    pub fn from_lines(content: &str) -> Self {
        let tokens = content
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        Self { tokens }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Special tokens present in this vocabulary, and the ones that are not.
    pub fn special_tokens(&self) -> (BTreeMap<&'static str, &'static str>, Vec<&'static str>) {
        let mut present = BTreeMap::new();
        let mut missing = Vec::new();
        for (key, token) in SPECIAL_TOKENS {
            if self.tokens.iter().any(|t| t == token) {
                present.insert(*key, *token);
            } else {
                missing.push(*token);
            }
        }
        (present, missing)
    }

    /// Render the target `vocab.json` document.
    pub fn to_json(&self) -> Result<String> {
        let (special, missing) = self.special_tokens();
        if !missing.is_empty() {
            tracing::warn!(?missing, "vocabulary lacks special tokens");
        }
        let doc = TargetVocab {
            all_tokens: &self.tokens,
            special_token_key_value: special,
        };
        serde_json::to_string_pretty(&doc).map_err(|e| ConvertError::Serialization {
            message: format!("encoding vocabulary: {e}"),
        })
    }
}
