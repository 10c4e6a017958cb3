//! Source checkpoint reader and vocabulary assets.

mod reader;
mod vocab;

pub use reader::{index_file_name, is_filtered, Checkpoint};
pub use vocab::{locate_vocab, TargetVocab, Vocab, SPECIAL_TOKENS};
