//! Bridle core types, traits, and error definitions.

pub mod automaton;
pub mod bitmask;
pub mod error;
pub mod tokenizer;
pub mod types;
pub mod vocabulary;

pub use automaton::{AutomatonEngine, SchemaTranslator, TokenAutomaton};
pub use bitmask::{apply_token_bitmask, words_per_row, TokenBitmask};
pub use error::{BridleError, CertificationError, Result, UnsupportedFeature};
pub use tokenizer::{RawToken, TokenizerSource};
pub use types::*;
pub use vocabulary::Vocabulary;
