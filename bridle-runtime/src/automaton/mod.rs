//! Built-in automaton engine backed by `regex-automata` dense DFAs.
//!
//! A regex is compiled into a byte-level DFA, then every canonical vocabulary
//! string is walked through it from every reachable state to produce a
//! token-level index.

mod dfa;
mod index;

pub use dfa::RegexDfa;
pub use index::{build_token_index, TokenIndex};

use bridle_core::{AutomatonEngine, BridleError, Result, Vocabulary};

pub const ENGINE_VERSION: &str = concat!("bridle-regex-dfa/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, Default)]
pub struct RegexEngine;

impl AutomatonEngine for RegexEngine {
    type Automaton = TokenIndex;

    fn version(&self) -> &str {
        ENGINE_VERSION
    }

    fn compile(&self, pattern: &str, vocabulary: &Vocabulary) -> Result<TokenIndex> {
        let dfa = RegexDfa::new(pattern)?;
        build_token_index(&dfa, vocabulary)
    }

    fn encode(&self, automaton: &TokenIndex) -> Result<Vec<u8>> {
        bincode::serialize(automaton)
            .map_err(|e| BridleError::Cache(format!("cannot encode token index: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<TokenIndex> {
        bincode::deserialize(bytes)
            .map_err(|e| BridleError::Cache(format!("cannot decode token index: {e}")))
    }
}
