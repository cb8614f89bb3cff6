//! Seams to the external automaton engine and schema translator.

use crate::error::Result;
use crate::types::{StateId, TokenId};
use crate::vocabulary::Vocabulary;

/// A compiled token-level automaton. Immutable and shared read-only by every
/// guide that uses the same grammar and vocabulary.
pub trait TokenAutomaton: Send + Sync {
    fn initial_state(&self) -> StateId;

    /// Advance on `token_id`; `None` if the token is not allowed in `state`.
    fn next_state(&self, state: StateId, token_id: TokenId) -> Option<StateId>;

    fn is_final_state(&self, state: StateId) -> bool;

    /// Token ids allowed in `state`, ascending. Empty for unknown states.
    fn allowed_tokens(&self, state: StateId) -> &[TokenId];

    fn num_states(&self) -> usize;

    /// Overwrite `row` with the allowed set of `state`. Ids that do not fit
    /// in the row are dropped.
    fn write_allowed_mask(&self, state: StateId, row: &mut [u32]) {
        row.fill(0);
        let capacity = row.len() * 32;
        for &id in self.allowed_tokens(state) {
            let idx = id as usize;
            if idx < capacity {
                row[idx / 32] |= 1 << (idx % 32);
            }
        }
    }
}

/// Compiles regular expressions against a vocabulary.
pub trait AutomatonEngine: Send + Sync {
    type Automaton: TokenAutomaton + 'static;

    /// Tag identifying the engine build. Persisted automata are discarded
    /// when it changes.
    fn version(&self) -> &str;

    fn compile(&self, pattern: &str, vocabulary: &Vocabulary) -> Result<Self::Automaton>;

    fn encode(&self, automaton: &Self::Automaton) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Automaton>;
}

/// Translates a JSON schema into a regular expression.
pub trait SchemaTranslator: Send + Sync {
    fn schema_to_regex(&self, schema: &serde_json::Value, whitespace: Option<&str>)
        -> Result<String>;
}
