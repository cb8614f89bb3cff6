use std::collections::{HashMap, HashSet};

use regex_automata::util::primitives::StateID;
use serde::{Deserialize, Serialize};
use tracing::debug;

use bridle_core::vocabulary::canonical_to_bytes;
use bridle_core::{BridleError, Result, StateId, TokenAutomaton, TokenId, Vocabulary};

use super::dfa::RegexDfa;

/// Outgoing edges of one index state, sorted by token id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Edges {
    tokens: Vec<TokenId>,
    targets: Vec<StateId>,
}

/// Pre-computed token-level automaton.
///
/// Maps each reachable DFA state to the vocabulary tokens that can be
/// appended without leaving the language, and to the state each one leads to.
/// States are renumbered densely with the initial state at 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIndex {
    initial_state: StateId,
    final_states: HashSet<StateId>,
    transitions: HashMap<StateId, Edges>,
    eos_token_id: TokenId,
    num_states: usize,
}

impl TokenIndex {
    pub fn eos_token_id(&self) -> TokenId {
        self.eos_token_id
    }

    pub fn final_states(&self) -> &HashSet<StateId> {
        &self.final_states
    }

    /// Number of `(state, token)` transitions, EOS loops included.
    pub fn num_transitions(&self) -> usize {
        self.transitions.values().map(|e| e.tokens.len()).sum()
    }
}

impl TokenAutomaton for TokenIndex {
    fn initial_state(&self) -> StateId {
        self.initial_state
    }

    fn next_state(&self, state: StateId, token_id: TokenId) -> Option<StateId> {
        let edges = self.transitions.get(&state)?;
        let pos = edges.tokens.binary_search(&token_id).ok()?;
        Some(edges.targets[pos])
    }

    fn is_final_state(&self, state: StateId) -> bool {
        self.final_states.contains(&state)
    }

    fn allowed_tokens(&self, state: StateId) -> &[TokenId] {
        self.transitions
            .get(&state)
            .map_or(&[], |edges| edges.tokens.as_slice())
    }

    fn num_states(&self) -> usize {
        self.num_states
    }
}

/// Build a token-level index from a byte-level DFA.
///
/// A token is allowed from a state if feeding its bytes keeps the DFA alive.
/// Accepting states get an EOS self-loop.
pub fn build_token_index(dfa: &RegexDfa, vocabulary: &Vocabulary) -> Result<TokenIndex> {
    let eos_token_id = vocabulary.eos_token_id();
    let vocab_bytes: Vec<(Vec<u8>, &[TokenId])> = vocabulary
        .tokens()
        .iter()
        .map(|(token, ids)| (canonical_to_bytes(token), ids.as_slice()))
        .collect();

    let start = dfa.start_state();
    let mut state_ids: HashMap<StateID, StateId> = HashMap::from([(start, 0)]);
    let mut pending = vec![start];
    let mut transitions: HashMap<StateId, Edges> = HashMap::new();
    let mut final_states: HashSet<StateId> = HashSet::new();

    while let Some(current) = pending.pop() {
        let current_id = state_ids[&current];
        let accepting = dfa.accepts_at_end(current);
        if accepting {
            final_states.insert(current_id);
        }

        let mut edges: Vec<(TokenId, StateId)> = Vec::new();
        for (bytes, ids) in &vocab_bytes {
            let Some(next) = dfa.walk(current, bytes) else {
                continue;
            };
            let fresh_id = state_ids.len() as StateId;
            let next_id = *state_ids.entry(next).or_insert_with(|| {
                pending.push(next);
                fresh_id
            });
            edges.extend(ids.iter().map(|&id| (id, next_id)));
        }
        if accepting {
            edges.push((eos_token_id, current_id));
        }

        edges.sort_unstable_by_key(|&(token, _)| token);
        let (tokens, targets): (Vec<TokenId>, Vec<StateId>) = edges.into_iter().unzip();
        transitions.insert(current_id, Edges { tokens, targets });
    }

    if final_states.is_empty() {
        return Err(BridleError::Compile(
            "the vocabulary cannot produce any string accepted by the pattern".into(),
        ));
    }

    let index = TokenIndex {
        initial_state: 0,
        final_states,
        transitions,
        eos_token_id,
        num_states: state_ids.len(),
    };
    debug!(
        states = index.num_states,
        transitions = index.num_transitions(),
        "built token index"
    );
    Ok(index)
}
