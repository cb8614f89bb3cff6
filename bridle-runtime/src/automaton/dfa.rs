use regex_automata::dfa::{dense, Automaton, StartKind};
use regex_automata::util::primitives::StateID;
use regex_automata::{Anchored, MatchKind};
use regex_syntax::ast::parse::Parser;

use bridle_core::{BridleError, Result};

/// Maximum allowed regex pattern length.
const MAX_PATTERN_LEN: usize = 64 * 1024;
/// Maximum DFA size in bytes (10 MB).
const MAX_DFA_SIZE: usize = 10 * 1024 * 1024;

/// A byte-level DFA with a universal anchored start state.
///
/// The pattern is compiled as `(?:pattern)\z`, so a match can only be
/// reported at end of input and any live state is a prefix of the language.
pub struct RegexDfa {
    dfa: dense::DFA<Vec<u32>>,
    start: StateID,
}

impl RegexDfa {
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(BridleError::GrammarSpecification(format!(
                "regex pattern too long ({} bytes, max {})",
                pattern.len(),
                MAX_PATTERN_LEN
            )));
        }

        // Parse on its own first so the wrapping group cannot rebalance a
        // malformed pattern.
        Parser::new().parse(pattern).map_err(|e| {
            BridleError::GrammarSpecification(format!("invalid regex pattern: {e}"))
        })?;

        // `MatchKind::All` keeps the DFA alive past the first match so every
        // string of the language stays reachable.
        let dfa = dense::Builder::new()
            .configure(
                dense::DFA::config()
                    .start_kind(StartKind::Anchored)
                    .match_kind(MatchKind::All)
                    .dfa_size_limit(Some(MAX_DFA_SIZE)),
            )
            .build(&format!("(?:{pattern})\\z"))
            .map_err(|e| BridleError::Compile(format!("regex DFA compilation error: {e}")))?;

        let start = dfa.universal_start_state(Anchored::Yes).ok_or_else(|| {
            BridleError::Compile("regex DFA has no universal anchored start state".into())
        })?;

        Ok(Self { dfa, start })
    }

    pub fn start_state(&self) -> StateID {
        self.start
    }

    /// Feed `bytes` from `state`. `None` once the DFA dies or quits.
    pub fn walk(&self, state: StateID, bytes: &[u8]) -> Option<StateID> {
        let mut current = state;
        for &byte in bytes {
            current = self.dfa.next_state(current, byte);
            if self.dfa.is_dead_state(current) || self.dfa.is_quit_state(current) {
                return None;
            }
        }
        Some(current)
    }

    /// Match states are delayed by one byte, so a state has matched
    /// everything fed so far only if the end-of-input transition matches.
    pub fn accepts_at_end(&self, state: StateID) -> bool {
        self.dfa.is_match_state(self.dfa.next_eoi_state(state))
    }
}
