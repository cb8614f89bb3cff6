//! Per-request guided-generation state machine.

use std::collections::VecDeque;
use std::sync::Arc;

use bridle_core::{BridleError, Result, StateId, TokenAutomaton, TokenId};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideStatus {
    Active { consumed: usize },
    /// Reported once `is_terminated` has observed an accepting state.
    Finished,
    /// The automaton sits in a non-accepting state with no allowed tokens.
    Failed,
}

/// Walks a shared compiled automaton on behalf of one request.
///
/// One guide per sequence, driven from a single step loop. The automaton
/// is shared read-only; dropping a guide never affects other requests.
pub struct Guide {
    automaton: Arc<dyn TokenAutomaton>,
    state: StateId,
    consumed: usize,
    /// States before the most recent accepted tokens, newest last.
    history: VecDeque<StateId>,
    max_rollback: usize,
    /// Raw terminal status seen by the previous `is_terminated` call.
    pending_terminated: bool,
}

impl Guide {
    pub fn new(automaton: Arc<dyn TokenAutomaton>, max_rollback_tokens: usize) -> Self {
        let state = automaton.initial_state();
        Self {
            automaton,
            state,
            consumed: 0,
            history: VecDeque::with_capacity(max_rollback_tokens),
            max_rollback: max_rollback_tokens,
            pending_terminated: false,
        }
    }

    pub fn current_state(&self) -> StateId {
        self.state
    }

    pub fn num_processed_tokens(&self) -> usize {
        self.consumed
    }

    pub fn automaton(&self) -> &Arc<dyn TokenAutomaton> {
        &self.automaton
    }

    /// Advance over every token in `tokens`, or over none of them.
    pub fn accept_tokens(&mut self, tokens: &[TokenId]) -> bool {
        let path = self.walk(tokens);
        if path.len() != tokens.len() {
            debug!(
                state = self.state,
                token_id = tokens[path.len()],
                position = path.len(),
                "Guide rejected token"
            );
            return false;
        }
        for next in path {
            self.push_history(self.state);
            self.state = next;
        }
        self.consumed += tokens.len();
        true
    }

    /// Longest prefix of `tokens` the guide would accept. Does not advance.
    pub fn validate_tokens(&self, tokens: &[TokenId]) -> Vec<TokenId> {
        let accepted = self.walk(tokens).len();
        tokens[..accepted].to_vec()
    }

    /// Undo the last `n` accepted tokens.
    pub fn rollback(&mut self, n: usize) -> Result<()> {
        if n > self.history.len() {
            return Err(BridleError::RollbackExceeded {
                requested: n,
                available: self.history.len(),
            });
        }
        for _ in 0..n {
            if let Some(previous) = self.history.pop_back() {
                self.state = previous;
            }
        }
        self.consumed -= n;
        if n > 0 {
            self.pending_terminated = false;
        }
        Ok(())
    }

    /// Overwrite `row` with the tokens allowed in the current state.
    pub fn fill_bitmask(&self, row: &mut [u32]) {
        self.automaton.write_allowed_mask(self.state, row);
    }

    pub fn allowed_tokens(&self) -> &[TokenId] {
        self.automaton.allowed_tokens(self.state)
    }

    /// Whether generation should stop, one call behind the automaton: each
    /// call returns the status seen by the previous call, so an EOS proposed
    /// at an accepting state still reaches the host.
    pub fn is_terminated(&mut self) -> bool {
        let previous = self.pending_terminated;
        self.pending_terminated = self.raw_terminated();
        previous
    }

    pub fn status(&self) -> GuideStatus {
        if self.is_dead_end() {
            GuideStatus::Failed
        } else if self.pending_terminated && self.automaton.is_final_state(self.state) {
            GuideStatus::Finished
        } else {
            GuideStatus::Active {
                consumed: self.consumed,
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = self.automaton.initial_state();
        self.consumed = 0;
        self.history.clear();
        self.pending_terminated = false;
    }

    fn raw_terminated(&self) -> bool {
        self.automaton.is_final_state(self.state) || self.is_dead_end()
    }

    fn is_dead_end(&self) -> bool {
        !self.automaton.is_final_state(self.state)
            && self.automaton.allowed_tokens(self.state).is_empty()
    }

    /// States visited while accepting `tokens`, stopping at the first
    /// rejected token.
    fn walk(&self, tokens: &[TokenId]) -> Vec<StateId> {
        let mut path = Vec::with_capacity(tokens.len());
        let mut state = self.state;
        for &token in tokens {
            match self.automaton.next_state(state, token) {
                Some(next) => {
                    path.push(next);
                    state = next;
                }
                None => break,
            }
        }
        path
    }

    fn push_history(&mut self, state: StateId) {
        if self.max_rollback == 0 {
            return;
        }
        if self.history.len() == self.max_rollback {
            self.history.pop_front();
        }
        self.history.push_back(state);
    }
}
