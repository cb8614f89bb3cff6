//! Per-sequence logits processor for hosts that mask one row at a time.

use std::borrow::Cow;
use std::sync::Arc;

use bridle_core::{BridleError, Result, TokenBitmask, TokenId};
use tracing::{debug, warn};

use crate::backend::Grammar;

/// Marks where a model's reasoning section ends. Output is only
/// constrained after it.
pub trait ReasoningBoundary: Send + Sync {
    fn is_reasoning_end(&self, token_ids: &[TokenId]) -> bool;

    /// The generated ids with the reasoning section removed.
    fn extract_content(&self, token_ids: &[TokenId]) -> Vec<TokenId>;
}

pub struct GuidedLogitsProcessor {
    grammar: Grammar,
    mask: TokenBitmask,
    reasoner: Option<Arc<dyn ReasoningBoundary>>,
    /// Content tokens already fed to the grammar.
    seen: usize,
}

impl GuidedLogitsProcessor {
    pub fn new(grammar: Grammar, reasoner: Option<Arc<dyn ReasoningBoundary>>) -> Self {
        let mask = TokenBitmask::new(1, grammar.vocab_size());
        Self {
            grammar,
            mask,
            reasoner,
            seen: 0,
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn grammar_mut(&mut self) -> &mut Grammar {
        &mut self.grammar
    }

    /// Catch the grammar up with `token_ids` (everything generated so far)
    /// and mask `logits` for the next position.
    ///
    /// A generated token the grammar rejects is a `TokenRejected` error and
    /// leaves `logits` untouched. The tokens before it stay consumed, so a
    /// later call with the host's truncated sequence resumes from there.
    pub fn process(&mut self, token_ids: &[TokenId], logits: &mut [f32]) -> Result<()> {
        let content: Cow<'_, [TokenId]> = match &self.reasoner {
            Some(reasoner) => {
                if !reasoner.is_reasoning_end(token_ids) {
                    return Ok(());
                }
                Cow::Owned(reasoner.extract_content(token_ids))
            }
            None => Cow::Borrowed(token_ids),
        };

        if content.len() < self.seen {
            // The host dropped tokens: rewind, or replay from scratch when
            // they are older than the rollback window.
            let dropped = self.seen - content.len();
            if self.grammar.rollback(dropped).is_err() {
                self.grammar.reset();
                self.seen = 0;
            } else {
                self.seen = content.len();
            }
        }
        if content.len() > self.seen {
            let new_tokens = &content[self.seen..];
            let valid = self.grammar.validate_tokens(new_tokens);
            if !valid.is_empty() && self.grammar.accept_tokens(&valid) {
                self.seen += valid.len();
            }
            if self.seen < content.len() {
                let token_id = content[self.seen];
                warn!(
                    token_id,
                    consumed = self.seen,
                    "Generated token rejected by grammar"
                );
                return Err(BridleError::TokenRejected {
                    token_id,
                    consumed: self.seen,
                });
            }
        }

        self.grammar.fill_bitmask(&mut self.mask, 0);
        self.mask.apply_to_logits(0, logits);
        debug!(processed = self.grammar.num_processed_tokens(), "Masked logits");
        Ok(())
    }
}
