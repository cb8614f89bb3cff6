//! Host-facing entry points: one backend per (tokenizer, model vocabulary),
//! one `Grammar` per guided request.

use std::sync::Arc;

use bridle_core::{
    AutomatonEngine, BridleError, GrammarSpec, RequestType, Result, TokenAutomaton,
    TokenBitmask, TokenId, TokenizerSource, Vocabulary,
};
use tracing::{debug, info};

use crate::automaton::RegexEngine;
use crate::compiler::GrammarCompiler;
use crate::config::GuidedDecodingConfig;
use crate::guide::{Guide, GuideStatus};

pub struct GuidedDecodingBackend<E: AutomatonEngine = RegexEngine> {
    compiler: Arc<GrammarCompiler<E>>,
    vocabulary: Arc<Vocabulary>,
    vocab_size: usize,
    config: GuidedDecodingConfig,
}

impl GuidedDecodingBackend<RegexEngine> {
    /// `vocab_size` is the width of the model's logits row, which may exceed
    /// the tokenizer's vocabulary.
    pub fn new(
        tokenizer: &dyn TokenizerSource,
        vocab_size: usize,
        config: GuidedDecodingConfig,
    ) -> Result<Self> {
        let compiler = Arc::new(GrammarCompiler::new(&config.cache)?);
        Self::with_compiler(compiler, tokenizer, vocab_size, config)
    }
}

impl<E: AutomatonEngine> GuidedDecodingBackend<E> {
    /// Build a backend on a shared compiler, so several backends reuse one
    /// automaton cache.
    pub fn with_compiler(
        compiler: Arc<GrammarCompiler<E>>,
        tokenizer: &dyn TokenizerSource,
        vocab_size: usize,
        config: GuidedDecodingConfig,
    ) -> Result<Self> {
        if vocab_size == 0 {
            return Err(BridleError::Configuration(
                "vocab_size must be greater than zero".into(),
            ));
        }
        let vocabulary = compiler.vocabulary_for(tokenizer)?;
        info!(
            vocab_size,
            canonical_tokens = vocabulary.len(),
            eos_token_id = vocabulary.eos_token_id(),
            "Guided decoding backend ready"
        );
        Ok(Self {
            compiler,
            vocabulary,
            vocab_size,
            config,
        })
    }

    pub fn compiler(&self) -> &Arc<GrammarCompiler<E>> {
        &self.compiler
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn compile_grammar(&self, spec: &GrammarSpec) -> Result<Grammar> {
        let compiled = self.compiler.compile(spec, &self.vocabulary)?;
        let automaton: Arc<dyn TokenAutomaton> = compiled;
        Ok(Grammar {
            guide: Guide::new(automaton, self.config.max_rollback_tokens),
            vocab_size: self.vocab_size,
        })
    }

    pub fn compile_request(&self, request_type: RequestType, text: &str) -> Result<Grammar> {
        self.compile_grammar(&GrammarSpec::from_request(request_type, text)?)
    }

    /// Reject a structured-output request before it is scheduled, without
    /// compiling its automaton.
    pub fn validate_request(&self, request_type: RequestType, text: &str) -> Result<()> {
        let spec = GrammarSpec::from_request(request_type, text)?;
        self.compiler.validate(&spec).map(|_| ())
    }

    /// Bitmask for up to `max_batch_size` sequences, every token allowed.
    pub fn allocate_bitmask(&self, max_batch_size: usize) -> TokenBitmask {
        TokenBitmask::new(max_batch_size, self.vocab_size)
    }
}

/// The grammar state of one request.
pub struct Grammar {
    guide: Guide,
    vocab_size: usize,
}

impl Grammar {
    pub fn accept_tokens(&mut self, tokens: &[TokenId]) -> bool {
        self.guide.accept_tokens(tokens)
    }

    pub fn validate_tokens(&self, tokens: &[TokenId]) -> Vec<TokenId> {
        self.guide.validate_tokens(tokens)
    }

    pub fn rollback(&mut self, num_tokens: usize) -> Result<()> {
        self.guide.rollback(num_tokens)
    }

    /// Write the allowed set into row `idx` of `bitmask`. Out-of-range rows
    /// are skipped.
    pub fn fill_bitmask(&self, bitmask: &mut TokenBitmask, idx: usize) {
        if idx >= bitmask.rows() {
            debug!(idx, rows = bitmask.rows(), "Bitmask row out of range");
            return;
        }
        self.guide.fill_bitmask(bitmask.row_mut(idx));
    }

    pub fn is_terminated(&mut self) -> bool {
        self.guide.is_terminated()
    }

    pub fn reset(&mut self) {
        self.guide.reset();
    }

    pub fn num_processed_tokens(&self) -> usize {
        self.guide.num_processed_tokens()
    }

    pub fn status(&self) -> GuideStatus {
        self.guide.status()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn guide(&self) -> &Guide {
        &self.guide
    }
}
