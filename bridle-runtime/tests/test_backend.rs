//! Host-facing backend, bitmask protocol and logits processor.

mod common;

use std::sync::Arc;

use bridle_core::{apply_token_bitmask, BridleError, RequestType, TokenId};
use bridle_runtime::{
    GuidedDecodingBackend, GuidedDecodingConfig, GuidedLogitsProcessor, ReasoningBoundary,
};
use common::MockTokenizer;

const TOKENS: &[&str] = &["</s>", "yes", "no", "y", "es", "<think>", "</think>", "hmm"];
/// Model logits are wider than the tokenizer vocabulary.
const VOCAB_SIZE: usize = 40;

fn backend() -> (MockTokenizer, GuidedDecodingBackend) {
    let tokenizer = MockTokenizer::byte_level(TOKENS)
        .with_special("<think>")
        .with_special("</think>");
    let backend =
        GuidedDecodingBackend::new(&tokenizer, VOCAB_SIZE, GuidedDecodingConfig::default())
            .unwrap();
    (tokenizer, backend)
}

fn allowed(logits: &[f32]) -> Vec<TokenId> {
    logits
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_finite())
        .map(|(i, _)| i as TokenId)
        .collect()
}

// ===== Backend =====

#[test]
fn test_zero_vocab_size_rejected() {
    let tokenizer = MockTokenizer::byte_level(TOKENS);
    let err = GuidedDecodingBackend::new(&tokenizer, 0, GuidedDecodingConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, BridleError::Configuration(_)));
}

#[test]
fn test_request_validation() {
    let (_, backend) = backend();
    assert!(backend.validate_request(RequestType::Regex, "(yes|no)").is_ok());
    assert!(matches!(
        backend.validate_request(RequestType::Regex, "^yes"),
        Err(BridleError::Certification(_))
    ));
    assert!(matches!(
        backend.validate_request(RequestType::Json, "{not json"),
        Err(BridleError::GrammarSpecification(_))
    ));
    assert!(matches!(
        backend.validate_request(RequestType::Grammar, "root ::= x"),
        Err(BridleError::GrammarSpecification(_))
    ));
}

#[test]
fn test_fill_only_touches_own_row() {
    let (tok, backend) = backend();
    let grammar = backend
        .compile_request(RequestType::Choice, r#"["yes", "no"]"#)
        .unwrap();

    let mut bitmask = backend.allocate_bitmask(4);
    assert_eq!(bitmask.words_per_row(), 2);
    grammar.fill_bitmask(&mut bitmask, 2);

    assert_eq!(bitmask.allowed_tokens(2), tok.ids(&["yes", "no", "y"]));
    for row in [0, 1, 3] {
        assert_eq!(bitmask.row(row), &[u32::MAX, u32::MAX]);
    }

    let mut logits = vec![0.0f32; 4 * VOCAB_SIZE];
    apply_token_bitmask(&mut logits, VOCAB_SIZE, &bitmask, Some(&[2]));
    assert_eq!(
        allowed(&logits[2 * VOCAB_SIZE..3 * VOCAB_SIZE]),
        tok.ids(&["yes", "no", "y"])
    );
    assert!(logits[..2 * VOCAB_SIZE].iter().all(|l| *l == 0.0));
    assert!(logits[3 * VOCAB_SIZE..].iter().all(|l| *l == 0.0));
}

#[test]
fn test_grammar_drives_to_termination() {
    let (tok, backend) = backend();
    let mut grammar = backend
        .compile_request(RequestType::Choice, r#"["yes", "no"]"#)
        .unwrap();

    assert!(grammar.accept_tokens(&tok.ids(&["y", "es"])));
    assert_eq!(grammar.num_processed_tokens(), 2);
    assert!(!grammar.is_terminated());

    let mut bitmask = backend.allocate_bitmask(1);
    grammar.fill_bitmask(&mut bitmask, 0);
    assert_eq!(bitmask.allowed_tokens(0), vec![0]);

    assert!(grammar.accept_tokens(&[0]));
    assert!(grammar.is_terminated());

    grammar.reset();
    assert_eq!(grammar.num_processed_tokens(), 0);
    assert_eq!(grammar.validate_tokens(&tok.ids(&["no", "yes"])), tok.ids(&["no"]));
}

#[test]
fn test_out_of_range_row_is_ignored() {
    let (_, backend) = backend();
    let grammar = backend.compile_request(RequestType::Regex, "yes").unwrap();
    let mut bitmask = backend.allocate_bitmask(1);
    grammar.fill_bitmask(&mut bitmask, 5);
    assert_eq!(bitmask.row(0), &[u32::MAX, u32::MAX]);
}

#[test]
fn test_backends_share_a_compiler() {
    let (tok, first) = backend();
    let second = GuidedDecodingBackend::with_compiler(
        Arc::clone(first.compiler()),
        &tok,
        VOCAB_SIZE,
        GuidedDecodingConfig::default(),
    )
    .unwrap();

    first.compile_request(RequestType::Regex, "yes").unwrap();
    second.compile_request(RequestType::Regex, "yes").unwrap();
    assert_eq!(first.compiler().stats().hits, 1);
    assert!(Arc::ptr_eq(first.vocabulary(), second.vocabulary()));
}

// ===== Logits processor =====

struct ThinkTags {
    end: TokenId,
}

impl ReasoningBoundary for ThinkTags {
    fn is_reasoning_end(&self, token_ids: &[TokenId]) -> bool {
        token_ids.contains(&self.end)
    }

    fn extract_content(&self, token_ids: &[TokenId]) -> Vec<TokenId> {
        match token_ids.iter().position(|&id| id == self.end) {
            Some(pos) => token_ids[pos + 1..].to_vec(),
            None => Vec::new(),
        }
    }
}

#[test]
fn test_processor_masks_each_step() {
    let (tok, backend) = backend();
    let grammar = backend
        .compile_request(RequestType::Choice, r#"["yes", "no"]"#)
        .unwrap();
    let mut processor = GuidedLogitsProcessor::new(grammar, None);

    let mut logits = vec![1.0f32; VOCAB_SIZE];
    processor.process(&[], &mut logits).unwrap();
    assert_eq!(allowed(&logits), tok.ids(&["yes", "no", "y"]));

    let mut logits = vec![1.0f32; VOCAB_SIZE];
    processor.process(&tok.ids(&["y"]), &mut logits).unwrap();
    assert_eq!(allowed(&logits), tok.ids(&["es"]));

    let mut logits = vec![1.0f32; VOCAB_SIZE];
    processor.process(&tok.ids(&["y", "es"]), &mut logits).unwrap();
    assert_eq!(allowed(&logits), vec![0]);
    assert_eq!(processor.grammar().num_processed_tokens(), 2);
}

#[test]
fn test_processor_follows_host_truncation() {
    let (tok, backend) = backend();
    let grammar = backend
        .compile_request(RequestType::Choice, r#"["yes", "no"]"#)
        .unwrap();
    let mut processor = GuidedLogitsProcessor::new(grammar, None);

    let mut logits = vec![1.0f32; VOCAB_SIZE];
    processor.process(&tok.ids(&["y", "es"]), &mut logits).unwrap();
    let mut logits = vec![1.0f32; VOCAB_SIZE];
    processor.process(&tok.ids(&["y"]), &mut logits).unwrap();
    assert_eq!(allowed(&logits), tok.ids(&["es"]));
    assert_eq!(processor.grammar().num_processed_tokens(), 1);
}

#[test]
fn test_processor_skips_reasoning() {
    let (tok, backend) = backend();
    let grammar = backend
        .compile_request(RequestType::Choice, r#"["yes", "no"]"#)
        .unwrap();
    let reasoner: Arc<dyn ReasoningBoundary> = Arc::new(ThinkTags {
        end: tok.id_of("</think>"),
    });
    let mut processor = GuidedLogitsProcessor::new(grammar, Some(reasoner));

    let thinking = tok.ids(&["<think>", "hmm", "hmm"]);
    let mut logits = vec![1.0f32; VOCAB_SIZE];
    processor.process(&thinking, &mut logits).unwrap();
    assert!(logits.iter().all(|l| *l == 1.0));

    let answered = tok.ids(&["<think>", "hmm", "</think>", "no"]);
    let mut logits = vec![1.0f32; VOCAB_SIZE];
    processor.process(&answered, &mut logits).unwrap();
    assert_eq!(allowed(&logits), vec![0]);
    assert_eq!(processor.grammar().num_processed_tokens(), 1);
}

#[test]
fn test_processor_rejection_then_truncation_stays_in_sync() {
    let (tok, backend) = backend();
    let grammar = backend
        .compile_request(RequestType::Choice, r#"["yes", "no"]"#)
        .unwrap();
    let mut processor = GuidedLogitsProcessor::new(grammar, None);

    let mut logits = vec![1.0f32; VOCAB_SIZE];
    processor.process(&tok.ids(&["y"]), &mut logits).unwrap();
    assert_eq!(allowed(&logits), tok.ids(&["es"]));

    let mut logits = vec![1.0f32; VOCAB_SIZE];
    let err = processor
        .process(&tok.ids(&["y", "no"]), &mut logits)
        .unwrap_err();
    assert!(matches!(
        err,
        BridleError::TokenRejected { token_id, consumed: 1 } if token_id == tok.id_of("no")
    ));
    assert!(logits.iter().all(|l| *l == 1.0));
    assert_eq!(processor.grammar().num_processed_tokens(), 1);

    // The host drops the rejected token and asks again.
    let mut logits = vec![1.0f32; VOCAB_SIZE];
    processor.process(&tok.ids(&["y"]), &mut logits).unwrap();
    assert_eq!(allowed(&logits), tok.ids(&["es"]));
    assert_eq!(processor.grammar().num_processed_tokens(), 1);
}

#[test]
fn test_processor_keeps_accepted_prefix_of_a_rejected_batch() {
    let (tok, backend) = backend();
    let grammar = backend
        .compile_request(RequestType::Choice, r#"["yes", "no"]"#)
        .unwrap();
    let mut processor = GuidedLogitsProcessor::new(grammar, None);

    let mut logits = vec![1.0f32; VOCAB_SIZE];
    let err = processor
        .process(&tok.ids(&["y", "y"]), &mut logits)
        .unwrap_err();
    assert!(matches!(err, BridleError::TokenRejected { consumed: 1, .. }));

    let mut logits = vec![1.0f32; VOCAB_SIZE];
    processor.process(&tok.ids(&["y", "es"]), &mut logits).unwrap();
    assert_eq!(allowed(&logits), vec![0]);
    assert_eq!(processor.grammar().num_processed_tokens(), 2);
}
