//! Turns a tokenizer vocabulary into byte-exact canonical strings.
//!
//! Tokenizers store the same bytes in different shapes: GPT-2 style
//! byte-level BPE remaps bytes to printable characters, SentencePiece uses
//! `<0xXX>` byte-fallback tokens, tiktoken keeps raw bytes. All of them are
//! reduced here to one canonical string per byte sequence so the automaton
//! engine sees identical input for identical bytes.

use std::collections::BTreeMap;

use bridle_core::vocabulary::{canonical_from_bytes, canonical_from_text};
use bridle_core::{BridleError, RawToken, Result, TokenId, TokenizerSource, Vocabulary};
use tracing::debug;

/// SentencePiece word-start marker.
const SPIECE_UNDERLINE: char = '\u{2581}';

/// Build the canonical vocabulary of `tokenizer`.
///
/// Fails with `Configuration` if the tokenizer has no EOS id or cannot
/// enumerate its vocabulary.
pub fn build_vocabulary(tokenizer: &dyn TokenizerSource) -> Result<Vocabulary> {
    let eos_token_id = tokenizer.eos_token_id().ok_or_else(|| {
        BridleError::Configuration(format!(
            "tokenizer {} has no EOS token id, but guided decoding requires one",
            tokenizer.identity()
        ))
    })?;
    let entries = tokenizer.vocabulary().ok_or_else(|| {
        BridleError::Configuration(format!(
            "cannot enumerate the vocabulary of tokenizer {}",
            tokenizer.identity()
        ))
    })?;

    let mut tokens: BTreeMap<String, Vec<TokenId>> = BTreeMap::new();
    let mut empty_token_ids = Vec::new();

    for (token, token_id) in &entries {
        if token_id == &eos_token_id {
            continue;
        }
        if tokenizer.is_special(token) {
            empty_token_ids.push(*token_id);
            continue;
        }
        let canonical = canonical_token(tokenizer, token, *token_id)?;
        if canonical.is_empty() {
            empty_token_ids.push(*token_id);
        } else {
            tokens.entry(canonical).or_default().push(*token_id);
        }
    }

    debug!(
        tokenizer = %tokenizer.identity(),
        entries = entries.len(),
        canonical = tokens.len(),
        excluded = empty_token_ids.len(),
        "canonicalized vocabulary"
    );

    Vocabulary::new(eos_token_id, tokens, empty_token_ids)
}

/// Canonical string of a single token. Empty if the token decodes to nothing.
pub fn canonical_token(
    tokenizer: &dyn TokenizerSource,
    token: &RawToken,
    token_id: TokenId,
) -> Result<String> {
    let mut decoded = tokenizer.decode_token(token, token_id);

    // SentencePiece decoders strip the leading space of a word-start token.
    if let RawToken::Text(text) = token {
        if text.starts_with(SPIECE_UNDERLINE) || text == "<0x20>" {
            decoded.insert(0, ' ');
        }
    }

    if decoded.is_empty() {
        return Ok(decoded);
    }

    match token {
        RawToken::Bytes(bytes) => Ok(canonical_from_bytes(bytes)),
        RawToken::Text(text)
            if decoded.contains('\u{FFFD}') && !is_whitespace_placeholder(text) =>
        {
            let bytes = match byte_fallback_value(text) {
                Some(byte) => vec![byte],
                None => text
                    .chars()
                    .map(|c| {
                        tokenizer.char_to_byte(c).ok_or_else(|| {
                            BridleError::Configuration(format!(
                                "cannot convert token `{text}` ({token_id}) to bytes: {decoded}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<u8>>>()?,
            };
            Ok(canonical_from_bytes(&bytes))
        }
        RawToken::Text(_) => Ok(canonical_from_text(&decoded)),
    }
}

/// Byte value of a SentencePiece byte-fallback token such as `<0xE2>`.
fn byte_fallback_value(token: &str) -> Option<u8> {
    let hex = token.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 || !hex.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b)) {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

/// Tokens shaped like `▁* +\.*` decode to replacement characters on some
/// tokenizers but are real whitespace; they are kept as decoded.
fn is_whitespace_placeholder(token: &str) -> bool {
    let rest = token.trim_start_matches(SPIECE_UNDERLINE);
    let after_spaces = rest.trim_start_matches(' ');
    after_spaces.len() < rest.len() && after_spaces.chars().all(|c| c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_fallback_value() {
        assert_eq!(byte_fallback_value("<0x0A>"), Some(0x0A));
        assert_eq!(byte_fallback_value("<0xE2>"), Some(0xE2));
        assert_eq!(byte_fallback_value("<0xe2>"), None);
        assert_eq!(byte_fallback_value("<0x123>"), None);
        assert_eq!(byte_fallback_value("0xE2"), None);
    }

    #[test]
    fn test_whitespace_placeholder() {
        assert!(is_whitespace_placeholder(" "));
        assert!(is_whitespace_placeholder("\u{2581}\u{2581}  .."));
        assert!(!is_whitespace_placeholder("\u{2581}"));
        assert!(!is_whitespace_placeholder(" a"));
        assert!(!is_whitespace_placeholder(".."));
    }
}
