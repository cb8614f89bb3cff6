//! The tokenizer collaborator consumed by vocabulary canonicalization.

use crate::types::TokenId;

/// A surface token as the tokenizer stores it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawToken {
    /// Printable token text, e.g. `Ġhello`, `▁the` or `<0x0A>`.
    Text(String),
    /// Raw byte token (tiktoken-style vocabularies).
    Bytes(Vec<u8>),
}

/// What grammar-guided decoding needs from a tokenizer.
pub trait TokenizerSource: Send + Sync {
    /// Stable identity used to key the per-tokenizer vocabulary cache.
    fn identity(&self) -> String;

    fn eos_token_id(&self) -> Option<TokenId>;

    /// All `(token, id)` pairs, or `None` if the tokenizer cannot enumerate
    /// its vocabulary.
    fn vocabulary(&self) -> Option<Vec<(RawToken, TokenId)>>;

    fn is_special(&self, token: &RawToken) -> bool;

    /// Printable string a single token decodes to.
    fn decode_token(&self, token: &RawToken, token_id: TokenId) -> String;

    /// Inverse of the byte-to-printable-character table of byte-level BPE.
    fn char_to_byte(&self, c: char) -> Option<u8> {
        gpt2_char_to_byte(c)
    }
}

/// Bytes that the GPT-2 byte-level table maps to themselves.
const fn is_direct_byte(b: u8) -> bool {
    matches!(b, 0x21..=0x7E | 0xA1..=0xAC | 0xAE..=0xFF)
}

const fn build_byte_to_char() -> [char; 256] {
    let mut table = ['\0'; 256];
    let mut shifted = 0u32;
    let mut b = 0usize;
    while b < 256 {
        let code = if is_direct_byte(b as u8) {
            b as u32
        } else {
            shifted += 1;
            255 + shifted
        };
        table[b] = match char::from_u32(code) {
            Some(c) => c,
            None => '\0',
        };
        b += 1;
    }
    table
}

static BYTE_TO_CHAR: [char; 256] = build_byte_to_char();

/// GPT-2 byte-level mapping: byte -> printable char.
pub fn gpt2_byte_to_char(byte: u8) -> char {
    BYTE_TO_CHAR[byte as usize]
}

/// GPT-2 byte-level mapping: printable char -> byte.
pub fn gpt2_char_to_byte(c: char) -> Option<u8> {
    let code = c as u32;
    if code < 256 && is_direct_byte(code as u8) {
        return Some(code as u8);
    }
    // Non-direct bytes occupy U+0100.. in ascending byte order.
    let offset = code.checked_sub(256)? as usize;
    (0..=255u8).filter(|b| !is_direct_byte(*b)).nth(offset)
}
