//! In-memory tokenizers for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use bridle_core::tokenizer::gpt2_char_to_byte;
use bridle_core::{RawToken, TokenId, TokenizerSource};

#[derive(Debug, Clone, Copy)]
pub enum Family {
    /// GPT-2 style: every byte is remapped to a printable character.
    ByteLevel,
    /// `▁` marks word starts, `<0xXX>` marks byte-fallback tokens.
    SentencePiece,
}

pub struct MockTokenizer {
    family: Family,
    entries: Vec<(RawToken, TokenId)>,
    eos_token_id: Option<TokenId>,
    special: HashSet<String>,
    decoded: HashMap<String, String>,
    enumerable: bool,
}

impl MockTokenizer {
    /// Tokens get ids in order. `</s>` is the EOS token when present.
    pub fn new(family: Family, tokens: &[&str]) -> Self {
        let entries: Vec<(RawToken, TokenId)> = tokens
            .iter()
            .enumerate()
            .map(|(id, t)| (RawToken::Text(t.to_string()), id as TokenId))
            .collect();
        let eos_token_id = tokens.iter().position(|t| *t == "</s>").map(|i| i as TokenId);
        Self {
            family,
            entries,
            eos_token_id,
            special: HashSet::new(),
            decoded: HashMap::new(),
            enumerable: true,
        }
    }

    pub fn byte_level(tokens: &[&str]) -> Self {
        Self::new(Family::ByteLevel, tokens)
    }

    pub fn sentencepiece(tokens: &[&str]) -> Self {
        Self::new(Family::SentencePiece, tokens)
    }

    /// Append a raw byte token with the next free id.
    pub fn with_bytes(mut self, bytes: &[u8]) -> Self {
        let id = self.entries.len() as TokenId;
        self.entries.push((RawToken::Bytes(bytes.to_vec()), id));
        self
    }

    pub fn with_special(mut self, token: &str) -> Self {
        self.special.insert(token.to_string());
        self
    }

    /// Force what a single-token decode of `token` returns.
    pub fn with_decoded(mut self, token: &str, decoded: &str) -> Self {
        self.decoded.insert(token.to_string(), decoded.to_string());
        self
    }

    pub fn with_eos(mut self, eos: Option<TokenId>) -> Self {
        self.eos_token_id = eos;
        self
    }

    pub fn without_enumeration(mut self) -> Self {
        self.enumerable = false;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn id_of(&self, token: &str) -> TokenId {
        self.entries
            .iter()
            .find(|(t, _)| *t == RawToken::Text(token.to_string()))
            .map(|(_, id)| *id)
            .unwrap_or_else(|| panic!("no token {token:?}"))
    }

    /// Ids of a sequence of token strings.
    pub fn ids(&self, tokens: &[&str]) -> Vec<TokenId> {
        tokens.iter().map(|t| self.id_of(t)).collect()
    }
}

fn sentencepiece_byte(text: &str) -> Option<u8> {
    let hex = text.strip_prefix("<0x")?.strip_suffix('>')?;
    u8::from_str_radix(hex, 16).ok()
}

impl TokenizerSource for MockTokenizer {
    fn identity(&self) -> String {
        let names: Vec<String> = self.entries.iter().map(|(t, id)| format!("{t:?}={id}")).collect();
        format!("{:?}:{:?}:{}", self.family, self.eos_token_id, names.join(","))
    }

    fn eos_token_id(&self) -> Option<TokenId> {
        self.eos_token_id
    }

    fn vocabulary(&self) -> Option<Vec<(RawToken, TokenId)>> {
        self.enumerable.then(|| self.entries.clone())
    }

    fn is_special(&self, token: &RawToken) -> bool {
        matches!(token, RawToken::Text(t) if self.special.contains(t))
    }

    fn decode_token(&self, token: &RawToken, _token_id: TokenId) -> String {
        let text = match token {
            RawToken::Bytes(bytes) => return String::from_utf8_lossy(bytes).into_owned(),
            RawToken::Text(text) => text,
        };
        if let Some(decoded) = self.decoded.get(text) {
            return decoded.clone();
        }
        if self.special.contains(text) || text == "</s>" {
            return text.clone();
        }
        match self.family {
            Family::ByteLevel => {
                let bytes: Vec<u8> = text
                    .chars()
                    .flat_map(|c| match gpt2_char_to_byte(c) {
                        Some(b) => vec![b],
                        None => c.to_string().into_bytes(),
                    })
                    .collect();
                String::from_utf8_lossy(&bytes).into_owned()
            }
            Family::SentencePiece => {
                let decoded = match sentencepiece_byte(text) {
                    Some(byte) => String::from_utf8_lossy(&[byte]).into_owned(),
                    None => text.replace('\u{2581}', " "),
                };
                // Single-token decoding drops the word-start space.
                decoded.strip_prefix(' ').map(str::to_string).unwrap_or(decoded)
            }
        }
    }
}
