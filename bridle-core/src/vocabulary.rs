//! Canonical vocabulary shared by every grammar compiled for one tokenizer.

use std::collections::{BTreeMap, HashSet};

use crate::error::{BridleError, Result};
use crate::types::TokenId;

/// Escape symbol prefix for a raw byte that is not part of valid UTF-8.
pub const BYTE_ESCAPE: char = '\0';

/// Mapping from canonical token strings to the ids that decode to them.
///
/// Immutable once built. The EOS id never appears in a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    eos_token_id: TokenId,
    tokens: BTreeMap<String, Vec<TokenId>>,
    empty_token_ids: Vec<TokenId>,
    hash: String,
}

impl Vocabulary {
    pub fn new(
        eos_token_id: TokenId,
        tokens: BTreeMap<String, Vec<TokenId>>,
        empty_token_ids: Vec<TokenId>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for (token, ids) in &tokens {
            if token.is_empty() {
                return Err(BridleError::Configuration(format!(
                    "empty canonical string maps to ids {ids:?}"
                )));
            }
            for &id in ids {
                if id == eos_token_id {
                    return Err(BridleError::Configuration(format!(
                        "EOS token {id} must not be part of the vocabulary mapping"
                    )));
                }
                if !seen.insert(id) {
                    return Err(BridleError::Configuration(format!(
                        "token id {id} appears in more than one canonical string"
                    )));
                }
            }
        }

        let hash = content_hash(eos_token_id, &tokens);
        Ok(Self {
            eos_token_id,
            tokens,
            empty_token_ids,
            hash,
        })
    }

    pub fn eos_token_id(&self) -> TokenId {
        self.eos_token_id
    }

    /// Canonical string -> equivalent token ids, in vocabulary order.
    pub fn tokens(&self) -> &BTreeMap<String, Vec<TokenId>> {
        &self.tokens
    }

    pub fn token_ids(&self, token: &str) -> Option<&[TokenId]> {
        self.tokens.get(token).map(|v| v.as_slice())
    }

    /// Ids excluded because they decode to nothing (or are special tokens).
    pub fn empty_token_ids(&self) -> &[TokenId] {
        &self.empty_token_ids
    }

    /// Stable content hash, hex encoded. Part of every cache key.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn content_hash(eos_token_id: TokenId, tokens: &BTreeMap<String, Vec<TokenId>>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&eos_token_id.to_le_bytes());
    for (token, ids) in tokens {
        hasher.update(&(token.len() as u64).to_le_bytes());
        hasher.update(token.as_bytes());
        hasher.update(&(ids.len() as u64).to_le_bytes());
        for id in ids {
            hasher.update(&id.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Canonical symbol for one byte: ASCII other than NUL stays as-is,
/// anything else becomes `\0` followed by two uppercase hex digits.
pub fn byte_symbol(byte: u8) -> String {
    if byte < 0x80 && byte != 0 {
        (byte as char).to_string()
    } else {
        format!("{BYTE_ESCAPE}{byte:02X}")
    }
}

/// Canonical string for a byte sequence. Valid UTF-8 is kept as text so the
/// same bytes canonicalize identically whatever form the tokenizer stored.
pub fn canonical_from_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => canonical_from_text(s),
        Err(_) => bytes.iter().map(|&b| byte_symbol(b)).collect(),
    }
}

/// Canonical string for decoded text. A literal NUL is written as `\000` so
/// it cannot be read back as the start of a byte escape.
pub fn canonical_from_text(text: &str) -> String {
    if text.contains(BYTE_ESCAPE) {
        text.replace(BYTE_ESCAPE, &byte_symbol(0))
    } else {
        text.to_string()
    }
}

/// Raw bytes a canonical string stands for (inverse of the escape scheme).
pub fn canonical_to_bytes(token: &str) -> Vec<u8> {
    let chars: Vec<char> = token.chars().collect();
    let mut out = Vec::with_capacity(token.len());
    let mut i = 0;
    while i < chars.len() {
        let escaped = match (chars[i], chars.get(i + 1), chars.get(i + 2)) {
            (BYTE_ESCAPE, Some(hi), Some(lo)) => hi
                .to_digit(16)
                .zip(lo.to_digit(16))
                .map(|(hi, lo)| (hi * 16 + lo) as u8),
            _ => None,
        };
        match escaped {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(chars[i].encode_utf8(&mut buf).as_bytes());
                i += 1;
            }
        }
    }
    out
}
