use std::collections::HashSet;
use std::path::Path;

use bridle_core::{BridleError, RawToken, Result, TokenId, TokenizerSource};
use tokenizers::Tokenizer as HfTokenizer;

/// A HuggingFace `tokenizer.json` as a guided-decoding tokenizer source.
pub struct HfTokenizerSource {
    inner: HfTokenizer,
    eos_token_id: Option<TokenId>,
    special_tokens: HashSet<String>,
    identity: String,
}

impl HfTokenizerSource {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let inner = HfTokenizer::from_bytes(&bytes).map_err(|e| {
            BridleError::Configuration(format!("cannot load {}: {e}", path.display()))
        })?;

        // tokenizer_config.json next to the tokenizer is the most reliable
        // source of the EOS token.
        let config_eos = path.parent().and_then(|dir| {
            let text = std::fs::read_to_string(dir.join("tokenizer_config.json")).ok()?;
            let value: serde_json::Value = serde_json::from_str(&text).ok()?;
            eos_from_config(&value, |token| inner.token_to_id(token))
        });
        let eos_token_id = config_eos
            .or_else(|| inner.token_to_id("</s>"))
            .or_else(|| inner.token_to_id("<|endoftext|>"))
            .or_else(|| inner.token_to_id("<|im_end|>"))
            .or_else(|| inner.token_to_id("<|eot_id|>"));

        let special_tokens = inner
            .get_added_tokens_decoder()
            .into_values()
            .filter(|token| token.special)
            .map(|token| token.content)
            .collect();

        Ok(Self {
            inner,
            eos_token_id,
            special_tokens,
            identity: blake3::hash(&bytes).to_hex().to_string(),
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

/// EOS id from a parsed `tokenizer_config.json`: numeric `eos_token_id`
/// first, then the `eos_token` string (plain or `{"content": ...}`).
pub fn eos_from_config(
    config: &serde_json::Value,
    token_to_id: impl Fn(&str) -> Option<TokenId>,
) -> Option<TokenId> {
    if let Some(id) = config.get("eos_token_id").and_then(|v| v.as_u64()) {
        return TokenId::try_from(id).ok();
    }
    let eos = config.get("eos_token")?;
    let content = eos
        .as_str()
        .or_else(|| eos.get("content").and_then(|c| c.as_str()))?;
    token_to_id(content)
}

impl TokenizerSource for HfTokenizerSource {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    fn eos_token_id(&self) -> Option<TokenId> {
        self.eos_token_id
    }

    fn vocabulary(&self) -> Option<Vec<(RawToken, TokenId)>> {
        let mut entries: Vec<(RawToken, TokenId)> = self
            .inner
            .get_vocab(true)
            .into_iter()
            .map(|(token, id)| (RawToken::Text(token), id))
            .collect();
        entries.sort_by_key(|(_, id)| *id);
        Some(entries)
    }

    fn is_special(&self, token: &RawToken) -> bool {
        match token {
            RawToken::Text(text) => self.special_tokens.contains(text),
            RawToken::Bytes(_) => false,
        }
    }

    fn decode_token(&self, token: &RawToken, token_id: TokenId) -> String {
        match self.inner.decode(&[token_id], false) {
            Ok(text) => text,
            Err(_) => match token {
                RawToken::Text(text) => text.clone(),
                RawToken::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            },
        }
    }
}
