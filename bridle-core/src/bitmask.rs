//! Packed allowed-token bitmask shared by a batch of guided sequences.
//!
//! One row per sequence, `ceil(vocab_size / 32)` words per row. A set bit
//! means the token is allowed. Rows start out all-allowed so sequences that
//! are not under grammar control pass through unmasked.

use crate::types::TokenId;

pub fn words_per_row(vocab_size: usize) -> usize {
    vocab_size.div_ceil(32)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBitmask {
    data: Vec<u32>,
    rows: usize,
    words_per_row: usize,
    vocab_size: usize,
}

impl TokenBitmask {
    /// Allocate `rows` rows with every token allowed.
    pub fn new(rows: usize, vocab_size: usize) -> Self {
        let words_per_row = words_per_row(vocab_size);
        Self {
            data: vec![u32::MAX; rows * words_per_row],
            rows,
            words_per_row,
            vocab_size,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn words_per_row(&self) -> usize {
        self.words_per_row
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn row(&self, row: usize) -> &[u32] {
        let start = row * self.words_per_row;
        &self.data[start..start + self.words_per_row]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [u32] {
        let start = row * self.words_per_row;
        &mut self.data[start..start + self.words_per_row]
    }

    /// Reset every row to all-allowed, ready for the next decoding step.
    pub fn fill_allowed(&mut self) {
        self.data.fill(u32::MAX);
    }

    pub fn is_allowed(&self, row: usize, token_id: TokenId) -> bool {
        let idx = token_id as usize;
        if idx >= self.vocab_size {
            return false;
        }
        self.row(row)[idx / 32] & (1 << (idx % 32)) != 0
    }

    /// Token ids allowed in `row`, ascending.
    pub fn allowed_tokens(&self, row: usize) -> Vec<TokenId> {
        (0..self.vocab_size as TokenId)
            .filter(|&id| self.is_allowed(row, id))
            .collect()
    }

    /// Force every disallowed logit in `logits` to `-inf`. Logits past the
    /// vocabulary covered by the mask are left untouched.
    pub fn apply_to_logits(&self, row: usize, logits: &mut [f32]) {
        let mask = self.row(row);
        let covered = logits.len().min(self.vocab_size);
        for (i, logit) in logits[..covered].iter_mut().enumerate() {
            if mask[i / 32] & (1 << (i % 32)) == 0 {
                *logit = f32::NEG_INFINITY;
            }
        }
    }
}

/// Apply `bitmask` to a flattened `[batch, vocab_size]` logits buffer.
///
/// `rows` selects which batch rows to mask; `None` masks every row the
/// bitmask covers. Row `i` of the logits uses row `i` of the bitmask.
pub fn apply_token_bitmask(
    logits: &mut [f32],
    vocab_size: usize,
    bitmask: &TokenBitmask,
    rows: Option<&[usize]>,
) {
    if vocab_size == 0 {
        return;
    }
    let batch = (logits.len() / vocab_size).min(bitmask.rows());
    let mut apply_row = |row: usize| {
        if row < batch {
            let slice = &mut logits[row * vocab_size..(row + 1) * vocab_size];
            bitmask.apply_to_logits(row, slice);
        }
    };
    match rows {
        Some(rows) => rows.iter().copied().for_each(&mut apply_row),
        None => (0..batch).for_each(apply_row),
    }
}
