//! Token-safe segmentation of retrieved passages.
//!
//! Re-splits any text into windows of at most `max_tokens` tokens of
//! the generator's own tokenizer, so no context segment can exceed the
//! generation budget no matter how large a retrieved passage is. Used
//! only when assembling generation context.

use crate::models::Tokenizer;

/// Split `text` into contiguous windows of at most `max_tokens` tokens,
/// decoded back to text. Empty text yields no segments.
pub fn segment(text: &str, max_tokens: usize, tokenizer: &dyn Tokenizer) -> Vec<String> {
    let ids = tokenizer.encode(text);
    if ids.is_empty() {
        return Vec::new();
    }

    ids.chunks(max_tokens.max(1))
        .map(|window| tokenizer.decode(window))
        .collect()
}
