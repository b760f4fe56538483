//! Sentence-aware text chunking.
//!
//! Splits cleaned text on sentence boundaries (`.`, `!`, `?` followed by
//! whitespace) and greedily packs sentences into size-bounded chunks. A
//! fixed-size character tail of each emitted chunk is prepended to the
//! next one so context carries across chunk boundaries.

use std::sync::OnceLock;

use regex::Regex;

static SENTENCE_BOUNDARY: OnceLock<Regex> = OnceLock::new();

fn boundary() -> &'static Regex {
    SENTENCE_BOUNDARY.get_or_init(|| Regex::new(r"[.!?]\s+").expect("static sentence regex"))
}

/// Collapse all runs of whitespace into single spaces.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into sentences, keeping terminal punctuation.
///
/// The final fragment is returned even without a terminator.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut last = 0;
    for m in boundary().find_iter(text) {
        // The matched punctuation character is one byte, so +1 stays on
        // a char boundary.
        sentences.push(text[last..m.start() + 1].trim());
        last = m.end();
    }
    let rest = text[last..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Split text into overlapping, size-bounded chunks.
///
/// Sentences are accumulated while the buffer stays within `chunk_size`
/// characters. On overflow the buffer is emitted and its last `overlap`
/// characters seed the next buffer. A single sentence longer than
/// `chunk_size` still becomes its own chunk; the final partial buffer is
/// never dropped.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();

    for sentence in split_sentences(text) {
        if buffer.len() + sentence.len() <= chunk_size {
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(sentence);
        } else {
            let trimmed = buffer.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
            let tail = char_tail(&buffer, overlap);
            buffer = if tail.is_empty() {
                sentence.to_string()
            } else {
                format!("{} {}", tail, sentence)
            };
        }
    }

    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }

    chunks
}

/// Last `n` characters of `s`, respecting char boundaries.
fn char_tail(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let start = s
        .char_indices()
        .rev()
        .take(n)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}
