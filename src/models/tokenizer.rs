//! Tokenizer collaborator, used only for token-budget segmentation.

use std::collections::HashMap;
use std::sync::Mutex;

/// Encode/decode contract of the generator's tokenizer.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;
    fn decode(&self, ids: &[u32]) -> String;
}

/// Whitespace tokenizer with an interior vocabulary so decode inverts
/// encode. A conservative stand-in for the real generator tokenizer:
/// word counts over-estimate nothing, so segments stay within budget.
#[derive(Debug, Default)]
pub struct WordTokenizer {
    vocab: Mutex<Vocab>,
}

#[derive(Debug, Default)]
struct Vocab {
    ids: HashMap<String, u32>,
    words: Vec<String>,
}

impl WordTokenizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tokenizer for WordTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        let mut vocab = self.vocab.lock().unwrap_or_else(|e| e.into_inner());
        text.split_whitespace()
            .map(|word| match vocab.ids.get(word) {
                Some(&id) => id,
                None => {
                    let id = vocab.words.len() as u32;
                    vocab.ids.insert(word.to_string(), id);
                    vocab.words.push(word.to_string());
                    id
                }
            })
            .collect()
    }

    fn decode(&self, ids: &[u32]) -> String {
        let vocab = self.vocab.lock().unwrap_or_else(|e| e.into_inner());
        ids.iter()
            .filter_map(|&id| vocab.words.get(id as usize).map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
