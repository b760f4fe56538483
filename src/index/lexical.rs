//! Lexical BM25 index, rebuilt on demand over a passage corpus.
//!
//! Scoring uses the Okapi BM25 formula:
//!
//! ```text
//! score = sum over query terms of:
//!   IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl / avgdl))
//! IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1.0)
//! ```

use std::collections::HashMap;

/// BM25 parameters.
const K1: f32 = 1.5;
const B: f32 = 0.75;

/// Whitespace tokenization, lowercased for term matching.
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Positional BM25 index: document *i* is the corpus passage at
/// insertion position *i*.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    /// Per-document term frequencies.
    term_freqs: Vec<HashMap<String, f32>>,
    /// term -> number of documents containing it
    doc_freqs: HashMap<String, usize>,
    doc_lengths: Vec<f32>,
    avg_doc_length: f32,
}

impl Bm25Index {
    /// Build a fresh index over the corpus texts. Rebuilding with the
    /// same texts yields identical scores (idempotent refresh).
    pub fn build<S: AsRef<str>>(texts: &[S]) -> Self {
        let mut term_freqs = Vec::with_capacity(texts.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(texts.len());

        for text in texts {
            let tokens = tokenize(text.as_ref());
            doc_lengths.push(tokens.len() as f32);

            let mut tf: HashMap<String, f32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0.0) += 1.0;
            }
            for term in tf.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(tf);
        }

        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<f32>() / doc_lengths.len() as f32
        };

        Self {
            term_freqs,
            doc_freqs,
            doc_lengths,
            avg_doc_length,
        }
    }

    pub fn len(&self) -> usize {
        self.term_freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.term_freqs.is_empty()
    }

    /// BM25 score of every document against the query, in corpus order.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let query_terms = tokenize(query);
        let n = self.len() as f32;
        let mut scores = vec![0.0f32; self.len()];

        if self.is_empty() || query_terms.is_empty() {
            return scores;
        }

        for term in &query_terms {
            let Some(&df) = self.doc_freqs.get(term) else {
                continue;
            };
            let idf = ((n - df as f32 + 0.5) / (df as f32 + 0.5) + 1.0).ln();

            for (i, tf_map) in self.term_freqs.iter().enumerate() {
                let Some(&tf) = tf_map.get(term) else {
                    continue;
                };
                let dl = self.doc_lengths[i];
                let norm = K1 * (1.0 - B + B * dl / self.avg_doc_length.max(1e-6));
                scores[i] += idf * (tf * (K1 + 1.0)) / (tf + norm);
            }
        }

        scores
    }

    /// Indices of the `top_k` highest-scoring documents, descending by
    /// score; ties keep insertion order (stable sort).
    pub fn top_k(&self, query: &str, top_k: usize) -> Vec<usize> {
        let scores = self.scores(query);
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        order.truncate(top_k);
        order
    }
}
