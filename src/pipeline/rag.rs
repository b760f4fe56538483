//! The main retrieval orchestrator.
//!
//! Owns the two corpora (user + db), their lexical indices, the answer
//! cache and the injected model collaborators. Both the direct answer
//! path and the HyDE path live here; the graph-restricted variant wraps
//! this pipeline (see [`crate::pipeline::graph_rag`]).

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{sha256_hex, AnswerCache, Fingerprint};
use crate::chunker;
use crate::config::{AnswerOptions, Method, PipelineConfig, SourceKind, EMBEDDING_DIM};
use crate::error::Result;
use crate::index::{Bm25Index, EmbeddingIndex, Passage};
use crate::models::{Embedder, Generator, Reranker, SamplingParams, Tokenizer};
use crate::segmenter;

/// Terminal answer when retrieval finds nothing. Not an error.
pub const NO_CONTEXT_ANSWER: &str = "No information found in the selected sources.";

/// How many retrieved passages make it into the prompt.
const PROMPT_PASSAGE_LIMIT: usize = 3;

/// Per-source corpus stats, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusStats {
    pub user_passages: usize,
    pub db_passages: usize,
}

/// Retrieval + generation orchestrator over the user and db corpora.
///
/// Explicitly owned: construct one per session with injected
/// collaborators, no process-wide state. Calls are synchronous
/// request-per-call; concurrent use of one instance must be serialized
/// by the caller.
pub struct RagPipeline {
    config: PipelineConfig,
    user_index: EmbeddingIndex,
    db_index: EmbeddingIndex,
    user_lexical: Option<Bm25Index>,
    db_lexical: Option<Bm25Index>,
    cache: AnswerCache,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    reranker: Option<Arc<dyn Reranker>>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl RagPipeline {
    /// Create a pipeline, loading both corpus snapshots when present.
    pub fn new(
        config: PipelineConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        let mut user_index = EmbeddingIndex::with_persist(EMBEDDING_DIM, &config.user_store);
        user_index.load()?;
        let mut db_index = EmbeddingIndex::with_persist(EMBEDDING_DIM, &config.db_store);
        db_index.load()?;

        let cache = AnswerCache::new(&config.cache_file);

        let mut pipeline = Self {
            config,
            user_index,
            db_index,
            user_lexical: None,
            db_lexical: None,
            cache,
            embedder,
            generator,
            reranker: None,
            tokenizer,
        };
        if pipeline.config.use_bm25 {
            pipeline.refresh_lexical();
        }
        Ok(pipeline)
    }

    /// Attach a reranker (builder style).
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn set_use_bm25(&mut self, use_bm25: bool) {
        self.config.use_bm25 = use_bm25;
        if use_bm25 {
            self.refresh_lexical();
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn index(&self, source: SourceKind) -> &EmbeddingIndex {
        match source {
            SourceKind::User => &self.user_index,
            SourceKind::Db => &self.db_index,
        }
    }

    fn lexical(&self, source: SourceKind) -> Option<&Bm25Index> {
        match source {
            SourceKind::User => self.user_lexical.as_ref(),
            SourceKind::Db => self.db_lexical.as_ref(),
        }
    }

    /// Clean, chunk and index a document into one corpus. Returns the
    /// number of chunks added. Lexical indices are refreshed when BM25
    /// is active.
    pub async fn add_document(
        &mut self,
        source: SourceKind,
        doc_name: &str,
        text: &str,
    ) -> Result<usize> {
        let cleaned = chunker::clean_text(text);
        let chunks = chunker::chunk(&cleaned, self.config.chunk_size, self.config.chunk_overlap);
        let count = chunks.len();
        if count == 0 {
            return Ok(0);
        }

        let passages: Vec<Passage> = chunks
            .into_iter()
            .map(|chunk| Passage::new(chunk, doc_name))
            .collect();

        match source {
            SourceKind::User => self.user_index.add(passages, &self.embedder).await?,
            SourceKind::Db => self.db_index.add(passages, &self.embedder).await?,
        }
        if self.config.use_bm25 {
            self.refresh_lexical();
        }

        info!("Indexed '{}' into {} chunks ({})", doc_name, count, source);
        Ok(count)
    }

    /// Persist one corpus snapshot.
    pub fn save(&self, source: SourceKind) -> Result<()> {
        self.index(source).save()
    }

    /// Rebuild the per-corpus BM25 indices from current passages.
    /// Idempotent for unchanged corpora.
    pub fn refresh_lexical(&mut self) {
        let user_texts: Vec<&str> = self
            .user_index
            .passages()
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        let db_texts: Vec<&str> = self
            .db_index
            .passages()
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        self.user_lexical = Some(Bm25Index::build(&user_texts));
        self.db_lexical = Some(Bm25Index::build(&db_texts));
        debug!(
            "Lexical indices refreshed: {} user, {} db passages",
            user_texts.len(),
            db_texts.len()
        );
    }

    /// Hybrid retrieval across the requested sources, in request order.
    ///
    /// Per source: BM25 ranking when enabled and built, dense search
    /// otherwise. Results are concatenated without cross-source
    /// deduplication (a passage reachable through both corpora appears
    /// twice by design).
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        sources: &[SourceKind],
    ) -> Result<Vec<Passage>> {
        let mut results = Vec::new();
        for &source in sources {
            let index = self.index(source);
            if self.config.use_bm25 {
                if let Some(lexical) = self.lexical(source) {
                    let passages = index.passages();
                    for i in lexical.top_k(query, top_k) {
                        results.push(passages[i].clone());
                    }
                    continue;
                }
            }
            results.extend(index.search(query, top_k, &self.embedder).await?);
        }
        debug!(
            "Retrieved {} candidates for {} sources",
            results.len(),
            sources.len()
        );
        Ok(results)
    }

    /// Rerank candidates down to `top_k`.
    ///
    /// Without a configured reranker (or with no candidates) the first
    /// `top_k` pass through unchanged. With one, candidates are scored
    /// pairwise and sorted by descending score; ties deliberately keep
    /// the original retrieval order.
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<Passage>,
        top_k: usize,
    ) -> Result<Vec<Passage>> {
        let Some(reranker) = &self.reranker else {
            candidates.truncate(top_k);
            return Ok(candidates);
        };
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let mut scored = Vec::with_capacity(candidates.len());
        for (position, candidate) in candidates.into_iter().enumerate() {
            let score = reranker.score(query, &candidate.text).await?;
            scored.push((score, position, candidate));
        }
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(top_k);

        Ok(scored.into_iter().map(|(_, _, p)| p).collect())
    }

    /// Answer a question with direct retrieval-augmented generation.
    pub async fn answer(&self, query: &str, opts: &AnswerOptions) -> Result<String> {
        let fingerprint = self.fingerprint(query, opts, Method::Rag);
        if let Some(cached) = self.cache.get(&fingerprint) {
            return Ok(cached);
        }

        let candidates = self.retrieve(query, opts.top_k, &opts.sources).await?;
        let documents = self.rerank(query, candidates, opts.top_k.max(1)).await?;

        if documents.is_empty() {
            self.cache_answer(&fingerprint, NO_CONTEXT_ANSWER);
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        let answer = self.generate_from_context(query, &documents, opts).await?;
        self.cache_answer(&fingerprint, &answer);
        Ok(answer)
    }

    /// Answer via HyDE: generate a pseudo-answer from the bare
    /// question, retrieve with it, then answer the original question
    /// from the retrieved context. Cached under its own method
    /// namespace, separate from direct RAG answers for the same query.
    pub async fn hyde_answer(
        &self,
        query: &str,
        opts: &AnswerOptions,
        pseudo_max_tokens: usize,
    ) -> Result<String> {
        let fingerprint = self.fingerprint(query, opts, Method::Hyde);
        if let Some(cached) = self.cache.get(&fingerprint) {
            return Ok(cached);
        }

        let pseudo_prompt = format!(
            "Write a short passage that answers the question.\n\nQuestion: {}\nPassage:",
            query
        );
        let pseudo_answer = self
            .generator
            .generate(&pseudo_prompt, pseudo_max_tokens, &sampling(opts))
            .await?;
        debug!("HyDE pseudo-answer: {} chars", pseudo_answer.len());

        let candidates = self
            .retrieve(&pseudo_answer, opts.top_k, &opts.sources)
            .await?;
        let documents = self
            .rerank(&pseudo_answer, candidates, opts.top_k.max(1))
            .await?;

        if documents.is_empty() {
            self.cache_answer(&fingerprint, NO_CONTEXT_ANSWER);
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        let answer = self.generate_from_context(query, &documents, opts).await?;
        self.cache_answer(&fingerprint, &answer);
        Ok(answer)
    }

    /// Build the labeled context prompt and call the generator.
    ///
    /// Each passage is token-safe segmented first, and only the first
    /// `PROMPT_PASSAGE_LIMIT` passages (clamped to their first segment)
    /// enter the prompt, bounding its length no matter how many
    /// passages were retrieved. A passage larger than the segment
    /// budget contributes only its leading segment; the trailing
    /// content is dropped from the prompt.
    pub(crate) async fn generate_from_context(
        &self,
        query: &str,
        documents: &[Passage],
        opts: &AnswerOptions,
    ) -> Result<String> {
        let blocks: Vec<String> = documents
            .iter()
            .take(PROMPT_PASSAGE_LIMIT)
            .map(|passage| {
                let segments = segmenter::segment(
                    &passage.text,
                    self.config.max_segment_tokens,
                    self.tokenizer.as_ref(),
                );
                let body = segments.into_iter().next().unwrap_or_default();
                format!("[{}]\n{}", passage.doc_name(), body)
            })
            .collect();

        if self.config.concat_answers {
            let prompt = build_prompt(&blocks.join("\n\n"), query);
            self.generator
                .generate(&prompt, opts.max_length, &sampling(opts))
                .await
        } else {
            // One generator call per passage, outputs concatenated.
            let mut parts = Vec::with_capacity(blocks.len());
            for block in &blocks {
                let prompt = build_prompt(block, query);
                parts.push(
                    self.generator
                        .generate(&prompt, opts.max_length, &sampling(opts))
                        .await?,
                );
            }
            Ok(parts.join("\n\n"))
        }
    }

    /// Fingerprint of a request, tying the cached answer to the exact
    /// query, settings and current user-corpus state.
    ///
    /// Source order is part of the key: retrieval concatenates
    /// per-source results in requested order, so `[user, db]` and
    /// `[db, user]` can produce different contexts and must not share
    /// a cached answer.
    pub fn fingerprint(&self, query: &str, opts: &AnswerOptions, method: Method) -> Fingerprint {
        let sources: Vec<String> = opts
            .sources
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        Fingerprint {
            query: query.to_string(),
            sources,
            top_k: opts.top_k,
            max_length: opts.max_length,
            temperature: opts.temperature,
            do_sample: opts.do_sample,
            doc_hash: self.doc_hash(),
            method: method.as_str().to_string(),
        }
    }

    /// Hash over the ordered `doc_name` sequence of the user corpus.
    /// Changes whenever documents are added or removed; stable across
    /// calls with an unchanged corpus.
    pub fn doc_hash(&self) -> String {
        sha256_hex(self.user_index.doc_names().join("\n").as_bytes())
    }

    /// Drop all user documents: fresh empty user index, snapshot
    /// directory deleted.
    pub fn clear_user_documents(&mut self) -> Result<()> {
        self.user_index.clear()?;
        if self.config.use_bm25 {
            self.refresh_lexical();
        }
        info!("Cleared all user documents");
        Ok(())
    }

    /// Delete the persisted answer cache.
    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear()?;
        info!("Answer cache cleared");
        Ok(())
    }

    pub fn stats(&self) -> CorpusStats {
        CorpusStats {
            user_passages: self.user_index.len(),
            db_passages: self.db_index.len(),
        }
    }

    pub(crate) fn user_passages(&self) -> &[Passage] {
        self.user_index.passages()
    }

    pub(crate) fn db_passages(&self) -> &[Passage] {
        self.db_index.passages()
    }

    /// Cache failures downgrade to a warning: the pipeline must still
    /// answer when the store is unavailable.
    fn cache_answer(&self, fingerprint: &Fingerprint, answer: &str) {
        if let Err(err) = self.cache.set(fingerprint, answer) {
            warn!("Failed to store answer in cache: {}", err);
        }
    }
}

fn sampling(opts: &AnswerOptions) -> SamplingParams {
    SamplingParams {
        temperature: opts.temperature,
        do_sample: opts.do_sample,
    }
}

fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "Answer the question based on the following context:\n{}\n\nQuestion: {}\nAnswer:",
        context, query
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_context_and_question() {
        let prompt = build_prompt("[a.txt]\nCats are mammals.", "What are cats?");
        assert!(prompt.contains("[a.txt]"));
        assert!(prompt.contains("Question: What are cats?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn sampling_copies_options() {
        let opts = AnswerOptions {
            temperature: 0.3,
            do_sample: false,
            ..Default::default()
        };
        let params = sampling(&opts);
        assert!(!params.do_sample);
        assert!((params.temperature - 0.3).abs() < 1e-6);
    }
}
