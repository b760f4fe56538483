//! Graph-restricted retrieval with explicit fallback to hybrid RAG.
//!
//! Wraps a [`RagPipeline`] and an entity graph. A query is first
//! resolved into a named [`GraphDecision`]; only a `GraphMatch` takes
//! the graph path (direct generation over graph-connected passages,
//! bypassing cache and rerank), everything else falls back to the
//! standard answer path.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::AnswerOptions;
use crate::error::Result;
use crate::graph::{EntityParser, GraphBuilder};
use crate::index::Passage;

use super::rag::RagPipeline;

/// Terminal answer when the graph was never built.
pub const GRAPH_NOT_BUILT_ANSWER: &str =
    "Knowledge graph not built yet. Build it before querying.";

/// Related-entity expansion depth for query entities.
const EXPANSION_DEPTH: usize = 2;

/// Outcome of routing a query through the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphDecision {
    /// No graph has been built yet.
    NoGraph,
    /// No query entities, or no passages mention a related entity.
    FallbackToHybrid,
    /// Graph-connected user passages to answer from.
    GraphMatch(Vec<Passage>),
}

/// GraphRAG orchestrator owning the underlying RAG pipeline.
pub struct GraphRagPipeline {
    rag: RagPipeline,
    builder: GraphBuilder,
    built: bool,
}

impl GraphRagPipeline {
    pub fn new(rag: RagPipeline, parser: Arc<dyn EntityParser>) -> Self {
        Self {
            rag,
            builder: GraphBuilder::new(parser),
            built: false,
        }
    }

    pub fn rag(&self) -> &RagPipeline {
        &self.rag
    }

    pub fn rag_mut(&mut self) -> &mut RagPipeline {
        &mut self.rag
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn builder(&self) -> &GraphBuilder {
        &self.builder
    }

    /// Build (or extend) the entity graph from both corpora. Held in
    /// memory only; must be rebuilt after a restart or corpus change.
    pub fn build_graph(&mut self) {
        info!("Building knowledge graph from user and db corpora");
        let documents: Vec<Passage> = self
            .rag
            .user_passages()
            .iter()
            .chain(self.rag.db_passages().iter())
            .cloned()
            .collect();
        self.builder.build(&documents);
        self.built = true;
    }

    /// Route a query: which passages (if any) the graph restricts
    /// retrieval to. Pure decision, no generator involved.
    pub fn decide(&self, query: &str) -> GraphDecision {
        if !self.built {
            return GraphDecision::NoGraph;
        }

        let entities = self.builder.query_entities(query);
        if entities.is_empty() {
            debug!("No entities in query, falling back to hybrid retrieval");
            return GraphDecision::FallbackToHybrid;
        }

        // A query entity participates in matching only when it is a
        // node in the graph, along with everything reachable within
        // the expansion depth. Entities absent from the graph
        // contribute nothing, so an unindexed surface form cannot
        // hijack the graph path.
        let mut related: Vec<String> = Vec::new();
        for entity in &entities {
            if self.builder.graph().contains(entity) && !related.contains(entity) {
                related.push(entity.clone());
            }
            for neighbor in self.builder.related_entities(entity, EXPANSION_DEPTH) {
                if !related.contains(&neighbor) {
                    related.push(neighbor);
                }
            }
        }

        let matched: Vec<Passage> = self
            .rag
            .user_passages()
            .iter()
            .filter(|passage| related.iter().any(|node| passage.text.contains(node)))
            .cloned()
            .collect();

        if matched.is_empty() {
            debug!("No passages mention related entities, falling back");
            GraphDecision::FallbackToHybrid
        } else {
            debug!("Graph matched {} passages", matched.len());
            GraphDecision::GraphMatch(matched)
        }
    }

    /// Answer a query through the graph when possible.
    ///
    /// `GraphMatch` generates directly from the matched passages,
    /// bypassing the cache and the hybrid/rerank machinery; the
    /// fallback path is the unchanged [`RagPipeline::answer`].
    pub async fn query(&self, query: &str, opts: &AnswerOptions) -> Result<String> {
        match self.decide(query) {
            GraphDecision::NoGraph => Ok(GRAPH_NOT_BUILT_ANSWER.to_string()),
            GraphDecision::FallbackToHybrid => self.rag.answer(query, opts).await,
            GraphDecision::GraphMatch(passages) => {
                self.rag
                    .generate_from_context(query, &passages, opts)
                    .await
            }
        }
    }
}
