//! Undirected entity graph built from extracted entities and
//! subject/verb/object triples.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use crate::index::Passage;

use super::parser::{DepRel, EntityParser, PosTag};

/// A (subject, verb lemma, object) relation extracted from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: String,
    pub relation: String,
    pub object: String,
}

/// In-memory undirected graph. Nodes are entity surface strings; each
/// edge carries a single relation label, and repeated relations between
/// the same pair overwrite it (last write wins).
#[derive(Debug, Default, Clone)]
pub struct EntityGraph {
    /// node -> (neighbor -> relation label)
    adjacency: HashMap<String, HashMap<String, String>>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>) {
        self.adjacency.entry(name.into()).or_default();
    }

    /// Add an undirected labeled edge, creating missing endpoints.
    pub fn add_edge(&mut self, a: impl Into<String>, b: impl Into<String>, relation: &str) {
        let a = a.into();
        let b = b.into();
        self.adjacency
            .entry(a.clone())
            .or_default()
            .insert(b.clone(), relation.to_string());
        self.adjacency
            .entry(b)
            .or_default()
            .insert(a, relation.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adjacency.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        let directed: usize = self.adjacency.values().map(HashMap::len).sum();
        // Self-loops contribute one directed entry, everything else two.
        let self_loops = self
            .adjacency
            .iter()
            .filter(|(node, neighbors)| neighbors.contains_key(*node))
            .count();
        (directed - self_loops) / 2 + self_loops
    }

    /// Relation label on the edge between `a` and `b`, if any.
    pub fn relation(&self, a: &str, b: &str) -> Option<&str> {
        self.adjacency.get(a)?.get(b).map(String::as_str)
    }

    /// Entities reachable within `depth` hops, excluding the start
    /// node. An absent entity yields an empty set, not an error.
    pub fn related_entities(&self, entity: &str, depth: usize) -> HashSet<String> {
        let mut related = HashSet::new();
        if !self.contains(entity) || depth == 0 {
            return related;
        }

        let mut visited: HashSet<&str> = HashSet::from([entity]);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(entity, 0)]);

        while let Some((node, dist)) = queue.pop_front() {
            if dist == depth {
                continue;
            }
            if let Some(neighbors) = self.adjacency.get(node) {
                for neighbor in neighbors.keys() {
                    if visited.insert(neighbor) {
                        related.insert(neighbor.clone());
                        queue.push_back((neighbor, dist + 1));
                    }
                }
            }
        }

        related
    }
}

/// Builds and queries the entity graph using an injected parser.
pub struct GraphBuilder {
    parser: Arc<dyn EntityParser>,
    graph: EntityGraph,
}

impl GraphBuilder {
    pub fn new(parser: Arc<dyn EntityParser>) -> Self {
        Self {
            parser,
            graph: EntityGraph::new(),
        }
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    /// Extract entities and relation triples from one text.
    ///
    /// A triple is emitted for every subject/object/prepositional-object
    /// token whose syntactic head is a verb, with the object collected
    /// from the head's direct-object children; tokens without such an
    /// object are skipped.
    pub fn extract(&self, text: &str) -> (Vec<String>, Vec<Triple>) {
        let parsed = self.parser.parse(text);
        let mut triples = Vec::new();

        for token in &parsed.tokens {
            if !matches!(token.dep, DepRel::Nsubj | DepRel::Dobj | DepRel::Pobj) {
                continue;
            }
            let Some(head) = parsed.tokens.get(token.head) else {
                continue;
            };
            if head.pos != PosTag::Verb {
                continue;
            }

            let object = parsed
                .tokens
                .iter()
                .filter(|child| child.head == token.head && child.dep == DepRel::Dobj)
                .map(|child| child.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            if !token.text.is_empty() && !object.is_empty() {
                triples.push(Triple {
                    subject: token.text.clone(),
                    relation: head.lemma.clone(),
                    object,
                });
            }
        }

        (parsed.entities, triples)
    }

    /// Accumulate entities and relations from documents into the graph.
    /// Repeated calls extend the graph; nothing is reset.
    pub fn build(&mut self, documents: &[Passage]) {
        for document in documents {
            let (entities, triples) = self.extract(&document.text);
            for entity in entities {
                self.graph.add_node(entity);
            }
            for triple in &triples {
                self.graph
                    .add_edge(&*triple.subject, &*triple.object, &triple.relation);
            }
            debug!(
                "Graph update from '{}': {} triples",
                document.doc_name(),
                triples.len()
            );
        }
        info!(
            "Entity graph now has {} nodes and {} edges",
            self.graph.node_count(),
            self.graph.edge_count()
        );
    }

    /// Entities extracted from free text (used for queries).
    pub fn query_entities(&self, text: &str) -> Vec<String> {
        self.parser.parse(text).entities
    }

    /// Breadth-first related entities, bounded by `depth` hops.
    pub fn related_entities(&self, entity: &str, depth: usize) -> HashSet<String> {
        self.graph.related_entities(entity, depth)
    }
}
