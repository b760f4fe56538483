//! Entity graph construction and traversal for graph-restricted
//! retrieval.

pub mod builder;
pub mod parser;

pub use builder::{EntityGraph, GraphBuilder, Triple};
pub use parser::{DepRel, DepToken, EntityParser, HeuristicParser, ParsedDoc, PosTag};
