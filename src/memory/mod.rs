//! Incident memory: the graph of past incidents and their outcomes.

pub mod graph;
pub mod types;

pub use graph::{cache_key, incident_id, IncidentGraphMemory};
pub use types::{
    describe, EdgeType, GraphEdge, GraphStats, IncidentNode, NewOutcome, OutcomeNode,
    SimilarityResult,
};
