//! Incident/outcome graph over the durable vector index.
//!
//! Two node maps and an edge list live behind one mutex together with the similarity
//! cache. Node maps are bounded by insertion order (oldest evicted first); the cache
//! is a true LRU keyed by a normalized query fingerprint. The two policies are kept
//! separate on purpose: the node cap bounds memory, the cache tracks what is queried.
//!
//! The vector index is only referenced through sidecar texts of the form
//! `"<incident_id>\t<description>"`. Hits whose incident is no longer in the node
//! map are skipped.

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::types::{
    describe, EdgeType, GraphEdge, GraphStats, IncidentNode, NewOutcome, OutcomeNode,
    SimilarityResult,
};
use crate::config::MemoryConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, VigilError};
use crate::event::ReliabilityEvent;
use crate::index::{distance_to_similarity, DurableVectorIndex};

/// A map that remembers insertion order and drops its oldest entry past `capacity`.
struct BoundedNodes<T> {
    nodes: HashMap<String, T>,
    order: VecDeque<String>,
    capacity: usize,
}

impl<T> BoundedNodes<T> {
    fn new(capacity: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    fn get(&self, id: &str) -> Option<&T> {
        self.nodes.get(id)
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Insert and return the ID evicted to make room, if any.
    fn insert(&mut self, id: String, node: T) -> Option<String> {
        self.order.push_back(id.clone());
        self.nodes.insert(id, node);
        if self.nodes.len() > self.capacity {
            let oldest = self.order.pop_front()?;
            self.nodes.remove(&oldest);
            return Some(oldest);
        }
        None
    }
}

#[derive(Default)]
struct Counters {
    total_incidents: u64,
    total_outcomes: u64,
    evicted_incidents: u64,
    evicted_outcomes: u64,
    similarity_searches: u64,
    cache_hits: u64,
    cache_misses: u64,
    last_search_time: Option<DateTime<Utc>>,
    outcome_seq: u64,
}

struct GraphState {
    incidents: BoundedNodes<IncidentNode>,
    outcomes: BoundedNodes<OutcomeNode>,
    edges: Vec<GraphEdge>,
    cache: LruCache<String, Vec<SimilarityResult>>,
    counters: Counters,
}

impl GraphState {
    fn outcomes_for(&self, incident_id: &str) -> Vec<OutcomeNode> {
        self.edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::ResolvedBy && e.source_id == incident_id)
            .filter_map(|e| self.outcomes.get(&e.target_id).cloned())
            .collect()
    }
}

pub struct IncidentGraphMemory {
    index: Arc<DurableVectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    similarity_threshold: f64,
    search_candidates: usize,
    state: Mutex<GraphState>,
}

fn short_hash(data: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(data.as_bytes()));
    digest[..16].to_string()
}

/// Deterministic incident ID: the event fingerprint, shortened.
pub fn incident_id(event: &ReliabilityEvent) -> String {
    format!("inc_{}", &event.fingerprint()[..16])
}

/// Cache key for a query. Metrics are rounded so float noise does not split entries.
pub fn cache_key(event: &ReliabilityEvent) -> String {
    format!(
        "{}:{:.3}:{:.5}",
        event.component, event.latency_p99, event.error_rate
    )
}

impl IncidentGraphMemory {
    pub fn new(
        index: Arc<DurableVectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &MemoryConfig,
    ) -> Self {
        let cache_capacity = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);
        tracing::info!(
            max_incidents = config.max_incident_nodes,
            max_outcomes = config.max_outcome_nodes,
            cache_size = cache_capacity.get(),
            similarity_threshold = config.similarity_threshold,
            "incident graph memory initialized"
        );
        Self {
            index,
            embedder,
            similarity_threshold: config.similarity_threshold,
            search_candidates: config.search_candidates.max(1),
            state: Mutex::new(GraphState {
                incidents: BoundedNodes::new(config.max_incident_nodes),
                outcomes: BoundedNodes::new(config.max_outcome_nodes),
                edges: Vec::new(),
                cache: LruCache::new(cache_capacity),
                counters: Counters::default(),
            }),
        }
    }

    pub fn index(&self) -> &Arc<DurableVectorIndex> {
        &self.index
    }

    /// Store an incident, returning its deterministic ID.
    ///
    /// Re-storing the same observation is a no-op that returns the existing ID. The
    /// vector write is queued; a full queue or embedding failure is logged and the node
    /// is still stored.
    pub fn store_incident(&self, event: &ReliabilityEvent, analysis: Map<String, Value>) -> String {
        let incident_id = incident_id(event);

        let description = {
            let mut state = self.state.lock();
            if state.incidents.contains(&incident_id) {
                tracing::debug!(id = %incident_id, "incident already stored");
                return incident_id;
            }

            let node = IncidentNode::from_event(incident_id.clone(), event, analysis);
            let description = node.description();
            state.counters.total_incidents += 1;
            if let Some(evicted) = state.incidents.insert(incident_id.clone(), node) {
                state.counters.evicted_incidents += 1;
                tracing::debug!(id = %evicted, "evicted oldest incident");
            }
            description
        };

        tracing::info!(
            id = %incident_id,
            component = %event.component,
            severity = %event.severity,
            "stored incident"
        );

        let queued = self
            .embedder
            .embed(&description)
            .and_then(|vector| self.index.add_async(vector, format!("{incident_id}\t{description}")));
        if let Err(e) = queued {
            tracing::warn!(id = %incident_id, error = %e, "incident not indexed");
        }

        incident_id
    }

    /// Store an outcome and link it to its incident with a `RESOLVED_BY` edge.
    pub fn store_outcome(&self, outcome: NewOutcome) -> Result<String> {
        let mut state = self.state.lock();
        if !state.incidents.contains(&outcome.incident_id) {
            tracing::warn!(id = %outcome.incident_id, "outcome for unknown incident rejected");
            return Err(VigilError::not_found("incident", outcome.incident_id));
        }

        let recorded_at = Utc::now();
        state.counters.outcome_seq += 1;
        let outcome_id = format!(
            "out_{}",
            short_hash(&format!(
                "{}:{}:{}:{}",
                outcome.incident_id,
                outcome.actions_taken.join(","),
                recorded_at.to_rfc3339(),
                state.counters.outcome_seq
            ))
        );

        let mut edge_meta = Map::new();
        edge_meta.insert("success".into(), Value::from(outcome.success));
        edge_meta.insert(
            "resolution_time".into(),
            serde_json::json!(outcome.resolution_time_minutes),
        );
        let edge = GraphEdge {
            edge_id: format!(
                "edge_{}",
                short_hash(&format!(
                    "{}:{}:{}",
                    outcome.incident_id,
                    outcome_id,
                    EdgeType::ResolvedBy
                ))
            ),
            source_id: outcome.incident_id.clone(),
            target_id: outcome_id.clone(),
            edge_type: EdgeType::ResolvedBy,
            weight: 1.0,
            metadata: edge_meta,
        };

        let node = OutcomeNode {
            outcome_id: outcome_id.clone(),
            incident_id: outcome.incident_id,
            actions_taken: outcome.actions_taken,
            success: outcome.success,
            resolution_time_minutes: outcome.resolution_time_minutes,
            lessons_learned: outcome.lessons_learned,
            recorded_at,
        };

        tracing::info!(
            id = %outcome_id,
            incident = %node.incident_id,
            success = node.success,
            "stored outcome"
        );

        state.counters.total_outcomes += 1;
        state.edges.push(edge);
        if let Some(evicted) = state.outcomes.insert(outcome_id.clone(), node) {
            state.counters.evicted_outcomes += 1;
            // An edge to an evicted outcome can never resolve again.
            state.edges.retain(|e| e.target_id != evicted);
            tracing::debug!(id = %evicted, "evicted oldest outcome");
        }

        Ok(outcome_id)
    }

    /// Up to `k` stored incidents most similar to `query`, best first.
    ///
    /// Results are cached per [`cache_key`]; the cache holds the full candidate list so
    /// a later call with a larger `k` (up to `search_candidates`) is still a hit.
    pub fn find_similar(&self, query: &ReliabilityEvent, k: usize) -> Result<Vec<SimilarityResult>> {
        let key = cache_key(query);

        {
            let mut state = self.state.lock();
            state.counters.similarity_searches += 1;
            state.counters.last_search_time = Some(Utc::now());
            if let Some(cached) = state.cache.get(&key) {
                let hit: Vec<_> = cached.iter().take(k).cloned().collect();
                state.counters.cache_hits += 1;
                tracing::debug!(key = %key, results = hit.len(), "similarity cache hit");
                return Ok(hit);
            }
            state.counters.cache_misses += 1;
        }

        let text = describe(&query.component, query.latency_p99, query.error_rate, query.severity);
        let vector = self.embedder.embed(&text)?;
        let hits = self.index.search_with_texts(&vector, self.search_candidates)?;

        let mut state = self.state.lock();
        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(hits.len());
        for (_, distance, text) in hits {
            let Some((incident_id, _)) = text.split_once('\t') else {
                continue;
            };
            let similarity = distance_to_similarity(distance);
            if similarity < self.similarity_threshold || !seen.insert(incident_id.to_string()) {
                continue;
            }
            let Some(incident) = state.incidents.get(incident_id).cloned() else {
                continue;
            };
            let outcomes = state.outcomes_for(incident_id);
            let success_rate = (!outcomes.is_empty()).then(|| {
                outcomes.iter().filter(|o| o.success).count() as f64 / outcomes.len() as f64
            });
            results.push(SimilarityResult {
                incident,
                similarity,
                distance,
                outcomes,
                success_rate,
            });
        }

        tracing::debug!(key = %key, candidates = results.len(), "similarity search complete");
        state.cache.put(key, results.clone());
        results.truncate(k);
        Ok(results)
    }

    pub fn get_incident(&self, incident_id: &str) -> Option<IncidentNode> {
        self.state.lock().incidents.get(incident_id).cloned()
    }

    pub fn get_outcome(&self, outcome_id: &str) -> Option<OutcomeNode> {
        self.state.lock().outcomes.get(outcome_id).cloned()
    }

    pub fn outcomes_for(&self, incident_id: &str) -> Vec<OutcomeNode> {
        self.state.lock().outcomes_for(incident_id)
    }

    /// Edges touching `node_id` in either direction.
    pub fn edges_for(&self, node_id: &str) -> Vec<GraphEdge> {
        self.state
            .lock()
            .edges
            .iter()
            .filter(|e| e.source_id == node_id || e.target_id == node_id)
            .cloned()
            .collect()
    }

    /// Whether a query for `event` would hit the cache. Does not touch recency.
    pub fn is_cached(&self, event: &ReliabilityEvent) -> bool {
        self.state.lock().cache.contains(&cache_key(event))
    }

    pub fn graph_stats(&self) -> GraphStats {
        let state = self.state.lock();
        let c = &state.counters;
        GraphStats {
            incident_nodes: state.incidents.len(),
            outcome_nodes: state.outcomes.len(),
            edges: state.edges.len(),
            total_incidents: c.total_incidents,
            total_outcomes: c.total_outcomes,
            evicted_incidents: c.evicted_incidents,
            evicted_outcomes: c.evicted_outcomes,
            similarity_searches: c.similarity_searches,
            cache_hits: c.cache_hits,
            cache_misses: c.cache_misses,
            cache_entries: state.cache.len(),
            cache_capacity: state.cache.cap().get(),
            indexed_vectors: self.index.count(),
            last_search_time: c.last_search_time,
        }
    }
}
