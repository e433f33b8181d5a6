//! Incident graph type definitions.
//!
//! [`IncidentNode`] and [`OutcomeNode`] are the two node kinds; [`GraphEdge`] links
//! them. [`SimilarityResult`] is what a similarity search hands back and what the
//! LRU cache stores.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::{EventSeverity, ReliabilityEvent};

/// A stored incident. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentNode {
    pub incident_id: String,
    pub component: String,
    pub severity: EventSeverity,
    pub timestamp: DateTime<Utc>,
    /// `latency_ms`, `error_rate`, `throughput`, `cpu_util`, `memory_util`.
    pub metrics: BTreeMap<String, f64>,
    /// Opaque analysis attached by whoever observed the incident.
    #[serde(default)]
    pub analysis: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl IncidentNode {
    pub fn from_event(incident_id: String, event: &ReliabilityEvent, analysis: Map<String, Value>) -> Self {
        let metrics = BTreeMap::from([
            ("latency_ms".to_string(), event.latency_p99),
            ("error_rate".to_string(), event.error_rate),
            ("throughput".to_string(), event.throughput),
            ("cpu_util".to_string(), event.cpu_util.unwrap_or(0.0)),
            ("memory_util".to_string(), event.memory_util.unwrap_or(0.0)),
        ]);

        let mut metadata = Map::new();
        metadata.insert("service_mesh".into(), Value::from(event.service_mesh.clone()));
        metadata.insert("revenue_impact".into(), serde_json::json!(event.revenue_impact));
        metadata.insert("user_impact".into(), serde_json::json!(event.user_impact));
        metadata.insert("upstream_deps".into(), serde_json::json!(event.upstream_deps));
        metadata.insert("downstream_deps".into(), serde_json::json!(event.downstream_deps));

        Self {
            incident_id,
            component: event.component.clone(),
            severity: event.severity,
            timestamp: event.timestamp,
            metrics,
            analysis,
            metadata,
        }
    }

    pub fn metric(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(0.0)
    }

    /// The text embedded for this incident.
    pub fn description(&self) -> String {
        describe(
            &self.component,
            self.metric("latency_ms"),
            self.metric("error_rate"),
            self.severity,
        )
    }
}

/// Render the embedding text for a component observation.
///
/// Incidents and queries go through the same template so an identical observation
/// embeds to an identical vector. The band words let nearby measurements share
/// tokens even when the raw numbers differ.
pub fn describe(component: &str, latency_ms: f64, error_rate: f64, severity: EventSeverity) -> String {
    format!(
        "{component} latency {latency_ms:.0}ms error {error_rate:.3} \
         latency-{} errors-{} severity-{severity}",
        latency_band(latency_ms),
        error_band(error_rate),
    )
}

fn latency_band(latency_ms: f64) -> &'static str {
    match latency_ms {
        l if l < 100.0 => "normal",
        l if l < 300.0 => "elevated",
        l if l < 1000.0 => "high",
        _ => "critical",
    }
}

fn error_band(error_rate: f64) -> &'static str {
    match error_rate {
        e if e < 0.01 => "normal",
        e if e < 0.05 => "elevated",
        e if e < 0.15 => "high",
        _ => "critical",
    }
}

/// Input to [`super::IncidentGraphMemory::store_outcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOutcome {
    pub incident_id: String,
    pub actions_taken: Vec<String>,
    pub success: bool,
    pub resolution_time_minutes: f64,
    #[serde(default)]
    pub lessons_learned: Vec<String>,
}

/// What happened after acting on an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeNode {
    pub outcome_id: String,
    pub incident_id: String,
    pub actions_taken: Vec<String>,
    pub success: bool,
    pub resolution_time_minutes: f64,
    pub lessons_learned: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// incident → outcome
    ResolvedBy,
    /// incident → incident
    SimilarTo,
    /// incident → incident
    CausedBy,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolvedBy => "RESOLVED_BY",
            Self::SimilarTo => "SIMILAR_TO",
            Self::CausedBy => "CAUSED_BY",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub edge_id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub weight: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// One candidate from a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub incident: IncidentNode,
    /// `1 - d²/2`, clamped to `[0, 1]`.
    pub similarity: f64,
    /// Squared L2 distance reported by the index.
    pub distance: f32,
    /// Outcomes recorded against this incident at search time.
    pub outcomes: Vec<OutcomeNode>,
    /// Fraction of `outcomes` that succeeded; `None` when there are none.
    pub success_rate: Option<f64>,
}

/// Observability counters for the graph. Produced without side effects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub incident_nodes: usize,
    pub outcome_nodes: usize,
    pub edges: usize,
    /// Cumulative stores, including nodes since evicted.
    pub total_incidents: u64,
    pub total_outcomes: u64,
    pub evicted_incidents: u64,
    pub evicted_outcomes: u64,
    pub similarity_searches: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_entries: usize,
    pub cache_capacity: usize,
    pub indexed_vectors: usize,
    pub last_search_time: Option<DateTime<Utc>>,
}

impl GraphStats {
    pub fn cache_hit_rate(&self) -> f64 {
        if self.similarity_searches == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.similarity_searches as f64
        }
    }
}
