//! End-to-end event processing.
//!
//! [`ReliabilityEngine`] owns one instance of each subsystem and wires them in the
//! order an incident flows: validate the event, select candidate actions by policy,
//! store the incident, produce one advisory response per action. Outcomes recorded
//! later close the loop for future similarity lookups.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::advisory::{AdvisoryPipeline, AdvisoryResponse, HealingAction, PipelineStats};
use crate::config::VigilConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Result, VigilError};
use crate::event::ReliabilityEvent;
use crate::index::{DurableVectorIndex, IndexOptions, IndexPaths};
use crate::memory::{GraphStats, IncidentGraphMemory, NewOutcome, SimilarityResult};
use crate::policy::{load_policies, PolicyEngine, PolicyMatch};

/// Everything produced for one event.
#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub incident_id: String,
    pub component: String,
    pub matched_policies: Vec<PolicyMatch>,
    /// Deduplicated candidate actions; `[no_action]` when nothing matched.
    pub actions: Vec<HealingAction>,
    pub advisories: Vec<AdvisoryResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub dimension: usize,
    pub flushed_vectors: usize,
    pub pending_vectors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub graph: GraphStats,
    pub pipeline: PipelineStats,
    pub index: IndexStats,
    pub policies: usize,
}

pub struct ReliabilityEngine {
    index: Arc<DurableVectorIndex>,
    memory: Arc<IncidentGraphMemory>,
    pipeline: AdvisoryPipeline,
    policies: PolicyEngine,
}

impl ReliabilityEngine {
    /// Open the on-disk index described by `config` and build every subsystem.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &VigilConfig) -> Result<Self> {
        let policies = match config.resolved_policies_file() {
            Some(path) => PolicyEngine::new(load_policies(&path)?)?,
            None => PolicyEngine::with_defaults(),
        };
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::from(embedding::create_provider(config.index.dimension));
        Self::with_parts(config, config.index_paths(), embedder, policies)
    }

    /// Build an engine around explicit paths, embedder, and policies.
    pub fn with_parts(
        config: &VigilConfig,
        paths: IndexPaths,
        embedder: Arc<dyn EmbeddingProvider>,
        policies: PolicyEngine,
    ) -> Result<Self> {
        if embedder.dimensions() != config.index.dimension {
            return Err(VigilError::DimensionMismatch {
                expected: config.index.dimension,
                actual: embedder.dimensions(),
            });
        }

        let index = Arc::new(DurableVectorIndex::open(
            paths,
            IndexOptions::from(&config.index),
        )?);
        let memory = Arc::new(IncidentGraphMemory::new(
            Arc::clone(&index),
            embedder,
            &config.memory,
        ));
        let pipeline = AdvisoryPipeline::new(Arc::clone(&memory), config.advisory.clone());

        tracing::info!(policies = policies.policies().len(), "reliability engine ready");
        Ok(Self {
            index,
            memory,
            pipeline,
            policies,
        })
    }

    pub fn memory(&self) -> &Arc<IncidentGraphMemory> {
        &self.memory
    }

    pub fn pipeline(&self) -> &AdvisoryPipeline {
        &self.pipeline
    }

    pub fn policies(&self) -> &PolicyEngine {
        &self.policies
    }

    pub async fn process_event(&self, event: ReliabilityEvent) -> Result<EventReport> {
        self.process_event_at(event, Utc::now()).await
    }

    /// Process `event` with policy cooldowns measured at `now`.
    pub async fn process_event_at(
        &self,
        event: ReliabilityEvent,
        now: DateTime<Utc>,
    ) -> Result<EventReport> {
        event.validate()?;

        let matched = self.policies.matches_at(&event, now);
        let mut actions: Vec<HealingAction> = Vec::new();
        let mut sources: Vec<(HealingAction, &str)> = Vec::new();
        for m in &matched {
            for action in &m.actions {
                if !actions.contains(action) {
                    actions.push(*action);
                    sources.push((*action, m.policy.as_str()));
                }
            }
        }

        let mut analysis = Map::new();
        analysis.insert("severity".into(), Value::from(event.severity.as_str()));
        analysis.insert(
            "matched_policies".into(),
            json!(matched.iter().map(|m| &m.policy).collect::<Vec<_>>()),
        );
        analysis.insert("candidate_actions".into(), json!(actions));
        let incident_id = self.memory.store_incident(&event, analysis);

        let mut advisories = Vec::with_capacity(sources.len());
        for (action, policy) in sources {
            let response = self
                .pipeline
                .recommend(action, &event, Some(&incident_id), Some(policy))
                .await;
            advisories.push(response);
        }

        if actions.is_empty() {
            actions.push(HealingAction::NoAction);
        }

        tracing::info!(
            incident = %incident_id,
            component = %event.component,
            actions = actions.len(),
            "event processed"
        );

        Ok(EventReport {
            incident_id,
            component: event.component,
            matched_policies: matched,
            actions,
            advisories,
        })
    }

    /// Record what happened after acting on an incident.
    pub fn record_outcome(&self, outcome: NewOutcome) -> Result<String> {
        self.memory.store_outcome(outcome)
    }

    pub fn find_similar(&self, event: &ReliabilityEvent, k: usize) -> Result<Vec<SimilarityResult>> {
        self.memory.find_similar(event, k)
    }

    pub async fn execute_tool(&self, request: &Value) -> AdvisoryResponse {
        self.pipeline.execute_tool(request).await
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            graph: self.memory.graph_stats(),
            pipeline: self.pipeline.stats(),
            index: IndexStats {
                dimension: self.index.dimension(),
                flushed_vectors: self.index.flushed_count(),
                pending_vectors: self.index.pending_count(),
            },
            policies: self.policies.policies().len(),
        }
    }

    /// Flush queued vectors and save the index.
    pub async fn save(&self) -> Result<()> {
        self.index.force_save().await
    }

    /// Stop retrievals, drain the index writer, and perform a final save.
    pub async fn shutdown(&self) -> Result<()> {
        self.pipeline.cancel();
        self.index.shutdown().await
    }
}
