//! Turns a remediation request into an advisory [`HealingIntent`].
//!
//! validate → sanitize → retrieve similar incidents → reason → score → emit.
//!
//! Retrieval is the only step that may be slow, so it runs on the blocking pool under
//! a timeout and a cancellation token; if it fails or expires the request proceeds
//! without historical context. Any other failure becomes an `error` response. Nothing
//! here executes an action: [`AdvisoryResponse::executed`] is `false` by construction.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use super::intent::{HealingIntent, IntentDraft, ReasoningKind, ReasoningStep, SimilarIncident};
use super::tools::HealingAction;
use super::validate::{sanitize_parameters, validate_request, AdvisoryRequest};
use crate::config::AdvisoryConfig;
use crate::error::{Result, VigilError};
use crate::event::ReliabilityEvent;
use crate::memory::{IncidentGraphMemory, SimilarityResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Completed,
    Rejected,
    Error,
}

/// Serializes as `false`. The only value an advisory response can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct NotExecuted;

impl Serialize for NotExecuted {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bool(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    Completed,
    TimedOut,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub analysis_time_ms: f64,
    pub similar_incidents_found: usize,
    pub rag_used: bool,
    pub cache_hit: bool,
    pub retrieval: RetrievalStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryResult {
    pub mode: &'static str,
    /// Whether a downstream executor would act on this intent.
    pub would_execute: bool,
    pub confidence: f64,
    pub healing_intent: HealingIntent,
    pub requires_enterprise: bool,
    pub analysis: AnalysisSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryResponse {
    pub request_id: String,
    pub status: ResponseStatus,
    pub message: String,
    executed: NotExecuted,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AdvisoryResult>,
    pub timestamp: DateTime<Utc>,
}

impl AdvisoryResponse {
    fn without_result(request_id: String, status: ResponseStatus, message: String) -> Self {
        Self {
            request_id,
            status,
            message,
            executed: NotExecuted,
            result: None,
            timestamp: Utc::now(),
        }
    }

    pub fn executed(&self) -> bool {
        false
    }

    pub fn intent(&self) -> Option<&HealingIntent> {
        self.result.as_ref().map(|r| &r.healing_intent)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub requests_processed: u64,
    pub intents_created: u64,
    pub validation_errors: u64,
    pub internal_errors: u64,
    pub retrieval_timeouts: u64,
    pub retrieval_failures: u64,
    pub avg_analysis_time_ms: f64,
}

/// Confidence for recommending `action` given the retrieved history.
///
/// `base × weight(action)`, further scaled by `0.9 + avg_similarity × 0.1` when there
/// is history, clamped to `[0, 1]`.
pub fn score_confidence(base: f64, action: HealingAction, similar: &[SimilarityResult]) -> f64 {
    let mut confidence = base * action.weight();
    if !similar.is_empty() {
        let avg = similar.iter().map(|s| s.similarity).sum::<f64>() / similar.len() as f64;
        confidence *= 0.9 + avg * 0.1;
    }
    confidence.clamp(0.0, 1.0)
}

fn historical_success_rate(similar: &[SimilarityResult]) -> Option<f64> {
    let rates: Vec<f64> = similar.iter().filter_map(|s| s.success_rate).collect();
    (!rates.is_empty()).then(|| rates.iter().sum::<f64>() / rates.len() as f64)
}

fn reasoning_chain(
    action: HealingAction,
    component: &str,
    parameters: &Map<String, Value>,
    similar: &[SimilarityResult],
) -> Vec<ReasoningStep> {
    let mut chain = vec![ReasoningStep {
        step: 1,
        kind: ReasoningKind::ComponentAnalysis,
        description: format!("Analyzing component: {component}"),
        details: json!({ "component": component }),
    }];

    if !similar.is_empty() {
        chain.push(ReasoningStep {
            step: 2,
            kind: ReasoningKind::HistoricalContext,
            description: format!("Found {} similar incidents", similar.len()),
            details: json!({
                "similar_incidents_count": similar.len(),
                "historical_success_rate": historical_success_rate(similar),
            }),
        });
    }

    chain.push(ReasoningStep {
        step: chain.len() as u32 + 1,
        kind: ReasoningKind::ActionRecommendation,
        description: format!("Recommend {action} for {component}"),
        details: json!({
            "tool": action.as_str(),
            "safety_level": action.safety_level(),
            "parameters": parameters,
        }),
    });
    chain
}

fn summarize(result: &SimilarityResult) -> SimilarIncident {
    let mut actions_taken: Vec<String> = Vec::new();
    for action in result.outcomes.iter().flat_map(|o| &o.actions_taken) {
        if !actions_taken.contains(action) {
            actions_taken.push(action.clone());
        }
    }
    let resolution_time_minutes = (!result.outcomes.is_empty()).then(|| {
        result.outcomes.iter().map(|o| o.resolution_time_minutes).sum::<f64>()
            / result.outcomes.len() as f64
    });
    SimilarIncident {
        incident_id: result.incident.incident_id.clone(),
        component: result.incident.component.clone(),
        similarity: result.similarity,
        success_rate: result.success_rate,
        actions_taken,
        resolution_time_minutes,
    }
}

struct Analysis {
    similar: Vec<SimilarityResult>,
    retrieval: RetrievalStatus,
    cache_hit: bool,
}

pub struct AdvisoryPipeline {
    memory: Arc<IncidentGraphMemory>,
    config: AdvisoryConfig,
    stats: Mutex<PipelineStats>,
    cancel: CancellationToken,
}

impl AdvisoryPipeline {
    pub fn new(memory: Arc<IncidentGraphMemory>, config: AdvisoryConfig) -> Self {
        Self {
            memory,
            config,
            stats: Mutex::new(PipelineStats::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.lock().clone()
    }

    /// Cancel in-flight retrievals. Requests still complete, without history.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Handle a raw advisory request.
    pub async fn execute_tool(&self, request: &Value) -> AdvisoryResponse {
        self.execute_tool_at(request, Utc::now()).await
    }

    /// Handle a raw advisory request detected at `detected_at`.
    pub async fn execute_tool_at(&self, raw: &Value, detected_at: DateTime<Utc>) -> AdvisoryResponse {
        let started = Instant::now();
        self.stats.lock().requests_processed += 1;

        let request = match validate_request(raw) {
            Ok(request) => request,
            Err(errors) => {
                self.stats.lock().validation_errors += 1;
                tracing::warn!(errors = ?errors, "advisory request rejected");
                let request_id = raw
                    .get("request_id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty() && id.chars().count() <= 100)
                    .map(str::to_string)
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                return AdvisoryResponse::without_result(
                    request_id,
                    ResponseStatus::Rejected,
                    VigilError::Validation(errors).to_string(),
                );
            }
        };

        let query = self.query_for(&request, detected_at);
        self.run(request, query, None, detected_at, started).await
    }

    /// Recommend `action` for an observed event, as selected by `policy`.
    pub async fn recommend(
        &self,
        action: HealingAction,
        event: &ReliabilityEvent,
        incident_id: Option<&str>,
        policy: Option<&str>,
    ) -> AdvisoryResponse {
        let started = Instant::now();
        self.stats.lock().requests_processed += 1;

        let mut metadata = Map::new();
        if let Some(id) = incident_id {
            metadata.insert("incident_id".into(), Value::from(id));
        }
        let justification = match policy {
            Some(p) => format!(
                "Policy {p} matched {}: latency_p99={:.1}ms error_rate={:.3}",
                event.component, event.latency_p99, event.error_rate
            ),
            None => format!("Anomaly detected on {}", event.component),
        };
        let request = AdvisoryRequest {
            request_id: None,
            tool: action,
            component: event.component.clone(),
            parameters: Map::new(),
            justification,
            metadata,
        };

        self.run(request, event.clone(), policy.map(str::to_string), event.timestamp, started)
            .await
    }

    /// The event whose history should inform a raw request.
    ///
    /// A known `metadata.incident_id` supplies the stored metrics; otherwise
    /// `metadata.latency_p99` and `metadata.error_rate` are used when present.
    fn query_for(&self, request: &AdvisoryRequest, detected_at: DateTime<Utc>) -> ReliabilityEvent {
        if let Some(node) = request.incident_id().and_then(|id| self.memory.get_incident(id)) {
            let mut event = ReliabilityEvent::new(
                node.component.clone(),
                node.metric("latency_ms"),
                node.metric("error_rate"),
            );
            event.severity = node.severity;
            event.timestamp = node.timestamp;
            return event;
        }

        let number = |key: &str| request.metadata.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        let mut event = ReliabilityEvent::new(
            request.component.clone(),
            number("latency_p99"),
            number("error_rate"),
        );
        event.timestamp = detected_at;
        if let Some(severity) = request
            .metadata
            .get("severity")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
        {
            event.severity = severity;
        }
        event
    }

    async fn run(
        &self,
        request: AdvisoryRequest,
        query: ReliabilityEvent,
        policy: Option<String>,
        detected_at: DateTime<Utc>,
        started: Instant,
    ) -> AdvisoryResponse {
        let fallback_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        match self.analyze(request, query, policy, detected_at, started).await {
            Ok(response) => response,
            Err(e) => {
                self.stats.lock().internal_errors += 1;
                tracing::error!(error = %e, "advisory analysis failed");
                AdvisoryResponse::without_result(
                    fallback_id,
                    ResponseStatus::Error,
                    format!("advisory analysis error: {e}"),
                )
            }
        }
    }

    async fn analyze(
        &self,
        request: AdvisoryRequest,
        query: ReliabilityEvent,
        policy: Option<String>,
        detected_at: DateTime<Utc>,
        started: Instant,
    ) -> Result<AdvisoryResponse> {
        let parameters = sanitize_parameters(&request.parameters);
        let incident_id = request.incident_id().unwrap_or_default().to_string();
        let analysis = self.retrieve(query, &incident_id).await;
        let similar = &analysis.similar;

        let confidence = score_confidence(self.config.base_confidence, request.tool, similar);
        let chain = reasoning_chain(request.tool, &request.component, &parameters, similar);

        let intent = HealingIntent::new(IntentDraft {
            action: request.tool,
            component: request.component,
            parameters,
            justification: request.justification,
            confidence,
            incident_id,
            detected_at,
            reasoning_chain: chain,
            similar_incidents: similar.iter().map(summarize).collect(),
            policy_applied: policy,
        })?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        {
            let mut stats = self.stats.lock();
            stats.intents_created += 1;
            let n = stats.intents_created as f64;
            let avg = stats.avg_analysis_time_ms;
            stats.avg_analysis_time_ms = avg + (elapsed_ms - avg) / n;
        }

        tracing::info!(
            action = %intent.action(),
            component = %intent.component(),
            confidence = intent.confidence(),
            similar = similar.len(),
            time_ms = elapsed_ms,
            "advisory intent created"
        );

        Ok(AdvisoryResponse {
            request_id: request
                .request_id
                .unwrap_or_else(|| intent.intent_id().to_string()),
            status: ResponseStatus::Completed,
            message: format!(
                "Advisory: recommended {} for {}",
                intent.action(),
                intent.component()
            ),
            executed: NotExecuted,
            result: Some(AdvisoryResult {
                mode: "advisory",
                would_execute: true,
                confidence: intent.confidence(),
                requires_enterprise: true,
                analysis: AnalysisSummary {
                    analysis_time_ms: elapsed_ms,
                    similar_incidents_found: similar.len(),
                    rag_used: !similar.is_empty(),
                    cache_hit: analysis.cache_hit,
                    retrieval: analysis.retrieval,
                },
                healing_intent: intent,
            }),
            timestamp: Utc::now(),
        })
    }

    /// Top-k history for `query`, never including the incident `exclude`.
    async fn retrieve(&self, query: ReliabilityEvent, exclude: &str) -> Analysis {
        let cache_hit = self.memory.is_cached(&query);
        let memory = Arc::clone(&self.memory);
        let k = self.config.similar_incidents_k;
        let fetch = if exclude.is_empty() { k } else { k + 1 };
        let timeout = self.config.retrieval_timeout();
        let cancel = self.cancel.child_token();

        let task = tokio::task::spawn_blocking(move || memory.find_similar(&query, fetch));
        let (mut similar, retrieval) = tokio::select! {
            biased;
            _ = cancel.cancelled() => (Vec::new(), RetrievalStatus::Cancelled),
            joined = tokio::time::timeout(timeout, task) => match joined {
                Ok(Ok(Ok(similar))) => (similar, RetrievalStatus::Completed),
                Ok(Ok(Err(e))) => {
                    tracing::warn!(error = %e, "similarity retrieval failed, continuing without history");
                    self.stats.lock().retrieval_failures += 1;
                    (Vec::new(), RetrievalStatus::Failed)
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "similarity retrieval task panicked");
                    self.stats.lock().retrieval_failures += 1;
                    (Vec::new(), RetrievalStatus::Failed)
                }
                Err(_) => {
                    tracing::warn!(timeout_ms = timeout.as_millis() as u64, "similarity retrieval timed out");
                    self.stats.lock().retrieval_timeouts += 1;
                    (Vec::new(), RetrievalStatus::TimedOut)
                }
            },
        };

        similar.retain(|s| s.incident.incident_id != exclude);
        similar.truncate(k);

        Analysis {
            similar,
            retrieval,
            cache_hit: cache_hit && retrieval == RetrievalStatus::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::IncidentNode;

    fn result(similarity: f64, success_rate: Option<f64>) -> SimilarityResult {
        SimilarityResult {
            incident: IncidentNode::from_event(
                "inc_test".into(),
                &ReliabilityEvent::new("api", 400.0, 0.1),
                Map::new(),
            ),
            similarity,
            distance: 0.0,
            outcomes: Vec::new(),
            success_rate,
        }
    }

    #[test]
    fn confidence_without_history() {
        let c = score_confidence(0.85, HealingAction::Rollback, &[]);
        assert!((c - 0.85 * 0.8).abs() < 1e-12);
    }

    #[test]
    fn confidence_with_history() {
        let similar = [result(1.0, None), result(0.5, None)];
        let c = score_confidence(0.85, HealingAction::AlertTeam, &similar);
        assert!((c - 0.85 * 0.99 * (0.9 + 0.75 * 0.1)).abs() < 1e-12);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(score_confidence(5.0, HealingAction::RestartContainer, &[]), 1.0);
    }

    #[test]
    fn reasoning_chain_skips_history_step_without_results() {
        let chain = reasoning_chain(HealingAction::ScaleOut, "api", &Map::new(), &[]);
        let kinds: Vec<_> = chain.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![ReasoningKind::ComponentAnalysis, ReasoningKind::ActionRecommendation]
        );
        assert_eq!(chain[1].step, 2);

        let similar = [result(0.9, Some(1.0)), result(0.8, Some(0.0))];
        let chain = reasoning_chain(HealingAction::ScaleOut, "api", &Map::new(), &similar);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1].details["historical_success_rate"], 0.5);
    }

    #[test]
    fn executed_serializes_as_false() {
        let response = AdvisoryResponse::without_result(
            "r".into(),
            ResponseStatus::Rejected,
            "nope".into(),
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["executed"], false);
        assert_eq!(value["status"], "rejected");
        assert!(value.get("result").is_none());
    }
}
