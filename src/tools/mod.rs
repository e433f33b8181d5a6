pub mod execute_tool;
pub mod find_similar;
pub mod process_event;
pub mod store_outcome;

use std::sync::Arc;

use execute_tool::ExecuteToolParams;
use find_similar::FindSimilarParams;
use process_event::ProcessEventParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use store_outcome::StoreOutcomeParams;

use vigil::advisory::registry;
use vigil::engine::ReliabilityEngine;
use vigil::event::{EventSeverity, ReliabilityEvent};
use vigil::memory::NewOutcome;

const DEFAULT_SIMILAR_K: usize = 5;

/// The Vigil MCP tool handler. Every tool delegates to one shared [`ReliabilityEngine`].
#[derive(Clone)]
pub struct VigilTools {
    tool_router: ToolRouter<Self>,
    engine: Arc<ReliabilityEngine>,
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

fn parse_severity(severity: Option<&str>) -> Result<EventSeverity, String> {
    severity.map_or(Ok(EventSeverity::default()), str::parse::<EventSeverity>)
}

#[tool_router]
impl VigilTools {
    pub fn new(engine: Arc<ReliabilityEngine>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine,
        }
    }

    /// Produce an advisory healing intent for a remediation request. Never executes it.
    #[tool(description = "Evaluate a remediation tool request against incident history and return an advisory healing intent with confidence and reasoning. Nothing is executed: the response always carries executed=false.")]
    async fn execute_tool(
        &self,
        Parameters(params): Parameters<ExecuteToolParams>,
    ) -> Result<String, String> {
        tracing::info!(tool = %params.tool, component = %params.component, "execute_tool called");
        let request =
            serde_json::to_value(&params).map_err(|e| format!("invalid request: {e}"))?;
        let response = self.engine.execute_tool(&request).await;
        to_json(&response)
    }

    /// Run a reliability event through policies and the advisory pipeline.
    #[tool(description = "Process a reliability event: store it as an incident, evaluate healing policies, and return advisory intents for each candidate action. Returns the incident_id to use with store_outcome.")]
    async fn process_event(
        &self,
        Parameters(params): Parameters<ProcessEventParams>,
    ) -> Result<String, String> {
        let mut event = ReliabilityEvent::new(params.component, params.latency_p99, params.error_rate);
        event.severity = parse_severity(params.severity.as_deref())?;
        event.throughput = params.throughput.unwrap_or(0.0);
        event.cpu_util = params.cpu_util;
        event.memory_util = params.memory_util;
        if let Some(mesh) = params.service_mesh {
            event.service_mesh = mesh;
        }

        tracing::info!(component = %event.component, "process_event called");
        let report = self
            .engine
            .process_event(event)
            .await
            .map_err(|e| format!("process_event failed: {e}"))?;
        to_json(&report)
    }

    /// Record the outcome of acting on an incident.
    #[tool(description = "Record what happened after acting on an incident (actions taken, success, resolution time). Outcomes inform confidence for future similar incidents.")]
    async fn store_outcome(
        &self,
        Parameters(params): Parameters<StoreOutcomeParams>,
    ) -> Result<String, String> {
        let outcome = NewOutcome {
            incident_id: params.incident_id,
            actions_taken: params.actions_taken,
            success: params.success,
            resolution_time_minutes: params.resolution_time_minutes,
            lessons_learned: params.lessons_learned.unwrap_or_default(),
        };
        let outcome_id = self
            .engine
            .record_outcome(outcome)
            .map_err(|e| format!("store_outcome failed: {e}"))?;
        Ok(serde_json::json!({ "outcome_id": outcome_id }).to_string())
    }

    /// Search incident history for events resembling a symptom.
    #[tool(description = "Find past incidents similar to a symptom (component, latency, error rate), with their recorded outcomes and success rates.")]
    async fn find_similar(
        &self,
        Parameters(params): Parameters<FindSimilarParams>,
    ) -> Result<String, String> {
        let mut event = ReliabilityEvent::new(params.component, params.latency_p99, params.error_rate);
        event.severity = parse_severity(params.severity.as_deref())?;
        let k = params.k.unwrap_or(DEFAULT_SIMILAR_K);

        let engine = Arc::clone(&self.engine);
        let results = tokio::task::spawn_blocking(move || engine.find_similar(&event, k))
            .await
            .map_err(|e| format!("search task failed: {e}"))?
            .map_err(|e| format!("find_similar failed: {e}"))?;

        tracing::info!(results = results.len(), "find_similar completed");
        Ok(serde_json::json!({ "total": results.len(), "incidents": results }).to_string())
    }

    /// Graph, pipeline, and index counters.
    #[tool(description = "Get incident memory statistics: node and edge counts, cache hit rate, pipeline metrics, and index size.")]
    async fn graph_stats(&self) -> Result<String, String> {
        let stats = self.engine.stats();
        let mut value = serde_json::to_value(&stats).map_err(|e| format!("serialization failed: {e}"))?;
        value["graph"]["cache_hit_rate"] = serde_json::json!(stats.graph.cache_hit_rate());
        Ok(value.to_string())
    }

    /// Catalogue of the remediation tools Vigil can advise on.
    #[tool(description = "List the remediation tools Vigil can recommend, with their safety level, confidence weight, and parameters. None of them are executed by Vigil.")]
    async fn list_advisory_tools(&self) -> Result<String, String> {
        to_json(&registry())
    }

    /// Flush pending vectors and write the index to disk.
    #[tool(description = "Flush queued incident vectors and save the vector index to disk now.")]
    async fn save_index(&self) -> Result<String, String> {
        self.engine
            .save()
            .await
            .map_err(|e| format!("save failed: {e}"))?;
        let stats = self.engine.stats();
        Ok(serde_json::json!({
            "status": "saved",
            "vectors": stats.index.flushed_vectors,
        })
        .to_string())
    }
}

#[tool_handler]
impl ServerHandler for VigilTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Vigil is an incident memory server. Use process_event for new reliability \
                 events, store_outcome once an incident is resolved, and execute_tool to get an \
                 advisory intent for a specific remediation. Vigil never executes actions."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
