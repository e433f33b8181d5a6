use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw advisory request. Forwarded as-is so validation sees exactly what the client sent.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteToolParams {
    #[schemars(
        description = "Remediation tool: rollback, restart_container, scale_out, circuit_breaker, traffic_shift, alert_team"
    )]
    pub tool: String,

    #[schemars(description = "Affected component, letters, digits, '-' and '_' only")]
    pub component: String,

    #[schemars(description = "Why this action is being considered (max 10000 characters)")]
    pub justification: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Tool-specific parameters, e.g. {\"replicas\": 3} for scale_out")]
    pub parameters: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Optional caller-supplied request ID (max 100 characters)")]
    pub request_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(
        description = "Optional context. incident_id links a stored incident; latency_p99 and error_rate describe the symptom when no incident is known."
    )]
    pub metadata: Option<Map<String, Value>>,
}
