use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FindSimilarParams {
    #[schemars(description = "Component the symptom was observed on")]
    pub component: String,

    #[schemars(description = "P99 latency in milliseconds")]
    pub latency_p99: f64,

    #[schemars(description = "Error rate between 0.0 and 1.0")]
    pub error_rate: f64,

    #[schemars(description = "Severity: low, medium, high, critical. Defaults to low.")]
    pub severity: Option<String>,

    #[schemars(description = "Maximum number of incidents to return. Defaults to 5.")]
    pub k: Option<usize>,
}
