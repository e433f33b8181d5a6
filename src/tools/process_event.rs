use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ProcessEventParams {
    #[schemars(description = "Component name, lowercase letters, digits and '-'")]
    pub component: String,

    #[schemars(description = "P99 latency in milliseconds")]
    pub latency_p99: f64,

    #[schemars(description = "Error rate between 0.0 and 1.0")]
    pub error_rate: f64,

    #[schemars(description = "Requests per second. Defaults to 0.")]
    pub throughput: Option<f64>,

    #[schemars(description = "CPU utilisation between 0.0 and 1.0")]
    pub cpu_util: Option<f64>,

    #[schemars(description = "Memory utilisation between 0.0 and 1.0")]
    pub memory_util: Option<f64>,

    #[schemars(description = "Severity: low, medium, high, critical. Defaults to low.")]
    pub severity: Option<String>,

    #[schemars(description = "Service mesh name. Defaults to 'default'.")]
    pub service_mesh: Option<String>,
}
