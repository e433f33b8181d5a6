use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreOutcomeParams {
    #[schemars(description = "ID of the incident this outcome resolves (from process_event)")]
    pub incident_id: String,

    #[schemars(description = "Actions that were actually taken")]
    pub actions_taken: Vec<String>,

    #[schemars(description = "Whether the actions resolved the incident")]
    pub success: bool,

    #[schemars(description = "Minutes from detection to resolution")]
    pub resolution_time_minutes: f64,

    #[schemars(description = "Optional lessons learned")]
    pub lessons_learned: Option<Vec<String>>,
}
