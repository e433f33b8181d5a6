//! The advisory record produced for every accepted recommendation.
//!
//! A [`HealingIntent`] is immutable: fields are private and set once by
//! [`HealingIntent::new`]. It has no notion of having been executed. Its
//! `deterministic_id` is a content hash of action, component, normalized parameters,
//! incident ID, and detection time truncated to the second, so identical requests
//! within one second collapse to one ID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::tools::HealingAction;
use super::validate::clean_string;
use crate::error::{Result, VigilError};

/// Intent justifications are capped at this many characters.
pub const MAX_INTENT_JUSTIFICATION: usize = 1_000;

pub const ENVELOPE_VERSION: u32 = 1;
pub const ENVELOPE_SCHEMA: &str = "healing_intent_v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningKind {
    ComponentAnalysis,
    HistoricalContext,
    ActionRecommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step: u32,
    #[serde(rename = "type")]
    pub kind: ReasoningKind,
    pub description: String,
    #[serde(default)]
    pub details: Value,
}

/// Compact view of a past incident that informed the recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarIncident {
    pub incident_id: String,
    pub component: String,
    pub similarity: f64,
    #[serde(default)]
    pub success_rate: Option<f64>,
    #[serde(default)]
    pub actions_taken: Vec<String>,
    #[serde(default)]
    pub resolution_time_minutes: Option<f64>,
}

/// Everything needed to build an intent.
#[derive(Debug, Clone)]
pub struct IntentDraft {
    pub action: HealingAction,
    pub component: String,
    pub parameters: Map<String, Value>,
    pub justification: String,
    pub confidence: f64,
    pub incident_id: String,
    pub detected_at: DateTime<Utc>,
    pub reasoning_chain: Vec<ReasoningStep>,
    pub similar_incidents: Vec<SimilarIncident>,
    pub policy_applied: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IntentFields")]
pub struct HealingIntent {
    intent_id: String,
    deterministic_id: String,
    action: HealingAction,
    component: String,
    parameters: Map<String, Value>,
    justification: String,
    confidence: f64,
    incident_id: String,
    detected_at: DateTime<Utc>,
    reasoning_chain: Vec<ReasoningStep>,
    similar_incidents: Vec<SimilarIncident>,
    policy_applied: Option<String>,
    rag_similarity_score: Option<f64>,
}

/// Wire form accepted on deserialization; checked before becoming an intent.
#[derive(Deserialize)]
struct IntentFields {
    intent_id: String,
    deterministic_id: String,
    action: HealingAction,
    component: String,
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default)]
    justification: String,
    confidence: f64,
    #[serde(default)]
    incident_id: String,
    detected_at: DateTime<Utc>,
    #[serde(default)]
    reasoning_chain: Vec<ReasoningStep>,
    #[serde(default)]
    similar_incidents: Vec<SimilarIncident>,
    #[serde(default)]
    policy_applied: Option<String>,
    #[serde(default)]
    rag_similarity_score: Option<f64>,
}

impl TryFrom<IntentFields> for HealingIntent {
    type Error = VigilError;

    fn try_from(f: IntentFields) -> Result<Self> {
        check_confidence(f.confidence)?;
        let expected =
            deterministic_id(f.action, &f.component, &f.parameters, &f.incident_id, f.detected_at);
        if f.deterministic_id != expected {
            return Err(VigilError::Codec(format!(
                "deterministic_id {} does not match intent content",
                f.deterministic_id
            )));
        }
        Ok(Self {
            intent_id: f.intent_id,
            deterministic_id: f.deterministic_id,
            action: f.action,
            component: f.component,
            parameters: f.parameters,
            justification: f.justification,
            confidence: f.confidence,
            incident_id: f.incident_id,
            detected_at: f.detected_at,
            reasoning_chain: f.reasoning_chain,
            similar_incidents: f.similar_incidents,
            policy_applied: f.policy_applied,
            rag_similarity_score: f.rag_similarity_score,
        })
    }
}

fn check_confidence(confidence: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(VigilError::Validation(vec![format!(
            "confidence must be between 0.0 and 1.0, got {confidence}"
        )]));
    }
    Ok(())
}

/// JSON with object keys sorted at every level, independent of map ordering features.
fn canonical_json(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                canonical_json(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonical_json(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub fn deterministic_id(
    action: HealingAction,
    component: &str,
    parameters: &Map<String, Value>,
    incident_id: &str,
    detected_at: DateTime<Utc>,
) -> String {
    let data = serde_json::json!({
        "action": action.as_str(),
        "component": component,
        "parameters": Value::Object(parameters.clone()),
        "incident_id": incident_id,
        "detected_at": detected_at.timestamp(),
    });
    let mut canonical = String::new();
    canonical_json(&data, &mut canonical);
    let digest = format!("{:x}", Sha256::digest(canonical.as_bytes()));
    format!("intent_{}", &digest[..16])
}

impl HealingIntent {
    /// Build an intent. The justification is cleaned and capped at
    /// [`MAX_INTENT_JUSTIFICATION`] characters; confidence must lie in `[0, 1]`.
    pub fn new(draft: IntentDraft) -> Result<Self> {
        check_confidence(draft.confidence)?;
        if !draft.action.is_tool() {
            return Err(VigilError::Validation(vec![
                "an intent requires a registered tool".into(),
            ]));
        }

        let rag_similarity_score = (!draft.similar_incidents.is_empty()).then(|| {
            let top: Vec<_> = draft.similar_incidents.iter().take(3).collect();
            top.iter().map(|s| s.similarity).sum::<f64>() / top.len() as f64
        });
        let deterministic_id = deterministic_id(
            draft.action,
            &draft.component,
            &draft.parameters,
            &draft.incident_id,
            draft.detected_at,
        );
        let random = uuid::Uuid::new_v4().simple().to_string();

        Ok(Self {
            intent_id: format!("intent_{}", &random[..16]),
            deterministic_id,
            action: draft.action,
            component: draft.component,
            parameters: draft.parameters,
            justification: clean_string(&draft.justification, MAX_INTENT_JUSTIFICATION),
            confidence: draft.confidence,
            incident_id: draft.incident_id,
            detected_at: draft.detected_at,
            reasoning_chain: draft.reasoning_chain,
            similar_incidents: draft.similar_incidents,
            policy_applied: draft.policy_applied,
            rag_similarity_score,
        })
    }

    pub fn intent_id(&self) -> &str {
        &self.intent_id
    }

    pub fn deterministic_id(&self) -> &str {
        &self.deterministic_id
    }

    pub fn action(&self) -> HealingAction {
        self.action
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn justification(&self) -> &str {
        &self.justification
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn incident_id(&self) -> &str {
        &self.incident_id
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    pub fn reasoning_chain(&self) -> &[ReasoningStep] {
        &self.reasoning_chain
    }

    pub fn similar_incidents(&self) -> &[SimilarIncident] {
        &self.similar_incidents
    }

    pub fn policy_applied(&self) -> Option<&str> {
        self.policy_applied.as_deref()
    }

    pub fn rag_similarity_score(&self) -> Option<f64> {
        self.rag_similarity_score
    }

    /// The request a downstream executor would receive. Vigil never sends it.
    pub fn to_execution_request(&self) -> ExecutionRequest {
        ExecutionRequest {
            intent_id: self.deterministic_id.clone(),
            action: self.action,
            component: self.component.clone(),
            parameters: self.parameters.clone(),
            justification: self.justification.clone(),
            confidence: self.confidence,
            incident_id: self.incident_id.clone(),
            detected_at: self.detected_at,
            requires_enterprise: true,
            advisory_metadata: AdvisoryMetadata {
                similar_incidents_count: self.similar_incidents.len(),
                rag_similarity_score: self.rag_similarity_score,
                has_reasoning_chain: !self.reasoning_chain.is_empty(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRequest {
    pub intent_id: String,
    pub action: HealingAction,
    pub component: String,
    pub parameters: Map<String, Value>,
    pub justification: String,
    pub confidence: f64,
    pub incident_id: String,
    pub detected_at: DateTime<Utc>,
    pub requires_enterprise: bool,
    pub advisory_metadata: AdvisoryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisoryMetadata {
    pub similar_incidents_count: usize,
    pub rag_similarity_score: Option<f64>,
    pub has_reasoning_chain: bool,
}

/// Versioned wrapper for storing or transmitting intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentEnvelope {
    pub version: u32,
    pub schema: String,
    pub data: Value,
}

impl IntentEnvelope {
    pub fn wrap(intent: &HealingIntent) -> Result<Self> {
        Ok(Self {
            version: ENVELOPE_VERSION,
            schema: ENVELOPE_SCHEMA.to_string(),
            data: serde_json::to_value(intent)?,
        })
    }

    pub fn unwrap_intent(self) -> Result<HealingIntent> {
        if self.version != ENVELOPE_VERSION {
            return Err(VigilError::Codec(format!(
                "unsupported intent envelope version {}",
                self.version
            )));
        }
        Ok(serde_json::from_value(self.data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn draft() -> IntentDraft {
        IntentDraft {
            action: HealingAction::RestartContainer,
            component: "api".into(),
            parameters: json!({"force": true, "grace_period_seconds": 30})
                .as_object()
                .cloned()
                .unwrap(),
            justification: "latency spike".into(),
            confidence: 0.85,
            incident_id: "inc_1".into(),
            detected_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
            reasoning_chain: Vec::new(),
            similar_incidents: Vec::new(),
            policy_applied: None,
        }
    }

    #[test]
    fn deterministic_id_ignores_sub_second_and_key_order() {
        let a = HealingIntent::new(draft()).unwrap();

        let mut d = draft();
        d.detected_at = d.detected_at + chrono::Duration::milliseconds(900);
        d.parameters = json!({"grace_period_seconds": 30, "force": true})
            .as_object()
            .cloned()
            .unwrap();
        let b = HealingIntent::new(d).unwrap();

        assert_eq!(a.deterministic_id(), b.deterministic_id());
        assert_ne!(a.intent_id(), b.intent_id());
        assert!(a.deterministic_id().starts_with("intent_"));
    }

    #[test]
    fn deterministic_id_changes_with_content() {
        let a = HealingIntent::new(draft()).unwrap();
        let mut d = draft();
        d.detected_at = d.detected_at + chrono::Duration::seconds(1);
        assert_ne!(a.deterministic_id(), HealingIntent::new(d).unwrap().deterministic_id());
    }

    #[test]
    fn rejects_out_of_range_confidence_and_no_action() {
        let mut d = draft();
        d.confidence = 1.2;
        assert!(HealingIntent::new(d).is_err());

        let mut d = draft();
        d.action = HealingAction::NoAction;
        assert!(HealingIntent::new(d).is_err());
    }

    #[test]
    fn justification_is_capped() {
        let mut d = draft();
        d.justification = "j".repeat(5_000);
        let intent = HealingIntent::new(d).unwrap();
        assert_eq!(intent.justification().len(), MAX_INTENT_JUSTIFICATION);
    }

    #[test]
    fn rag_score_averages_top_three() {
        let mut d = draft();
        d.similar_incidents = [0.9, 0.8, 0.7, 0.1]
            .into_iter()
            .map(|s| SimilarIncident {
                incident_id: "inc".into(),
                component: "api".into(),
                similarity: s,
                success_rate: None,
                actions_taken: Vec::new(),
                resolution_time_minutes: None,
            })
            .collect();
        let intent = HealingIntent::new(d).unwrap();
        assert!((intent.rag_similarity_score().unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(intent.to_execution_request().advisory_metadata.similar_incidents_count, 4);
    }

    #[test]
    fn execution_request_uses_deterministic_id() {
        let intent = HealingIntent::new(draft()).unwrap();
        let req = intent.to_execution_request();
        assert_eq!(req.intent_id, intent.deterministic_id());
        assert!(req.requires_enterprise);
        assert!(!req.advisory_metadata.has_reasoning_chain);
    }

    #[test]
    fn envelope_round_trip_and_version_check() {
        let intent = HealingIntent::new(draft()).unwrap();
        let envelope = IntentEnvelope::wrap(&intent).unwrap();
        assert_eq!(envelope.schema, "healing_intent_v1");
        assert_eq!(envelope.clone().unwrap_intent().unwrap(), intent);

        let mut future = envelope;
        future.version = 2;
        assert!(future.unwrap_intent().is_err());
    }

    #[test]
    fn tampered_intent_fails_to_deserialize() {
        let intent = HealingIntent::new(draft()).unwrap();
        let mut value = serde_json::to_value(&intent).unwrap();
        value["component"] = json!("other");
        assert!(serde_json::from_value::<HealingIntent>(value).is_err());
    }
}
