//! Request validation and parameter sanitization.
//!
//! Validation runs on the raw JSON so every problem can be reported at once, including
//! wrong field types that a typed deserializer would stop at. Sanitization then bounds
//! whatever passed: parameters later flow into cache keys, justifications, and responses.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::tools::HealingAction;

pub const MAX_COMPONENT_LEN: usize = 255;
pub const MAX_JUSTIFICATION_LEN: usize = 10_000;
pub const MAX_PARAMETERS_BYTES: usize = 100_000;
pub const MAX_REQUEST_ID_LEN: usize = 100;
pub const MAX_METADATA_BYTES: usize = 100_000;
pub const MAX_INCIDENT_ID_LEN: usize = 100;

const MAX_KEY_LEN: usize = 100;
const MAX_STRING_LEN: usize = 10_000;
const MAX_LIST_ITEMS: usize = 100;
const MAX_LIST_STRING_LEN: usize = 1_000;
/// Objects nested deeper than this are dropped.
const MAX_DEPTH: usize = 5;

/// A request that passed validation. Parameters are not yet sanitized.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryRequest {
    pub request_id: Option<String>,
    pub tool: HealingAction,
    pub component: String,
    pub parameters: Map<String, Value>,
    pub justification: String,
    pub metadata: Map<String, Value>,
}

impl AdvisoryRequest {
    pub fn incident_id(&self) -> Option<&str> {
        self.metadata.get("incident_id").and_then(Value::as_str)
    }
}

fn component_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check every field of a raw request, collecting all violations.
pub fn validate_request(raw: &Value) -> Result<AdvisoryRequest, Vec<String>> {
    let mut errors = Vec::new();
    let Some(obj) = raw.as_object() else {
        return Err(vec![format!("request must be an object, got {}", json_kind(raw))]);
    };

    let tool = match obj.get("tool") {
        None => {
            errors.push("missing required field: tool".to_string());
            None
        }
        Some(Value::String(name)) => {
            let tool = HealingAction::tool(name);
            if tool.is_none() {
                errors.push(format!("unknown tool: {name}"));
            }
            tool
        }
        Some(other) => {
            errors.push(format!("tool must be a string, got {}", json_kind(other)));
            None
        }
    };

    let component = match obj.get("component") {
        None => {
            errors.push("missing required field: component".to_string());
            None
        }
        Some(Value::String(c)) => {
            let len = c.chars().count();
            if len == 0 || len > MAX_COMPONENT_LEN {
                errors.push(format!(
                    "component must be 1-{MAX_COMPONENT_LEN} characters, got {len}"
                ));
            } else if !component_pattern().is_match(c) {
                errors.push(format!(
                    "invalid component name: {c}. Must contain only letters, numbers, hyphens, and underscores"
                ));
            }
            Some(c.clone())
        }
        Some(other) => {
            errors.push(format!("component must be a string, got {}", json_kind(other)));
            None
        }
    };

    let justification = match obj.get("justification") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(j)) => {
            let len = j.chars().count();
            if len > MAX_JUSTIFICATION_LEN {
                errors.push(format!(
                    "justification too long (max {MAX_JUSTIFICATION_LEN} characters): {len}"
                ));
            } else if len < 10 {
                tracing::debug!(len, "justification is brief");
            }
            j.clone()
        }
        Some(other) => {
            errors.push(format!("justification must be a string, got {}", json_kind(other)));
            String::new()
        }
    };

    let parameters = match obj.get("parameters") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(p)) => {
            let size = serde_json::to_string(p).map(|s| s.len()).unwrap_or(usize::MAX);
            if size > MAX_PARAMETERS_BYTES {
                errors.push(format!(
                    "parameters too large (max {MAX_PARAMETERS_BYTES} bytes): {size}"
                ));
            }
            if let Some(tool) = tool {
                errors.extend(tool.check_params(p));
            }
            p.clone()
        }
        Some(other) => {
            errors.push(format!("parameters must be an object, got {}", json_kind(other)));
            Map::new()
        }
    };

    let request_id = match obj.get("request_id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) if id.is_empty() => None,
        Some(Value::String(id)) => {
            let len = id.chars().count();
            if len > MAX_REQUEST_ID_LEN {
                errors.push(format!(
                    "request_id too long (max {MAX_REQUEST_ID_LEN} characters): {len}"
                ));
            }
            Some(id.clone())
        }
        Some(other) => {
            errors.push(format!("request_id must be a string, got {}", json_kind(other)));
            None
        }
    };

    let metadata = match obj.get("metadata") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => {
            let size = serde_json::to_string(m).map(|s| s.len()).unwrap_or(usize::MAX);
            if size > MAX_METADATA_BYTES {
                errors.push(format!(
                    "metadata too large (max {MAX_METADATA_BYTES} bytes): {size}"
                ));
            }
            sanitize_metadata(m)
        }
        Some(other) => {
            errors.push(format!("metadata must be an object, got {}", json_kind(other)));
            Map::new()
        }
    };

    if let Some(mode) = obj.get("mode").and_then(Value::as_str) {
        if mode != "advisory" {
            tracing::warn!(mode, "only advisory mode is supported, ignoring requested mode");
        }
    }

    match (tool, component) {
        (Some(tool), Some(component)) if errors.is_empty() => Ok(AdvisoryRequest {
            request_id,
            tool,
            component,
            parameters,
            justification,
            metadata,
        }),
        _ => Err(errors),
    }
}

fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}')
}

/// Remove control characters (tab, newline, and carriage return survive) and cap the
/// result at `max_chars` characters.
pub fn clean_string(s: &str, max_chars: usize) -> String {
    s.chars()
        .filter(|c| !is_stripped_control(*c))
        .take(max_chars)
        .collect()
}

/// Recursively bound a parameter map.
///
/// Keys are capped at 100 characters, strings at 10,000, lists at 100 scalar items
/// (strings inside lists at 1,000), and nesting at five levels. Non-scalar list
/// items are dropped.
pub fn sanitize_parameters(params: &Map<String, Value>) -> Map<String, Value> {
    sanitize_map(params, 1)
}

/// Bound metadata like parameters. `incident_id` is further capped at 100 characters
/// since it feeds intent identity.
fn sanitize_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    let mut out = sanitize_map(metadata, 1);
    if let Some(Value::String(id)) = out.get_mut("incident_id") {
        *id = clean_string(id, MAX_INCIDENT_ID_LEN);
    }
    out
}

fn sanitize_map(map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in map {
        let key = clean_string(key, MAX_KEY_LEN);
        let value = match value {
            Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
            Value::String(s) => {
                if s.chars().count() > MAX_STRING_LEN {
                    tracing::warn!(key = %key, "parameter value too long, truncating");
                }
                Value::String(clean_string(s, MAX_STRING_LEN))
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .take(MAX_LIST_ITEMS)
                    .filter_map(|item| match item {
                        Value::String(s) => Some(Value::String(clean_string(s, MAX_LIST_STRING_LEN))),
                        Value::Null | Value::Bool(_) | Value::Number(_) => Some(item.clone()),
                        Value::Array(_) | Value::Object(_) => None,
                    })
                    .collect(),
            ),
            Value::Object(nested) => {
                if depth >= MAX_DEPTH {
                    tracing::warn!(key = %key, "parameters nested too deeply, dropping");
                    continue;
                }
                Value::Object(sanitize_map(nested, depth + 1))
            }
        };
        out.insert(key, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn errors_of(raw: Value) -> Vec<String> {
        validate_request(&raw).unwrap_err()
    }

    #[test]
    fn valid_request_parses() {
        let req = validate_request(&json!({
            "tool": "restart_container",
            "component": "payments_api-2",
            "parameters": {"force": true},
            "justification": "latency spike after deploy",
            "request_id": "req-1",
            "metadata": {"incident_id": "inc_abc"}
        }))
        .unwrap();
        assert_eq!(req.tool, HealingAction::RestartContainer);
        assert_eq!(req.incident_id(), Some("inc_abc"));
        assert_eq!(req.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn validation_accumulates_every_error() {
        let errors = errors_of(json!({
            "tool": "drop_tables",
            "component": "bad component!",
            "parameters": [1, 2, 3],
            "justification": "x".repeat(10_001),
            "request_id": "r".repeat(101)
        }));
        assert_eq!(errors.len(), 5, "{errors:?}");
    }

    #[test]
    fn missing_fields_are_reported() {
        let errors = errors_of(json!({}));
        assert!(errors.iter().any(|e| e.contains("tool")));
        assert!(errors.iter().any(|e| e.contains("component")));
    }

    #[test]
    fn oversized_parameters_are_rejected() {
        let errors = errors_of(json!({
            "tool": "alert_team",
            "component": "api",
            "parameters": {"blob": "x".repeat(MAX_PARAMETERS_BYTES + 1)}
        }));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("too large"));
    }

    #[test]
    fn typed_parameter_mismatch_is_rejected() {
        let errors = errors_of(json!({
            "tool": "scale_out",
            "component": "api",
            "parameters": {"replicas": 2.5}
        }));
        assert!(errors[0].contains("replicas"));
    }

    #[test]
    fn non_object_request_is_rejected() {
        assert_eq!(errors_of(json!("restart everything")).len(), 1);
    }

    #[test]
    fn sanitize_strips_control_chars_then_truncates() {
        let long = format!("\u{0}control\u{1}chars{}", "y".repeat(20_000));
        let params = json!({"note": long, "keep": "tab\there\nnewline"});
        let clean = sanitize_parameters(params.as_object().unwrap());

        let note = clean["note"].as_str().unwrap();
        assert_eq!(note.chars().count(), 10_000);
        assert!(note.starts_with("controlchars"));
        assert!(!note.chars().any(is_stripped_control));
        assert_eq!(clean["keep"], "tab\there\nnewline");
    }

    #[test]
    fn sanitize_bounds_lists_keys_and_depth() {
        let items: Vec<Value> = (0..150).map(Value::from).collect();
        let params = json!({
            "k".repeat(150): 1,
            "list": items,
            "mixed": ["a".repeat(2_000), {"nested": true}, [1], null],
            "l1": {"l2": {"l3": {"l4": {"l5": {"l6": "deep"}}}}}
        });
        let clean = sanitize_parameters(params.as_object().unwrap());

        assert!(clean.contains_key(&"k".repeat(100)));
        assert_eq!(clean["list"].as_array().unwrap().len(), 100);

        let mixed = clean["mixed"].as_array().unwrap();
        assert_eq!(mixed.len(), 2);
        assert_eq!(mixed[0].as_str().unwrap().len(), 1_000);

        let l4 = &clean["l1"]["l2"]["l3"]["l4"];
        assert!(l4.is_object());
        assert!(l4.get("l5").is_none());
    }

    #[test]
    fn metadata_incident_id_is_cleaned_and_capped() {
        let long_id = format!("inc_\u{7}{}", "a".repeat(500));
        let request = validate_request(&json!({
            "tool": "alert_team",
            "component": "api",
            "metadata": {"incident_id": long_id, "note": "x\u{0}y"},
        }))
        .unwrap();

        let id = request.incident_id().unwrap();
        assert_eq!(id.chars().count(), MAX_INCIDENT_ID_LEN);
        assert!(id.starts_with("inc_a"));
        assert_eq!(request.metadata["note"], json!("xy"));
    }

    #[test]
    fn oversized_metadata_is_rejected() {
        let errors = errors_of(json!({
            "tool": "alert_team",
            "component": "api",
            "metadata": {"blob": "z".repeat(MAX_METADATA_BYTES)},
        }));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("metadata too large"), "{errors:?}");
    }
}
