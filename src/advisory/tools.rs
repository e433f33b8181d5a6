//! Registry of the remediation tools an advisory request may name.
//!
//! Each tool carries a description, a safety level, the confidence weight applied when
//! scoring a recommendation, and a typed schema for the parameters it understands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A remediation action. [`HealingAction::NoAction`] is the sentinel the policy engine
/// returns when nothing matched; it is not a registered tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingAction {
    RestartContainer,
    ScaleOut,
    CircuitBreaker,
    TrafficShift,
    Rollback,
    AlertTeam,
    NoAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Low,
    Medium,
    High,
}

/// JSON kind expected for a known parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Bool,
}

impl ParamKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Bool => "boolean",
        }
    }
}

pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

const fn param(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec { name, kind }
}

const RESTART_PARAMS: &[ParamSpec] = &[
    param("grace_period_seconds", ParamKind::Number),
    param("force", ParamKind::Bool),
];
const SCALE_OUT_PARAMS: &[ParamSpec] = &[
    param("replicas", ParamKind::Integer),
    param("max_replicas", ParamKind::Integer),
];
const CIRCUIT_BREAKER_PARAMS: &[ParamSpec] = &[
    param("error_threshold", ParamKind::Number),
    param("timeout_seconds", ParamKind::Number),
];
const TRAFFIC_SHIFT_PARAMS: &[ParamSpec] = &[
    param("target", ParamKind::String),
    param("percentage", ParamKind::Number),
];
const ROLLBACK_PARAMS: &[ParamSpec] = &[
    param("revision", ParamKind::String),
    param("reason", ParamKind::String),
];
const ALERT_TEAM_PARAMS: &[ParamSpec] = &[
    param("channel", ParamKind::String),
    param("severity", ParamKind::String),
    param("message", ParamKind::String),
];

impl HealingAction {
    /// The six registered tools, in registry order.
    pub const TOOLS: [HealingAction; 6] = [
        Self::Rollback,
        Self::RestartContainer,
        Self::ScaleOut,
        Self::CircuitBreaker,
        Self::TrafficShift,
        Self::AlertTeam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RestartContainer => "restart_container",
            Self::ScaleOut => "scale_out",
            Self::CircuitBreaker => "circuit_breaker",
            Self::TrafficShift => "traffic_shift",
            Self::Rollback => "rollback",
            Self::AlertTeam => "alert_team",
            Self::NoAction => "no_action",
        }
    }

    /// Registered tool by name. `no_action` is not a tool.
    pub fn tool(name: &str) -> Option<Self> {
        Self::TOOLS.into_iter().find(|t| t.as_str() == name)
    }

    pub fn is_tool(&self) -> bool {
        *self != Self::NoAction
    }

    /// Confidence multiplier reflecting blast radius; riskier tools score lower.
    pub fn weight(&self) -> f64 {
        match self {
            Self::RestartContainer => 1.0,
            Self::ScaleOut => 0.95,
            Self::CircuitBreaker => 0.9,
            Self::TrafficShift => 0.85,
            Self::Rollback => 0.8,
            Self::AlertTeam => 0.99,
            Self::NoAction => 0.0,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Rollback => "Analyze deployment rollback feasibility and impact",
            Self::RestartContainer => "Analyze container restart impact and timing",
            Self::ScaleOut => "Analyze scaling feasibility and resource requirements",
            Self::CircuitBreaker => "Analyze circuit breaker activation impact",
            Self::TrafficShift => "Analyze traffic shifting strategies",
            Self::AlertTeam => "Analyze when and how to alert human operators",
            Self::NoAction => "No remediation recommended",
        }
    }

    pub fn safety_level(&self) -> SafetyLevel {
        match self {
            Self::Rollback => SafetyLevel::High,
            Self::RestartContainer | Self::CircuitBreaker | Self::TrafficShift => {
                SafetyLevel::Medium
            }
            Self::ScaleOut | Self::AlertTeam | Self::NoAction => SafetyLevel::Low,
        }
    }

    pub fn params(&self) -> &'static [ParamSpec] {
        match self {
            Self::RestartContainer => RESTART_PARAMS,
            Self::ScaleOut => SCALE_OUT_PARAMS,
            Self::CircuitBreaker => CIRCUIT_BREAKER_PARAMS,
            Self::TrafficShift => TRAFFIC_SHIFT_PARAMS,
            Self::Rollback => ROLLBACK_PARAMS,
            Self::AlertTeam => ALERT_TEAM_PARAMS,
            Self::NoAction => &[],
        }
    }

    /// Type-check known parameters. Unknown keys are left to sanitization.
    pub fn check_params(&self, params: &serde_json::Map<String, Value>) -> Vec<String> {
        self.params()
            .iter()
            .filter_map(|spec| {
                let value = params.get(spec.name)?;
                (!value.is_null() && !spec.kind.matches(value)).then(|| {
                    format!(
                        "parameter '{}' for {} must be a {}",
                        spec.name,
                        self.as_str(),
                        spec.kind.as_str()
                    )
                })
            })
            .collect()
    }
}

impl std::fmt::Display for HealingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HealingAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_action" => Ok(Self::NoAction),
            _ => Self::tool(s).ok_or_else(|| format!("unknown action: {s}")),
        }
    }
}

/// Catalogue entry for listing tools.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub safety_level: SafetyLevel,
    pub weight: f64,
    pub parameters: Vec<(&'static str, &'static str)>,
    pub can_execute: bool,
}

pub fn registry() -> Vec<ToolInfo> {
    HealingAction::TOOLS
        .iter()
        .map(|t| ToolInfo {
            name: t.as_str(),
            description: t.description(),
            safety_level: t.safety_level(),
            weight: t.weight(),
            parameters: t.params().iter().map(|p| (p.name, p.kind.as_str())).collect(),
            can_execute: false,
        })
        .collect()
}
