//! Declarative healing policies and their load-time validation.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::advisory::HealingAction;
use crate::error::{Result, VigilError};
use crate::event::{Metric, ReliabilityEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
}

impl Operator {
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Eq => value == threshold,
            Self::Gte => value >= threshold,
            Self::Lte => value <= threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "==",
            Self::Gte => ">=",
            Self::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCondition {
    pub metric: Metric,
    pub operator: Operator,
    pub threshold: f64,
}

impl PolicyCondition {
    pub fn new(metric: Metric, operator: Operator, threshold: f64) -> Self {
        Self {
            metric,
            operator,
            threshold,
        }
    }

    /// False when the event does not report the metric or it is NaN.
    pub fn matches(&self, event: &ReliabilityEvent) -> bool {
        event
            .metric(self.metric)
            .is_some_and(|v| self.operator.compare(v, self.threshold))
    }
}

impl std::fmt::Display for PolicyCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.metric, self.operator.symbol(), self.threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingPolicy {
    pub name: String,
    /// All must hold for the policy to match.
    pub conditions: Vec<PolicyCondition>,
    pub actions: Vec<HealingAction>,
    /// 1 (most urgent) to 5. Informational; evaluation follows declaration order.
    pub priority: u8,
    #[serde(default = "default_cool_down")]
    pub cool_down_seconds: u64,
    #[serde(default)]
    pub max_executions_per_hour: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// One week.
const MAX_COOL_DOWN_SECONDS: u64 = 7 * 24 * 3600;

fn default_cool_down() -> u64 {
    300
}

fn default_enabled() -> bool {
    true
}

impl HealingPolicy {
    fn new(
        name: &str,
        conditions: Vec<PolicyCondition>,
        actions: Vec<HealingAction>,
        priority: u8,
    ) -> Self {
        Self {
            name: name.to_string(),
            conditions,
            actions,
            priority,
            cool_down_seconds: default_cool_down(),
            max_executions_per_hour: None,
            enabled: true,
        }
    }

    pub fn matches(&self, event: &ReliabilityEvent) -> bool {
        self.conditions.iter().all(|c| c.matches(event))
    }

    fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("policy name must not be empty".to_string());
        }
        if !(1..=5).contains(&self.priority) {
            errors.push(format!(
                "policy {}: priority must be 1-5, got {}",
                self.name, self.priority
            ));
        }
        if self.actions.is_empty() {
            errors.push(format!("policy {}: actions must not be empty", self.name));
        }
        if self.actions.contains(&HealingAction::NoAction) {
            errors.push(format!("policy {}: no_action is not a tool", self.name));
        }
        if self.cool_down_seconds > MAX_COOL_DOWN_SECONDS {
            errors.push(format!(
                "policy {}: cool_down_seconds must be at most {}, got {}",
                self.name, MAX_COOL_DOWN_SECONDS, self.cool_down_seconds
            ));
        }
        for c in &self.conditions {
            if !(c.threshold >= 0.0) {
                errors.push(format!(
                    "policy {}: threshold for {} must be >= 0, got {}",
                    self.name, c.metric, c.threshold
                ));
            }
        }
        errors
    }
}

/// Check a policy set, collecting every problem.
pub fn validate_policies(policies: &[HealingPolicy]) -> Result<()> {
    let mut errors: Vec<String> = policies.iter().flat_map(HealingPolicy::problems).collect();
    let mut names = HashSet::new();
    for p in policies {
        if !names.insert(p.name.as_str()) {
            errors.push(format!("duplicate policy name: {}", p.name));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(VigilError::Validation(errors))
    }
}

#[derive(Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policy: Vec<HealingPolicy>,
}

/// Parse `[[policy]]` tables from TOML and validate them.
pub fn parse_policies(toml_str: &str) -> Result<Vec<HealingPolicy>> {
    let file: PolicyFile = toml::from_str(toml_str)
        .map_err(|e| VigilError::Validation(vec![format!("invalid policy file: {e}")]))?;
    validate_policies(&file.policy)?;
    Ok(file.policy)
}

pub fn load_policies(path: &Path) -> Result<Vec<HealingPolicy>> {
    let contents = std::fs::read_to_string(path).map_err(|e| VigilError::persistence(path, e))?;
    let policies = parse_policies(&contents)?;
    tracing::info!(path = %path.display(), count = policies.len(), "loaded healing policies");
    Ok(policies)
}

/// The built-in policy set.
pub fn default_policies() -> Vec<HealingPolicy> {
    use HealingAction::*;
    use Metric::*;
    use Operator::*;

    let c = PolicyCondition::new;
    vec![
        HealingPolicy::new(
            "high_latency_restart",
            vec![c(LatencyP99, Gt, 300.0), c(ErrorRate, Lt, 0.1)],
            vec![RestartContainer],
            2,
        ),
        HealingPolicy::new(
            "cascading_failure",
            vec![c(ErrorRate, Gt, 0.15)],
            vec![CircuitBreaker, AlertTeam],
            1,
        ),
        HealingPolicy::new(
            "resource_exhaustion",
            vec![c(CpuUtil, Gt, 0.85), c(MemoryUtil, Gt, 0.85)],
            vec![ScaleOut, AlertTeam],
            1,
        ),
        HealingPolicy::new(
            "moderate_performance_issue",
            vec![c(LatencyP99, Gt, 200.0), c(ErrorRate, Gt, 0.05)],
            vec![TrafficShift],
            3,
        ),
        HealingPolicy::new(
            "critical_failure",
            vec![c(LatencyP99, Gt, 500.0), c(ErrorRate, Gt, 0.1)],
            vec![RestartContainer, AlertTeam, TrafficShift],
            1,
        ),
    ]
}
