//! The reliability signal consumed by the policy engine and the incident memory.
//!
//! A [`ReliabilityEvent`] is produced by upstream detectors; this crate only reads it.
//! [`Metric`] names the numeric fields a policy condition may reference.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, VigilError};

/// Upper bound (exclusive) on a plausible p99 latency, in milliseconds.
pub const MAX_LATENCY_MS: f64 = 300_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventSeverity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Numeric event fields addressable from a policy condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    LatencyP99,
    ErrorRate,
    Throughput,
    CpuUtil,
    MemoryUtil,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LatencyP99 => "latency_p99",
            Self::ErrorRate => "error_rate",
            Self::Throughput => "throughput",
            Self::CpuUtil => "cpu_util",
            Self::MemoryUtil => "memory_util",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observation of a component's health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityEvent {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub component: String,
    #[serde(default = "default_service_mesh")]
    pub service_mesh: String,
    /// P99 latency in milliseconds.
    pub latency_p99: f64,
    /// Fraction of failed requests, `0.0..=1.0`.
    pub error_rate: f64,
    /// Requests per second.
    #[serde(default)]
    pub throughput: f64,
    #[serde(default)]
    pub cpu_util: Option<f64>,
    #[serde(default)]
    pub memory_util: Option<f64>,
    #[serde(default)]
    pub revenue_impact: Option<f64>,
    #[serde(default)]
    pub user_impact: Option<u64>,
    #[serde(default)]
    pub upstream_deps: Vec<String>,
    #[serde(default)]
    pub downstream_deps: Vec<String>,
    #[serde(default)]
    pub severity: EventSeverity,
}

fn default_service_mesh() -> String {
    "default".into()
}

fn component_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9-]+$").expect("static regex"))
}

impl ReliabilityEvent {
    /// Minimal event with the three fields every consumer relies on.
    pub fn new(component: impl Into<String>, latency_p99: f64, error_rate: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            component: component.into(),
            service_mesh: default_service_mesh(),
            latency_p99,
            error_rate,
            throughput: 0.0,
            cpu_util: None,
            memory_util: None,
            revenue_impact: None,
            user_impact: None,
            upstream_deps: Vec::new(),
            downstream_deps: Vec::new(),
            severity: EventSeverity::Low,
        }
    }

    /// Look up a metric by name. `None` means the event did not report it.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::LatencyP99 => Some(self.latency_p99),
            Metric::ErrorRate => Some(self.error_rate),
            Metric::Throughput => Some(self.throughput),
            Metric::CpuUtil => self.cpu_util,
            Metric::MemoryUtil => self.memory_util,
        }
    }

    /// Check every field bound, collecting all violations.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.component.is_empty() || self.component.len() > 255 {
            errors.push(format!(
                "component must be 1-255 characters, got {}",
                self.component.len()
            ));
        } else if !component_pattern().is_match(&self.component) {
            errors.push(format!(
                "component '{}' must contain only lowercase letters, numbers, and hyphens",
                self.component
            ));
        }

        if self.service_mesh.is_empty() || self.service_mesh.len() > 100 {
            errors.push("service_mesh must be 1-100 characters".into());
        }
        if !(0.0..MAX_LATENCY_MS).contains(&self.latency_p99) {
            errors.push(format!(
                "latency_p99 must be in [0, {MAX_LATENCY_MS}), got {}",
                self.latency_p99
            ));
        }
        if !(0.0..=1.0).contains(&self.error_rate) {
            errors.push(format!("error_rate must be in [0, 1], got {}", self.error_rate));
        }
        if !(self.throughput >= 0.0) {
            errors.push(format!("throughput must be >= 0, got {}", self.throughput));
        }
        for (name, value) in [("cpu_util", self.cpu_util), ("memory_util", self.memory_util)] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    errors.push(format!("{name} must be in [0, 1], got {v}"));
                }
            }
        }
        if let Some(v) = self.revenue_impact {
            if !(v >= 0.0) {
                errors.push(format!("revenue_impact must be >= 0, got {v}"));
            }
        }
        for dep in self.upstream_deps.iter().chain(&self.downstream_deps) {
            if !component_pattern().is_match(dep) {
                errors.push(format!(
                    "dependency '{dep}' must contain only lowercase letters, numbers, and hyphens"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(VigilError::Validation(errors))
        }
    }

    /// Deterministic fingerprint for deduplicating identical observations.
    pub fn fingerprint(&self) -> String {
        let data = format!(
            "{}:{}:{:?}:{:?}:{}",
            self.component,
            self.service_mesh,
            self.latency_p99,
            self.error_rate,
            self.timestamp.to_rfc3339()
        );
        format!("{:x}", Sha256::digest(data.as_bytes()))
    }
}
