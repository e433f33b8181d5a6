//! Policy evaluation with per-(policy, component) cooldowns and hourly caps.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::types::{validate_policies, HealingPolicy};
use crate::advisory::HealingAction;
use crate::error::Result;
use crate::event::ReliabilityEvent;

/// A policy that fired, with the actions it contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyMatch {
    pub policy: String,
    pub priority: u8,
    pub actions: Vec<HealingAction>,
}

#[derive(Default)]
struct FireHistory {
    last_fired: Option<DateTime<Utc>>,
    /// Firings within the last hour, oldest first.
    window: VecDeque<DateTime<Utc>>,
}

pub struct PolicyEngine {
    policies: Vec<HealingPolicy>,
    history: Mutex<HashMap<(String, String), FireHistory>>,
}

impl PolicyEngine {
    pub fn new(policies: Vec<HealingPolicy>) -> Result<Self> {
        validate_policies(&policies)?;
        Ok(Self {
            policies,
            history: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_defaults() -> Self {
        Self {
            policies: super::default_policies(),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn policies(&self) -> &[HealingPolicy] {
        &self.policies
    }

    /// Candidate actions for `event`, deduplicated in first-seen order.
    /// `[NoAction]` when no policy fired.
    pub fn evaluate(&self, event: &ReliabilityEvent) -> Vec<HealingAction> {
        self.evaluate_at(event, Utc::now())
    }

    pub fn evaluate_at(&self, event: &ReliabilityEvent, now: DateTime<Utc>) -> Vec<HealingAction> {
        let mut actions = Vec::new();
        for m in self.matches_at(event, now) {
            for action in m.actions {
                if !actions.contains(&action) {
                    actions.push(action);
                }
            }
        }
        if actions.is_empty() {
            actions.push(HealingAction::NoAction);
        }
        actions
    }

    /// Policies that fire for `event` at `now`, in declaration order. Firing records
    /// `now` against each matched policy's cooldown and hourly window.
    pub fn matches_at(&self, event: &ReliabilityEvent, now: DateTime<Utc>) -> Vec<PolicyMatch> {
        let mut history = self.history.lock();
        let hour_ago = now - Duration::hours(1);
        self.prune(&mut history, now, hour_ago);
        let mut matched = Vec::new();

        for policy in self.policies.iter().filter(|p| p.enabled) {
            let key = (policy.name.clone(), event.component.clone());

            if let Some(entry) = history.get_mut(&key) {
                if let Some(last) = entry.last_fired {
                    let since = now.signed_duration_since(last);
                    // An unrepresentable cooldown never elapses.
                    if cool_down(policy).map_or(true, |cd| since < cd) {
                        tracing::debug!(policy = %policy.name, component = %event.component, "policy in cooldown");
                        continue;
                    }
                }

                while entry.window.front().is_some_and(|t| *t <= hour_ago) {
                    entry.window.pop_front();
                }
                if let Some(cap) = policy.max_executions_per_hour {
                    if entry.window.len() >= cap as usize {
                        tracing::debug!(policy = %policy.name, component = %event.component, cap, "hourly cap reached");
                        continue;
                    }
                }
            }

            if !policy.matches(event) {
                continue;
            }

            let entry = history.entry(key).or_default();
            entry.last_fired = Some(now);
            entry.window.push_back(now);
            tracing::info!(
                policy = %policy.name,
                component = %event.component,
                priority = policy.priority,
                "policy fired"
            );
            matched.push(PolicyMatch {
                policy: policy.name.clone(),
                priority: policy.priority,
                actions: policy.actions.clone(),
            });
        }

        matched
    }

    /// Drop histories whose cooldown has elapsed and whose hourly window is empty.
    fn prune(
        &self,
        history: &mut HashMap<(String, String), FireHistory>,
        now: DateTime<Utc>,
        hour_ago: DateTime<Utc>,
    ) {
        history.retain(|(name, _), entry| {
            let Some(policy) = self.policies.iter().find(|p| &p.name == name) else {
                return false;
            };
            while entry.window.front().is_some_and(|t| *t <= hour_ago) {
                entry.window.pop_front();
            }
            let cooling = match (entry.last_fired, cool_down(policy)) {
                (Some(last), Some(cd)) => now.signed_duration_since(last) < cd,
                (Some(_), None) => true,
                (None, _) => false,
            };
            cooling || !entry.window.is_empty()
        });
    }
}

fn cool_down(policy: &HealingPolicy) -> Option<Duration> {
    i64::try_from(policy.cool_down_seconds)
        .ok()
        .and_then(Duration::try_seconds)
}
