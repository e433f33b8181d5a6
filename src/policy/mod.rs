//! Healing policies: declarative rules that map a reliability event to candidate actions.

pub mod engine;
pub mod types;

pub use engine::{PolicyEngine, PolicyMatch};
pub use types::{
    default_policies, load_policies, parse_policies, validate_policies, HealingPolicy, Operator,
    PolicyCondition,
};
