//! Advisory decision pipeline.
//!
//! - [`tools`]: registry of remediation tools, weights, and parameter schemas
//! - [`validate`]: request validation and parameter sanitization
//! - [`intent`]: [`HealingIntent`], the immutable advisory record
//! - [`pipeline`]: [`AdvisoryPipeline`], which ties retrieval and scoring together

pub mod intent;
pub mod pipeline;
pub mod tools;
pub mod validate;

pub use intent::{ExecutionRequest, HealingIntent, IntentEnvelope, ReasoningKind, ReasoningStep, SimilarIncident};
pub use pipeline::{
    score_confidence, AdvisoryPipeline, AdvisoryResponse, AdvisoryResult, PipelineStats,
    ResponseStatus, RetrievalStatus,
};
pub use tools::{registry, HealingAction, ToolInfo};
pub use validate::{sanitize_parameters, validate_request, AdvisoryRequest};
