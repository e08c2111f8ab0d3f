//! Wire-format DTOs for the engine's external API surface: the agent
//! pipeline response, the coordinator entry points, and the in-pipeline
//! coordination checkpoint. These are plain serialisable shapes, kept
//! separate from `civic_types::PipelineState`/`CoordinationState` so the
//! internal mutable records can evolve without breaking callers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use civic_types::{DecisionKind, ResolutionMethod};

/// `{action, plan, constraints, conditions}` on a `recommend`/`approve`
/// response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    pub plan: Value,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    pub confidence: f64,
}

/// `details` block carried on every `AgentResponse`, regardless of
/// decision kind.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponseDetails {
    #[serde(default)]
    pub feasible: Option<bool>,
    #[serde(default)]
    pub policy_compliant: Option<bool>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub plan: Option<Value>,
    #[serde(default)]
    pub tool_results: Value,
    #[serde(default)]
    pub observations: Value,
}

/// The shape returned to an external caller of a single agent pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub decision: DecisionKind,
    pub reason: String,
    #[serde(default)]
    pub requires_human_review: bool,
    pub confidence: f64,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
    #[serde(default)]
    pub data: Option<Value>,
    pub details: ResponseDetails,
    pub execution_time_ms: i64,
}

impl AgentResponse {
    pub fn error(reason: impl Into<String>) -> Self {
        AgentResponse {
            decision: DecisionKind::Error,
            reason: reason.into(),
            requires_human_review: false,
            confidence: 0.0,
            recommendation: None,
            data: None,
            details: ResponseDetails::default(),
            execution_time_ms: 0,
        }
    }
}

/// Result of `Coordinate(agent_decisions)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinateResult {
    pub coordination_id: String,
    pub decision: String,
    pub rationale: String,
    pub execution_plan: Value,
    pub conflicts_detected: usize,
    pub resolution_method: CoordinateResolutionMethod,
    pub requires_human: bool,
    pub processing_time: f64,
    pub workflow_log: Vec<String>,
}

/// `resolution_method` widened with the no-conflict case, which has no
/// `ResolutionMethod` counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateResolutionMethod {
    None,
    Rule,
    Llm,
    Human,
}

impl From<ResolutionMethod> for CoordinateResolutionMethod {
    fn from(m: ResolutionMethod) -> Self {
        match m {
            ResolutionMethod::Rule => CoordinateResolutionMethod::Rule,
            ResolutionMethod::Llm => CoordinateResolutionMethod::Llm,
            ResolutionMethod::Human => CoordinateResolutionMethod::Human,
        }
    }
}

/// Result of the in-pipeline `CheckPlanConflicts` coordination checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckPlanConflictsResult {
    pub has_conflicts: bool,
    pub should_proceed: bool,
    pub requires_human: bool,
    #[serde(default)]
    pub conflict_types: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub alternative_suggestions: Vec<String>,
}

/// Query passed into `CheckPlanConflicts` by the coordination checkpoint
/// node, ahead of tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConflictQuery {
    pub agent_id: String,
    pub agent_type: String,
    pub plan: Value,
    pub location: String,
    #[serde(default)]
    pub resources_needed: Vec<String>,
    pub estimated_cost: f64,
    pub priority: civic_types::Priority,
}

/// The seam between an agent pipeline's in-flight coordination checkpoint
/// (civic-core) and the coordination workflow that actually answers it
/// (civic-coordination). Defined here, on the shared DTO crate, so
/// neither side depends on the other directly — civic-runtime wires the
/// concrete implementation into each pipeline at construction time.
#[async_trait]
pub trait ConflictChecker: Send + Sync {
    async fn check_plan_conflicts(&self, query: PlanConflictQuery) -> CheckPlanConflictsResult;
}
