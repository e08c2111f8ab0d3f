use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::enums::Level;
use crate::request::Request;

/// A single step inside a `Plan`, naming a tool from the agent's registry
/// plus the parameter pack the Tool Executor will pass it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub steps: Vec<ToolInvocation>,
    pub estimated_cost: f64,
    pub estimated_duration: String,
    #[serde(default)]
    pub resources_needed: Vec<String>,
    pub risk_level: Level,
}

/// Breakdown behind `PipelineState::confidence`, preserved so the
/// output generator and transparency log can show their work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub data_completeness: f64,
    pub risk_factor: f64,
    pub retry_penalty: f64,
    pub historical_similarity: f64,
}

impl ConfidenceFactors {
    pub fn weighted_sum(&self) -> f64 {
        0.30 * self.data_completeness
            + 0.30 * self.risk_factor
            + 0.20 * self.retry_penalty
            + 0.20 * self.historical_similarity
    }
}

/// The mutable record threaded through one pipeline execution. Timestamps
/// never regress; `attempts` never exceeds `max_attempts`; `escalate` is
/// monotonic once set except by a human-approval node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub input_event: Request,
    #[serde(default)]
    pub context: HashMap<String, Vec<Value>>,

    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub risk_level: Option<Level>,
    #[serde(default)]
    pub goal: Option<String>,

    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub alternative_plans: Vec<Plan>,

    #[serde(default)]
    pub tool_results: HashMap<String, Value>,
    #[serde(default)]
    pub observations: HashMap<String, Value>,

    #[serde(default)]
    pub feasible: Option<bool>,
    #[serde(default)]
    pub feasibility_reason: Option<String>,
    #[serde(default)]
    pub feasibility_details: HashMap<String, Value>,

    #[serde(default)]
    pub policy_ok: Option<bool>,
    #[serde(default)]
    pub policy_violations: Vec<String>,

    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub confidence_factors: Option<ConfidenceFactors>,

    #[serde(default)]
    pub escalate: bool,
    #[serde(default)]
    pub escalation_reason: Option<String>,

    #[serde(default)]
    pub coordination_check: Option<Value>,
    #[serde(default)]
    pub coordination_approved: bool,
    #[serde(default)]
    pub coordination_recommendations: Vec<String>,

    #[serde(default)]
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default)]
    pub retry_needed: bool,

    #[serde(default)]
    pub response: Option<Value>,

    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_time_ms: Option<i64>,
    pub agent_version: String,
}

impl PipelineState {
    pub fn new(input_event: Request, agent_version: impl Into<String>, max_attempts: u32) -> Self {
        PipelineState {
            input_event,
            context: HashMap::new(),
            intent: None,
            risk_level: None,
            goal: None,
            plan: None,
            alternative_plans: Vec::new(),
            tool_results: HashMap::new(),
            observations: HashMap::new(),
            feasible: None,
            feasibility_reason: None,
            feasibility_details: HashMap::new(),
            policy_ok: None,
            policy_violations: Vec::new(),
            confidence: None,
            confidence_factors: None,
            escalate: false,
            escalation_reason: None,
            coordination_check: None,
            coordination_approved: false,
            coordination_recommendations: Vec::new(),
            attempts: 0,
            max_attempts,
            retry_needed: false,
            response: None,
            started_at: Utc::now(),
            completed_at: None,
            execution_time_ms: None,
            agent_version: agent_version.into(),
        }
    }

    /// Marks escalation. Monotonic: never clears an existing reason once set,
    /// unless called from the human-approval gate via `clear_escalation`.
    pub fn set_escalate(&mut self, reason: impl Into<String>) {
        self.escalate = true;
        if self.escalation_reason.is_none() {
            self.escalation_reason = Some(reason.into());
        }
    }

    pub fn clear_escalation(&mut self) {
        self.escalate = false;
        self.escalation_reason = None;
    }

    pub fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.execution_time_ms = Some((now - self.started_at).num_milliseconds());
    }
}
