use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent_decision::AgentDecision;
use crate::enums::{ConflictType, EscalationStatus, Level, ResolutionDecision, ResolutionMethod};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(default = "Uuid::new_v4")]
    pub conflict_id: Uuid,
    pub conflict_type: ConflictType,
    pub agents_involved: Vec<String>,
    pub description: String,
    pub severity: Level,
    pub complexity_score: f64,
    #[serde(default = "Utc::now")]
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(default = "Uuid::new_v4")]
    pub resolution_id: Uuid,
    pub conflict_id: Uuid,
    pub method: ResolutionMethod,
    pub decision: ResolutionDecision,
    pub rationale: String,
    pub confidence: f64,
    pub requires_human: bool,
    pub execution_plan: Value,
    #[serde(default = "Utc::now")]
    pub resolved_at: DateTime<Utc>,
}

/// One selectable option presented to a human during escalation
/// (e.g. approve_all, approve_partial, defer, reject).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanEscalation {
    #[serde(default = "Uuid::new_v4")]
    pub escalation_id: Uuid,
    pub conflict_id: Option<Uuid>,
    pub reason: String,
    pub urgency: Level,
    pub options: Vec<DecisionOption>,
    #[serde(default)]
    pub llm_analysis: Option<String>,
    pub status: EscalationStatus,
    #[serde(default)]
    pub approver: Option<String>,
    #[serde(default)]
    pub approval_notes: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A single coordination run's record, carried end to end across
/// conflict detection, resolution, and finalisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationState {
    pub coordination_id: String,
    pub agent_decisions: Vec<AgentDecision>,
    #[serde(default)]
    pub conflicts_detected: Vec<Conflict>,
    #[serde(default)]
    pub has_conflicts: bool,
    #[serde(default)]
    pub resolutions: Vec<Resolution>,
    #[serde(default)]
    pub resolution_method: Option<ResolutionMethod>,
    #[serde(default)]
    pub requires_human: bool,
    #[serde(default)]
    pub human_escalation: Option<HumanEscalation>,
    #[serde(default)]
    pub final_decision: Option<String>,
    #[serde(default)]
    pub execution_plan: Option<Value>,
    #[serde(default)]
    pub workflow_log: Vec<String>,
    #[serde(default)]
    pub decision_rationale: Option<String>,
    #[serde(default = "Utc::now")]
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_processing_time: Option<f64>,
}

impl CoordinationState {
    pub fn new(agent_decisions: Vec<AgentDecision>, coordination_id: impl Into<String>) -> Self {
        CoordinationState {
            coordination_id: coordination_id.into(),
            agent_decisions,
            conflicts_detected: Vec::new(),
            has_conflicts: false,
            resolutions: Vec::new(),
            resolution_method: None,
            requires_human: false,
            human_escalation: None,
            final_decision: None,
            execution_plan: None,
            workflow_log: vec!["Coordination workflow started".to_string()],
            decision_rationale: None,
            started_at: Utc::now(),
            completed_at: None,
            total_processing_time: None,
        }
    }

    pub fn log(&mut self, entry: impl Into<String>) {
        self.workflow_log.push(entry.into());
    }

    pub fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.total_processing_time = Some((now - self.started_at).num_milliseconds() as f64 / 1000.0);
    }
}
