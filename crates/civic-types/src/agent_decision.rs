use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::Priority;

/// One department's decision fed into a coordination run. Produced either
/// from a pipeline's `response` or constructed directly by a caller that
/// already knows what it wants coordinated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDecision {
    pub agent_id: String,
    pub agent_type: String,
    pub decision: String,
    pub request: String,
    pub confidence: f64,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub resources_needed: Vec<String>,
    pub location: String,
    pub estimated_cost: f64,
    #[serde(default)]
    pub timeline: Option<String>,
    pub priority: Priority,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl AgentDecision {
    pub fn new(
        agent_type: impl Into<String>,
        decision: impl Into<String>,
        request: impl Into<String>,
        location: impl Into<String>,
        estimated_cost: f64,
        priority: Priority,
    ) -> Self {
        AgentDecision {
            agent_id: format!("{}-{}", "agent", Uuid::new_v4()),
            agent_type: agent_type.into(),
            decision: decision.into(),
            request: request.into(),
            confidence: 0.0,
            constraints: Vec::new(),
            resources_needed: Vec::new(),
            location: location.into(),
            estimated_cost,
            timeline: None,
            priority,
            timestamp: Utc::now(),
        }
    }
}
