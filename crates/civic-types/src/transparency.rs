use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One immutable row in the transparency log. Created once at write time
/// and never updated; `searchable_text` is what `SearchDecisions` matches
/// against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyEntry {
    #[serde(default = "Uuid::new_v4")]
    pub log_id: Uuid,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub agent_type: String,
    pub node_name: String,
    pub decision: String,
    pub context: Value,
    pub rationale: String,
    pub confidence: f64,
    #[serde(default)]
    pub cost_impact: Option<f64>,
    #[serde(default)]
    pub affected_citizens: Option<i64>,
    #[serde(default)]
    pub policy_references: Vec<String>,
    pub searchable_text: String,
}

impl TransparencyEntry {
    pub fn new(
        agent_type: impl Into<String>,
        node_name: impl Into<String>,
        decision: impl Into<String>,
        rationale: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let rationale = rationale.into();
        let decision = decision.into();
        let agent_type = agent_type.into();
        let searchable_text = format!("{agent_type} {decision} {rationale}");
        TransparencyEntry {
            log_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            agent_type,
            node_name: node_name.into(),
            decision,
            context: Value::Null,
            rationale,
            confidence,
            cost_impact: None,
            affected_citizens: None,
            policy_references: Vec::new(),
            searchable_text,
        }
    }
}
