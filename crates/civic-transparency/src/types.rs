//! Error taxonomy and report shapes for the transparency log.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type TransparencyResult<T> = Result<T, TransparencyError>;

#[derive(Debug, Error)]
pub enum TransparencyError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// One row of `SearchDecisions` — the full entry plus its rank distance
/// (lower is closer). When no similarity engine is wired up, `distance`
/// is a recency-based ordinal rather than a true semantic distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub log_id: uuid::Uuid,
    pub text: String,
    pub agent_type: String,
    pub node_name: String,
    pub decision: String,
    pub confidence: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    pub filter_agent: Option<String>,
    pub filter_node: Option<String>,
    pub min_confidence: Option<f64>,
    pub max_cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportStatistics {
    pub total_decisions: i64,
    pub escalation_rate: f64,
    pub average_confidence: f64,
    pub total_cost_impact: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionReport {
    pub statistics: ReportStatistics,
    pub decisions_by_agent: std::collections::HashMap<String, i64>,
    pub top_decisions: Vec<SearchHit>,
    pub recent_decisions: Vec<SearchHit>,
}
