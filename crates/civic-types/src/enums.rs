use serde::{Deserialize, Serialize};
use std::fmt;

/// Shared ordered severity scale. Reused for `risk_level`, conflict
/// `severity`, and escalation `urgency` — all three are drawn from the
/// same four-point scale in the source system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
    Critical,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
            Level::Critical => "critical",
        }
    }

    pub fn is_high_or_critical(self) -> bool {
        matches!(self, Level::High | Level::Critical)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered priority enum: `routine < maintenance < expansion <
/// safety_critical < public_health < emergency`. Declaration order is the
/// ordinal order; numeric weights for severity/complexity math live in
/// `coordination.priority_levels` (see civic-core::config) since that
/// mapping is configuration, not a language-level fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Routine,
    Maintenance,
    Expansion,
    SafetyCritical,
    PublicHealth,
    Emergency,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Routine => "routine",
            Priority::Maintenance => "maintenance",
            Priority::Expansion => "expansion",
            Priority::SafetyCritical => "safety_critical",
            Priority::PublicHealth => "public_health",
            Priority::Emergency => "emergency",
        }
    }

    pub fn is_emergency(self) -> bool {
        matches!(self, Priority::Emergency)
    }

    pub fn all() -> [Priority; 6] {
        [
            Priority::Routine,
            Priority::Maintenance,
            Priority::Expansion,
            Priority::SafetyCritical,
            Priority::PublicHealth,
            Priority::Emergency,
        ]
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    Resource,
    Location,
    Timing,
    Policy,
    Budget,
}

impl ConflictType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictType::Resource => "resource",
            ConflictType::Location => "location",
            ConflictType::Timing => "timing",
            ConflictType::Policy => "policy",
            ConflictType::Budget => "budget",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Rule,
    Llm,
    Human,
}

impl ResolutionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionMethod::Rule => "rule",
            ResolutionMethod::Llm => "llm",
            ResolutionMethod::Human => "human",
        }
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionDecision {
    ApproveAll,
    ApprovePartial,
    Defer,
    Reject,
    Escalate,
}

impl ResolutionDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionDecision::ApproveAll => "approve_all",
            ResolutionDecision::ApprovePartial => "approve_partial",
            ResolutionDecision::Defer => "defer",
            ResolutionDecision::Reject => "reject",
            ResolutionDecision::Escalate => "escalate",
        }
    }
}

impl fmt::Display for ResolutionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    Approved,
    Rejected,
    Deferred,
    Modified,
}

impl EscalationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EscalationStatus::Pending => "pending",
            EscalationStatus::Approved => "approved",
            EscalationStatus::Rejected => "rejected",
            EscalationStatus::Deferred => "deferred",
            EscalationStatus::Modified => "modified",
        }
    }
}

impl fmt::Display for EscalationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    RequestAssistance,
    OfferSupport,
    StatusUpdate,
    ResourceAllocation,
    CoordinationNeeded,
    Acknowledgement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Acknowledged,
}

/// The six department agents the dispatcher can materialise. Closed set,
/// matches the agent type labels wired through the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Water,
    Engineering,
    Fire,
    Sanitation,
    Health,
    Finance,
}

impl AgentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentType::Water => "water",
            AgentType::Engineering => "engineering",
            AgentType::Fire => "fire",
            AgentType::Sanitation => "sanitation",
            AgentType::Health => "health",
            AgentType::Finance => "finance",
        }
    }

    pub fn all() -> [AgentType; 6] {
        [
            AgentType::Water,
            AgentType::Engineering,
            AgentType::Fire,
            AgentType::Sanitation,
            AgentType::Health,
            AgentType::Finance,
        ]
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final decision label on a pipeline's response, and on an
/// `AgentDecision` fed into the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Recommend,
    Approve,
    Deny,
    Inform,
    Escalate,
    Error,
}

impl DecisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionKind::Recommend => "recommend",
            DecisionKind::Approve => "approve",
            DecisionKind::Deny => "deny",
            DecisionKind::Inform => "inform",
            DecisionKind::Escalate => "escalate",
            DecisionKind::Error => "error",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distinguishes the direct-response informational path from the full
/// plan/tool/feasibility pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Action,
    Informational,
}
