//! Human-Approval Gate and Human Interface: decides whether a
//! resolution needs a person to sign off, builds the escalation a
//! human reviews, and acquires their decision through a pluggable
//! `ApprovalSource`.

use async_trait::async_trait;
use civic_core::CoordinationConfig;
use civic_types::{AgentDecision, Conflict, DecisionOption, EscalationStatus, HumanEscalation, Level, Priority, Resolution};
use tokio::io::{AsyncBufReadExt, BufReader};

/// True if `resolution` must be escalated to a human before it can be
/// finalised: flagged by the resolver itself, below the confidence
/// floor, the decision batch's combined cost exceeds the
/// auto-approval limit, or the resolver gave up and escalated outright.
pub fn requires_escalation(resolution: &Resolution, decisions: &[AgentDecision], config: &CoordinationConfig) -> bool {
    if resolution.requires_human {
        return true;
    }
    if resolution.confidence < config.confidence_threshold {
        return true;
    }
    let total_cost: f64 = decisions.iter().map(|d| d.estimated_cost).sum();
    if total_cost > config.auto_approval_cost_limit {
        return true;
    }
    resolution.decision == civic_types::ResolutionDecision::Escalate
}

fn urgency(conflict: Option<&Conflict>, decisions: &[AgentDecision]) -> Level {
    if decisions.iter().any(|d| d.priority == Priority::Emergency) {
        return Level::Critical;
    }
    let has_safety_or_health = decisions.iter().any(|d| matches!(d.priority, Priority::SafetyCritical | Priority::PublicHealth));
    if has_safety_or_health || conflict.map(|c| c.severity == Level::High).unwrap_or(false) {
        return Level::High;
    }
    if conflict.map(|c| c.severity == Level::Medium).unwrap_or(false) {
        return Level::Medium;
    }
    Level::Low
}

fn options_for(decisions: &[AgentDecision]) -> Vec<DecisionOption> {
    let mut options = vec![
        DecisionOption { id: "approve_all".to_string(), label: "Approve all".to_string(), description: "Approve every agent's decision as submitted".to_string() },
    ];
    if decisions.len() > 1 {
        let highest = decisions.iter().max_by_key(|d| d.priority).map(|d| d.agent_id.clone()).unwrap_or_default();
        options.push(DecisionOption {
            id: "approve_partial".to_string(),
            label: format!("Approve highest priority ({highest})"),
            description: "Approve only the highest-priority agent's decision; defer the rest".to_string(),
        });
    }
    options.push(DecisionOption { id: "defer".to_string(), label: "Defer".to_string(), description: "Postpone all involved decisions".to_string() });
    options.push(DecisionOption { id: "reject".to_string(), label: "Reject".to_string(), description: "Reject the proposed resolution outright".to_string() });
    options
}

/// Builds the escalation record a human reviews. Does not acquire a
/// decision; call an `ApprovalSource` with the result.
pub fn build_escalation(conflict: Option<&Conflict>, resolution: &Resolution, decisions: &[AgentDecision]) -> HumanEscalation {
    HumanEscalation {
        escalation_id: uuid::Uuid::new_v4(),
        conflict_id: conflict.map(|c| c.conflict_id),
        reason: resolution.rationale.clone(),
        urgency: urgency(conflict, decisions),
        options: options_for(decisions),
        llm_analysis: None,
        status: EscalationStatus::Pending,
        approver: None,
        approval_notes: None,
        created_at: chrono::Utc::now(),
        resolved_at: None,
    }
}

#[derive(Debug, Clone)]
pub struct HumanDecision {
    pub status: EscalationStatus,
    pub approver: String,
    pub execution_plan: serde_json::Value,
    pub notes: Option<String>,
}

/// Acquires a human's decision for a pending escalation. Implementors
/// provide the actual channel: a terminal prompt, an auto-approve
/// stand-in for unattended runs, or a scripted test double.
#[async_trait]
pub trait ApprovalSource: Send + Sync {
    async fn acquire(&self, escalation: &HumanEscalation) -> HumanDecision;
}

/// Reads a decision from stdin. Defaults to `deferred` if the prompt
/// is interrupted (stdin closes without a line) rather than blocking
/// forever or silently approving.
pub struct InteractiveApprovalSource;

#[async_trait]
impl ApprovalSource for InteractiveApprovalSource {
    async fn acquire(&self, escalation: &HumanEscalation) -> HumanDecision {
        println!("Escalation {} ({}): {}", escalation.escalation_id, escalation.urgency.as_str(), escalation.reason);
        for option in &escalation.options {
            println!("  [{}] {} - {}", option.id, option.label, option.description);
        }
        println!("Enter option id (or leave blank to defer):");

        let mut stdin = BufReader::new(tokio::io::stdin());
        let mut line = String::new();
        let read = stdin.read_line(&mut line).await;

        let choice = match read {
            Ok(0) | Err(_) => {
                return HumanDecision {
                    status: EscalationStatus::Deferred,
                    approver: "interactive".to_string(),
                    execution_plan: serde_json::json!({"action": "defer", "reason": "prompt interrupted"}),
                    notes: Some("stdin closed before a decision was entered".to_string()),
                };
            }
            Ok(_) => line.trim().to_string(),
        };

        let status = match choice.as_str() {
            "approve_all" => EscalationStatus::Approved,
            "approve_partial" => EscalationStatus::Modified,
            "reject" => EscalationStatus::Rejected,
            _ => EscalationStatus::Deferred,
        };

        HumanDecision {
            status,
            approver: "interactive".to_string(),
            execution_plan: serde_json::json!({"action": choice}),
            notes: None,
        }
    }
}

/// Approves everything automatically, for unattended deployments that
/// set `coordination.auto_approve`.
pub struct AutoApproveSource;

#[async_trait]
impl ApprovalSource for AutoApproveSource {
    async fn acquire(&self, _escalation: &HumanEscalation) -> HumanDecision {
        HumanDecision {
            status: EscalationStatus::Approved,
            approver: "auto".to_string(),
            execution_plan: serde_json::json!({"action": "approve_all"}),
            notes: Some("auto-approved: coordination.auto_approve is set".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_types::{ConflictType, ResolutionDecision, ResolutionMethod};

    fn decision(agent_type: &str, priority: Priority) -> AgentDecision {
        AgentDecision::new(agent_type, "recommend", "req", "Downtown", 1000.0, priority)
    }

    fn resolution() -> Resolution {
        Resolution {
            resolution_id: uuid::Uuid::new_v4(),
            conflict_id: uuid::Uuid::new_v4(),
            method: ResolutionMethod::Rule,
            decision: ResolutionDecision::ApprovePartial,
            rationale: "test".to_string(),
            confidence: 0.95,
            requires_human: false,
            execution_plan: serde_json::json!({}),
            resolved_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn escalates_when_confidence_below_threshold() {
        let config = CoordinationConfig::default();
        let mut r = resolution();
        r.confidence = 0.2;
        assert!(requires_escalation(&r, &[decision("water", Priority::Routine)], &config));
    }

    #[test]
    fn does_not_escalate_a_confident_low_cost_resolution() {
        let config = CoordinationConfig::default();
        let r = resolution();
        assert!(!requires_escalation(&r, &[decision("water", Priority::Routine)], &config));
    }

    #[test]
    fn approve_partial_option_omitted_for_single_decision() {
        let options = options_for(&[decision("water", Priority::Routine)]);
        assert!(!options.iter().any(|o| o.id == "approve_partial"));
    }

    #[test]
    fn approve_partial_option_present_for_multiple_decisions() {
        let options = options_for(&[decision("water", Priority::Routine), decision("engineering", Priority::Maintenance)]);
        assert!(options.iter().any(|o| o.id == "approve_partial"));
    }

    #[test]
    fn urgency_is_critical_when_any_decision_is_emergency() {
        let conflict = Conflict {
            conflict_id: uuid::Uuid::new_v4(),
            conflict_type: ConflictType::Resource,
            agents_involved: vec![],
            description: "".to_string(),
            severity: Level::Low,
            complexity_score: 0.1,
            detected_at: chrono::Utc::now(),
        };
        let decisions = vec![decision("fire", Priority::Emergency)];
        assert_eq!(urgency(Some(&conflict), &decisions), Level::Critical);
    }

    #[tokio::test]
    async fn auto_approve_source_always_approves() {
        let escalation = build_escalation(None, &resolution(), &[decision("water", Priority::Routine)]);
        let result = AutoApproveSource.acquire(&escalation).await;
        assert_eq!(result.status, EscalationStatus::Approved);
    }
}
