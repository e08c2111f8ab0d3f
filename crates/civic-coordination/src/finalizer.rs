//! Finalizer: collapses a coordination run's conflicts, resolutions,
//! and (if any) human decision into the run's final verdict, then logs
//! it to the transparency store.

use std::sync::Arc;

use civic_transparency::TransparencyLog;
use civic_types::{CoordinationState, TransparencyEntry};
use serde_json::json;

use crate::human::HumanDecision;

/// Finalises `state` in place. `human_decision` is `Some` only when the
/// run was escalated; its outcome overwrites the primary resolution's.
pub async fn finalize(state: &mut CoordinationState, human_decision: Option<&HumanDecision>, transparency: &Arc<TransparencyLog>) {
    if state.conflicts_detected.is_empty() {
        state.final_decision = Some("approved".to_string());
        state.execution_plan = Some(json!({
            "approved": state.agent_decisions.iter().map(|d| d.agent_id.clone()).collect::<Vec<_>>(),
            "action": "execute_all",
        }));
        state.decision_rationale = Some("no conflicts detected across this batch".to_string());
        state.log("finalized: no conflicts, all decisions approved");
    } else if let Some(human) = human_decision {
        state.final_decision = Some(format!("{:?}", human.status).to_lowercase());
        state.execution_plan = Some(human.execution_plan.clone());
        state.decision_rationale = human.notes.clone().or_else(|| Some(format!("human approver: {}", human.approver)));
        state.log(format!("finalized: human decision '{:?}' by {}", human.status, human.approver));
    } else if let Some(primary) = state.resolutions.first() {
        state.final_decision = Some(format!("{:?}", primary.decision).to_lowercase());
        state.execution_plan = Some(primary.execution_plan.clone());
        state.decision_rationale = Some(primary.rationale.clone());
        state.log(format!("finalized: adopted {:?} resolution via {:?}", primary.decision, primary.method));
    } else {
        state.final_decision = Some("escalate".to_string());
        state.decision_rationale = Some("conflicts detected but no resolution was produced".to_string());
        state.log("finalized: no resolution available, escalating by default");
    }

    state.finish();

    let mut entry = TransparencyEntry::new(
        "coordination",
        "finalizer",
        state.final_decision.clone().unwrap_or_else(|| "unknown".to_string()),
        state.decision_rationale.clone().unwrap_or_default(),
        state.resolutions.first().map(|r| r.confidence).unwrap_or(1.0),
    );
    entry.context = json!({ "coordination_id": state.coordination_id, "conflict_count": state.conflicts_detected.len() });
    if let Err(error) = transparency.record(entry).await {
        tracing::warn!(error = %error, "failed to record coordination decision to the transparency log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_types::{AgentDecision, Priority};

    async fn log() -> Arc<TransparencyLog> {
        Arc::new(TransparencyLog::open_in_memory().await.expect("open in-memory transparency log"))
    }

    #[tokio::test]
    async fn no_conflicts_approves_everything() {
        let decisions = vec![AgentDecision::new("water", "recommend", "req", "Downtown", 1000.0, Priority::Routine)];
        let mut state = CoordinationState::new(decisions, "coord-1");
        finalize(&mut state, None, &log().await).await;
        assert_eq!(state.final_decision.as_deref(), Some("approved"));
        assert!(state.completed_at.is_some());
    }

    #[tokio::test]
    async fn human_decision_overrides_primary_resolution() {
        let decisions = vec![AgentDecision::new("water", "recommend", "req", "Downtown", 1000.0, Priority::Routine)];
        let mut state = CoordinationState::new(decisions, "coord-2");
        state.conflicts_detected.push(civic_types::Conflict {
            conflict_id: uuid::Uuid::new_v4(),
            conflict_type: civic_types::ConflictType::Resource,
            agents_involved: vec![],
            description: "".to_string(),
            severity: civic_types::Level::Medium,
            complexity_score: 0.5,
            detected_at: chrono::Utc::now(),
        });
        let human = HumanDecision {
            status: civic_types::EscalationStatus::Approved,
            approver: "ops".to_string(),
            execution_plan: json!({"action": "approve_all"}),
            notes: None,
        };
        finalize(&mut state, Some(&human), &log().await).await;
        assert_eq!(state.final_decision.as_deref(), Some("approved"));
    }
}
