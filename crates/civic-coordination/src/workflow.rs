//! Top-level coordination workflow: detect conflicts, route by
//! complexity, resolve (rules or LLM), gate on human approval, and
//! finalize. The wiring is a small fixed state machine rather than a
//! `civic_core::PipelineGraph` — five steps with no branching beyond
//! the two decisions already named, so a graph would add indirection
//! without buying anything.

use std::sync::Arc;

use civic_core::CoordinationConfig;
use civic_llm::LlmAdapter;
use civic_transparency::TransparencyLog;
use civic_types::{AgentDecision, CoordinationState};

use crate::human::{self, ApprovalSource};
use crate::router::{self, Route};
use crate::{finalizer, negotiator, rules};

pub struct CoordinationWorkflow {
    pub config: CoordinationConfig,
    pub llm: Arc<dyn LlmAdapter>,
    pub approval: Arc<dyn ApprovalSource>,
    pub transparency: Arc<TransparencyLog>,
}

impl CoordinationWorkflow {
    pub fn new(config: CoordinationConfig, llm: Arc<dyn LlmAdapter>, approval: Arc<dyn ApprovalSource>, transparency: Arc<TransparencyLog>) -> Self {
        CoordinationWorkflow { config, llm, approval, transparency }
    }

    pub async fn run(&self, agent_decisions: Vec<AgentDecision>, coordination_id: impl Into<String>) -> CoordinationState {
        let mut state = CoordinationState::new(agent_decisions, coordination_id);

        state.conflicts_detected = crate::detector::detect_conflicts(&state.agent_decisions, &self.config);
        state.has_conflicts = !state.conflicts_detected.is_empty();
        state.log(format!("detected {} conflicts", state.conflicts_detected.len()));

        let route = router::route(&state.conflicts_detected, &self.config);

        match route {
            Route::NoConflict => {
                state.log("no conflicts; routing straight to finalize");
            }
            Route::Rules => {
                state.resolution_method = Some(civic_types::ResolutionMethod::Rule);
                for conflict in &state.conflicts_detected {
                    state.resolutions.push(rules::resolve(conflict, &state.agent_decisions, &self.config));
                }
                state.log("resolved via rule engine");
            }
            Route::Llm => {
                state.resolution_method = Some(civic_types::ResolutionMethod::Llm);
                for conflict in &state.conflicts_detected {
                    let resolution = negotiator::negotiate(conflict, &state.agent_decisions, &self.llm, &self.config).await;
                    state.resolutions.push(resolution);
                }
                state.log("resolved via llm negotiation");
            }
        }

        let primary = state.resolutions.first().cloned();
        let needs_human = primary
            .as_ref()
            .map(|r| human::requires_escalation(r, &state.agent_decisions, &self.config))
            .unwrap_or(false);

        let human_decision = if needs_human {
            state.requires_human = true;
            let conflict = state.conflicts_detected.first();
            let escalation = human::build_escalation(conflict, primary.as_ref().expect("needs_human implies a primary resolution"), &state.agent_decisions);
            state.log(format!("escalating to human: {}", escalation.reason));

            let decision = if self.config.auto_approve {
                crate::human::AutoApproveSource.acquire(&escalation).await
            } else {
                self.approval.acquire(&escalation).await
            };

            let mut escalation = escalation;
            escalation.status = decision.status;
            escalation.approver = Some(decision.approver.clone());
            escalation.approval_notes = decision.notes.clone();
            escalation.resolved_at = Some(chrono::Utc::now());
            state.human_escalation = Some(escalation);
            state.log(format!("human decision: {:?} by {}", decision.status, decision.approver));

            Some(decision)
        } else {
            None
        };

        finalizer::finalize(&mut state, human_decision.as_ref(), &self.transparency).await;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_llm::StaticAdapter;
    use civic_types::Priority;

    struct AlwaysApprove;

    #[async_trait::async_trait]
    impl ApprovalSource for AlwaysApprove {
        async fn acquire(&self, _escalation: &civic_types::HumanEscalation) -> human::HumanDecision {
            human::HumanDecision {
                status: civic_types::EscalationStatus::Approved,
                approver: "test-reviewer".to_string(),
                execution_plan: serde_json::json!({"action": "approve_all"}),
                notes: None,
            }
        }
    }

    fn workflow() -> CoordinationWorkflow {
        CoordinationWorkflow::new(
            CoordinationConfig::default(),
            Arc::new(StaticAdapter::err("no llm configured")),
            Arc::new(AlwaysApprove),
            Arc::new(futures::executor::block_on(TransparencyLog::open_in_memory()).unwrap()),
        )
    }

    #[tokio::test]
    async fn no_conflicts_finalizes_as_approved() {
        let decisions = vec![AgentDecision::new("water", "recommend", "req", "Downtown", 1000.0, Priority::Routine)];
        let state = workflow().run(decisions, "coord-1").await;
        assert_eq!(state.final_decision.as_deref(), Some("approved"));
        assert!(!state.requires_human);
    }

    #[tokio::test]
    async fn resource_conflict_resolves_via_rules_without_escalation() {
        let mut a = AgentDecision::new("water", "recommend", "req", "Downtown", 1000.0, Priority::Maintenance);
        a.resources_needed = vec!["crew-1".to_string()];
        let mut b = AgentDecision::new("engineering", "recommend", "req", "Uptown", 1000.0, Priority::Routine);
        b.resources_needed = vec!["crew-1".to_string()];

        let state = workflow().run(vec![a, b], "coord-2").await;
        assert_eq!(state.resolution_method, Some(civic_types::ResolutionMethod::Rule));
        assert!(state.final_decision.is_some());
    }

    #[tokio::test]
    async fn budget_escalation_over_limit_engages_approval_source() {
        let a = AgentDecision::new("water", "recommend", "req", "Downtown", 4_000_000.0, Priority::Expansion);
        let b = AgentDecision::new("engineering", "recommend", "req", "Downtown", 3_000_000.0, Priority::Expansion);

        let state = workflow().run(vec![a, b], "coord-3").await;
        assert!(state.requires_human);
        assert_eq!(state.final_decision.as_deref(), Some("approved"));
    }
}
