//! `ConflictChecker` adapter: the in-pipeline checkpoint a domain
//! agent's `CoordinationCheckpointNode` calls before it executes tools.
//! Lighter than the full coordination workflow — it checks a proposed
//! plan against whatever other agents have recently proposed, using
//! the same detector the full workflow uses, without running a rule
//! engine or LLM negotiation pass.

use async_trait::async_trait;
use civic_core::CoordinationConfig;
use civic_types::{AgentDecision, Level};
use civic_wire::{CheckPlanConflictsResult, ConflictChecker, PlanConflictQuery};
use tokio::sync::RwLock;

use crate::detector;

const RECENT_DECISIONS_CAPACITY: usize = 50;

/// Tracks recently proposed plans in memory and flags a new one that
/// collides with them. Registered once per process and shared across
/// every domain agent's checkpoint node.
pub struct LiveConflictChecker {
    config: CoordinationConfig,
    recent: RwLock<Vec<AgentDecision>>,
}

impl LiveConflictChecker {
    pub fn new(config: CoordinationConfig) -> Self {
        LiveConflictChecker { config, recent: RwLock::new(Vec::new()) }
    }
}

fn decision_from_query(query: &PlanConflictQuery) -> AgentDecision {
    let mut decision = AgentDecision::new(
        query.agent_type.clone(),
        query.plan.to_string(),
        format!("plan proposed by {}", query.agent_id),
        query.location.clone(),
        query.estimated_cost,
        query.priority,
    );
    decision.agent_id = query.agent_id.clone();
    decision.resources_needed = query.resources_needed.clone();
    decision
}

#[async_trait]
impl ConflictChecker for LiveConflictChecker {
    async fn check_plan_conflicts(&self, query: PlanConflictQuery) -> CheckPlanConflictsResult {
        let candidate = decision_from_query(&query);

        let mut recent = self.recent.write().await;
        let mut batch: Vec<AgentDecision> = recent.iter().filter(|d| d.agent_id != candidate.agent_id).cloned().collect();
        batch.push(candidate.clone());

        let conflicts = detector::detect_conflicts(&batch, &self.config);
        let has_conflicts = !conflicts.is_empty();
        let requires_human = conflicts.iter().any(|c| matches!(c.severity, Level::High | Level::Critical));
        let should_proceed = !has_conflicts || conflicts.iter().all(|c| c.complexity_score < self.config.complexity_threshold);

        recent.retain(|d| d.agent_id != candidate.agent_id);
        recent.push(candidate);
        if recent.len() > RECENT_DECISIONS_CAPACITY {
            recent.remove(0);
        }

        CheckPlanConflictsResult {
            has_conflicts,
            should_proceed,
            requires_human,
            conflict_types: conflicts.iter().map(|c| c.conflict_type.as_str().to_string()).collect(),
            recommendations: conflicts.iter().map(|c| c.description.clone()).collect(),
            alternative_suggestions: if should_proceed { Vec::new() } else { vec!["resubmit after the conflicting plan completes or escalate for coordination".to_string()] },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_types::Priority;
    use serde_json::json;

    fn query(agent_id: &str, agent_type: &str, location: &str, resources: Vec<&str>) -> PlanConflictQuery {
        PlanConflictQuery {
            agent_id: agent_id.to_string(),
            agent_type: agent_type.to_string(),
            plan: json!({"steps": []}),
            location: location.to_string(),
            resources_needed: resources.into_iter().map(String::from).collect(),
            estimated_cost: 1000.0,
            priority: Priority::Routine,
        }
    }

    #[tokio::test]
    async fn first_plan_for_a_resource_proceeds_cleanly() {
        let checker = LiveConflictChecker::new(CoordinationConfig::default());
        let result = checker.check_plan_conflicts(query("water-1", "water", "Downtown", vec!["crew-1"])).await;
        assert!(!result.has_conflicts);
        assert!(result.should_proceed);
    }

    #[tokio::test]
    async fn second_plan_on_same_resource_is_flagged() {
        let checker = LiveConflictChecker::new(CoordinationConfig::default());
        checker.check_plan_conflicts(query("water-1", "water", "Downtown", vec!["crew-1"])).await;
        let result = checker.check_plan_conflicts(query("engineering-1", "engineering", "Uptown", vec!["crew-1"])).await;
        assert!(result.has_conflicts);
    }
}
