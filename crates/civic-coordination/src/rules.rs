//! Rule Engine: deterministic conflict resolution for the conflict
//! types the Complexity Router judged simple enough. One function per
//! conflict type, each keyed to the agent decisions it names.

use chrono::Datelike;
use civic_core::CoordinationConfig;
use civic_types::{AgentDecision, Conflict, ConflictType, Priority, Resolution, ResolutionDecision, ResolutionMethod};
use serde_json::json;

fn decisions_for<'a>(conflict: &Conflict, decisions: &'a [AgentDecision]) -> Vec<&'a AgentDecision> {
    decisions.iter().filter(|d| conflict.agents_involved.contains(&d.agent_id)).collect()
}

fn execution_plan(approved: &[&str], queued: &[&str], deferred: &[&str], sequence: &[(&str, u32)], action: &str) -> serde_json::Value {
    json!({
        "approved": approved,
        "queued": queued,
        "deferred": deferred,
        "sequence": sequence.iter().map(|(agent, order)| json!({"agent": agent, "order": order})).collect::<Vec<_>>(),
        "action": action,
    })
}

/// Dispatches to the resolver for `conflict.conflict_type`.
pub fn resolve(conflict: &Conflict, decisions: &[AgentDecision], config: &CoordinationConfig) -> Resolution {
    let involved = decisions_for(conflict, decisions);
    match conflict.conflict_type {
        ConflictType::Resource => resolve_resource(conflict, &involved),
        ConflictType::Policy => resolve_policy(conflict, &involved),
        ConflictType::Timing => resolve_timing(conflict, &involved),
        ConflictType::Budget => resolve_budget(conflict, &involved, config),
        ConflictType::Location => resolve_location(conflict, &involved),
    }
}

/// Emergency wins outright. Otherwise highest priority wins; if the top
/// two priorities tie, the *entire* set is re-sorted by timestamp
/// (FIFO) rather than just the tied subset.
fn resolve_resource(conflict: &Conflict, decisions: &[&AgentDecision]) -> Resolution {
    if let Some(emergency) = decisions.iter().find(|d| d.priority == Priority::Emergency) {
        let others: Vec<&str> = decisions.iter().filter(|d| d.agent_id != emergency.agent_id).map(|d| d.agent_id.as_str()).collect();
        return Resolution {
            resolution_id: uuid::Uuid::new_v4(),
            conflict_id: conflict.conflict_id,
            method: ResolutionMethod::Rule,
            decision: ResolutionDecision::ApprovePartial,
            rationale: format!("agent '{}' holds emergency priority and wins the contested resource", emergency.agent_id),
            confidence: 0.95,
            requires_human: false,
            execution_plan: execution_plan(&[emergency.agent_id.as_str()], &[], &others, &[], "approve_emergency_proceed_others_queue"),
            resolved_at: chrono::Utc::now(),
        };
    }

    let mut ranked: Vec<&&AgentDecision> = decisions.iter().collect();
    ranked.sort_by(|a, b| b.priority.cmp(&a.priority));

    let top_two_tie = ranked.len() >= 2 && ranked[0].priority == ranked[1].priority;
    if top_two_tie {
        ranked.sort_by_key(|d| d.timestamp);
    }

    let winner = ranked[0];
    let queued: Vec<&str> = ranked[1..].iter().map(|d| d.agent_id.as_str()).collect();

    Resolution {
        resolution_id: uuid::Uuid::new_v4(),
        conflict_id: conflict.conflict_id,
        method: ResolutionMethod::Rule,
        decision: ResolutionDecision::ApprovePartial,
        rationale: if top_two_tie {
            "priorities tied; resolved by submission order (first in, first served)".to_string()
        } else {
            format!("agent '{}' holds the highest priority on the contested resource", winner.agent_id)
        },
        confidence: if top_two_tie { 0.90 } else { 0.95 },
        requires_human: false,
        execution_plan: execution_plan(&[winner.agent_id.as_str()], &queued, &[], &[], "approve_highest_priority_queue_rest"),
        resolved_at: chrono::Utc::now(),
    }
}

/// Seasonal (monsoon) policy conflicts defer every involved agent to
/// the first post-season month.
fn resolve_policy(conflict: &Conflict, decisions: &[&AgentDecision]) -> Resolution {
    let deferred: Vec<&str> = decisions.iter().map(|d| d.agent_id.as_str()).collect();
    let next_october = chrono::Utc::now().with_month(10).unwrap_or_else(chrono::Utc::now);

    Resolution {
        resolution_id: uuid::Uuid::new_v4(),
        conflict_id: conflict.conflict_id,
        method: ResolutionMethod::Rule,
        decision: ResolutionDecision::Defer,
        rationale: format!("outdoor/construction work deferred out of the monsoon window to {}", next_october.format("%B")),
        confidence: 1.0,
        requires_human: false,
        execution_plan: execution_plan(&[], &[], &deferred, &[], "defer_all_to_post_season"),
        resolved_at: chrono::Utc::now(),
    }
}

const SEQUENTIAL_PRECEDENCE: &[(&str, &str)] = &[("engineering", "water"), ("engineering", "sanitation")];

/// Detects a known sequential dependency (engineering precedes
/// water/sanitation maintenance on the same infrastructure); otherwise
/// falls back to plain FIFO ordering by submission timestamp.
fn resolve_timing(conflict: &Conflict, decisions: &[&AgentDecision]) -> Resolution {
    let mut ordered: Vec<&&AgentDecision> = decisions.iter().collect();

    let mut dependency_found = false;
    for &(first, second) in SEQUENTIAL_PRECEDENCE {
        let has_first = ordered.iter().any(|d| d.agent_type == first);
        let has_second = ordered.iter().any(|d| d.agent_type == second);
        if has_first && has_second {
            ordered.sort_by_key(|d| if d.agent_type == first { 0 } else { 1 });
            dependency_found = true;
            break;
        }
    }
    if !dependency_found {
        ordered.sort_by_key(|d| d.timestamp);
    }

    let sequence: Vec<(&str, u32)> = ordered.iter().enumerate().map(|(i, d)| (d.agent_id.as_str(), i as u32 + 1)).collect();

    Resolution {
        resolution_id: uuid::Uuid::new_v4(),
        conflict_id: conflict.conflict_id,
        method: ResolutionMethod::Rule,
        decision: ResolutionDecision::ApproveAll,
        rationale: if dependency_found {
            "sequential dependency detected; ordered by required precedence".to_string()
        } else {
            "no dependency detected; ordered by submission time".to_string()
        },
        confidence: if dependency_found { 0.90 } else { 0.85 },
        requires_human: false,
        execution_plan: execution_plan(&[], &[], &[], &sequence, "execute_in_sequence"),
        resolved_at: chrono::Utc::now(),
    }
}

/// Allocates to the highest-priority agent and defers the rest when
/// total cost is within the auto-approval limit; escalates otherwise.
fn resolve_budget(conflict: &Conflict, decisions: &[&AgentDecision], config: &CoordinationConfig) -> Resolution {
    let total: f64 = decisions.iter().map(|d| d.estimated_cost).sum();

    if total > config.auto_approval_cost_limit {
        return Resolution {
            resolution_id: uuid::Uuid::new_v4(),
            conflict_id: conflict.conflict_id,
            method: ResolutionMethod::Rule,
            decision: ResolutionDecision::Escalate,
            rationale: format!("combined cost {total} exceeds the auto-approval limit"),
            confidence: 0.80,
            requires_human: true,
            execution_plan: execution_plan(&[], &[], &[], &[], "escalate_budget_to_human"),
            resolved_at: chrono::Utc::now(),
        };
    }

    let mut ranked: Vec<&&AgentDecision> = decisions.iter().collect();
    ranked.sort_by(|a, b| b.priority.cmp(&a.priority));
    let winner = ranked[0];
    let deferred: Vec<&str> = ranked[1..].iter().map(|d| d.agent_id.as_str()).collect();

    Resolution {
        resolution_id: uuid::Uuid::new_v4(),
        conflict_id: conflict.conflict_id,
        method: ResolutionMethod::Rule,
        decision: ResolutionDecision::ApprovePartial,
        rationale: format!("budget allocated to highest-priority agent '{}'; remainder deferred", winner.agent_id),
        confidence: 0.80,
        requires_human: !deferred.is_empty(),
        execution_plan: execution_plan(&[winner.agent_id.as_str()], &[], &deferred, &[], "allocate_to_highest_priority"),
        resolved_at: chrono::Utc::now(),
    }
}

/// Emergency override as in the resource case; with exactly two
/// agents, proposes simultaneous coordination for a human to confirm;
/// otherwise a plain FIFO sequence.
fn resolve_location(conflict: &Conflict, decisions: &[&AgentDecision]) -> Resolution {
    if let Some(emergency) = decisions.iter().find(|d| d.priority == Priority::Emergency) {
        let others: Vec<&str> = decisions.iter().filter(|d| d.agent_id != emergency.agent_id).map(|d| d.agent_id.as_str()).collect();
        return Resolution {
            resolution_id: uuid::Uuid::new_v4(),
            conflict_id: conflict.conflict_id,
            method: ResolutionMethod::Rule,
            decision: ResolutionDecision::ApprovePartial,
            rationale: format!("agent '{}' holds emergency priority at the contested location", emergency.agent_id),
            confidence: 0.95,
            requires_human: false,
            execution_plan: execution_plan(&[emergency.agent_id.as_str()], &[], &others, &[], "approve_emergency_defer_others"),
            resolved_at: chrono::Utc::now(),
        };
    }

    if decisions.len() == 2 {
        let approved: Vec<&str> = decisions.iter().map(|d| d.agent_id.as_str()).collect();
        return Resolution {
            resolution_id: uuid::Uuid::new_v4(),
            conflict_id: conflict.conflict_id,
            method: ResolutionMethod::Rule,
            decision: ResolutionDecision::ApproveAll,
            rationale: "two agents at the same location; proposing simultaneous coordinated work".to_string(),
            confidence: 0.70,
            requires_human: true,
            execution_plan: execution_plan(&approved, &[], &[], &[], "propose_simultaneous_coordination"),
            resolved_at: chrono::Utc::now(),
        };
    }

    let mut ordered: Vec<&&AgentDecision> = decisions.iter().collect();
    ordered.sort_by_key(|d| d.timestamp);
    let sequence: Vec<(&str, u32)> = ordered.iter().enumerate().map(|(i, d)| (d.agent_id.as_str(), i as u32 + 1)).collect();

    Resolution {
        resolution_id: uuid::Uuid::new_v4(),
        conflict_id: conflict.conflict_id,
        method: ResolutionMethod::Rule,
        decision: ResolutionDecision::ApproveAll,
        rationale: "multiple agents at the same location; ordered by submission time".to_string(),
        confidence: 0.85,
        requires_human: false,
        execution_plan: execution_plan(&[], &[], &[], &sequence, "execute_in_sequence"),
        resolved_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use civic_types::Level;
    use uuid::Uuid;

    fn agent(agent_type: &str, priority: Priority, cost: f64) -> AgentDecision {
        let mut d = AgentDecision::new(agent_type, "recommend", "request", "Downtown", cost, priority);
        d.agent_id = format!("{agent_type}-1");
        d
    }

    fn conflict_for(conflict_type: ConflictType, decisions: &[AgentDecision]) -> Conflict {
        Conflict {
            conflict_id: Uuid::new_v4(),
            conflict_type,
            agents_involved: decisions.iter().map(|d| d.agent_id.clone()).collect(),
            description: "test".to_string(),
            severity: Level::Medium,
            complexity_score: 0.2,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn resource_conflict_emergency_always_wins() {
        let decisions = vec![agent("fire", Priority::Emergency, 1000.0), agent("water", Priority::Routine, 1000.0)];
        let conflict = conflict_for(ConflictType::Resource, &decisions);
        let resolution = resolve(&conflict, &decisions, &CoordinationConfig::default());
        assert_eq!(resolution.decision, ResolutionDecision::ApprovePartial);
        assert_eq!(resolution.execution_plan["approved"][0], "fire-1");
    }

    #[test]
    fn resource_conflict_tie_falls_back_to_fifo() {
        let mut a = agent("water", Priority::Maintenance, 1000.0);
        a.timestamp = Utc::now() - chrono::Duration::minutes(5);
        let b = agent("engineering", Priority::Maintenance, 1000.0);
        let decisions = vec![a.clone(), b];
        let conflict = conflict_for(ConflictType::Resource, &decisions);
        let resolution = resolve(&conflict, &decisions, &CoordinationConfig::default());
        assert_eq!(resolution.execution_plan["approved"][0], a.agent_id);
    }

    #[test]
    fn budget_conflict_escalates_over_limit() {
        let decisions = vec![agent("water", Priority::Expansion, 4_000_000.0), agent("engineering", Priority::Expansion, 3_000_000.0)];
        let conflict = conflict_for(ConflictType::Budget, &decisions);
        let resolution = resolve(&conflict, &decisions, &CoordinationConfig::default());
        assert_eq!(resolution.decision, ResolutionDecision::Escalate);
        assert!(resolution.requires_human);
    }

    #[test]
    fn budget_conflict_respects_configured_limit() {
        let decisions = vec![agent("water", Priority::Expansion, 200_000.0), agent("engineering", Priority::Expansion, 200_000.0)];
        let conflict = conflict_for(ConflictType::Budget, &decisions);
        let mut config = CoordinationConfig::default();
        config.auto_approval_cost_limit = 100_000.0;
        let resolution = resolve(&conflict, &decisions, &config);
        assert_eq!(resolution.decision, ResolutionDecision::Escalate);
    }
}
