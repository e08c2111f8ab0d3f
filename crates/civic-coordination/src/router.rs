//! Complexity Router: decides whether a batch of conflicts can be
//! resolved by the rule engine or needs the LLM negotiator. The
//! decision is sticky — the first conflict that disqualifies rules
//! pushes the whole batch to the LLM, even if later conflicts in the
//! list would individually have qualified.

use civic_core::CoordinationConfig;
use civic_types::ConflictType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    NoConflict,
    Rules,
    Llm,
}

fn always_qualifies(conflict_type: ConflictType) -> bool {
    matches!(conflict_type, ConflictType::Resource | ConflictType::Policy | ConflictType::Timing)
}

fn qualifies_with_two_agents(conflict_type: ConflictType) -> bool {
    matches!(conflict_type, ConflictType::Budget | ConflictType::Location)
}

fn can_resolve_with_rules(conflict: &civic_types::Conflict, config: &CoordinationConfig) -> bool {
    if conflict.complexity_score >= config.complexity_threshold {
        return false;
    }
    if always_qualifies(conflict.conflict_type) {
        return true;
    }
    if qualifies_with_two_agents(conflict.conflict_type) {
        return conflict.agents_involved.len() == 2;
    }
    false
}

/// Walks conflicts in order and stops at the first one the rule engine
/// can't handle; everything from that point forward, including
/// conflicts that individually qualify, is routed to the LLM.
pub fn route(conflicts: &[civic_types::Conflict], config: &CoordinationConfig) -> Route {
    if conflicts.is_empty() {
        return Route::NoConflict;
    }

    for conflict in conflicts {
        if !can_resolve_with_rules(conflict, config) {
            return Route::Llm;
        }
    }

    Route::Rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use civic_types::Level;
    use uuid::Uuid;

    fn conflict(conflict_type: ConflictType, score: f64, agents: usize) -> civic_types::Conflict {
        civic_types::Conflict {
            conflict_id: Uuid::new_v4(),
            conflict_type,
            agents_involved: (0..agents).map(|i| format!("agent-{i}")).collect(),
            description: "test".to_string(),
            severity: Level::Medium,
            complexity_score: score,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn empty_conflicts_routes_no_conflict() {
        let config = CoordinationConfig::default();
        assert_eq!(route(&[], &config), Route::NoConflict);
    }

    #[test]
    fn resource_conflict_under_threshold_routes_rules() {
        let config = CoordinationConfig::default();
        let conflicts = vec![conflict(ConflictType::Resource, 0.2, 2)];
        assert_eq!(route(&conflicts, &config), Route::Rules);
    }

    #[test]
    fn budget_conflict_with_three_agents_disqualifies_rules() {
        let config = CoordinationConfig::default();
        let conflicts = vec![conflict(ConflictType::Budget, 0.2, 3)];
        assert_eq!(route(&conflicts, &config), Route::Llm);
    }

    #[test]
    fn first_disqualifier_sticks_even_if_later_conflicts_would_qualify() {
        let config = CoordinationConfig::default();
        let conflicts = vec![
            conflict(ConflictType::Budget, 0.2, 3),
            conflict(ConflictType::Resource, 0.1, 2),
        ];
        assert_eq!(route(&conflicts, &config), Route::Llm);
    }

    #[test]
    fn score_at_or_above_threshold_disqualifies_rules() {
        let config = CoordinationConfig::default();
        let conflicts = vec![conflict(ConflictType::Resource, config.complexity_threshold, 2)];
        assert_eq!(route(&conflicts, &config), Route::Llm);
    }
}
