//! Conflict Detector: independent checks across a batch of agent
//! decisions, each producing zero or more `Conflict`s, plus the
//! complexity-score formula the router consumes.

use std::collections::HashMap;

use civic_core::CoordinationConfig;
use civic_types::{AgentDecision, Conflict, ConflictType, Level, Priority};

fn severity_for_priorities(priorities: &[Priority], config: &CoordinationConfig) -> Level {
    let max_level = priorities.iter().map(|p| config.priority_level(*p)).max().unwrap_or(1);
    match max_level {
        0..=3 => Level::Low,
        4..=6 => Level::Medium,
        7..=8 => Level::High,
        _ => Level::Critical,
    }
}

fn conflict(
    conflict_type: ConflictType,
    decisions: &[&AgentDecision],
    description: impl Into<String>,
    config: &CoordinationConfig,
) -> Conflict {
    let priorities: Vec<Priority> = decisions.iter().map(|d| d.priority).collect();
    Conflict {
        conflict_id: uuid::Uuid::new_v4(),
        conflict_type,
        agents_involved: decisions.iter().map(|d| d.agent_id.clone()).collect(),
        description: description.into(),
        severity: severity_for_priorities(&priorities, config),
        complexity_score: complexity_score(decisions, config),
        detected_at: chrono::Utc::now(),
    }
}

/// Start at 0.0; +0.1 for 2 agents, +min(0.15·n, 0.5) for n>2; +0.3 if
/// max cost > 5,000,000, +0.15 if > 1,000,000, +0.10 if > 500,000; if
/// any priority is `emergency`, cap at 0.3 (emergencies are simple);
/// else +0.10 per distinct priority. Clamped to 1.0.
pub fn complexity_score(decisions: &[&AgentDecision], _config: &CoordinationConfig) -> f64 {
    let n = decisions.len();
    let mut score = 0.0f64;

    if n == 2 {
        score += 0.1;
    } else if n > 2 {
        score += (0.15 * n as f64).min(0.5);
    }

    let max_cost = decisions.iter().map(|d| d.estimated_cost).fold(0.0, f64::max);
    if max_cost > 5_000_000.0 {
        score += 0.3;
    } else if max_cost > 1_000_000.0 {
        score += 0.15;
    } else if max_cost > 500_000.0 {
        score += 0.10;
    }

    let has_emergency = decisions.iter().any(|d| d.priority == Priority::Emergency);
    if has_emergency {
        return score.min(0.3);
    }

    let distinct_priorities: std::collections::HashSet<Priority> = decisions.iter().map(|d| d.priority).collect();
    score += 0.10 * distinct_priorities.len() as f64;

    score.clamp(0.0, 1.0)
}

/// Runs every independent check across `decisions`, returning every
/// conflict found. Order is resource, location, timing, policy, budget.
pub fn detect_conflicts(decisions: &[AgentDecision], config: &CoordinationConfig) -> Vec<Conflict> {
    let refs: Vec<&AgentDecision> = decisions.iter().collect();
    let mut conflicts = Vec::new();

    conflicts.extend(detect_resource_conflicts(&refs, config));
    conflicts.extend(detect_location_conflicts(&refs, config));
    conflicts.extend(detect_timing_conflicts(&refs, config));
    conflicts.extend(detect_policy_conflicts(&refs, config));
    conflicts.extend(detect_budget_conflicts(&refs, config));

    conflicts
}

fn detect_resource_conflicts<'a>(decisions: &[&'a AgentDecision], config: &CoordinationConfig) -> Vec<Conflict> {
    let mut by_resource: HashMap<&str, Vec<&&'a AgentDecision>> = HashMap::new();
    for decision in decisions {
        for resource in &decision.resources_needed {
            by_resource.entry(resource.as_str()).or_default().push(decision);
        }
    }

    by_resource
        .into_iter()
        .filter(|(_, ds)| ds.len() >= 2)
        .map(|(resource, ds)| {
            let ds: Vec<&AgentDecision> = ds.into_iter().copied().collect();
            conflict(
                ConflictType::Resource,
                &ds,
                format!("resource '{resource}' requested by {} agents", ds.len()),
                config,
            )
        })
        .collect()
}

fn detect_location_conflicts<'a>(decisions: &[&'a AgentDecision], config: &CoordinationConfig) -> Vec<Conflict> {
    let mut by_location: HashMap<&str, Vec<&&'a AgentDecision>> = HashMap::new();
    for decision in decisions {
        by_location.entry(decision.location.as_str()).or_default().push(decision);
    }

    by_location
        .into_iter()
        .filter(|(_, ds)| ds.len() >= 2)
        .map(|(location, ds)| {
            let ds: Vec<&AgentDecision> = ds.into_iter().copied().collect();
            conflict(
                ConflictType::Location,
                &ds,
                format!("location '{location}' targeted by {} agents", ds.len()),
                config,
            )
        })
        .collect()
}

fn detect_timing_conflicts<'a>(decisions: &[&'a AgentDecision], config: &CoordinationConfig) -> Vec<Conflict> {
    let timed: Vec<&AgentDecision> = decisions
        .iter()
        .filter(|d| d.timeline.is_some())
        .copied()
        .collect();
    if timed.len() < 2 {
        return Vec::new();
    }
    let mut c = conflict(
        ConflictType::Timing,
        &timed,
        format!("{} decisions declare overlapping timelines", timed.len()),
        config,
    );
    c.severity = Level::Medium;
    vec![c]
}

const MONSOON_PROJECT_TYPES: &[&str] = &["construction", "road_work", "outdoor_maintenance"];

fn detect_policy_conflicts<'a>(decisions: &[&'a AgentDecision], config: &CoordinationConfig) -> Vec<Conflict> {
    use chrono::Datelike;
    let month = chrono::Utc::now().month() as u8;
    if !config.monsoon_months.contains(&month) {
        return Vec::new();
    }

    let seasonal: Vec<&AgentDecision> = decisions
        .iter()
        .filter(|d| MONSOON_PROJECT_TYPES.iter().any(|t| d.decision.contains(t) || d.request.contains(t)))
        .copied()
        .collect();
    if seasonal.is_empty() {
        return Vec::new();
    }

    let mut c = conflict(
        ConflictType::Policy,
        &seasonal,
        "outdoor/construction project scheduled during monsoon months".to_string(),
        config,
    );
    c.severity = Level::High;
    vec![c]
}

const BUDGET_TOTAL_THRESHOLD: f64 = 2_000_000.0;
const BUDGET_INDIVIDUAL_THRESHOLD: f64 = 500_000.0;

fn detect_budget_conflicts<'a>(decisions: &[&'a AgentDecision], config: &CoordinationConfig) -> Vec<Conflict> {
    let total: f64 = decisions.iter().map(|d| d.estimated_cost).sum();
    if total <= BUDGET_TOTAL_THRESHOLD {
        return Vec::new();
    }
    let over_individual: Vec<&AgentDecision> = decisions
        .iter()
        .filter(|d| d.estimated_cost > BUDGET_INDIVIDUAL_THRESHOLD)
        .copied()
        .collect();
    if over_individual.len() < 2 {
        return Vec::new();
    }
    vec![conflict(
        ConflictType::Budget,
        &over_individual,
        format!("combined estimated cost {total} crosses budget threshold"),
        config,
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(agent_type: &str, location: &str, cost: f64, priority: Priority) -> AgentDecision {
        AgentDecision::new(agent_type, "recommend", "do the thing", location, cost, priority)
    }

    #[test]
    fn resource_conflict_detected_when_two_agents_want_same_resource() {
        let config = CoordinationConfig::default();
        let mut a = decision("water", "Downtown", 1000.0, Priority::Routine);
        a.resources_needed = vec!["crew_truck_1".to_string()];
        let mut b = decision("engineering", "Uptown", 1000.0, Priority::Routine);
        b.resources_needed = vec!["crew_truck_1".to_string()];

        let conflicts = detect_conflicts(&[a, b], &config);
        assert!(conflicts.iter().any(|c| c.conflict_type == ConflictType::Resource));
    }

    #[test]
    fn complexity_score_caps_at_point_three_when_emergency_present() {
        let config = CoordinationConfig::default();
        let a = decision("fire", "Downtown", 6_000_000.0, Priority::Emergency);
        let b = decision("water", "Downtown", 1000.0, Priority::Routine);
        let score = complexity_score(&[&a, &b], &config);
        assert!(score <= 0.3);
    }

    #[test]
    fn location_conflict_requires_at_least_two_agents() {
        let config = CoordinationConfig::default();
        let a = decision("water", "Downtown", 1000.0, Priority::Routine);
        let conflicts = detect_conflicts(&[a], &config);
        assert!(conflicts.is_empty());
    }
}
