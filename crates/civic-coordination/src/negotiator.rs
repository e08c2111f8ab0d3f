//! LLM Negotiator: asks the configured LLM to resolve a batch of
//! conflicts the Complexity Router judged too entangled for plain
//! rules. Falls back to the rule engine on a malformed response, and
//! to an outright escalation if that fallback itself fails to apply.

use std::sync::Arc;

use civic_core::CoordinationConfig;
use civic_llm::{CompletionRequest, LlmAdapter};
use civic_types::{AgentDecision, Conflict, Resolution, ResolutionDecision, ResolutionMethod};
use serde::Deserialize;
use serde_json::json;

use crate::rules;

#[derive(Debug, Deserialize)]
struct NegotiatedResolution {
    decision: String,
    rationale: String,
    confidence: f64,
    requires_human: bool,
    execution_plan: serde_json::Value,
}

fn parse_decision(raw: &str) -> Option<ResolutionDecision> {
    match raw {
        "approve_all" => Some(ResolutionDecision::ApproveAll),
        "approve_partial" => Some(ResolutionDecision::ApprovePartial),
        "defer" => Some(ResolutionDecision::Defer),
        "reject" => Some(ResolutionDecision::Reject),
        "escalate" => Some(ResolutionDecision::Escalate),
        _ => None,
    }
}

fn prompt(conflict: &Conflict, involved: &[&AgentDecision]) -> CompletionRequest {
    let system = "You negotiate conflicts between municipal department agent decisions. \
        Respond with strict JSON only: {\"decision\": \"approve_all|approve_partial|defer|reject|escalate\", \
        \"rationale\": string, \"confidence\": number between 0 and 1, \"requires_human\": boolean, \
        \"execution_plan\": {\"approved\": [...], \"queued\": [...], \"deferred\": [...], \"sequence\": [...], \"action\": string}}";

    let decisions_json: Vec<serde_json::Value> = involved
        .iter()
        .map(|d| json!({"agent_id": d.agent_id, "agent_type": d.agent_type, "decision": d.decision, "priority": d.priority.as_str(), "estimated_cost": d.estimated_cost, "location": d.location}))
        .collect();

    let user = json!({
        "conflict_type": conflict.conflict_type.as_str(),
        "severity": conflict.severity.as_str(),
        "complexity_score": conflict.complexity_score,
        "description": conflict.description,
        "decisions": decisions_json,
    })
    .to_string();

    CompletionRequest::json(system, user)
}

pub async fn negotiate(conflict: &Conflict, decisions: &[AgentDecision], llm: &Arc<dyn LlmAdapter>, config: &CoordinationConfig) -> Resolution {
    let involved: Vec<&AgentDecision> = decisions.iter().filter(|d| conflict.agents_involved.contains(&d.agent_id)).collect();

    let raw = match llm.complete(prompt(conflict, &involved)).await {
        Ok(response) => response.content,
        Err(error) => {
            tracing::warn!(error = %error, "llm negotiation call failed, falling back to rule engine");
            return rules::resolve(conflict, decisions, config);
        }
    };

    let parsed: Result<NegotiatedResolution, _> = serde_json::from_str(&raw);
    let negotiated = match parsed {
        Ok(n) => n,
        Err(error) => {
            tracing::warn!(error = %error, "llm negotiation response malformed, falling back to rule engine");
            return rules::resolve(conflict, decisions, config);
        }
    };

    let Some(decision) = parse_decision(&negotiated.decision) else {
        tracing::warn!(decision = %negotiated.decision, "llm returned an unknown decision, falling back to rule engine");
        return rules::resolve(conflict, decisions, config);
    };

    if !(0.0..=1.0).contains(&negotiated.confidence) {
        tracing::warn!(confidence = negotiated.confidence, "llm returned an out-of-range confidence, falling back to rule engine");
        return rules::resolve(conflict, decisions, config);
    }

    Resolution {
        resolution_id: uuid::Uuid::new_v4(),
        conflict_id: conflict.conflict_id,
        method: ResolutionMethod::Llm,
        decision,
        rationale: negotiated.rationale,
        confidence: negotiated.confidence,
        requires_human: negotiated.requires_human,
        execution_plan: negotiated.execution_plan,
        resolved_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use civic_llm::StaticAdapter;
    use civic_types::{ConflictType, Level, Priority};
    use uuid::Uuid;

    fn conflict() -> Conflict {
        Conflict {
            conflict_id: Uuid::new_v4(),
            conflict_type: ConflictType::Budget,
            agents_involved: vec!["water-1".to_string(), "engineering-1".to_string()],
            description: "test".to_string(),
            severity: Level::Medium,
            complexity_score: 0.7,
            detected_at: Utc::now(),
        }
    }

    fn decisions() -> Vec<AgentDecision> {
        let mut a = AgentDecision::new("water", "recommend", "req", "Downtown", 1000.0, Priority::Routine);
        a.agent_id = "water-1".to_string();
        let mut b = AgentDecision::new("engineering", "recommend", "req", "Downtown", 1000.0, Priority::Routine);
        b.agent_id = "engineering-1".to_string();
        vec![a, b]
    }

    #[tokio::test]
    async fn malformed_llm_response_falls_back_to_rules() {
        let llm: Arc<dyn LlmAdapter> = Arc::new(StaticAdapter::ok("not json"));
        let resolution = negotiate(&conflict(), &decisions(), &llm, &CoordinationConfig::default()).await;
        assert_eq!(resolution.method, ResolutionMethod::Rule);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_rules() {
        let llm: Arc<dyn LlmAdapter> = Arc::new(StaticAdapter::err("timeout"));
        let resolution = negotiate(&conflict(), &decisions(), &llm, &CoordinationConfig::default()).await;
        assert_eq!(resolution.method, ResolutionMethod::Rule);
    }

    #[tokio::test]
    async fn well_formed_llm_response_is_used_directly() {
        let body = json!({
            "decision": "approve_partial",
            "rationale": "water agent has priority",
            "confidence": 0.82,
            "requires_human": false,
            "execution_plan": {"approved": ["water-1"], "queued": [], "deferred": ["engineering-1"], "sequence": [], "action": "approve_partial"},
        })
        .to_string();
        let llm: Arc<dyn LlmAdapter> = Arc::new(StaticAdapter::ok(body));
        let resolution = negotiate(&conflict(), &decisions(), &llm, &CoordinationConfig::default()).await;
        assert_eq!(resolution.method, ResolutionMethod::Llm);
        assert_eq!(resolution.decision, ResolutionDecision::ApprovePartial);
    }
}
