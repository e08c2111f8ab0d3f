//! Shared node library: the vertices every domain agent's pipeline is
//! assembled from (see `pipeline.rs`). Each node is constructed once per
//! agent and reused across requests — state lives entirely in the
//! `PipelineState` passed to `run`, never on the node itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use civic_data::{load_context, DataSource};
use civic_llm::{CompletionRequest, LlmAdapter};
use civic_tools::ToolRegistry;
use civic_types::{ConfidenceFactors, Level, Plan, PipelineState, ToolInvocation};
use civic_wire::{CheckPlanConflictsResult, ConflictChecker, PlanConflictQuery};
use serde_json::{json, Value};

use crate::config::GlobalConfig;
use crate::runtime::Node;

/// Reads `input_event.context["location"]`, falling back to `"general"`
/// (an unfiltered sentinel) when the caller didn't supply one.
fn location(state: &PipelineState) -> String {
    state
        .input_event
        .context_str("location")
        .unwrap_or("general")
        .to_string()
}

fn estimated_cost(state: &PipelineState) -> f64 {
    state.input_event.context_f64("estimated_cost").unwrap_or(0.0)
}

// ---------------------------------------------------------------------
// Context Loader
// ---------------------------------------------------------------------

/// Queries the domain data source for this agent's relevant fact-sets.
/// Never raises: a failing query leaves that fact-set empty rather than
/// aborting the pipeline.
pub struct ContextLoaderNode {
    data: Arc<dyn DataSource>,
    fact_names: Vec<&'static str>,
}

impl ContextLoaderNode {
    pub fn new(data: Arc<dyn DataSource>, fact_names: Vec<&'static str>) -> Self {
        ContextLoaderNode { data, fact_names }
    }
}

#[async_trait]
impl Node for ContextLoaderNode {
    fn name(&self) -> &'static str {
        "context_loader"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let location = location(state);
        state.context = load_context(self.data.as_ref(), Some(&location), &self.fact_names).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Intent Analyser
// ---------------------------------------------------------------------

/// Classifies the request into an agent-specific intent label, setting
/// `risk_level`. Emergency requests short-circuit straight to a high (or
/// agent-overridden critical) risk level without waiting on the LLM.
pub struct IntentAnalyserNode {
    llm: Arc<dyn LlmAdapter>,
    agent_label: &'static str,
    keyword_fallback: Vec<(&'static str, &'static str)>,
    emergency_risk: Level,
}

impl IntentAnalyserNode {
    pub fn new(
        llm: Arc<dyn LlmAdapter>,
        agent_label: &'static str,
        keyword_fallback: Vec<(&'static str, &'static str)>,
        emergency_risk: Level,
    ) -> Self {
        IntentAnalyserNode {
            llm,
            agent_label,
            keyword_fallback,
            emergency_risk,
        }
    }

    fn classify_by_keyword(&self, description: &str) -> (String, Level) {
        let lowered = description.to_lowercase();
        for (keyword, intent) in &self.keyword_fallback {
            if lowered.contains(keyword) {
                return (intent.to_string(), Level::Medium);
            }
        }
        ("general_inquiry".to_string(), Level::Low)
    }
}

#[async_trait]
impl Node for IntentAnalyserNode {
    fn name(&self) -> &'static str {
        "intent_analyser"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        if state.input_event.is_emergency() {
            state.intent = Some("emergency_response".to_string());
            state.risk_level = Some(self.emergency_risk);
            if self.emergency_risk == Level::Critical {
                state.set_escalate("emergency request classified as critical risk");
            }
            return Ok(());
        }

        let system = format!(
            "You are the intent classifier for the {} municipal agent. \
             Respond with strict JSON: {{\"intent\": string, \"risk_level\": \
             \"low\"|\"medium\"|\"high\"|\"critical\", \"safety_concerns\": [string], \
             \"reasoning\": string}}.",
            self.agent_label
        );
        let request = CompletionRequest::json(system, state.input_event.description.clone());

        let (intent, risk_level) = match self.llm.complete(request).await {
            Ok(response) => match serde_json::from_str::<Value>(&response.content) {
                Ok(parsed) => {
                    let intent = parsed
                        .get("intent")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    let risk = parsed
                        .get("risk_level")
                        .and_then(|v| v.as_str())
                        .and_then(parse_level);
                    match (intent, risk) {
                        (Some(intent), Some(risk)) => (intent, risk),
                        _ => self.classify_by_keyword(&state.input_event.description),
                    }
                }
                Err(_) => self.classify_by_keyword(&state.input_event.description),
            },
            Err(err) => {
                tracing::warn!(%err, "intent analyser: llm unavailable, using keyword fallback");
                self.classify_by_keyword(&state.input_event.description)
            }
        };

        state.intent = Some(intent);
        state.risk_level = Some(risk_level);
        if risk_level == Level::Critical {
            state.set_escalate("intent analyser classified request as critical risk");
        }
        Ok(())
    }
}

fn parse_level(value: &str) -> Option<Level> {
    match value {
        "low" => Some(Level::Low),
        "medium" => Some(Level::Medium),
        "high" => Some(Level::High),
        "critical" => Some(Level::Critical),
        _ => None,
    }
}

// ---------------------------------------------------------------------
// Goal Setter
// ---------------------------------------------------------------------

/// Pure, no external calls: templates `intent` plus a couple of request
/// fields into a short goal string.
pub struct GoalSetterNode;

#[async_trait]
impl Node for GoalSetterNode {
    fn name(&self) -> &'static str {
        "goal_setter"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let intent = state.intent.clone().unwrap_or_else(|| "general_inquiry".to_string());
        let location = location(state);
        state.goal = Some(format!("address '{intent}' for {location}"));
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------

/// Produces `plan` and `alternative_plans`. Steps the LLM invents that
/// don't name a real tool in this agent's registry are dropped.
pub struct PlannerNode {
    llm: Arc<dyn LlmAdapter>,
    tools: ToolRegistry,
    agent_label: &'static str,
    template: Arc<dyn Fn(&PipelineState) -> Plan + Send + Sync>,
}

impl PlannerNode {
    pub fn new(
        llm: Arc<dyn LlmAdapter>,
        tools: ToolRegistry,
        agent_label: &'static str,
        template: impl Fn(&PipelineState) -> Plan + Send + Sync + 'static,
    ) -> Self {
        PlannerNode {
            llm,
            tools,
            agent_label,
            template: Arc::new(template),
        }
    }

    async fn valid_tool_names(&self) -> std::collections::HashSet<String> {
        self.tools.names().await.into_iter().collect()
    }

    fn parse_plan(value: &Value, valid: &std::collections::HashSet<String>) -> Option<Plan> {
        let name = value.get("name")?.as_str()?.to_string();
        let steps: Vec<ToolInvocation> = value
            .get("steps")?
            .as_array()?
            .iter()
            .filter_map(|s| {
                let tool_name = s.as_str()?.to_string();
                if valid.contains(&tool_name) {
                    Some(ToolInvocation {
                        tool_name,
                        params: HashMap::new(),
                    })
                } else {
                    tracing::info!(tool_name, "planner dropped unknown tool name");
                    None
                }
            })
            .collect();
        let estimated_cost = value.get("estimated_cost").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let estimated_duration = value
            .get("estimated_duration")
            .and_then(|v| v.as_str())
            .unwrap_or("unspecified")
            .to_string();
        let resources_needed = value
            .get("resources_needed")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let risk_level = value
            .get("risk_level")
            .and_then(|v| v.as_str())
            .and_then(parse_level)
            .unwrap_or(Level::Medium);
        Some(Plan {
            name,
            steps,
            estimated_cost,
            estimated_duration,
            resources_needed,
            risk_level,
        })
    }
}

#[async_trait]
impl Node for PlannerNode {
    fn name(&self) -> &'static str {
        "planner"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let valid = self.valid_tool_names().await;

        let system = format!(
            "You are the planner for the {} municipal agent. Respond with strict JSON: \
             {{\"plans\": [{{\"name\": string, \"steps\": [toolName, ...], \"estimated_duration\": \
             string, \"estimated_cost\": number, \"resources_needed\": [string], \"risk_level\": \
             \"low\"|\"medium\"|\"high\"|\"critical\"}}]}}. Only use tool names from: {}.",
            self.agent_label,
            valid.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        let user = format!(
            "Goal: {}\nIntent: {}\nDescription: {}",
            state.goal.as_deref().unwrap_or(""),
            state.intent.as_deref().unwrap_or(""),
            state.input_event.description
        );
        let request = CompletionRequest::json(system, user);

        let plans: Vec<Plan> = match self.llm.complete(request).await {
            Ok(response) => match serde_json::from_str::<Value>(&response.content) {
                Ok(parsed) => parsed
                    .get("plans")
                    .and_then(|v| v.as_array())
                    .map(|plans| plans.iter().filter_map(|p| Self::parse_plan(p, &valid)).collect())
                    .unwrap_or_default(),
                Err(_) => Vec::new(),
            },
            Err(err) => {
                tracing::warn!(%err, "planner: llm unavailable, using template fallback");
                Vec::new()
            }
        };

        let (primary, alternatives) = if plans.is_empty() {
            (((self.template)(state)), Vec::new())
        } else {
            let mut iter = plans.into_iter();
            let primary = iter.next().unwrap();
            (primary, iter.collect())
        };

        state.plan = Some(primary);
        state.alternative_plans = alternatives;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Coordination Checkpoint
// ---------------------------------------------------------------------

/// Consults the coordination workflow via `ConflictChecker` mid-pipeline,
/// before any tool executes.
pub struct CoordinationCheckpointNode {
    checker: Arc<dyn ConflictChecker>,
    agent_id: String,
    agent_type: civic_types::AgentType,
}

impl CoordinationCheckpointNode {
    pub fn new(checker: Arc<dyn ConflictChecker>, agent_id: impl Into<String>, agent_type: civic_types::AgentType) -> Self {
        CoordinationCheckpointNode {
            checker,
            agent_id: agent_id.into(),
            agent_type,
        }
    }
}

#[async_trait]
impl Node for CoordinationCheckpointNode {
    fn name(&self) -> &'static str {
        "coordination_checkpoint"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let plan = state.plan.clone().ok_or_else(|| anyhow::anyhow!("no plan to coordinate"))?;
        let priority = state
            .input_event
            .context
            .get("priority")
            .and_then(|v| v.as_str())
            .and_then(parse_priority)
            .unwrap_or(civic_types::Priority::Routine);

        let query = PlanConflictQuery {
            agent_id: self.agent_id.clone(),
            agent_type: self.agent_type.as_str().to_string(),
            plan: serde_json::to_value(&plan).unwrap_or(Value::Null),
            location: location(state),
            resources_needed: plan.resources_needed.clone(),
            estimated_cost: estimated_cost(state),
            priority,
        };

        let result: CheckPlanConflictsResult = self.checker.check_plan_conflicts(query).await;

        state.coordination_check = Some(serde_json::to_value(&result).unwrap_or(Value::Null));
        state.coordination_approved = result.should_proceed;
        state.coordination_recommendations = result.recommendations.clone();

        if result.requires_human {
            state.set_escalate("coordination checkpoint requires human review");
            return Ok(());
        }

        if result.has_conflicts && !result.should_proceed {
            state.attempts += 1;
            state.retry_needed = true;
            if state.attempts >= state.max_attempts {
                state.set_escalate("coordination conflicts unresolved after max attempts");
            }
        } else {
            state.retry_needed = false;
        }
        Ok(())
    }
}

fn parse_priority(value: &str) -> Option<civic_types::Priority> {
    use civic_types::Priority::*;
    match value {
        "routine" => Some(Routine),
        "maintenance" => Some(Maintenance),
        "expansion" => Some(Expansion),
        "safety_critical" => Some(SafetyCritical),
        "public_health" => Some(PublicHealth),
        "emergency" => Some(Emergency),
        _ => None,
    }
}

// ---------------------------------------------------------------------
// Tool Executor
// ---------------------------------------------------------------------

/// Calls every step of `plan.steps` in order. A failing tool call
/// records an inline error and does not abort the remaining steps.
pub struct ToolExecutorNode {
    data: Arc<dyn DataSource>,
    tools: ToolRegistry,
}

impl ToolExecutorNode {
    pub fn new(data: Arc<dyn DataSource>, tools: ToolRegistry) -> Self {
        ToolExecutorNode { data, tools }
    }
}

#[async_trait]
impl Node for ToolExecutorNode {
    fn name(&self) -> &'static str {
        "tool_executor"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let Some(plan) = state.plan.clone() else {
            return Ok(());
        };
        let location = location(state);
        let estimated_cost = estimated_cost(state);

        for step in &plan.steps {
            let mut params = json!({
                "location": location,
                "estimated_cost": estimated_cost,
                "required_workers": state.input_event.context_f64("required_workers").unwrap_or(1.0),
                "fill_threshold": 95.0,
            });
            if let Value::Object(extra) = &mut params {
                for (key, value) in &step.params {
                    extra.insert(key.clone(), value.clone());
                }
            }
            let result = self.tools.call(&step.tool_name, self.data.as_ref(), &params).await;
            state.tool_results.insert(step.tool_name.clone(), result);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------

/// Normalises `tool_results` into a flat `extracted_facts` mapping
/// stashed in `observations`. The extraction itself is always the
/// deterministic explicit switch below; the LLM is only asked for a
/// one-line human-readable commentary on top of it.
pub struct ObserverNode {
    llm: Arc<dyn LlmAdapter>,
    agent_label: &'static str,
}

impl ObserverNode {
    pub fn new(llm: Arc<dyn LlmAdapter>, agent_label: &'static str) -> Self {
        ObserverNode { llm, agent_label }
    }
}

#[async_trait]
impl Node for ObserverNode {
    fn name(&self) -> &'static str {
        "observer"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let mut facts = serde_json::Map::new();
        for (tool_name, result) in &state.tool_results {
            if let Some(err) = result.get("error") {
                facts.insert(format!("{tool_name}_error"), err.clone());
                continue;
            }
            if let Some(sufficient) = result.get("sufficient") {
                facts.insert(format!("{tool_name}_sufficient"), sufficient.clone());
            }
            if let Some(has_conflict) = result.get("has_conflict") {
                facts.insert(format!("{tool_name}_has_conflict"), has_conflict.clone());
            }
            if let Some(overflowing) = result.get("overflowing_bins") {
                facts.insert(format!("{tool_name}_overflowing"), overflowing.clone());
            }
            if let Some(condition) = result.get("condition") {
                facts.insert(format!("{tool_name}_condition"), condition.clone());
            }
            if let Some(critical_issues) = result.get("critical_issues") {
                facts.insert(format!("{tool_name}_critical_issues"), critical_issues.clone());
            }
            if let Some(risk_level) = result.get("risk_level") {
                facts.insert(format!("{tool_name}_risk_level"), risk_level.clone());
            }
            if let Some(count) = result.get("count") {
                facts.insert(format!("{tool_name}_count"), count.clone());
            }
        }

        let system = format!(
            "You are the observer for the {} municipal agent. In one short sentence, \
             summarise the extracted facts below in plain prose for a human reviewer.",
            self.agent_label
        );
        let user = serde_json::to_string(&facts).unwrap_or_default();
        let request = CompletionRequest::json(system, user);
        let commentary = match self.llm.complete(request).await {
            Ok(response) => response.content,
            Err(err) => {
                tracing::warn!(%err, "observer: llm unavailable, using templated commentary");
                templated_commentary(&facts)
            }
        };

        state.observations.insert("commentary".to_string(), json!(commentary));
        state.observations.insert("extracted_facts".to_string(), Value::Object(facts));
        Ok(())
    }
}

fn templated_commentary(facts: &serde_json::Map<String, Value>) -> String {
    format!("observed {} extracted facts from tool results", facts.len())
}

// ---------------------------------------------------------------------
// Feasibility Evaluator
// ---------------------------------------------------------------------

/// Pure deterministic rules over `extracted_facts` and `plan`. Emergency
/// intents bypass every rule but worker-availability.
pub struct FeasibilityEvaluatorNode {
    pub budget_utilisation_cap: f64,
}

impl Default for FeasibilityEvaluatorNode {
    fn default() -> Self {
        FeasibilityEvaluatorNode {
            budget_utilisation_cap: 90.0,
        }
    }
}

#[async_trait]
impl Node for FeasibilityEvaluatorNode {
    fn name(&self) -> &'static str {
        "feasibility_evaluator"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let is_emergency = state.intent.as_deref() == Some("emergency_response");
        let facts = state
            .observations
            .get("extracted_facts")
            .cloned()
            .unwrap_or(Value::Object(serde_json::Map::new()));

        let mut reasons = Vec::new();
        let mut feasible = true;

        const POOR_CONDITIONS: &[&str] = &["poor", "critical"];
        const HIGH_RISK_LEVELS: &[&str] = &["high", "critical"];
        const ACTIVE_PROJECTS_CAP: i64 = 3;

        for (key, value) in facts.as_object().into_iter().flatten() {
            if key.ends_with("_sufficient") && value == &json!(false) {
                feasible = false;
                reasons.push(format!("{key} failed"));
            }
            if !is_emergency {
                if key.ends_with("_has_conflict") && value == &json!(true) {
                    feasible = false;
                    reasons.push("schedule conflict detected".to_string());
                }
                if key.contains("budget") && key.ends_with("_sufficient") && value == &json!(false) {
                    feasible = false;
                    reasons.push("budget insufficient".to_string());
                }
                if key.ends_with("_condition") {
                    let poor = value.as_str().map(|c| POOR_CONDITIONS.contains(&c)).unwrap_or(false);
                    if poor {
                        feasible = false;
                        reasons.push(format!("{key} reports a poor or critical condition"));
                    }
                }
                if key.ends_with("_critical_issues") && value.as_i64().unwrap_or(0) > 0 {
                    feasible = false;
                    reasons.push(format!("{key} reports active critical issues"));
                }
                if key.ends_with("_risk_level") {
                    let risky = value.as_str().map(|r| HIGH_RISK_LEVELS.contains(&r)).unwrap_or(false);
                    if risky {
                        feasible = false;
                        reasons.push(format!("{key} reports a high or critical risk level"));
                    }
                }
                if key.contains("active_projects") && key.ends_with("_count") && value.as_i64().unwrap_or(0) > ACTIVE_PROJECTS_CAP {
                    feasible = false;
                    reasons.push(format!("{key} exceeds the active-projects cap of {ACTIVE_PROJECTS_CAP}"));
                }
            }
        }

        if let Some(budget_result) = state.tool_results.get("check_budget") {
            if let Some(utilisation) = budget_result.get("utilisation_percent").and_then(|v| v.as_f64()) {
                if !is_emergency && utilisation > self.budget_utilisation_cap {
                    feasible = false;
                    reasons.push(format!("budget utilisation {utilisation}% exceeds cap"));
                }
            }
        }

        if !feasible && state.attempts < state.max_attempts && !state.alternative_plans.is_empty() {
            state.retry_needed = true;
        } else {
            state.retry_needed = false;
        }

        state.feasible = Some(feasible);
        state.feasibility_reason = Some(if feasible {
            "all feasibility checks passed".to_string()
        } else {
            reasons.join("; ")
        });
        state.feasibility_details = facts
            .as_object()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Policy Validator
// ---------------------------------------------------------------------

/// Deterministic rule set for `(policy_ok, violations)`; the deterministic
/// rules are authoritative for the boolean. A failed policy always sets
/// `escalate=true`. The LLM is preferred only for a nuanced explanation
/// of the outcome, never for the outcome itself.
pub struct PolicyValidatorNode {
    llm: Arc<dyn LlmAdapter>,
    agent_label: &'static str,
    pub max_cost_without_escalation: f64,
}

impl PolicyValidatorNode {
    pub fn new(llm: Arc<dyn LlmAdapter>, agent_label: &'static str) -> Self {
        PolicyValidatorNode {
            llm,
            agent_label,
            max_cost_without_escalation: 1_000_000.0,
        }
    }
}

#[async_trait]
impl Node for PolicyValidatorNode {
    fn name(&self) -> &'static str {
        "policy_validator"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let mut violations = Vec::new();
        let cost = state.plan.as_ref().map(|p| p.estimated_cost).unwrap_or(0.0);
        if cost > self.max_cost_without_escalation {
            violations.push(format!("estimated cost {cost} exceeds policy limit without escalation"));
        }
        if state.risk_level == Some(Level::Critical) {
            violations.push("critical risk level requires human policy review".to_string());
        }

        let policy_ok = violations.is_empty();

        let system = format!(
            "You are the policy validator for the {} municipal agent. Given the \
             violations list below (empty means compliant), write one short sentence \
             explaining the policy outcome to a human reviewer. The outcome itself is \
             already decided; only explain it.",
            self.agent_label
        );
        let user = serde_json::to_string(&violations).unwrap_or_default();
        let request = CompletionRequest::json(system, user);
        let explanation = match self.llm.complete(request).await {
            Ok(response) => response.content,
            Err(err) => {
                tracing::warn!(%err, "policy validator: llm unavailable, using templated explanation");
                templated_policy_explanation(policy_ok, &violations)
            }
        };
        state.observations.insert("policy_explanation".to_string(), json!(explanation));

        state.policy_ok = Some(policy_ok);
        state.policy_violations = violations;
        if !policy_ok {
            state.set_escalate("policy validator found violations");
        }
        Ok(())
    }
}

fn templated_policy_explanation(policy_ok: bool, violations: &[String]) -> String {
    if policy_ok {
        "no policy violations detected".to_string()
    } else {
        violations.join("; ")
    }
}

// ---------------------------------------------------------------------
// Confidence Estimator
// ---------------------------------------------------------------------

pub struct ConfidenceEstimatorNode;

#[async_trait]
impl Node for ConfidenceEstimatorNode {
    fn name(&self) -> &'static str {
        "confidence_estimator"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let total_tools = state.tool_results.len().max(1) as f64;
        let successful_tools = state
            .tool_results
            .values()
            .filter(|r| r.get("error").is_none())
            .count() as f64;
        let data_completeness = successful_tools / total_tools;

        let risk_factor = match state.risk_level.unwrap_or(Level::Medium) {
            Level::Low => 1.0,
            Level::Medium => 0.8,
            Level::High => 0.6,
            Level::Critical => 0.3,
        };

        let retry_penalty = (1.0 - 0.15 * state.attempts as f64).max(0.4);
        let historical_similarity = 0.7;

        let factors = ConfidenceFactors {
            data_completeness,
            risk_factor,
            retry_penalty,
            historical_similarity,
        };
        let confidence = (factors.weighted_sum() * 100.0).round() / 100.0;
        let confidence = confidence.clamp(0.0, 1.0);

        state.confidence_factors = Some(factors);
        state.confidence = Some(confidence);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Decision Router
// ---------------------------------------------------------------------

pub struct DecisionRouterNode {
    pub confidence_threshold: f64,
}

impl Default for DecisionRouterNode {
    fn default() -> Self {
        DecisionRouterNode {
            confidence_threshold: 0.7,
        }
    }
}

impl DecisionRouterNode {
    pub fn from_config(config: &GlobalConfig) -> Self {
        DecisionRouterNode {
            confidence_threshold: config.agent.confidence_threshold,
        }
    }
}

#[async_trait]
impl Node for DecisionRouterNode {
    fn name(&self) -> &'static str {
        "decision_router"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let risk_escalates = matches!(state.risk_level, Some(Level::High) | Some(Level::Critical));
        let policy_escalates = state.policy_ok == Some(false);
        let confidence_escalates = state.confidence.unwrap_or(0.0) < self.confidence_threshold;
        let exhausted_retries = state.feasible == Some(false) && state.attempts >= state.max_attempts;

        if risk_escalates || policy_escalates || confidence_escalates || exhausted_retries {
            let reason = if risk_escalates {
                "risk level requires human attention"
            } else if policy_escalates {
                "policy violation"
            } else if confidence_escalates {
                "confidence below threshold"
            } else {
                "not feasible after exhausting retries"
            };
            state.set_escalate(reason);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Output Generator
// ---------------------------------------------------------------------

pub struct OutputGeneratorNode;

#[async_trait]
impl Node for OutputGeneratorNode {
    fn name(&self) -> &'static str {
        "output_generator"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let details = json!({
            "feasible": state.feasible,
            "policy_compliant": state.policy_ok,
            "risk_level": state.risk_level.map(|l| l.as_str()),
            "plan": state.plan,
            "tool_results": state.tool_results,
            "observations": state.observations,
        });

        state.response = Some(if state.escalate {
            json!({
                "decision": "escalate",
                "reason": state.escalation_reason.clone().unwrap_or_else(|| "escalated".to_string()),
                "requires_human_review": true,
                "confidence": state.confidence.unwrap_or(0.0),
                "details": details,
            })
        } else if state.feasible == Some(true) && state.policy_ok == Some(true) {
            let action = if state.intent.as_deref() == Some("emergency_response") {
                "approve"
            } else {
                "recommend"
            };
            json!({
                "decision": action,
                "reason": state.feasibility_reason.clone().unwrap_or_default(),
                "requires_human_review": false,
                "confidence": state.confidence.unwrap_or(0.0),
                "recommendation": {
                    "action": state.goal.clone().unwrap_or_default(),
                    "plan": state.plan,
                    "constraints": Vec::<String>::new(),
                    "conditions": state.coordination_recommendations,
                    "confidence": state.confidence.unwrap_or(0.0),
                },
                "details": details,
            })
        } else {
            json!({
                "decision": "deny",
                "reason": state.feasibility_reason.clone().unwrap_or_default(),
                "requires_human_review": false,
                "confidence": state.confidence.unwrap_or(0.0),
                "details": details,
            })
        });
        state.finish();
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Direct-Response Path (informational queries)
// ---------------------------------------------------------------------

/// Short-circuits the full pipeline for `query_type=informational`
/// requests: reads context, formats a terse summary, never escalates.
pub struct DirectResponseNode {
    llm: Arc<dyn LlmAdapter>,
    agent_label: &'static str,
}

impl DirectResponseNode {
    pub fn new(llm: Arc<dyn LlmAdapter>, agent_label: &'static str) -> Self {
        DirectResponseNode { llm, agent_label }
    }
}

#[async_trait]
impl Node for DirectResponseNode {
    fn name(&self) -> &'static str {
        "direct_response"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let system = format!(
            "You are the {} municipal agent answering an informational question. \
             Respond with one or two short sentences of plain prose. Never use a table.",
            self.agent_label
        );
        let user = format!(
            "Question: {}\nAvailable data: {}",
            state.input_event.description,
            serde_json::to_string(&state.context).unwrap_or_default()
        );
        let request = CompletionRequest::json(system, user);

        let summary = match self.llm.complete(request).await {
            Ok(response) => response.content,
            Err(err) => {
                tracing::warn!(%err, "direct response: llm unavailable, using templated listing");
                templated_listing(&state.context)
            }
        };

        state.feasible = Some(true);
        state.policy_ok = Some(true);
        state.confidence = Some(0.95);
        state.response = Some(json!({
            "decision": "inform",
            "reason": "informational query answered from available context",
            "requires_human_review": false,
            "confidence": 0.95,
            "data": {
                "summary": summary,
                "context": state.context,
            },
        }));
        state.finish();
        Ok(())
    }
}

fn templated_listing(context: &HashMap<String, Vec<Value>>) -> String {
    let total: usize = context.values().map(|rows| rows.len()).sum();
    let sets: Vec<String> = context.keys().cloned().collect();
    format!("Found {total} matching records across {}.", sets.join(", "))
}

// ---------------------------------------------------------------------
// Memory Logger
// ---------------------------------------------------------------------

/// Appends a Transparency Entry for this routing decision. Failures are
/// swallowed — logging is best-effort and never blocks the response.
pub struct MemoryLoggerNode {
    sink: Arc<dyn TransparencySink>,
    agent_type: civic_types::AgentType,
}

impl MemoryLoggerNode {
    pub fn new(sink: Arc<dyn TransparencySink>, agent_type: civic_types::AgentType) -> Self {
        MemoryLoggerNode { sink, agent_type }
    }
}

/// Narrow seam onto `civic_transparency::TransparencyLog` so this crate
/// doesn't need a direct dependency on it; `civic-runtime` provides the
/// concrete sink at construction time.
#[async_trait]
pub trait TransparencySink: Send + Sync {
    async fn record(&self, entry: civic_types::TransparencyEntry);
}

#[async_trait]
impl Node for MemoryLoggerNode {
    fn name(&self) -> &'static str {
        "memory_logger"
    }

    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
        let decision = state
            .response
            .as_ref()
            .and_then(|r| r.get("decision"))
            .and_then(|d| d.as_str())
            .unwrap_or("unknown")
            .to_string();
        let rationale = state
            .response
            .as_ref()
            .and_then(|r| r.get("reason"))
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string();

        let mut entry = civic_types::TransparencyEntry::new(
            self.agent_type.as_str(),
            "output_generator",
            decision,
            rationale,
            state.confidence.unwrap_or(0.0),
        );
        entry.cost_impact = state.plan.as_ref().map(|p| p.estimated_cost);
        entry.context = json!({ "request_id": state.input_event.request_id });

        self.sink.record(entry).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_data::FixtureDataSource;
    use civic_llm::StaticAdapter;
    use civic_types::Request;

    fn base_state() -> PipelineState {
        let mut request = Request::new("maintenance_request", "routine pipe inspection");
        request.context.insert("location".to_string(), json!("Downtown"));
        PipelineState::new(request, "test-1.0", 3)
    }

    #[tokio::test]
    async fn context_loader_populates_known_fact_sets() {
        let data: Arc<dyn DataSource> = Arc::new(FixtureDataSource::seeded());
        let node = ContextLoaderNode::new(data, vec!["health_resources"]);
        let mut state = base_state();
        node.run(&mut state).await.unwrap();
        assert_eq!(state.context["health_resources"].len(), 9);
    }

    #[tokio::test]
    async fn intent_analyser_fast_paths_emergency_requests() {
        let llm: Arc<dyn LlmAdapter> = Arc::new(StaticAdapter::err("unreachable"));
        let node = IntentAnalyserNode::new(llm, "water", vec![], Level::High);
        let mut state = base_state();
        state.input_event.request_type = "emergency_response".to_string();
        node.run(&mut state).await.unwrap();
        assert_eq!(state.intent.as_deref(), Some("emergency_response"));
        assert_eq!(state.risk_level, Some(Level::High));
    }

    #[tokio::test]
    async fn confidence_estimator_matches_weighted_formula() {
        let node = ConfidenceEstimatorNode;
        let mut state = base_state();
        state.risk_level = Some(Level::Low);
        state.tool_results.insert("a".to_string(), json!({"ok": true}));
        node.run(&mut state).await.unwrap();
        // data_completeness=1.0, risk_factor=1.0, retry_penalty=1.0, historical=0.7
        // 0.3 + 0.3 + 0.2 + 0.14 = 0.94
        assert_eq!(state.confidence, Some(0.94));
    }

    #[tokio::test]
    async fn decision_router_escalates_on_low_confidence() {
        let node = DecisionRouterNode::default();
        let mut state = base_state();
        state.confidence = Some(0.5);
        state.policy_ok = Some(true);
        state.feasible = Some(true);
        node.run(&mut state).await.unwrap();
        assert!(state.escalate);
    }

    #[tokio::test]
    async fn observer_falls_back_to_templated_commentary_when_llm_unavailable() {
        let llm: Arc<dyn LlmAdapter> = Arc::new(StaticAdapter::err("unreachable"));
        let node = ObserverNode::new(llm, "water");
        let mut state = base_state();
        state.tool_results.insert("check_budget".to_string(), json!({"sufficient": true}));
        node.run(&mut state).await.unwrap();
        let facts = &state.observations["extracted_facts"];
        assert_eq!(facts["check_budget_sufficient"], true);
        assert!(state.observations["commentary"].as_str().unwrap().contains("extracted facts"));
    }

    #[tokio::test]
    async fn feasibility_evaluator_rejects_critical_pipeline_condition() {
        let node = FeasibilityEvaluatorNode::default();
        let mut state = base_state();
        state.observations.insert(
            "extracted_facts".to_string(),
            json!({"check_pipeline_condition_condition": "critical"}),
        );
        node.run(&mut state).await.unwrap();
        assert_eq!(state.feasible, Some(false));
    }

    #[tokio::test]
    async fn feasibility_evaluator_rejects_high_zone_risk() {
        let node = FeasibilityEvaluatorNode::default();
        let mut state = base_state();
        state.observations.insert(
            "extracted_facts".to_string(),
            json!({"check_zone_risk_risk_level": "high"}),
        );
        node.run(&mut state).await.unwrap();
        assert_eq!(state.feasible, Some(false));
    }

    #[tokio::test]
    async fn feasibility_evaluator_rejects_active_projects_over_cap() {
        let node = FeasibilityEvaluatorNode::default();
        let mut state = base_state();
        state.observations.insert(
            "extracted_facts".to_string(),
            json!({"check_active_projects_count": 4}),
        );
        node.run(&mut state).await.unwrap();
        assert_eq!(state.feasible, Some(false));
    }

    #[tokio::test]
    async fn feasibility_evaluator_passes_when_all_facts_within_bounds() {
        let node = FeasibilityEvaluatorNode::default();
        let mut state = base_state();
        state.observations.insert(
            "extracted_facts".to_string(),
            json!({
                "check_pipeline_condition_condition": "fair",
                "check_zone_risk_risk_level": "low",
                "check_active_projects_count": 2,
            }),
        );
        node.run(&mut state).await.unwrap();
        assert_eq!(state.feasible, Some(true));
    }

    #[tokio::test]
    async fn policy_validator_falls_back_to_templated_explanation_when_llm_unavailable() {
        let llm: Arc<dyn LlmAdapter> = Arc::new(StaticAdapter::err("unreachable"));
        let node = PolicyValidatorNode::new(llm, "water");
        let mut state = base_state();
        state.plan = Some(Plan {
            name: "test".to_string(),
            steps: Vec::new(),
            estimated_cost: 2_000_000.0,
            estimated_duration: "unspecified".to_string(),
            resources_needed: Vec::new(),
            risk_level: Level::Medium,
        });
        node.run(&mut state).await.unwrap();
        assert_eq!(state.policy_ok, Some(false));
        assert!(state.escalate);
        assert!(state.observations["policy_explanation"].as_str().unwrap().contains("exceeds policy limit"));
    }
}
