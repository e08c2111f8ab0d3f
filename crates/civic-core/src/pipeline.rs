//! Per-domain agent pipeline assembly. Each of the six department agents
//! (water, engineering, fire, sanitation, health, finance) is the same
//! `PipelineGraph` shape wired from the shared node library, differing
//! only in its fact-sets, keyword fallback, tool registry, and plan
//! template.

use std::sync::Arc;

use civic_data::DataSource;
use civic_llm::LlmAdapter;
use civic_tools::ToolRegistry;
use civic_types::{AgentType, Level, Plan, PipelineState, Request, ToolInvocation};
use civic_wire::ConflictChecker;

use crate::config::GlobalConfig;
use crate::nodes::*;
use crate::runtime::{Edge, Node, PipelineGraph, PipelineGraphBuilder, END};

/// One instantiated department agent: a fixed `PipelineGraph` plus the
/// `query_type=informational` short-circuit graph, both closing over the
/// same data source, tool registry, and adapters.
pub struct DomainAgent {
    pub agent_type: AgentType,
    full_pipeline: PipelineGraph,
    direct_response: PipelineGraph,
    max_attempts: u32,
    agent_version: &'static str,
}

impl DomainAgent {
    pub async fn run(&self, request: Request) -> PipelineState {
        let initial = PipelineState::new(request.clone(), self.agent_version, self.max_attempts);
        let graph = if request.query_type == Some(civic_types::QueryType::Informational) {
            &self.direct_response
        } else {
            &self.full_pipeline
        };
        crate::runtime::execute(graph, initial).await
    }
}

fn template_plan(name: &str, tool_names: &[&str], risk: Level) -> Arc<dyn Fn(&PipelineState) -> Plan + Send + Sync> {
    let name = name.to_string();
    let steps: Vec<ToolInvocation> = tool_names
        .iter()
        .map(|t| ToolInvocation {
            tool_name: t.to_string(),
            params: Default::default(),
        })
        .collect();
    Arc::new(move |_state: &PipelineState| Plan {
        name: name.clone(),
        steps: steps.clone(),
        estimated_cost: 0.0,
        estimated_duration: "unspecified".to_string(),
        resources_needed: Vec::new(),
        risk_level: risk,
    })
}

/// Spec per domain agent: its fact-sets, keyword fallback dictionary,
/// default plan template, and emergency-path risk override.
struct DomainSpec {
    agent_type: AgentType,
    agent_label: &'static str,
    fact_names: Vec<&'static str>,
    keyword_fallback: Vec<(&'static str, &'static str)>,
    template_name: &'static str,
    template_tools: Vec<&'static str>,
    emergency_risk: Level,
}

fn domain_spec(agent_type: AgentType) -> DomainSpec {
    match agent_type {
        AgentType::Water => DomainSpec {
            agent_type,
            agent_label: "water",
            fact_names: vec!["pipeline_segments", "zone_risk_levels", "available_workers", "budgets", "schedule_conflicts"],
            keyword_fallback: vec![("leak", "pipe_repair"), ("pressure", "pressure_investigation")],
            template_name: "dispatch_water_crew",
            template_tools: vec!["check_worker_availability", "check_budget", "check_pipeline_condition", "check_zone_risk"],
            emergency_risk: Level::Critical,
        },
        AgentType::Engineering => DomainSpec {
            agent_type,
            agent_label: "engineering",
            fact_names: vec!["active_projects", "available_workers", "budgets", "schedule_conflicts"],
            keyword_fallback: vec![("bridge", "structural_inspection"), ("road", "road_work")],
            template_name: "schedule_inspection",
            template_tools: vec!["check_worker_availability", "check_budget", "check_active_projects"],
            emergency_risk: Level::High,
        },
        AgentType::Fire => DomainSpec {
            agent_type,
            agent_label: "fire",
            fact_names: vec!["fire_incidents", "available_workers", "budgets", "schedule_conflicts"],
            keyword_fallback: vec![("fire", "fire_response"), ("hazard", "hazard_inspection")],
            template_name: "dispatch_fire_crew",
            template_tools: vec!["check_worker_availability", "check_incident_history"],
            emergency_risk: Level::Critical,
        },
        AgentType::Sanitation => DomainSpec {
            agent_type,
            agent_label: "sanitation",
            fact_names: vec!["sanitation_bins", "collection_routes", "available_workers", "budgets", "schedule_conflicts"],
            keyword_fallback: vec![("overflow", "bin_collection"), ("route", "route_optimisation")],
            template_name: "dispatch_collection_crew",
            template_tools: vec!["check_worker_availability", "check_bin_capacity", "check_budget"],
            emergency_risk: Level::High,
        },
        AgentType::Health => DomainSpec {
            agent_type,
            agent_label: "health",
            fact_names: vec!["health_resources", "disease_incidents", "available_workers", "budgets", "schedule_conflicts"],
            keyword_fallback: vec![("outbreak", "disease_response"), ("supplies", "supply_request")],
            template_name: "dispatch_health_response",
            template_tools: vec!["report_health_supplies", "check_worker_availability"],
            emergency_risk: Level::Critical,
        },
        AgentType::Finance => DomainSpec {
            agent_type,
            agent_label: "finance",
            fact_names: vec!["pending_invoices", "budgets", "schedule_conflicts"],
            keyword_fallback: vec![("invoice", "invoice_review"), ("overrun", "budget_review")],
            template_name: "review_budget_line",
            template_tools: vec!["check_budget", "check_pending_invoices"],
            emergency_risk: Level::High,
        },
    }
}

/// Builds the one `DomainAgent` for `agent_type`, wiring the shared node
/// library against the supplied adapters per the state-machine in the
/// pipeline runtime's wiring diagram:
/// `context → intent → goal → planner → coordination_checkpoint
///  coordination_checkpoint → {escalate→output, retry→planner, proceed→tools}
///  tools → observe → feasibility → {retry→tools, ok→policy}
///  policy → memory_log → confidence → router → output → END`
pub fn build_domain_agent(
    agent_type: AgentType,
    agent_id: impl Into<String>,
    config: &GlobalConfig,
    data: Arc<dyn DataSource>,
    llm: Arc<dyn LlmAdapter>,
    conflict_checker: Arc<dyn ConflictChecker>,
    transparency_sink: Arc<dyn TransparencySink>,
    tools: ToolRegistry,
) -> DomainAgent {
    let spec = domain_spec(agent_type);
    let agent_id = agent_id.into();

    let context_loader: Arc<dyn Node> = Arc::new(ContextLoaderNode::new(data.clone(), spec.fact_names.clone()));
    let intent_analyser: Arc<dyn Node> = Arc::new(IntentAnalyserNode::new(
        llm.clone(),
        spec.agent_label,
        spec.keyword_fallback.clone(),
        spec.emergency_risk,
    ));
    let goal_setter: Arc<dyn Node> = Arc::new(GoalSetterNode);
    let planner: Arc<dyn Node> = Arc::new(PlannerNode::new(
        llm.clone(),
        tools.clone(),
        spec.agent_label,
        {
            let template = template_plan(spec.template_name, &spec.template_tools, Level::Medium);
            move |state: &PipelineState| (template)(state)
        },
    ));
    let coordination_checkpoint: Arc<dyn Node> = Arc::new(CoordinationCheckpointNode::new(
        conflict_checker,
        agent_id.clone(),
        agent_type,
    ));
    let tool_executor: Arc<dyn Node> = Arc::new(ToolExecutorNode::new(data.clone(), tools.clone()));
    let observer: Arc<dyn Node> = Arc::new(ObserverNode::new(llm.clone(), spec.agent_label));
    let feasibility: Arc<dyn Node> = Arc::new(FeasibilityEvaluatorNode::default());
    let policy: Arc<dyn Node> = Arc::new(PolicyValidatorNode::new(llm.clone(), spec.agent_label));
    let confidence: Arc<dyn Node> = Arc::new(ConfidenceEstimatorNode);
    let router: Arc<dyn Node> = Arc::new(DecisionRouterNode::from_config(config));
    let output: Arc<dyn Node> = Arc::new(OutputGeneratorNode);
    let memory_logger: Arc<dyn Node> = Arc::new(MemoryLoggerNode::new(transparency_sink.clone(), agent_type));

    let full_pipeline = PipelineGraphBuilder::new("context_loader")
        .node("context_loader", context_loader)
        .node("intent_analyser", intent_analyser)
        .node("goal_setter", goal_setter)
        .node("planner", planner)
        .node("coordination_checkpoint", coordination_checkpoint)
        .node("tool_executor", tool_executor)
        .node("observer", observer)
        .node("feasibility_evaluator", feasibility)
        .node("policy_validator", policy)
        .node("memory_logger", memory_logger)
        .node("confidence_estimator", confidence)
        .node("decision_router", router)
        .node("output_generator", output)
        .edge("context_loader", Edge::Direct("intent_analyser".to_string()))
        .edge("intent_analyser", Edge::Direct("goal_setter".to_string()))
        .edge("goal_setter", Edge::Direct("planner".to_string()))
        .edge("planner", Edge::Direct("coordination_checkpoint".to_string()))
        .edge(
            "coordination_checkpoint",
            Edge::conditional(
                |s: &PipelineState| {
                    if s.escalate {
                        "escalate".to_string()
                    } else if s.retry_needed {
                        "retry".to_string()
                    } else {
                        "proceed".to_string()
                    }
                },
                [("escalate", "output_generator"), ("retry", "planner"), ("proceed", "tool_executor")],
            ),
        )
        .edge("tool_executor", Edge::Direct("observer".to_string()))
        .edge("observer", Edge::Direct("feasibility_evaluator".to_string()))
        .edge(
            "feasibility_evaluator",
            Edge::conditional(
                |s: &PipelineState| if s.retry_needed { "retry".to_string() } else { "ok".to_string() },
                [("retry", "tool_executor"), ("ok", "policy_validator")],
            ),
        )
        .edge("policy_validator", Edge::Direct("memory_logger".to_string()))
        .edge("memory_logger", Edge::Direct("confidence_estimator".to_string()))
        .edge("confidence_estimator", Edge::Direct("decision_router".to_string()))
        .edge("decision_router", Edge::Direct("output_generator".to_string()))
        .edge("output_generator", Edge::Direct(END.to_string()))
        .fallback_on_max_attempts("output_generator")
        .build();

    let direct_response_node: Arc<dyn Node> = Arc::new(DirectResponseNode::new(llm, spec.agent_label));
    let direct_context_loader: Arc<dyn Node> = Arc::new(ContextLoaderNode::new(data, spec.fact_names));
    let direct_response = PipelineGraphBuilder::new("context_loader")
        .node("context_loader", direct_context_loader)
        .node("direct_response", direct_response_node)
        .edge("context_loader", Edge::Direct("direct_response".to_string()))
        .edge("direct_response", Edge::Direct(END.to_string()))
        .build();

    DomainAgent {
        agent_type,
        full_pipeline,
        direct_response,
        max_attempts: config.agent.max_planning_attempts,
        agent_version: "civic-agent-1.0",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use civic_data::FixtureDataSource;
    use civic_llm::StaticAdapter;
    use civic_wire::{CheckPlanConflictsResult, PlanConflictQuery};

    struct NeverConflicts;

    #[async_trait]
    impl ConflictChecker for NeverConflicts {
        async fn check_plan_conflicts(&self, _query: PlanConflictQuery) -> CheckPlanConflictsResult {
            CheckPlanConflictsResult {
                has_conflicts: false,
                should_proceed: true,
                requires_human: false,
                conflict_types: Vec::new(),
                recommendations: Vec::new(),
                alternative_suggestions: Vec::new(),
            }
        }
    }

    struct NullSink;

    #[async_trait]
    impl TransparencySink for NullSink {
        async fn record(&self, _entry: civic_types::TransparencyEntry) {}
    }

    #[tokio::test]
    async fn water_agent_runs_end_to_end_without_panicking() {
        let config = GlobalConfig::default();
        let data: Arc<dyn DataSource> = Arc::new(FixtureDataSource::seeded());
        let llm: Arc<dyn LlmAdapter> = Arc::new(StaticAdapter::err("no llm configured in test"));
        let tools = ToolRegistry::for_agent(AgentType::Water).await;
        let agent = build_domain_agent(
            AgentType::Water,
            "water-1",
            &config,
            data,
            llm,
            Arc::new(NeverConflicts),
            Arc::new(NullSink),
            tools,
        );

        let mut request = Request::new("maintenance_request", "routine pipe inspection needed");
        request.context.insert("location".to_string(), serde_json::json!("Downtown"));
        let result = agent.run(request).await;

        assert!(result.response.is_some());
        assert!(result.completed_at.is_some());
    }

    #[tokio::test]
    async fn informational_query_takes_direct_response_path() {
        let config = GlobalConfig::default();
        let data: Arc<dyn DataSource> = Arc::new(FixtureDataSource::seeded());
        let llm: Arc<dyn LlmAdapter> = Arc::new(StaticAdapter::ok("nine supply records on hand"));
        let tools = ToolRegistry::for_agent(AgentType::Health).await;
        let agent = build_domain_agent(
            AgentType::Health,
            "health-1",
            &config,
            data,
            llm,
            Arc::new(NeverConflicts),
            Arc::new(NullSink),
            tools,
        );

        let mut request = Request::new("supply_inquiry", "how many health supplies do we have?");
        request.query_type = Some(civic_types::QueryType::Informational);
        request.context.insert("location".to_string(), serde_json::json!("Downtown"));
        let result = agent.run(request).await;

        let decision = result.response.unwrap();
        assert_eq!(decision["decision"], "inform");
        assert_eq!(result.confidence, Some(0.95));
    }
}
