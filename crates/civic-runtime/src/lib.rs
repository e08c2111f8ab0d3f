//! Top-level facade: wires the six domain agents, the coordination
//! workflow, the agent dispatcher, the transparency log and the
//! message bus into one running system. No CLI or HTTP surface lives
//! here — callers (a binary, a test harness) drive `System` directly.

mod sink;

use std::path::Path;
use std::sync::Arc;

use civic_core::GlobalConfig;
use civic_coordination::{AutoApproveSource, CoordinationWorkflow, InteractiveApprovalSource, LiveConflictChecker};
use civic_data::DataSource;
use civic_dispatcher::AgentDispatcher;
use civic_llm::{LlmAdapter, OpenAiCompatibleAdapter};
use civic_observability::{LoggingInitInfo, ProcessKind};
use civic_tools::ToolRegistry;
use civic_transparency::TransparencyLog;
use civic_types::{AgentDecision, AgentType, Request};
use civic_wire::{AgentResponse, CoordinateResolutionMethod, CoordinateResult};
use tracing_appender::non_blocking::WorkerGuard;

pub use sink::TransparencySinkAdapter;

fn default_transparency_path(config: &GlobalConfig) -> String {
    config.db.url.clone().unwrap_or_else(|| "data/transparency.sqlite3".to_string())
}

fn build_llm_adapter(config: &GlobalConfig) -> Arc<dyn LlmAdapter> {
    Arc::new(OpenAiCompatibleAdapter::new(config.llm.base_url.clone(), config.llm.api_key.clone(), config.llm.model.clone()))
}

/// Running instance of the whole coordination engine, built from one
/// `GlobalConfig` and one shared `DataSource`. Owns the logging
/// worker guard so log writes flush on drop.
pub struct System {
    pub config: GlobalConfig,
    pub dispatcher: Arc<AgentDispatcher>,
    pub coordination: Arc<CoordinationWorkflow>,
    pub transparency: Arc<TransparencyLog>,
    pub bus: Arc<civic_core::MessageBus>,
    _logging_guard: Option<WorkerGuard>,
}

impl System {
    /// Boots the full system: initialises process logging, opens the
    /// transparency log, and registers all six domain agents behind
    /// the dispatcher, each sharing one `LiveConflictChecker` and one
    /// transparency sink.
    pub async fn bootstrap(config: GlobalConfig, data: Arc<dyn DataSource>, logs_dir: &Path) -> anyhow::Result<(Self, LoggingInitInfo)> {
        let (guard, logging_info) = civic_observability::init_process_logging(ProcessKind::AgentPipeline, logs_dir, 14)?;

        let transparency = if default_transparency_path(&config) == ":memory:" {
            Arc::new(TransparencyLog::open_in_memory().await?)
        } else {
            Arc::new(TransparencyLog::open(Path::new(&default_transparency_path(&config))).await?)
        };

        let llm = build_llm_adapter(&config);
        let conflict_checker: Arc<dyn civic_wire::ConflictChecker> = Arc::new(LiveConflictChecker::new(config.coordination.clone()));
        let sink: Arc<dyn civic_core::nodes::TransparencySink> = Arc::new(TransparencySinkAdapter::new(transparency.clone()));

        let mut dispatcher = AgentDispatcher::new();
        for agent_type in AgentType::all() {
            let config = config.clone();
            let data = data.clone();
            let llm = llm.clone();
            let conflict_checker = conflict_checker.clone();
            let sink = sink.clone();
            dispatcher = dispatcher.register(agent_type, move || {
                let tools = futures::executor::block_on(ToolRegistry::for_agent(agent_type));
                Arc::new(civic_core::build_domain_agent(
                    agent_type,
                    format!("{agent_type}-1"),
                    &config,
                    data.clone(),
                    llm.clone(),
                    conflict_checker.clone(),
                    sink.clone(),
                    tools,
                ))
            });
        }

        let approval: Arc<dyn civic_coordination::ApprovalSource> = if config.coordination.auto_approve {
            Arc::new(AutoApproveSource)
        } else {
            Arc::new(InteractiveApprovalSource)
        };

        let coordination = Arc::new(CoordinationWorkflow::new(config.coordination.clone(), llm.clone(), approval, transparency.clone()));

        let system = System {
            config,
            dispatcher: Arc::new(dispatcher),
            coordination,
            transparency,
            bus: Arc::new(civic_core::MessageBus::new()),
            _logging_guard: Some(guard),
        };

        Ok((system, logging_info))
    }

    /// Runs `request` through the named domain agent's pipeline and
    /// translates its `PipelineState` into the external `AgentResponse`
    /// shape.
    pub async fn handle_request(&self, agent_type: AgentType, request: Request) -> AgentResponse {
        let result = self.dispatcher.query_agent(agent_type, request, "direct_request").await;

        let Some(response) = result.response else {
            return AgentResponse::error(result.error.unwrap_or_else(|| "agent produced no response".to_string()));
        };

        let decision = response.get("decision").and_then(|d| d.as_str()).unwrap_or("error");
        let decision_kind: civic_types::DecisionKind = serde_json::from_value(serde_json::Value::String(decision.to_string()))
            .unwrap_or(civic_types::DecisionKind::Error);

        AgentResponse {
            decision: decision_kind,
            reason: response.get("reason").and_then(|r| r.as_str()).unwrap_or_default().to_string(),
            requires_human_review: response.get("requires_human_review").and_then(|v| v.as_bool()).unwrap_or(false),
            confidence: response.get("confidence").and_then(|c| c.as_f64()).unwrap_or(0.0),
            recommendation: response.get("recommendation").and_then(|r| serde_json::from_value(r.clone()).ok()),
            data: response.get("data").cloned(),
            details: serde_json::from_value(response.get("details").cloned().unwrap_or_default()).unwrap_or_default(),
            execution_time_ms: result.duration_ms,
        }
    }

    /// Runs a batch of agent decisions through the coordination
    /// workflow and translates its `CoordinationState` into the
    /// external `CoordinateResult` shape.
    pub async fn coordinate(&self, agent_decisions: Vec<AgentDecision>) -> CoordinateResult {
        let coordination_id = format!("coord-{}", uuid::Uuid::new_v4());
        let state = self.coordination.run(agent_decisions, coordination_id.clone()).await;

        CoordinateResult {
            coordination_id,
            decision: state.final_decision.unwrap_or_else(|| "unknown".to_string()),
            rationale: state.decision_rationale.unwrap_or_default(),
            execution_plan: state.execution_plan.unwrap_or(serde_json::Value::Null),
            conflicts_detected: state.conflicts_detected.len(),
            resolution_method: state
                .resolution_method
                .map(CoordinateResolutionMethod::from)
                .unwrap_or(CoordinateResolutionMethod::None),
            requires_human: state.requires_human,
            processing_time: state.total_processing_time.unwrap_or(0.0),
            workflow_log: state.workflow_log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_data::FixtureDataSource;

    #[tokio::test]
    async fn bootstrap_and_handle_a_routine_water_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GlobalConfig::default();
        config.db.url = Some(":memory:".to_string());
        let data: Arc<dyn DataSource> = Arc::new(FixtureDataSource::seeded());

        let (system, _info) = System::bootstrap(config, data, dir.path()).await.unwrap();

        let mut request = Request::new("maintenance_request", "routine pipe inspection");
        request.context.insert("location".to_string(), serde_json::json!("Downtown"));
        let response = system.handle_request(AgentType::Water, request).await;

        assert_ne!(response.reason, "");
    }

    #[tokio::test]
    async fn coordinate_with_no_decisions_approves_trivially() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GlobalConfig::default();
        config.db.url = Some(":memory:".to_string());
        let data: Arc<dyn DataSource> = Arc::new(FixtureDataSource::seeded());

        let (system, _info) = System::bootstrap(config, data, dir.path()).await.unwrap();
        let result = system.coordinate(Vec::new()).await;
        assert_eq!(result.decision, "approved");
        assert_eq!(result.conflicts_detected, 0);
    }
}
