//! Coordinator-side registry that materialises domain agent pipelines on
//! demand and forwards requests to them. Agents are constructed lazily
//! from factory closures the caller supplies at startup — not via
//! reflection over a type registry — and cached per agent type so a
//! second query for the same type reuses the existing instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use civic_core::DomainAgent;
use civic_types::{AgentType, Request};
use tokio::sync::RwLock;

/// RAII depth guard: increments on construction, decrements on drop, so
/// a query that panics or returns early still releases its slot.
struct DepthGuard<'a>(&'a AtomicU32);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Result of one `QueryAgent` call — mirrors the agent pipeline's raw
/// state rather than the wire `AgentResponse`, since the dispatcher sits
/// inside the process and callers (the coordination workflow) want the
/// full `PipelineState` to read additional fields off of.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub success: bool,
    pub agent_type: AgentType,
    pub response: Option<serde_json::Value>,
    pub duration_ms: i64,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

type AgentFactory = Box<dyn Fn() -> Arc<DomainAgent> + Send + Sync>;

/// Registry + lazy-instantiation cache for the six domain agents.
pub struct AgentDispatcher {
    factories: HashMap<AgentType, AgentFactory>,
    cache: RwLock<HashMap<AgentType, Arc<DomainAgent>>>,
    /// Cycle guard: a query already in flight through this dispatcher
    /// bumps this before running the agent; a second, nested query
    /// observed while it's still elevated is refused rather than run.
    depth: AtomicU32,
}

impl AgentDispatcher {
    pub fn new() -> Self {
        AgentDispatcher {
            factories: HashMap::new(),
            cache: RwLock::new(HashMap::new()),
            depth: AtomicU32::new(0),
        }
    }

    pub fn register(mut self, agent_type: AgentType, factory: impl Fn() -> Arc<DomainAgent> + Send + Sync + 'static) -> Self {
        self.factories.insert(agent_type, Box::new(factory));
        self
    }

    async fn agent_for(&self, agent_type: AgentType) -> Option<Arc<DomainAgent>> {
        {
            let cache = self.cache.read().await;
            if let Some(agent) = cache.get(&agent_type) {
                return Some(agent.clone());
            }
        }
        let factory = self.factories.get(&agent_type)?;
        let agent = factory();
        self.cache.write().await.insert(agent_type, agent.clone());
        Some(agent)
    }

    /// Instantiates (or reuses) `agent_type`'s pipeline and runs
    /// `request` through it, timing the call. Refuses to run if a query
    /// through this same dispatcher is already in flight — the
    /// coordinator must not recursively enrich its own enrichment query.
    pub async fn query_agent(&self, agent_type: AgentType, request: Request, reason: &str) -> QueryResult {
        let timestamp = Utc::now();

        if self.depth.fetch_add(1, Ordering::SeqCst) >= 1 {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return QueryResult {
                success: false,
                agent_type,
                response: None,
                duration_ms: 0,
                timestamp,
                error: Some("refused: nested agent dispatch detected".to_string()),
            };
        }
        let _guard = DepthGuard(&self.depth);

        tracing::debug!(agent_type = %agent_type, reason, "dispatching agent query");

        let Some(agent) = self.agent_for(agent_type).await else {
            return QueryResult {
                success: false,
                agent_type,
                response: None,
                duration_ms: 0,
                timestamp,
                error: Some(format!("no factory registered for agent type '{agent_type}'")),
            };
        };

        let started = Utc::now();
        let state = agent.run(request).await;
        let duration_ms = (Utc::now() - started).num_milliseconds();

        QueryResult {
            success: !state.escalate || state.response.is_some(),
            agent_type,
            response: state.response.clone(),
            duration_ms,
            timestamp,
            error: state.escalation_reason.clone(),
        }
    }

    /// Sequential dispatch across several agent types. v1 does not
    /// require fan-out parallelism; agents are stateless across
    /// requests so a future revision MAY parallelise this safely.
    pub async fn query_multiple_agents(
        &self,
        requests: HashMap<AgentType, Request>,
        reason: &str,
    ) -> HashMap<AgentType, QueryResult> {
        let mut results = HashMap::with_capacity(requests.len());
        for (agent_type, request) in requests {
            let result = self.query_agent(agent_type, request, reason).await;
            results.insert(agent_type, result);
        }
        results
    }

    /// Releases cached agent instances. Agents hold no unmanaged
    /// resources in this implementation, so this just drops the cache.
    pub async fn close_all(&self) {
        self.cache.write().await.clear();
    }
}

impl Default for AgentDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use civic_data::FixtureDataSource;
    use civic_llm::StaticAdapter;
    use civic_tools::ToolRegistry;
    use civic_wire::{CheckPlanConflictsResult, ConflictChecker, PlanConflictQuery};

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
    impl civic_core::nodes::TransparencySink for NullSink {
        async fn record(&self, _entry: civic_types::TransparencyEntry) {}
    }

    fn make_dispatcher() -> AgentDispatcher {
        AgentDispatcher::new().register(AgentType::Water, || {
            let config = civic_core::GlobalConfig::default();
            let data: Arc<dyn civic_data::DataSource> = Arc::new(FixtureDataSource::seeded());
            let llm: Arc<dyn civic_llm::LlmAdapter> = Arc::new(StaticAdapter::err("no llm in test"));
            Arc::new(civic_core::build_domain_agent(
                AgentType::Water,
                "water-1",
                &config,
                data,
                llm,
                Arc::new(NeverConflicts),
                Arc::new(NullSink),
                futures::executor::block_on(ToolRegistry::for_agent(AgentType::Water)),
            ))
        })
    }

    #[tokio::test]
    async fn query_agent_instantiates_and_runs() {
        let dispatcher = make_dispatcher();
        let mut request = Request::new("maintenance_request", "routine inspection");
        request.context.insert("location".to_string(), serde_json::json!("Downtown"));
        let result = dispatcher.query_agent(AgentType::Water, request, "test").await;
        assert!(result.response.is_some());
    }

    #[tokio::test]
    async fn query_unregistered_agent_type_reports_error() {
        let dispatcher = AgentDispatcher::new();
        let request = Request::new("maintenance_request", "routine inspection");
        let result = dispatcher.query_agent(AgentType::Fire, request, "test").await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn query_multiple_agents_runs_sequentially() {
        let dispatcher = make_dispatcher();
        let mut requests = HashMap::new();
        let mut request = Request::new("maintenance_request", "routine inspection");
        request.context.insert("location".to_string(), serde_json::json!("Downtown"));
        requests.insert(AgentType::Water, request);

        let results = dispatcher.query_multiple_agents(requests, "enrichment").await;
        assert_eq!(results.len(), 1);
        assert!(results[&AgentType::Water].response.is_some());
    }
}
