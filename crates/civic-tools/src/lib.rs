//! Per-agent tool registry. Tools wrap `civic_data::DataSource` queries
//! into named, parameterised capabilities the planner can reference by
//! name and the Tool Executor invokes by name. Tools never raise: any
//! failure is folded into the returned JSON as `{"error": "..."}"`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use civic_data::{DataSource, FactQuery};
use civic_types::AgentType;
use serde_json::{json, Value};
use tokio::sync::RwLock;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn call(&self, data: &dyn DataSource, params: &Value) -> Value;
}

fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn param_f64(params: &Value, key: &str) -> Option<f64> {
    params.get(key).and_then(|v| v.as_f64())
}

/// Checks whether enough workers are free at a location to staff a job.
pub struct CheckWorkerAvailabilityTool;

#[async_trait]
impl Tool for CheckWorkerAvailabilityTool {
    fn name(&self) -> &'static str {
        "check_worker_availability"
    }

    async fn call(&self, data: &dyn DataSource, params: &Value) -> Value {
        let location = param_str(params, "location");
        let required = param_f64(params, "required_workers").unwrap_or(0.0) as i64;
        let query = FactQuery::for_location(location);
        match data.query("available_workers", &query).await {
            Ok(rows) => {
                let available = rows.len() as i64;
                json!({
                    "available": available,
                    "required": required,
                    "sufficient": available >= required,
                })
            }
            Err(err) => json!({ "error": err.to_string() }),
        }
    }
}

/// Checks remaining budget at a location against an estimated cost.
pub struct CheckBudgetTool;

#[async_trait]
impl Tool for CheckBudgetTool {
    fn name(&self) -> &'static str {
        "check_budget"
    }

    async fn call(&self, data: &dyn DataSource, params: &Value) -> Value {
        let location = param_str(params, "location");
        let estimated_cost = param_f64(params, "estimated_cost").unwrap_or(0.0);
        let query = FactQuery::for_location(location);
        match data.query("budgets", &query).await {
            Ok(rows) => {
                let remaining = rows
                    .first()
                    .and_then(|b| b.get("remaining"))
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                let allocated = rows
                    .first()
                    .and_then(|b| b.get("allocated"))
                    .and_then(|v| v.as_f64())
                    .unwrap_or(remaining.max(1.0));
                let utilisation = if allocated > 0.0 {
                    1.0 - (remaining / allocated)
                } else {
                    0.0
                };
                json!({
                    "remaining": remaining,
                    "estimated_cost": estimated_cost,
                    "sufficient": remaining >= estimated_cost,
                    "utilisation_percent": (utilisation * 100.0).round(),
                })
            }
            Err(err) => json!({ "error": err.to_string() }),
        }
    }
}

/// Looks for overlapping schedule entries at a location.
pub struct CheckScheduleConflictsTool;

#[async_trait]
impl Tool for CheckScheduleConflictsTool {
    fn name(&self) -> &'static str {
        "check_schedule_conflicts"
    }

    async fn call(&self, data: &dyn DataSource, params: &Value) -> Value {
        let location = param_str(params, "location");
        let query = FactQuery::for_location(location);
        match data.query("schedule_conflicts", &query).await {
            Ok(rows) => json!({
                "conflict_count": rows.len(),
                "has_conflict": !rows.is_empty(),
                "conflicts": rows,
            }),
            Err(err) => json!({ "error": err.to_string() }),
        }
    }
}

/// Sanitation-specific: counts bins near capacity at a location.
pub struct CheckBinCapacityTool;

#[async_trait]
impl Tool for CheckBinCapacityTool {
    fn name(&self) -> &'static str {
        "check_bin_capacity"
    }

    async fn call(&self, data: &dyn DataSource, params: &Value) -> Value {
        let location = param_str(params, "location");
        let threshold = param_f64(params, "fill_threshold").unwrap_or(95.0);
        let query = FactQuery::for_location(location);
        match data.query("sanitation_bins", &query).await {
            Ok(rows) => {
                let overflowing = rows
                    .iter()
                    .filter(|b| {
                        b.get("fill_percent")
                            .and_then(|v| v.as_f64())
                            .map(|f| f >= threshold)
                            .unwrap_or(false)
                    })
                    .count();
                json!({
                    "total_bins": rows.len(),
                    "overflowing_bins": overflowing,
                    "fill_threshold": threshold,
                })
            }
            Err(err) => json!({ "error": err.to_string() }),
        }
    }
}

/// Health-specific: reports medical supply counts at a location.
pub struct ReportHealthSuppliesTool;

#[async_trait]
impl Tool for ReportHealthSuppliesTool {
    fn name(&self) -> &'static str {
        "report_health_supplies"
    }

    async fn call(&self, data: &dyn DataSource, params: &Value) -> Value {
        let location = param_str(params, "location");
        let query = FactQuery::for_location(location);
        match data.query("health_resources", &query).await {
            Ok(rows) => json!({
                "supplies": rows,
                "count": rows.len(),
            }),
            Err(err) => json!({ "error": err.to_string() }),
        }
    }
}

/// Water-specific: reports the worst pipeline segment condition and the
/// total count of segments under a critical issue at a location.
pub struct CheckPipelineConditionTool;

const CONDITION_SEVERITY: &[&str] = &["good", "fair", "poor", "critical"];

#[async_trait]
impl Tool for CheckPipelineConditionTool {
    fn name(&self) -> &'static str {
        "check_pipeline_condition"
    }

    async fn call(&self, data: &dyn DataSource, params: &Value) -> Value {
        let location = param_str(params, "location");
        let query = FactQuery::for_location(location);
        match data.query("pipeline_segments", &query).await {
            Ok(rows) => {
                let worst = rows
                    .iter()
                    .filter_map(|r| r.get("condition").and_then(|v| v.as_str()))
                    .max_by_key(|c| CONDITION_SEVERITY.iter().position(|s| s == c).unwrap_or(0))
                    .unwrap_or("good")
                    .to_string();
                let critical_issues: i64 = rows
                    .iter()
                    .filter_map(|r| r.get("critical_issues").and_then(|v| v.as_i64()))
                    .sum();
                json!({
                    "segments": rows.len(),
                    "condition": worst,
                    "critical_issues": critical_issues,
                })
            }
            Err(err) => json!({ "error": err.to_string() }),
        }
    }
}

/// Reports the risk level on file for a location, as assessed by zone
/// hazard surveys (flood plain, landslide, seismic, etc).
pub struct CheckZoneRiskTool;

#[async_trait]
impl Tool for CheckZoneRiskTool {
    fn name(&self) -> &'static str {
        "check_zone_risk"
    }

    async fn call(&self, data: &dyn DataSource, params: &Value) -> Value {
        let location = param_str(params, "location");
        let query = FactQuery::for_location(location);
        match data.query("zone_risk_levels", &query).await {
            Ok(rows) => {
                let risk_level = rows
                    .first()
                    .and_then(|r| r.get("risk_level"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("low")
                    .to_string();
                json!({ "risk_level": risk_level })
            }
            Err(err) => json!({ "error": err.to_string() }),
        }
    }
}

/// Generic per-location headcount/condition tool shared by several
/// domains (active incidents, open inspections, live projects).
pub struct CountRecordsTool {
    tool_name: &'static str,
    fact_name: &'static str,
}

impl CountRecordsTool {
    pub fn new(tool_name: &'static str, fact_name: &'static str) -> Self {
        CountRecordsTool {
            tool_name,
            fact_name,
        }
    }
}

#[async_trait]
impl Tool for CountRecordsTool {
    fn name(&self) -> &'static str {
        self.tool_name
    }

    async fn call(&self, data: &dyn DataSource, params: &Value) -> Value {
        let location = param_str(params, "location");
        let query = FactQuery::for_location(location);
        match data.query(self.fact_name, &query).await {
            Ok(rows) => json!({ "count": rows.len(), "records": rows }),
            Err(err) => json!({ "error": err.to_string() }),
        }
    }
}

#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        ToolRegistry {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().await.insert(tool.name().to_string(), tool);
    }

    /// Tools shared by every department: worker availability, budget, and
    /// schedule conflicts all read generically named fact-sets.
    pub async fn shared() -> Self {
        let registry = ToolRegistry::empty();
        registry.register(Arc::new(CheckWorkerAvailabilityTool)).await;
        registry.register(Arc::new(CheckBudgetTool)).await;
        registry.register(Arc::new(CheckScheduleConflictsTool)).await;
        registry
    }

    /// Builds the registry for one department, adding its own tools on
    /// top of the shared pool.
    pub async fn for_agent(agent_type: AgentType) -> Self {
        let registry = ToolRegistry::shared().await;
        match agent_type {
            AgentType::Sanitation => {
                registry.register(Arc::new(CheckBinCapacityTool)).await;
                registry
                    .register(Arc::new(CountRecordsTool::new(
                        "check_collection_routes",
                        "collection_routes",
                    )))
                    .await;
            }
            AgentType::Health => {
                registry.register(Arc::new(ReportHealthSuppliesTool)).await;
                registry
                    .register(Arc::new(CountRecordsTool::new(
                        "check_disease_incidents",
                        "disease_incidents",
                    )))
                    .await;
            }
            AgentType::Water => {
                registry.register(Arc::new(CheckPipelineConditionTool)).await;
                registry.register(Arc::new(CheckZoneRiskTool)).await;
            }
            AgentType::Engineering => {
                registry
                    .register(Arc::new(CountRecordsTool::new(
                        "check_active_projects",
                        "active_projects",
                    )))
                    .await;
            }
            AgentType::Fire => {
                registry
                    .register(Arc::new(CountRecordsTool::new(
                        "check_incident_history",
                        "fire_incidents",
                    )))
                    .await;
            }
            AgentType::Finance => {
                registry
                    .register(Arc::new(CountRecordsTool::new(
                        "check_pending_invoices",
                        "pending_invoices",
                    )))
                    .await;
            }
        }
        registry
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Calls a tool by name. Unknown names return a structural error
    /// rather than panicking — the Tool Executor records it inline and
    /// continues with the remaining plan steps.
    pub async fn call(&self, name: &str, data: &dyn DataSource, params: &Value) -> Value {
        let tools = self.tools.read().await;
        match tools.get(name) {
            Some(tool) => tool.call(data, params).await,
            None => json!({ "error": format!("unknown tool: {name}") }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_data::FixtureDataSource;

    #[tokio::test]
    async fn check_worker_availability_reports_sufficiency() {
        let data = FixtureDataSource::seeded();
        let registry = ToolRegistry::for_agent(AgentType::Water).await;
        let result = registry
            .call(
                "check_worker_availability",
                &data,
                &json!({"location": "Downtown", "required_workers": 5}),
            )
            .await;
        assert_eq!(result["available"], 10);
        assert_eq!(result["sufficient"], true);
    }

    #[tokio::test]
    async fn unknown_tool_returns_structural_error() {
        let data = FixtureDataSource::seeded();
        let registry = ToolRegistry::for_agent(AgentType::Water).await;
        let result = registry.call("does_not_exist", &data, &json!({})).await;
        assert!(result.get("error").is_some());
    }

    #[tokio::test]
    async fn bin_capacity_tool_counts_overflow() {
        let data = FixtureDataSource::seeded();
        let registry = ToolRegistry::for_agent(AgentType::Sanitation).await;
        let result = registry
            .call("check_bin_capacity", &data, &json!({"location": "Downtown"}))
            .await;
        assert_eq!(result["overflowing_bins"], 6);
    }

    #[tokio::test]
    async fn pipeline_condition_tool_reports_seeded_good_condition() {
        let data = FixtureDataSource::seeded();
        let registry = ToolRegistry::for_agent(AgentType::Water).await;
        let result = registry
            .call("check_pipeline_condition", &data, &json!({"location": "Downtown"}))
            .await;
        assert_eq!(result["condition"], "fair");
        assert_eq!(result["critical_issues"], 0);
    }

    #[tokio::test]
    async fn pipeline_condition_tool_surfaces_worst_segment() {
        let data = FixtureDataSource::new().with_fact(
            "pipeline_segments",
            vec![
                json!({"segment_id": 1, "location": "Uptown", "condition": "fair", "critical_issues": 0}),
                json!({"segment_id": 2, "location": "Uptown", "condition": "critical", "critical_issues": 2}),
            ],
        );
        let registry = ToolRegistry::for_agent(AgentType::Water).await;
        let result = registry
            .call("check_pipeline_condition", &data, &json!({"location": "Uptown"}))
            .await;
        assert_eq!(result["condition"], "critical");
        assert_eq!(result["critical_issues"], 2);
    }

    #[tokio::test]
    async fn zone_risk_tool_reports_seeded_low_risk() {
        let data = FixtureDataSource::seeded();
        let registry = ToolRegistry::for_agent(AgentType::Water).await;
        let result = registry
            .call("check_zone_risk", &data, &json!({"location": "Downtown"}))
            .await;
        assert_eq!(result["risk_level"], "low");
    }
}
