//! Read-only facade over persisted domain facts. The core crate never
//! talks to storage directly: every Context Loader and Tool goes through
//! a `DataSource`, so the pipeline is testable against an in-memory
//! fixture store without a database.

mod fixtures;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

pub use fixtures::FixtureDataSource;

/// Locations that mean "no filter" rather than a real place name.
pub const UNFILTERED_LOCATIONS: &[&str] = &["general", "all", "any", "city", "citywide"];

pub fn is_unfiltered_location(location: &str) -> bool {
    UNFILTERED_LOCATIONS.contains(&location.to_lowercase().as_str())
}

/// A read-only query against a named fact-set (e.g. `"available_trucks"`,
/// `"health_resources"`). `location` and `recency_days` are optional
/// filters; callers normalise "no filter" sentinels before calling.
#[derive(Debug, Clone, Default)]
pub struct FactQuery {
    pub location: Option<String>,
    pub recency_days: Option<u32>,
    pub status: Option<String>,
}

impl FactQuery {
    pub fn for_location(location: Option<&str>) -> Self {
        let location = location
            .filter(|l| !is_unfiltered_location(l))
            .map(|l| l.to_string());
        FactQuery {
            location,
            recency_days: None,
            status: None,
        }
    }
}

/// The contract every domain agent's Context Loader and Tools query
/// through. Implementations forbid writes — this crate only ever reads.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Returns the named fact-set as a list of record mappings. Unknown
    /// fact names return an empty list rather than erroring, matching the
    /// Context Loader's "never raises" guarantee.
    async fn query(&self, fact_name: &str, query: &FactQuery) -> anyhow::Result<Vec<Value>>;
}

/// Convenience helper mirroring the Context Loader's fallback behaviour:
/// swallow errors, log, and produce an empty list.
pub async fn query_or_empty(
    source: &dyn DataSource,
    fact_name: &str,
    query: &FactQuery,
) -> Vec<Value> {
    match source.query(fact_name, query).await {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(fact_name, %err, "data source query failed, using empty fact set");
            Vec::new()
        }
    }
}

/// Loads several fact-sets for one location into a `context` map, the
/// shape `PipelineState::context` expects from the Context Loader.
pub async fn load_context(
    source: &dyn DataSource,
    location: Option<&str>,
    fact_names: &[&str],
) -> HashMap<String, Vec<Value>> {
    let query = FactQuery::for_location(location);
    let mut context = HashMap::with_capacity(fact_names.len());
    for name in fact_names {
        let rows = query_or_empty(source, name, &query).await;
        context.insert((*name).to_string(), rows);
    }
    context
}
