use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{DataSource, FactQuery};

/// In-memory, fact-name-keyed record store. Used both in tests and as the
/// default data source when no persisted store is wired up — seeded with
/// a small representative dataset per domain so the pipeline's context
/// loaders and tools have something real to read.
pub struct FixtureDataSource {
    facts: RwLock<HashMap<String, Vec<Value>>>,
}

impl FixtureDataSource {
    pub fn new() -> Self {
        FixtureDataSource {
            facts: RwLock::new(HashMap::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new()
    }

    pub fn with_fact(self, name: impl Into<String>, rows: Vec<Value>) -> Self {
        self.facts.write().unwrap().insert(name.into(), rows);
        self
    }

    pub fn set_fact(&self, name: impl Into<String>, rows: Vec<Value>) {
        self.facts.write().unwrap().insert(name.into(), rows);
    }

    /// A dataset covering the six end-to-end scenarios: nine health
    /// supplies records, ten available water workers with budget
    /// remaining 300000, six overflowing sanitation bins, three pipeline
    /// segments in good/fair condition, a low zone risk level, and two
    /// active engineering projects (under the cap of three).
    pub fn seeded() -> Self {
        let mut facts = HashMap::new();

        facts.insert(
            "health_resources".to_string(),
            (1..=9)
                .map(|i| {
                    json!({
                        "resource_id": i,
                        "resource_type": if i % 2 == 0 { "vaccines" } else { "first_aid_kits" },
                        "quantity": 40 + i * 3,
                        "location": "Downtown",
                        "status": "available",
                    })
                })
                .collect(),
        );

        facts.insert(
            "available_workers".to_string(),
            (1..=10)
                .map(|i| {
                    json!({
                        "worker_id": i,
                        "location": "Downtown",
                        "status": "available",
                    })
                })
                .collect(),
        );

        facts.insert(
            "budgets".to_string(),
            vec![json!({
                "location": "Downtown",
                "remaining": 300_000,
                "allocated": 500_000,
            })],
        );

        facts.insert(
            "sanitation_bins".to_string(),
            (1..=6)
                .map(|i| {
                    json!({
                        "bin_id": i,
                        "location": "Downtown",
                        "fill_percent": 95 + (i % 5),
                    })
                })
                .collect(),
        );

        facts.insert(
            "schedule_conflicts".to_string(),
            Vec::new(),
        );

        facts.insert(
            "pipeline_segments".to_string(),
            vec![
                json!({"segment_id": 1, "location": "Downtown", "condition": "good", "critical_issues": 0}),
                json!({"segment_id": 2, "location": "Downtown", "condition": "fair", "critical_issues": 0}),
                json!({"segment_id": 3, "location": "Downtown", "condition": "good", "critical_issues": 0}),
            ],
        );

        facts.insert(
            "zone_risk_levels".to_string(),
            vec![json!({"location": "Downtown", "risk_level": "low"})],
        );

        facts.insert(
            "active_projects".to_string(),
            (1..=2)
                .map(|i| json!({"project_id": i, "location": "Downtown", "status": "active"}))
                .collect(),
        );

        FixtureDataSource {
            facts: RwLock::new(facts),
        }
    }
}

impl Default for FixtureDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for FixtureDataSource {
    async fn query(&self, fact_name: &str, query: &FactQuery) -> anyhow::Result<Vec<Value>> {
        let facts = self.facts.read().unwrap();
        let Some(rows) = facts.get(fact_name) else {
            return Ok(Vec::new());
        };

        let filtered = rows
            .iter()
            .filter(|row| match &query.location {
                Some(loc) => row
                    .get("location")
                    .and_then(|v| v.as_str())
                    .map(|l| l.eq_ignore_ascii_case(loc))
                    .unwrap_or(true),
                None => true,
            })
            .filter(|row| match &query.status {
                Some(status) => row
                    .get("status")
                    .and_then(|v| v.as_str())
                    .map(|s| s.eq_ignore_ascii_case(status))
                    .unwrap_or(true),
                None => true,
            })
            .cloned()
            .collect();

        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_health_resources_has_nine_records() {
        let source = FixtureDataSource::seeded();
        let rows = source
            .query("health_resources", &FactQuery::for_location(Some("Downtown")))
            .await
            .unwrap();
        assert_eq!(rows.len(), 9);
    }

    #[tokio::test]
    async fn unknown_fact_name_returns_empty() {
        let source = FixtureDataSource::seeded();
        let rows = source
            .query("nonexistent_fact", &FactQuery::default())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn location_filter_excludes_other_locations() {
        let source = FixtureDataSource::new().with_fact(
            "available_workers",
            vec![
                json!({"worker_id": 1, "location": "Downtown"}),
                json!({"worker_id": 2, "location": "Zone-A"}),
            ],
        );
        let rows = source
            .query("available_workers", &FactQuery::for_location(Some("Zone-A")))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
