//! Typed, in-process configuration tree. This crate never opens a file
//! or reads an environment variable itself — callers assemble a
//! `GlobalConfig` from `Default::default()`, a builder, or a merged
//! `serde_json::Value` and hand it to the pipeline/coordination
//! constructors.

use std::collections::HashMap;

use civic_types::Priority;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),
    #[error("missing required configuration field: {0}")]
    MissingField(String),
    #[error("invalid edge label '{label}' declared for node '{node}'")]
    InvalidEdgeLabel { node: String, label: String },
    #[error("configuration value for `{field}` failed to deserialize: {source}")]
    Deserialize {
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub url: Option<String>,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "civic".to_string(),
            user: "civic".to_string(),
            password: String::new(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            provider: "openai-compatible".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_planning_attempts: u32,
    pub confidence_threshold: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            max_planning_attempts: 3,
            confidence_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub complexity_threshold: f64,
    pub confidence_threshold: f64,
    pub auto_approval_cost_limit: f64,
    pub human_response_timeout_seconds: u64,
    pub monsoon_months: Vec<u8>,
    pub priority_levels: HashMap<Priority, u32>,
    pub auto_approve: bool,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        let mut priority_levels = HashMap::new();
        priority_levels.insert(Priority::Routine, 1);
        priority_levels.insert(Priority::Maintenance, 3);
        priority_levels.insert(Priority::Expansion, 5);
        priority_levels.insert(Priority::SafetyCritical, 7);
        priority_levels.insert(Priority::PublicHealth, 8);
        priority_levels.insert(Priority::Emergency, 10);

        CoordinationConfig {
            complexity_threshold: 0.6,
            confidence_threshold: 0.7,
            auto_approval_cost_limit: 5_000_000.0,
            human_response_timeout_seconds: 300,
            monsoon_months: vec![6, 7, 8, 9],
            priority_levels,
            auto_approve: false,
        }
    }
}

impl CoordinationConfig {
    pub fn priority_level(&self, priority: Priority) -> u32 {
        self.priority_levels.get(&priority).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub db: DbConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub coordination: CoordinationConfig,
}

impl GlobalConfig {
    /// Deep-merges `overrides` on top of the current config and returns
    /// the result. Unrecognized keys are silently dropped by
    /// `serde_json::from_value` rather than rejected; per-field
    /// overrides are applied key by key so a caller can set e.g. only
    /// `coordination.auto_approve` without restating the whole tree.
    pub fn merge_value(&self, overrides: Value) -> Result<GlobalConfig, ConfigError> {
        let base = serde_json::to_value(self).expect("GlobalConfig always serializes");
        let merged = deep_merge(base, overrides);
        serde_json::from_value(merged).map_err(|source| ConfigError::Deserialize {
            field: "GlobalConfig".to_string(),
            source,
        })
    }
}

/// Recursively merges `overlay` into `base`: objects merge key by key,
/// any other value type in `overlay` replaces the corresponding value in
/// `base` wholesale.
fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_spec_literal_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.agent.max_planning_attempts, 3);
        assert_eq!(config.agent.confidence_threshold, 0.7);
        assert_eq!(config.coordination.complexity_threshold, 0.6);
        assert_eq!(config.coordination.auto_approval_cost_limit, 5_000_000.0);
        assert_eq!(config.coordination.monsoon_months, vec![6, 7, 8, 9]);
        assert_eq!(config.coordination.priority_level(Priority::Emergency), 10);
        assert_eq!(config.coordination.priority_level(Priority::Routine), 1);
    }

    #[test]
    fn merge_value_overrides_a_single_leaf_without_disturbing_siblings() {
        let config = GlobalConfig::default();
        let merged = config
            .merge_value(json!({"coordination": {"auto_approve": true}}))
            .unwrap();
        assert!(merged.coordination.auto_approve);
        assert_eq!(merged.coordination.complexity_threshold, 0.6);
        assert_eq!(merged.agent.max_planning_attempts, 3);
    }
}
