use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::enums::QueryType;

/// A citizen or department request handed to a single domain agent's
/// pipeline. `context` is a free-form bag for request-type-specific
/// fields (location, resource counts, budget figures) that the shared
/// node library and domain tools read out by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "Uuid::new_v4")]
    pub request_id: Uuid,
    pub request_type: String,
    pub description: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub query_type: Option<QueryType>,
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

impl Request {
    pub fn new(request_type: impl Into<String>, description: impl Into<String>) -> Self {
        Request {
            request_id: Uuid::new_v4(),
            request_type: request_type.into(),
            description: description.into(),
            context: HashMap::new(),
            query_type: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn is_emergency(&self) -> bool {
        self.request_type == "emergency_response" || self.description.to_lowercase().contains("emergency")
    }

    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(|v| v.as_str())
    }

    pub fn context_f64(&self, key: &str) -> Option<f64> {
        self.context.get(key).and_then(|v| v.as_f64())
    }
}
