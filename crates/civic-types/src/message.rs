use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::enums::{Level, MessageStatus, MessageType};

/// An ad-hoc message routed through the message bus between two agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterAgentMessage {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub from_agent: String,
    pub to_agent: String,
    pub message_type: MessageType,
    pub priority: Level,
    pub content: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_pending")]
    pub status: MessageStatus,
    #[serde(default)]
    pub response: Option<String>,
}

fn default_pending() -> MessageStatus {
    MessageStatus::Pending
}

impl InterAgentMessage {
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        message_type: MessageType,
        priority: Level,
        content: impl Into<String>,
    ) -> Self {
        InterAgentMessage {
            id: Uuid::new_v4(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            message_type,
            priority,
            content: content.into(),
            context: Value::Null,
            timestamp: Utc::now(),
            status: MessageStatus::Pending,
            response: None,
        }
    }

    pub fn acknowledge(&mut self, response: impl Into<String>) {
        self.status = MessageStatus::Acknowledged;
        self.response = Some(response.into());
    }
}
