//! Process-wide inter-agent message bus. Unlike a broadcast channel,
//! messages here are addressed to a single recipient and sit pending
//! until that recipient acknowledges them — the contract is a per-agent
//! FIFO mailbox, not fan-out pub/sub.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use civic_types::{InterAgentMessage, MessageStatus};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone)]
pub struct MessageBus {
    mailboxes: Arc<RwLock<HashMap<String, VecDeque<InterAgentMessage>>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        MessageBus {
            mailboxes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn send(&self, message: InterAgentMessage) -> Uuid {
        let id = message.id;
        let mut mailboxes = self.mailboxes.write().await;
        mailboxes
            .entry(message.to_agent.clone())
            .or_default()
            .push_back(message);
        id
    }

    /// All pending (un-acknowledged) messages addressed to `agent_id`, in
    /// arrival order.
    pub async fn messages_for(&self, agent_id: &str) -> Vec<InterAgentMessage> {
        let mailboxes = self.mailboxes.read().await;
        mailboxes
            .get(agent_id)
            .map(|queue| {
                queue
                    .iter()
                    .filter(|m| m.status == MessageStatus::Pending)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Acknowledges a pending message by id, attaching a response. Returns
    /// `false` if no such pending message exists for that agent.
    pub async fn acknowledge(&self, agent_id: &str, message_id: Uuid, response: impl Into<String>) -> bool {
        let mut mailboxes = self.mailboxes.write().await;
        let Some(queue) = mailboxes.get_mut(agent_id) else {
            return false;
        };
        match queue.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.acknowledge(response);
                true
            }
            None => false,
        }
    }

    /// Drops acknowledged messages from `agent_id`'s mailbox, keeping
    /// memory bounded for long-running processes.
    pub async fn sweep_acknowledged(&self, agent_id: &str) {
        let mut mailboxes = self.mailboxes.write().await;
        if let Some(queue) = mailboxes.get_mut(agent_id) {
            queue.retain(|m| m.status != MessageStatus::Acknowledged);
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_types::{Level, MessageType};

    fn msg(from: &str, to: &str) -> InterAgentMessage {
        InterAgentMessage::new(from, to, MessageType::RequestAssistance, Level::Medium, "need backup crew")
    }

    #[tokio::test]
    async fn delivers_in_fifo_order_per_recipient() {
        let bus = MessageBus::new();
        bus.send(msg("fire_dept", "water_dept")).await;
        bus.send(msg("engineering_dept", "water_dept")).await;

        let pending = bus.messages_for("water_dept").await;
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].from_agent, "fire_dept");
        assert_eq!(pending[1].from_agent, "engineering_dept");
    }

    #[tokio::test]
    async fn acknowledged_messages_drop_out_of_pending() {
        let bus = MessageBus::new();
        let id = bus.send(msg("fire_dept", "water_dept")).await;

        assert!(bus.acknowledge("water_dept", id, "on it").await);
        let pending = bus.messages_for("water_dept").await;
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn acknowledge_unknown_id_returns_false() {
        let bus = MessageBus::new();
        bus.send(msg("fire_dept", "water_dept")).await;
        assert!(!bus.acknowledge("water_dept", Uuid::new_v4(), "x").await);
    }
}
