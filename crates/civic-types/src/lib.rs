mod agent_decision;
mod coordination;
mod enums;
mod message;
mod request;
mod state;
mod transparency;

pub use agent_decision::AgentDecision;
pub use coordination::{Conflict, CoordinationState, DecisionOption, HumanEscalation, Resolution};
pub use enums::{
    AgentType, ConflictType, DecisionKind, EscalationStatus, Level, MessageStatus, MessageType,
    Priority, QueryType, ResolutionDecision, ResolutionMethod,
};
pub use message::InterAgentMessage;
pub use request::Request;
pub use state::{ConfidenceFactors, Plan, PipelineState, ToolInvocation};
pub use transparency::TransparencyEntry;
