//! Pipeline runtime, shared node library, per-domain pipeline assembly,
//! configuration, and the inter-agent message bus for the civic
//! coordination engine. Every domain agent (water, engineering, fire,
//! sanitation, health, finance) is one instance of the pipeline graph
//! built in `pipeline::build_domain_agent`.

pub mod bus;
pub mod config;
pub mod nodes;
pub mod pipeline;
pub mod runtime;

pub use bus::MessageBus;
pub use config::{AgentConfig, ConfigError, CoordinationConfig, DbConfig, GlobalConfig, LlmConfig};
pub use pipeline::{build_domain_agent, DomainAgent};
pub use runtime::{Edge, Node, PipelineGraph, PipelineGraphBuilder, END};
