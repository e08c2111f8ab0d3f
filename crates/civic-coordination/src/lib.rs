//! Coordination workflow: detects conflicts between domain agents'
//! decisions, resolves them with rules or an LLM negotiator, escalates
//! to a human when required, and finalizes the outcome. Also exposes
//! `LiveConflictChecker`, the lightweight in-pipeline checkpoint each
//! domain agent's pipeline calls before committing to a plan.

pub mod checker;
pub mod detector;
pub mod finalizer;
pub mod human;
pub mod negotiator;
pub mod router;
pub mod rules;
pub mod workflow;

pub use checker::LiveConflictChecker;
pub use human::{ApprovalSource, AutoApproveSource, HumanDecision, InteractiveApprovalSource};
pub use router::Route;
pub use workflow::CoordinationWorkflow;
