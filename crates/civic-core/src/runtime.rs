//! The pipeline runtime: a small directed-graph executor. Vertices are
//! named nodes; edges are either unconditional or guarded by a predicate
//! over the current state. Execution is single-threaded per request —
//! no two nodes of the same pipeline run concurrently — but each node
//! hop runs inside its own tokio task so a panicking node can never take
//! down a batch of concurrently-running pipelines with it.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use civic_types::PipelineState;
use futures::FutureExt;

pub const END: &str = "END";

/// Defensive cap on total node hops per execution. Not part of the
/// contract — a backstop against a misconfigured graph with a predicate
/// that never reaches `END`, so one bad wiring can't hang a request
/// forever.
const MAX_NODE_VISITS: u32 = 64;

#[async_trait]
pub trait Node: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Mutates `state` in place. Returning `Err` is the node's way of
    /// reporting an internal failure (an adapter call that had no usable
    /// fallback); the runtime converts it into `state.escalate = true`
    /// with a reason naming the node.
    async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub enum Edge {
    Direct(String),
    /// `predicate(state)` returns a label; `labels` maps that label to
    /// the next vertex. An unknown label is a fatal configuration error
    /// and panics rather than producing a degraded pipeline state.
    Conditional {
        predicate: Arc<dyn Fn(&PipelineState) -> String + Send + Sync>,
        labels: HashMap<String, String>,
    },
}

impl Edge {
    pub fn conditional<F>(predicate: F, labels: impl IntoIterator<Item = (&'static str, &'static str)>) -> Edge
    where
        F: Fn(&PipelineState) -> String + Send + Sync + 'static,
    {
        Edge::Conditional {
            predicate: Arc::new(predicate),
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

pub struct PipelineGraph {
    start: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Edge>,
    /// When a loop edge would re-enter an already-visited vertex and
    /// `state.attempts >= state.max_attempts`, the runtime redirects here
    /// instead of looping again.
    fallback_on_max_attempts: Option<String>,
}

pub struct PipelineGraphBuilder {
    start: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Edge>,
    fallback_on_max_attempts: Option<String>,
}

impl PipelineGraphBuilder {
    pub fn new(start: impl Into<String>) -> Self {
        PipelineGraphBuilder {
            start: start.into(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            fallback_on_max_attempts: None,
        }
    }

    pub fn node(mut self, name: &'static str, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(name.to_string(), node);
        self
    }

    pub fn edge(mut self, from: &'static str, to: Edge) -> Self {
        self.edges.insert(from.to_string(), to);
        self
    }

    pub fn fallback_on_max_attempts(mut self, node_name: &'static str) -> Self {
        self.fallback_on_max_attempts = Some(node_name.to_string());
        self
    }

    pub fn build(self) -> PipelineGraph {
        PipelineGraph {
            start: self.start,
            nodes: self.nodes,
            edges: self.edges,
            fallback_on_max_attempts: self.fallback_on_max_attempts,
        }
    }
}

/// Runs `graph` from its declared start vertex to `END`, returning the
/// final state. Never panics: a panicking node is caught at its task
/// boundary and converted into an escalation against the state as it
/// stood immediately before that node ran.
pub async fn execute(graph: &PipelineGraph, initial: PipelineState) -> PipelineState {
    let mut state = initial;
    let mut current = graph.start.clone();
    let mut visited: HashSet<String> = HashSet::new();
    let mut hops: u32 = 0;

    loop {
        if current == END {
            break;
        }
        hops += 1;
        if hops > MAX_NODE_VISITS {
            state.set_escalate("runtime: exceeded maximum node visits, possible graph misconfiguration");
            break;
        }

        let Some(node) = graph.nodes.get(&current).cloned() else {
            state.set_escalate(format!("configuration error: unknown node '{current}'"));
            break;
        };

        state = run_node_guarded(node.clone(), state).await;

        current = match graph.edges.get(&current) {
            None => END.to_string(),
            Some(Edge::Direct(next)) => next.clone(),
            Some(Edge::Conditional { predicate, labels }) => {
                let label = predicate(&state);
                match labels.get(&label) {
                    Some(next) => next.clone(),
                    None => panic!(
                        "configuration error: node '{}' produced undeclared edge label '{label}'",
                        node.name()
                    ),
                }
            }
        };

        if visited.contains(&current) && state.attempts >= state.max_attempts {
            if let Some(fallback) = &graph.fallback_on_max_attempts {
                current = fallback.clone();
            }
        }
        visited.insert(current.clone());
    }

    state
}

async fn run_node_guarded(node: Arc<dyn Node>, state: PipelineState) -> PipelineState {
    let backup = state.clone();
    let node_name = node.name();

    let handle = tokio::spawn(async move {
        let mut s = state;
        let result = AssertUnwindSafe(node.run(&mut s)).catch_unwind().await;
        (s, result)
    });

    match handle.await {
        Ok((s, Ok(Ok(())))) => s,
        Ok((mut s, Ok(Err(err)))) => {
            s.set_escalate(format!("{node_name}: {err}"));
            s
        }
        Ok((_, Err(_panic))) => {
            let mut s = backup;
            s.set_escalate(format!("{node_name}: panicked"));
            s
        }
        Err(_join_err) => {
            let mut s = backup;
            s.set_escalate(format!("{node_name}: task join failed"));
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_types::Request;

    struct IncrementNode;

    #[async_trait]
    impl Node for IncrementNode {
        fn name(&self) -> &'static str {
            "increment"
        }

        async fn run(&self, state: &mut PipelineState) -> anyhow::Result<()> {
            state.attempts += 1;
            Ok(())
        }
    }

    struct FailingNode;

    #[async_trait]
    impl Node for FailingNode {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(&self, _state: &mut PipelineState) -> anyhow::Result<()> {
            anyhow::bail!("adapter unavailable")
        }
    }

    fn base_state() -> PipelineState {
        PipelineState::new(Request::new("test", "a test request"), "test-1.0", 3)
    }

    #[tokio::test]
    async fn straight_line_graph_runs_to_end() {
        let graph = PipelineGraphBuilder::new("increment")
            .node("increment", Arc::new(IncrementNode))
            .edge("increment", Edge::Direct(END.to_string()))
            .build();
        let result = execute(&graph, base_state()).await;
        assert_eq!(result.attempts, 1);
        assert!(!result.escalate);
    }

    #[tokio::test]
    async fn node_error_sets_escalate_with_node_name() {
        let graph = PipelineGraphBuilder::new("failing")
            .node("failing", Arc::new(FailingNode))
            .edge("failing", Edge::Direct(END.to_string()))
            .build();
        let result = execute(&graph, base_state()).await;
        assert!(result.escalate);
        assert!(result.escalation_reason.unwrap().starts_with("failing:"));
    }

    #[tokio::test]
    async fn conditional_edge_routes_on_label() {
        let graph = PipelineGraphBuilder::new("increment")
            .node("increment", Arc::new(IncrementNode))
            .edge(
                "increment",
                Edge::conditional(
                    |s: &PipelineState| if s.attempts > 0 { "done".to_string() } else { "retry".to_string() },
                    [("done", END), ("retry", "increment")],
                ),
            )
            .build();
        let result = execute(&graph, base_state()).await;
        assert_eq!(result.attempts, 1);
    }
}
