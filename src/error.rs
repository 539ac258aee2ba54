//! Error types for graph structure, persistence, execution and host calls.

use thiserror::Error;

use crate::node::NodeId;

/// Structural errors raised by [`Graph`](crate::Graph) queries and authoring
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The graph has no Start node to begin execution from.
    #[error("graph has no entry (Start) node")]
    NoEntryNode,
    /// The graph has more than one Start node; the entry is ambiguous.
    #[error("graph has {0} Start nodes, expected exactly one")]
    MultipleEntryNodes(usize),
    /// A referenced node is not present in the graph.
    #[error("node not found: {0}")]
    UnknownNode(NodeId),
    /// A port id does not exist on the node it was addressed on.
    #[error("node {node} has no {direction} port '{port}'")]
    UnknownPort {
        /// The addressed node.
        node: NodeId,
        /// The missing port id.
        port: crate::port::PortId,
        /// "input" or "output".
        direction: &'static str,
    },
}

/// Errors raised while serializing or reloading a graph asset.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The JSON form could not be produced or parsed.
    #[error("graph serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by host collaborators.
///
/// A host error on a leaf effect is an authoring-environment problem, not an
/// engine failure: the runner logs it and completes the node anyway.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// The host does not know the requested effect.
    #[error("unknown host effect '{0}'")]
    UnknownEffect(String),
    /// The effect was found but failed to run.
    #[error("host effect '{effect}' failed: {message}")]
    EffectFailed {
        /// The effect name.
        effect: String,
        /// Host-provided failure detail.
        message: String,
    },
}

/// Errors raised by the [`Runner`](crate::Runner).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// Structural problem with the graph being run.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// `run` was called while a run is already in flight.
    #[error("runner is already driving a graph")]
    AlreadyRunning,
    /// A control was used outside the Running state.
    #[error("runner is not running")]
    NotRunning,
    /// `step` or `resume` was used outside the Paused state.
    #[error("runner is not paused")]
    NotPaused,
    /// The run was cancelled by `stop()`. Internal signal; `run` reports
    /// this as [`RunOutcome::Stopped`](crate::runner::RunOutcome) instead of
    /// an error.
    #[error("run was stopped")]
    Stopped,
    /// Nested sub-graphs exceeded the configured depth limit.
    #[error("sub-graph nesting depth {depth} exceeds max {max}")]
    NestingLimitExceeded {
        /// The depth that was reached.
        depth: usize,
        /// The configured maximum.
        max: usize,
    },
}
