//! Graph-based authoring and execution of branching interactive sequences.
//!
//! `choreo` models a scripted sequence — a tutorial, a cutscene, a staged
//! encounter — as a directed graph of typed nodes. A [`Graph`] is a passive,
//! serializable asset built from nodes, port-addressed connections and
//! variable declarations; a [`Runner`] executes it asynchronously with
//! pause, resume, single-step and breakpoints, reporting progress to
//! registered observers.
//!
//! # Core Concepts
//!
//! - [`Graph`] - Directed graph asset with authoring and validation API
//! - [`Node`](node::Node) - Typed vertices: leaf actions and control flow
//! - [`Connection`](connection::Connection) - Port-to-port control edges
//! - [`Runner`] - Asynchronous executor with debugger-style controls
//! - [`Host`](action::Host) - Seam to the embedding application's effects
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use choreo::prelude::*;
//!
//! let mut graph = Graph::new();
//! let start = graph.add(NodeKind::Start);
//! let greet = graph.add(NodeKind::Action {
//!     action: Action::ShowMessage { text: "hello".into() },
//! });
//! let end = graph.add(NodeKind::End);
//! graph.link(&start, &greet)?;
//! graph.link(&greet, &end)?;
//!
//! let runner = Runner::new();
//! let report = runner.run(Arc::new(graph)).await?;
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! ```

/// Leaf effects and the host collaborator seam.
pub mod action;

/// Port-to-port connections between nodes.
pub mod connection;

/// Predicates evaluated by Conditional nodes.
pub mod condition;

/// Error types for graph structure, persistence, execution and host calls.
pub mod error;

/// Graph structure, authoring, validation and persistence.
pub mod graph;

/// Lifecycle events and the observer registry.
pub mod hooks;

/// Node types for graph vertices.
pub mod node;

/// Ports: the named connection points on nodes.
pub mod port;

/// The asynchronous runner and its controls.
pub mod runner;

/// Variables: named, typed mutable cells scoped to one run.
pub mod variable;

/// Re-export of the common types for easy access.
pub mod prelude {
    pub use crate::action::{Action, Host, NullHost};
    pub use crate::condition::{CompareOp, Condition};
    pub use crate::connection::Connection;
    pub use crate::error::{GraphError, HostError, PersistError, RunnerError};
    pub use crate::graph::{Graph, ValidationError};
    pub use crate::hooks::{HookRegistrationError, Hooks, RunnerEvent};
    pub use crate::node::{
        ConditionalNode, LoopNode, LoopPolicy, Node, NodeId, NodeKind, NodeState, Outcome,
        RandomBranchNode, SequenceNode, SubGraphNode, WaitForAllNode,
    };
    pub use crate::port::{Capacity, Direction, Port, PortId};
    pub use crate::runner::{RunOutcome, RunReport, RunState, Runner};
    pub use crate::variable::{Value, Variable, VariableStore};
}

// Re-export key types at crate root for convenience
pub use graph::{Graph, ValidationError};
pub use node::{NodeId, NodeKind};
pub use port::PortId;
pub use runner::{RunOutcome, RunReport, Runner};
