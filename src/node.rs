//! Node types: the vertices of a flow graph.
//!
//! A node is a typed unit of behavior with ports and a lifecycle. A handful
//! of kinds encode control flow (Sequence, Parallel, Loop, Conditional,
//! RandomBranch, WaitForAll, SubGraph); Action nodes carry a single leaf
//! effect. Nodes own no connections — the [`Graph`](crate::Graph) does.

use core::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::condition::Condition;
use crate::graph::Graph;
use crate::port::{Port, PortId};

/// Stable unique identifier of a node.
///
/// Assigned at creation, immutable, and the sole addressing key for
/// connections and runtime correlation. Generated ids use nanoid; persisted
/// ids round-trip verbatim. Internally `Arc<str>` for cheap cloning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Arc<str>);

impl NodeId {
    /// Generates a fresh unique id.
    #[must_use]
    pub fn generate() -> Self {
        Self(nanoid::nanoid!().into())
    }

    /// Creates a node id from a specific string value.
    ///
    /// Primarily useful in tests and when restoring serialized graphs.
    #[must_use]
    pub fn from_string(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a node within one run.
///
/// `Failed` does not mean "errored": it is the alternate branch of a binary
/// decision, produced only by Conditional nodes to select their "false"
/// port. Every other kind only ever reaches `Completed` or is reset to
/// `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeState {
    /// Not yet reached in the current run.
    #[default]
    Idle,
    /// Currently executing.
    Running,
    /// Finished; continuation follows the node's terminal port.
    Completed,
    /// Conditional only: the predicate evaluated false.
    Failed,
}

/// How a node's execution settled.
///
/// Every execution produces exactly one outcome; `Failed` is only ever
/// produced by Conditional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The node finished its work.
    Completed,
    /// Conditional's predicate evaluated false.
    Failed,
}

impl Outcome {
    /// The node state this outcome settles into.
    #[must_use]
    pub fn state(self) -> NodeState {
        match self {
            Outcome::Completed => NodeState::Completed,
            Outcome::Failed => NodeState::Failed,
        }
    }
}

/// Sequence node payload: an ordered, growable list of step ports.
///
/// The step count is persisted for readability, but connections are the
/// source of truth: [`Graph::reconcile`](crate::Graph::reconcile) raises the
/// count to cover the highest connected `step{i}` index after a reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceNode {
    /// Number of `step{i}` output ports.
    pub steps: usize,
}

/// Loop termination policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum LoopPolicy {
    /// Runs the body a fixed number of times.
    Count {
        /// Number of iterations.
        iterations: usize,
    },
    /// Repeats while a Bool variable equals the expected value, re-checked
    /// before each iteration.
    Condition {
        /// Variable to read before each iteration.
        variable: String,
        /// Value the variable must equal for the loop to continue.
        expected: bool,
    },
    /// No stop condition from inside the node; ends only via `stop()`.
    Infinite,
}

/// Loop node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopNode {
    /// When the loop ends.
    #[serde(flatten)]
    pub policy: LoopPolicy,
}

/// Conditional node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalNode {
    /// The predicate to evaluate.
    pub condition: Condition,
}

/// RandomBranch node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomBranchNode {
    /// Number of `option{i}` output ports to draw from.
    pub options: usize,
    /// When set, the chosen chain is driven to completion before this node
    /// signals its own output; otherwise the chain is fired and forgotten.
    #[serde(default)]
    pub wait_for_branch: bool,
}

/// WaitForAll node payload.
///
/// An asynchronous join barrier over its connected input slots. No other
/// node in this engine signals the barrier automatically — completions must
/// be routed in explicitly via
/// [`Runner::notify_input_complete`](crate::Runner::notify_input_complete).
/// This producer-side gap is inherited from the original design and kept
/// deliberate rather than guessed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitForAllNode {
    /// Number of `in{i}` input slots, capped at [`WaitForAllNode::MAX_INPUTS`].
    pub inputs: usize,
}

impl WaitForAllNode {
    /// Maximum number of input slots.
    pub const MAX_INPUTS: usize = 4;

    /// The effective slot count after clamping.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.inputs.min(Self::MAX_INPUTS)
    }
}

/// SubGraph node payload: a reference to a nested graph asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGraphNode {
    /// The nested graph executed when this node runs.
    pub graph: Arc<Graph>,
}

/// The typed behavior of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point; completes immediately. Exactly one per graph.
    Start,
    /// Terminal; completes immediately, no outgoing connection resolved.
    End,
    /// A single leaf effect.
    Action {
        /// The effect to run.
        action: Action,
    },
    /// Runs each connected step chain in order, awaiting each.
    Sequence(SequenceNode),
    /// Runs every chain on the fan-out port concurrently; joins on all.
    Parallel,
    /// Repeats the body chain per its policy.
    Loop(LoopNode),
    /// Routes "true"/"false" from a synchronous predicate.
    Conditional(ConditionalNode),
    /// Draws one option uniformly at random.
    RandomBranch(RandomBranchNode),
    /// Join barrier driven by the explicit join API.
    WaitForAll(WaitForAllNode),
    /// Swaps execution into a nested graph and back.
    SubGraph(SubGraphNode),
}

impl NodeKind {
    /// Returns the kind name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::Action { .. } => "action",
            NodeKind::Sequence(_) => "sequence",
            NodeKind::Parallel => "parallel",
            NodeKind::Loop(_) => "loop",
            NodeKind::Conditional(_) => "conditional",
            NodeKind::RandomBranch(_) => "random_branch",
            NodeKind::WaitForAll(_) => "wait_for_all",
            NodeKind::SubGraph(_) => "sub_graph",
        }
    }
}

/// A node in a flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable unique identifier.
    pub id: NodeId,
    /// Display label for editors and traces; orthogonal to execution.
    #[serde(default)]
    pub label: String,
    /// Editor canvas position; orthogonal to execution.
    #[serde(default)]
    pub position: (f32, f32),
    /// When set, the runner auto-pauses before executing this node.
    #[serde(default)]
    pub breakpoint: bool,
    /// The node's typed behavior.
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    /// Creates a node with a freshly generated id.
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self::with_id(NodeId::generate(), kind)
    }

    /// Creates a node with a specific id.
    #[must_use]
    pub fn with_id(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            label: String::new(),
            position: (0.0, 0.0),
            breakpoint: false,
            kind,
        }
    }

    /// Sets the display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Marks the node as a breakpoint.
    #[must_use]
    pub fn with_breakpoint(mut self) -> Self {
        self.breakpoint = true;
        self
    }

    /// Input ports, derived from the node's kind and fields.
    #[must_use]
    pub fn input_ports(&self) -> Vec<Port> {
        match &self.kind {
            NodeKind::Start => Vec::new(),
            NodeKind::WaitForAll(wfa) => (0..wfa.slot_count())
                .map(|i| Port::input(PortId::slot(i), format!("In {i}")).multi())
                .collect(),
            _ => vec![Port::input(PortId::input(), "In")],
        }
    }

    /// Output ports, derived from the node's kind and fields.
    #[must_use]
    pub fn output_ports(&self) -> Vec<Port> {
        match &self.kind {
            NodeKind::End => Vec::new(),
            NodeKind::Sequence(seq) => {
                let mut ports: Vec<Port> = (0..seq.steps)
                    .map(|i| Port::output(PortId::step(i), format!("Step {i}")))
                    .collect();
                ports.push(Port::output(PortId::done(), "Done"));
                ports
            }
            NodeKind::Parallel => vec![
                Port::output(PortId::branches(), "Branches").multi(),
                Port::output(PortId::done(), "Done"),
            ],
            NodeKind::Loop(_) => vec![
                Port::output(PortId::loop_body(), "Loop"),
                Port::output(PortId::done(), "Done"),
            ],
            NodeKind::Conditional(_) => vec![
                Port::output(PortId::on_true(), "True"),
                Port::output(PortId::on_false(), "False"),
            ],
            NodeKind::RandomBranch(rb) => {
                let mut ports: Vec<Port> = (0..rb.options)
                    .map(|i| Port::output(PortId::option(i), format!("Option {i}")))
                    .collect();
                ports.push(Port::output(PortId::output(), "Out"));
                ports
            }
            _ => vec![Port::output(PortId::output(), "Out")],
        }
    }

    /// Resolves the output port the runner follows after this node settles.
    ///
    /// This is the single continuation dispatch used by every call site —
    /// the runner's main chain and each container's private loop — so
    /// branch-routing rules cannot drift between them. Returns `None` for
    /// terminal nodes.
    #[must_use]
    pub fn continuation_port(&self, outcome: Outcome) -> Option<PortId> {
        match (&self.kind, outcome) {
            (NodeKind::End, _) => None,
            (NodeKind::Conditional(_), Outcome::Completed) => Some(PortId::on_true()),
            (NodeKind::Conditional(_), Outcome::Failed) => Some(PortId::on_false()),
            (NodeKind::Sequence(_) | NodeKind::Parallel | NodeKind::Loop(_), _) => {
                Some(PortId::done())
            }
            _ => Some(PortId::output()),
        }
    }

    /// Returns true if the node declares the given output port.
    #[must_use]
    pub fn has_output_port(&self, port: &PortId) -> bool {
        self.output_ports().iter().any(|p| &p.id == port)
    }

    /// Returns true if the node declares the given input port.
    #[must_use]
    pub fn has_input_port(&self, port: &PortId) -> bool {
        self.input_ports().iter().any(|p| &p.id == port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::Capacity;

    #[test]
    fn node_id_uniqueness() {
        assert_ne!(NodeId::generate(), NodeId::generate());
    }

    #[test]
    fn start_and_end_port_shapes() {
        let start = Node::new(NodeKind::Start);
        assert!(start.input_ports().is_empty());
        assert_eq!(start.output_ports().len(), 1);

        let end = Node::new(NodeKind::End);
        assert_eq!(end.input_ports().len(), 1);
        assert!(end.output_ports().is_empty());
    }

    #[test]
    fn sequence_ports_grow_with_steps() {
        let node = Node::new(NodeKind::Sequence(SequenceNode { steps: 3 }));
        let ports = node.output_ports();
        assert_eq!(ports.len(), 4); // step0..step2 + done
        assert_eq!(ports[0].id, PortId::step(0));
        assert_eq!(ports[3].id, PortId::done());
    }

    #[test]
    fn parallel_fan_out_is_multi() {
        let node = Node::new(NodeKind::Parallel);
        let ports = node.output_ports();
        assert_eq!(ports[0].capacity, Capacity::Multi);
        assert_eq!(ports[1].id, PortId::done());
    }

    #[test]
    fn wait_for_all_inputs_clamped_and_multi() {
        let node = Node::new(NodeKind::WaitForAll(WaitForAllNode { inputs: 9 }));
        let ports = node.input_ports();
        assert_eq!(ports.len(), WaitForAllNode::MAX_INPUTS);
        assert!(ports.iter().all(|p| p.capacity == Capacity::Multi));
    }

    #[test]
    fn continuation_dispatch() {
        let cond = Node::new(NodeKind::Conditional(ConditionalNode {
            condition: crate::condition::Condition::BoolEquals {
                variable: "x".into(),
                expected: true,
            },
        }));
        assert_eq!(
            cond.continuation_port(Outcome::Completed),
            Some(PortId::on_true())
        );
        assert_eq!(
            cond.continuation_port(Outcome::Failed),
            Some(PortId::on_false())
        );

        let lp = Node::new(NodeKind::Loop(LoopNode {
            policy: LoopPolicy::Infinite,
        }));
        assert_eq!(lp.continuation_port(Outcome::Completed), Some(PortId::done()));

        let end = Node::new(NodeKind::End);
        assert_eq!(end.continuation_port(Outcome::Completed), None);

        let start = Node::new(NodeKind::Start);
        assert_eq!(
            start.continuation_port(Outcome::Completed),
            Some(PortId::output())
        );
    }

    #[test]
    fn outcome_settles_state() {
        assert_eq!(Outcome::Completed.state(), NodeState::Completed);
        assert_eq!(Outcome::Failed.state(), NodeState::Failed);
    }
}
