//! The flow graph: nodes, connections and variable declarations.
//!
//! A [`Graph`] is a passive asset. It owns no runtime state and can be
//! serialized, diffed and shared (`Arc<Graph>`) freely; the
//! [`Runner`](crate::Runner) keeps all per-run state on its side.
//! Connections are the source of truth for topology: dynamic port counts
//! (Sequence steps, RandomBranch options) are re-derived from them on
//! reload via [`Graph::reconcile`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::Connection;
use crate::error::{GraphError, PersistError};
use crate::node::{Node, NodeId, NodeKind};
use crate::port::{Capacity, PortId};
use crate::variable::{Value, Variable};

/// A structural defect found by [`Graph::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No Start node exists.
    #[error("graph has no Start node")]
    NoEntryNode,
    /// More than one Start node exists.
    #[error("graph has {count} Start nodes, expected exactly one")]
    MultipleEntryNodes {
        /// How many Start nodes were found.
        count: usize,
    },
    /// A connection endpoint names a node that is not in the graph.
    #[error("connection references missing node {node}")]
    DanglingNode {
        /// The missing node id.
        node: NodeId,
    },
    /// A connection endpoint names a port its node does not declare.
    #[error("node {node} has no {direction} port '{port}'")]
    UnknownPort {
        /// The addressed node.
        node: NodeId,
        /// The missing port id.
        port: PortId,
        /// Whether an input or output port was addressed.
        direction: &'static str,
    },
    /// A SubGraph node nests a graph with no usable entry.
    #[error("sub-graph of node {node} has no single Start node")]
    SubGraphWithoutEntry {
        /// The SubGraph node.
        node: NodeId,
    },
    /// A single-capacity port carries more than one connection.
    #[error("{direction} port '{port}' on node {node} has {count} connections, capacity is one")]
    SingleCapacityViolation {
        /// The owning node.
        node: NodeId,
        /// The overloaded port.
        port: PortId,
        /// Whether the port is an input or output.
        direction: &'static str,
        /// How many connections were found.
        count: usize,
    },
}

/// A directed flow graph of nodes, connections and variable declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    connections: Vec<Connection>,
    #[serde(default)]
    variables: Vec<Variable>,
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── access ──────────────────────────────────────────────────────────

    /// All nodes in insertion order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All connections in insertion order.
    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// All variable declarations.
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Finds a node by id.
    #[must_use]
    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    /// Finds a node by id, mutably.
    #[must_use]
    pub fn get_node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| &node.id == id)
    }

    /// Resolves the graph's single entry node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NoEntryNode`] when no Start node exists and
    /// [`GraphError::MultipleEntryNodes`] when more than one does.
    pub fn entry(&self) -> Result<&Node, GraphError> {
        let mut starts = self
            .nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Start));
        match (starts.next(), starts.next()) {
            (Some(start), None) => Ok(start),
            (None, _) => Err(GraphError::NoEntryNode),
            (Some(_), Some(_)) => Err(GraphError::MultipleEntryNodes(
                self.nodes
                    .iter()
                    .filter(|node| matches!(node.kind, NodeKind::Start))
                    .count(),
            )),
        }
    }

    /// The first connection out of the given port, if any.
    ///
    /// Single-capacity ports admit one connection; if that invariant has
    /// been violated the first match in insertion order is authoritative.
    #[must_use]
    pub fn connection_from(&self, node: &NodeId, port: &PortId) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| &c.source_node == node && &c.source_port == port)
    }

    /// All connections out of the given port, in insertion order.
    pub fn connections_from<'a>(
        &'a self,
        node: &'a NodeId,
        port: &'a PortId,
    ) -> impl Iterator<Item = &'a Connection> {
        self.connections
            .iter()
            .filter(move |c| &c.source_node == node && &c.source_port == port)
    }

    /// All connections into the given node, in insertion order.
    pub fn connections_into<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Connection> {
        self.connections.iter().filter(move |c| &c.target_node == node)
    }

    // ── authoring ───────────────────────────────────────────────────────

    /// Adds a node of the given kind and returns its generated id.
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        let node = Node::new(kind);
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Inserts a pre-built node, keeping its id.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Connects an output port to an input port.
    ///
    /// Connecting a dynamic port one past the current count (`step{n}` on a
    /// Sequence with `n` steps, `option{n}` on a RandomBranch with `n`
    /// options) grows the node to cover it, so authoring can append without
    /// a separate resize call.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] when either endpoint node is
    /// missing and [`GraphError::UnknownPort`] when a port does not exist
    /// on its node.
    pub fn connect(
        &mut self,
        source_node: &NodeId,
        source_port: PortId,
        target_node: &NodeId,
        target_port: PortId,
    ) -> Result<(), GraphError> {
        self.grow_for_port(source_node, &source_port);

        let source = self
            .get_node(source_node)
            .ok_or_else(|| GraphError::UnknownNode(source_node.clone()))?;
        if !source.has_output_port(&source_port) {
            return Err(GraphError::UnknownPort {
                node: source_node.clone(),
                port: source_port,
                direction: "output",
            });
        }
        let target = self
            .get_node(target_node)
            .ok_or_else(|| GraphError::UnknownNode(target_node.clone()))?;
        if !target.has_input_port(&target_port) {
            return Err(GraphError::UnknownPort {
                node: target_node.clone(),
                port: target_port,
                direction: "input",
            });
        }

        self.connections.push(Connection::new(
            source_node.clone(),
            source_port,
            target_node.clone(),
            target_port,
        ));
        Ok(())
    }

    /// Convenience: connects `source`'s default output to `target`'s input.
    ///
    /// # Errors
    ///
    /// Same as [`Graph::connect`].
    pub fn link(&mut self, source: &NodeId, target: &NodeId) -> Result<(), GraphError> {
        self.connect(source, PortId::output(), target, PortId::input())
    }

    /// Appends a step to a Sequence node and returns the new step port.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] when the node is missing or not
    /// a Sequence.
    pub fn add_sequence_step(&mut self, node: &NodeId) -> Result<PortId, GraphError> {
        match self.get_node_mut(node) {
            Some(Node {
                kind: NodeKind::Sequence(seq),
                ..
            }) => {
                let port = PortId::step(seq.steps);
                seq.steps += 1;
                Ok(port)
            }
            _ => Err(GraphError::UnknownNode(node.clone())),
        }
    }

    /// Declares a variable with an initial value, replacing any previous
    /// declaration of the same name.
    pub fn declare_variable(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.variables.iter_mut().find(|v| v.name == name) {
            Some(decl) => decl.value = value,
            None => self.variables.push(Variable::new(name, value)),
        }
    }

    /// Removes a node and every connection touching it.
    ///
    /// Removing an unknown id is a no-op.
    pub fn remove_node(&mut self, id: &NodeId) {
        self.nodes.retain(|node| &node.id != id);
        self.connections
            .retain(|c| &c.source_node != id && &c.target_node != id);
    }

    /// Grows a dynamic-count node when a connection addresses the port one
    /// past its current range.
    fn grow_for_port(&mut self, node: &NodeId, port: &PortId) {
        let Some(node) = self.get_node_mut(node) else {
            return;
        };
        match &mut node.kind {
            NodeKind::Sequence(seq) => {
                if port.dynamic_index("step") == Some(seq.steps) {
                    seq.steps += 1;
                }
            }
            NodeKind::RandomBranch(rb) => {
                if port.dynamic_index("option") == Some(rb.options) {
                    rb.options += 1;
                }
            }
            _ => {}
        }
    }

    // ── validation ──────────────────────────────────────────────────────

    /// Checks the graph for structural defects.
    ///
    /// Collects every defect rather than stopping at the first, so editors
    /// can surface the full list at once.
    ///
    /// # Errors
    ///
    /// Returns every [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let start_count = self
            .nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Start))
            .count();
        match start_count {
            1 => {}
            0 => errors.push(ValidationError::NoEntryNode),
            count => errors.push(ValidationError::MultipleEntryNodes { count }),
        }

        for connection in &self.connections {
            match self.get_node(&connection.source_node) {
                None => errors.push(ValidationError::DanglingNode {
                    node: connection.source_node.clone(),
                }),
                Some(source) => {
                    if !source.has_output_port(&connection.source_port) {
                        errors.push(ValidationError::UnknownPort {
                            node: connection.source_node.clone(),
                            port: connection.source_port.clone(),
                            direction: "output",
                        });
                    }
                }
            }
            match self.get_node(&connection.target_node) {
                None => errors.push(ValidationError::DanglingNode {
                    node: connection.target_node.clone(),
                }),
                Some(target) => {
                    if !target.has_input_port(&connection.target_port) {
                        errors.push(ValidationError::UnknownPort {
                            node: connection.target_node.clone(),
                            port: connection.target_port.clone(),
                            direction: "input",
                        });
                    }
                }
            }
        }

        for node in &self.nodes {
            if let NodeKind::SubGraph(sub) = &node.kind
                && sub.graph.entry().is_err()
            {
                errors.push(ValidationError::SubGraphWithoutEntry {
                    node: node.id.clone(),
                });
            }
            for port in node.output_ports() {
                if port.capacity == Capacity::Multi {
                    continue;
                }
                let count = self.connections_from(&node.id, &port.id).count();
                if count > 1 {
                    errors.push(ValidationError::SingleCapacityViolation {
                        node: node.id.clone(),
                        port: port.id,
                        direction: "output",
                        count,
                    });
                }
            }
            for port in node.input_ports() {
                if port.capacity == Capacity::Multi {
                    continue;
                }
                let count = self
                    .connections_into(&node.id)
                    .filter(|c| c.target_port == port.id)
                    .count();
                if count > 1 {
                    errors.push(ValidationError::SingleCapacityViolation {
                        node: node.id.clone(),
                        port: port.id,
                        direction: "input",
                        count,
                    });
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    // ── persistence ─────────────────────────────────────────────────────

    /// Serializes the graph to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistError`] when serialization fails.
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restores a graph from its JSON form, reconciling dynamic port
    /// counts against the loaded connections.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistError`] when the JSON cannot be parsed.
    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let mut graph: Self = serde_json::from_str(json)?;
        graph.reconcile();
        Ok(graph)
    }

    /// Serializes and restores the graph in one step.
    ///
    /// This is the editor's save-then-load path collapsed: the result is
    /// equal to the original for any graph whose dynamic counts already
    /// match its connections.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistError`] when either direction fails.
    pub fn force_reload(&self) -> Result<Self, PersistError> {
        Self::from_json(&self.to_json()?)
    }

    /// Re-derives dynamic port counts from the connections.
    ///
    /// Raises a Sequence's step count and a RandomBranch's option count to
    /// cover the highest connected dynamic index. Counts are never lowered:
    /// an authored-but-unconnected trailing port survives a reload.
    pub fn reconcile(&mut self) {
        let connections = std::mem::take(&mut self.connections);
        for node in &mut self.nodes {
            let (prefix, count): (&str, &mut usize) = match &mut node.kind {
                NodeKind::Sequence(seq) => ("step", &mut seq.steps),
                NodeKind::RandomBranch(rb) => ("option", &mut rb.options),
                _ => continue,
            };
            let highest = connections
                .iter()
                .filter(|c| c.source_node == node.id)
                .filter_map(|c| c.source_port.dynamic_index(prefix))
                .max();
            if let Some(highest) = highest {
                *count = (*count).max(highest + 1);
            }
        }
        self.connections = connections;
    }
}
