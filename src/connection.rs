//! Connections: the directed edges between node ports.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::port::PortId;

/// A directed edge from an output port to an input port.
///
/// Connections are immutable values owned by the [`Graph`](crate::Graph);
/// nodes never hold their own edges. A `(source_node, source_port)` pair with
/// single capacity has at most one outgoing connection; if that invariant is
/// violated the engine treats the first match as authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Node the edge originates from.
    pub source_node: NodeId,
    /// Output port on the source node.
    pub source_port: PortId,
    /// Node the edge terminates at.
    pub target_node: NodeId,
    /// Input port on the target node.
    pub target_port: PortId,
}

impl Connection {
    /// Creates a new connection.
    #[must_use]
    pub fn new(
        source_node: NodeId,
        source_port: PortId,
        target_node: NodeId,
        target_port: PortId,
    ) -> Self {
        Self {
            source_node,
            source_port,
            target_node,
            target_port,
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source_node, self.source_port, self.target_node, self.target_port
        )
    }
}
