//! Ports: the named connection points on nodes.
//!
//! Every node exposes a set of input and output ports derived from its kind
//! and field values. Connections address ports by `(NodeId, PortId)`; the
//! ports themselves are never serialized.

use core::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a port, unique within its owning node and direction.
///
/// Port ids are plain strings ("output", "done", "step0", ...) so they
/// round-trip through serialized connections unchanged. Internally uses
/// `Arc<str>` for cheap cloning (reference count bump only).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(Arc<str>);

impl PortId {
    /// Creates a port id from a specific string value.
    #[must_use]
    pub fn from_string(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// The single input port most nodes declare.
    #[must_use]
    pub fn input() -> Self {
        Self::from_string("input")
    }

    /// The single output port most nodes declare.
    #[must_use]
    pub fn output() -> Self {
        Self::from_string("output")
    }

    /// The terminal port of Sequence, Parallel and Loop nodes.
    #[must_use]
    pub fn done() -> Self {
        Self::from_string("done")
    }

    /// Conditional's port for the `Completed` outcome.
    #[must_use]
    pub fn on_true() -> Self {
        Self::from_string("true")
    }

    /// Conditional's port for the `Failed` outcome.
    #[must_use]
    pub fn on_false() -> Self {
        Self::from_string("false")
    }

    /// Loop's body port.
    #[must_use]
    pub fn loop_body() -> Self {
        Self::from_string("loop")
    }

    /// Parallel's multi-capacity fan-out port.
    #[must_use]
    pub fn branches() -> Self {
        Self::from_string("branches")
    }

    /// The `i`-th step port of a Sequence node.
    #[must_use]
    pub fn step(index: usize) -> Self {
        Self::from_string(format!("step{index}"))
    }

    /// The `i`-th option port of a RandomBranch node.
    #[must_use]
    pub fn option(index: usize) -> Self {
        Self::from_string(format!("option{index}"))
    }

    /// The `i`-th input slot of a WaitForAll node.
    #[must_use]
    pub fn slot(index: usize) -> Self {
        Self::from_string(format!("in{index}"))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses a dynamic port id of the form `{prefix}{index}`.
    ///
    /// Returns the index for ids like `step2` or `option0`; used when
    /// deriving dynamic port lists back from connections.
    #[must_use]
    pub fn dynamic_index(&self, prefix: &str) -> Option<usize> {
        self.0.strip_prefix(prefix)?.parse().ok()
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a port relative to its owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Connections terminate here.
    Input,
    /// Connections originate here.
    Output,
}

/// How many connections a port admits for control purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Capacity {
    /// At most one connection; the engine treats the first match as
    /// authoritative if the invariant is violated.
    #[default]
    Single,
    /// Any number of connections. Used only by Parallel's fan-out port and
    /// WaitForAll's input slots.
    Multi,
}

/// A named, directioned socket on a node.
///
/// Ports are pure functions of a node's kind and current field values;
/// they carry no state of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    /// Identifier, unique within the owning node and direction.
    pub id: PortId,
    /// Human-readable name shown by editors.
    pub display_name: String,
    /// Whether connections originate or terminate here.
    pub direction: Direction,
    /// Single or multi connection capacity.
    pub capacity: Capacity,
}

impl Port {
    /// Creates a single-capacity input port.
    #[must_use]
    pub fn input(id: PortId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            direction: Direction::Input,
            capacity: Capacity::Single,
        }
    }

    /// Creates a single-capacity output port.
    #[must_use]
    pub fn output(id: PortId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            direction: Direction::Output,
            capacity: Capacity::Single,
        }
    }

    /// Widens the port to multi capacity.
    #[must_use]
    pub fn multi(mut self) -> Self {
        self.capacity = Capacity::Multi;
        self
    }
}
