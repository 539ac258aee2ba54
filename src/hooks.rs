//! Runtime observation: lifecycle events and the observer registry.
//!
//! Observers receive a best-effort stream of [`RunnerEvent`]s emitted at the
//! graph and node boundaries of a run. They react to events but cannot
//! influence control flow; use them for logging, debugger UIs, metrics and
//! test assertions.
//!
//! # Example
//!
//! ```ignore
//! runner.hooks().register_observer("logger", |event: &RunnerEvent| {
//!     tracing::info!(%event, "run event");
//! })?;
//! ```

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::node::{NodeId, NodeState};
use crate::runner::RunOutcome;

// ─────────────────────────────────────────────────────────────────────────────
// RunnerEvent
// ─────────────────────────────────────────────────────────────────────────────

/// A lifecycle event emitted during a run.
///
/// All observers receive `&RunnerEvent` and match on variants for typed
/// access. Events are snapshots; by the time an observer runs, the runner
/// may have moved on.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// Fired once when a run begins, before the entry node executes.
    GraphStarted {
        /// Number of nodes in the top-level graph.
        node_count: usize,
    },

    /// Fired once when a run ends, however it ends.
    GraphEnded {
        /// Whether the run completed or was stopped.
        outcome: RunOutcome,
        /// Number of node executions over the whole run.
        nodes_visited: usize,
        /// Wall-clock duration of the run.
        duration: Duration,
    },

    /// Fired before a node executes.
    NodeStarted {
        /// The node about to execute.
        node: NodeId,
    },

    /// Fired after a node settles.
    NodeCompleted {
        /// The node that settled.
        node: NodeId,
        /// The state it settled into.
        state: NodeState,
    },

    /// Fired when the run pauses, whether by `pause()` or a breakpoint.
    Paused {
        /// The node the run is paused at, when one is in flight.
        node: Option<NodeId>,
    },

    /// Fired when a paused run resumes.
    Resumed,
}

impl RunnerEvent {
    /// Returns the event's name for logging and filtering.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            RunnerEvent::GraphStarted { .. } => "graph_started",
            RunnerEvent::GraphEnded { .. } => "graph_ended",
            RunnerEvent::NodeStarted { .. } => "node_started",
            RunnerEvent::NodeCompleted { .. } => "node_completed",
            RunnerEvent::Paused { .. } => "paused",
            RunnerEvent::Resumed => "resumed",
        }
    }

    /// Returns the node this event concerns, for node-level events.
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            RunnerEvent::NodeStarted { node } | RunnerEvent::NodeCompleted { node, .. } => {
                Some(node)
            }
            RunnerEvent::Paused { node } => node.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for RunnerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerEvent::GraphStarted { node_count } => {
                write!(f, "GraphStarted(nodes: {node_count})")
            }
            RunnerEvent::GraphEnded {
                outcome,
                nodes_visited,
                duration,
            } => write!(
                f,
                "GraphEnded({outcome:?}, visited: {nodes_visited}, duration: {duration:?})"
            ),
            RunnerEvent::NodeStarted { node } => write!(f, "NodeStarted({node})"),
            RunnerEvent::NodeCompleted { node, state } => {
                write!(f, "NodeCompleted({node}, {state:?})")
            }
            RunnerEvent::Paused { node: Some(node) } => write!(f, "Paused(at: {node})"),
            RunnerEvent::Paused { node: None } => write!(f, "Paused"),
            RunnerEvent::Resumed => write!(f, "Resumed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hooks
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during observer registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookRegistrationError {
    /// An observer with this name is already registered.
    #[error("observer '{name}' already registered")]
    DuplicateName {
        /// The duplicate observer name.
        name: String,
    },
}

/// Entry in the observer registry.
struct ObserverEntry {
    /// Human-readable name for debugging and duplicate detection.
    name: String,
    observer: Arc<dyn Fn(&RunnerEvent) + Send + Sync>,
}

/// Registry of run observers.
///
/// Interior mutability via [`RwLock`] allows registration while a runner is
/// idle and concurrent invocation while it executes. Observers run inline on
/// the emitting task, in registration order; keep them fast.
#[derive(Default)]
pub struct Hooks {
    observers: RwLock<Vec<ObserverEntry>>,
}

impl Hooks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer under a unique name.
    ///
    /// # Errors
    ///
    /// Returns [`HookRegistrationError::DuplicateName`] when the name is
    /// already taken.
    pub fn register_observer<F>(
        &self,
        name: impl Into<String>,
        observer: F,
    ) -> Result<&Self, HookRegistrationError>
    where
        F: Fn(&RunnerEvent) + Send + Sync + 'static,
    {
        let name = name.into();
        let mut observers = self.observers.write();
        if observers.iter().any(|entry| entry.name == name) {
            return Err(HookRegistrationError::DuplicateName { name });
        }
        observers.push(ObserverEntry {
            name,
            observer: Arc::new(observer),
        });
        Ok(self)
    }

    /// Removes an observer by name. Unknown names are a no-op.
    pub fn remove_observer(&self, name: &str) {
        self.observers.write().retain(|entry| entry.name != name);
    }

    /// Returns true if an observer with the given name is registered.
    #[must_use]
    pub fn contains_observer(&self, name: &str) -> bool {
        self.observers
            .read()
            .iter()
            .any(|entry| entry.name == name)
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Delivers an event to every observer, in registration order.
    pub fn emit(&self, event: &RunnerEvent) {
        // Clone the handles out so observers can register or remove hooks
        // from inside a callback without deadlocking the registry.
        let observers: Vec<Arc<dyn Fn(&RunnerEvent) + Send + Sync>> = self
            .observers
            .read()
            .iter()
            .map(|entry| Arc::clone(&entry.observer))
            .collect();
        for observer in observers {
            observer(event);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("observers", &self.observer_count())
            .finish()
    }
}
