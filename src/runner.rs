//! The runner: asynchronous, observable execution of one graph at a time.
//!
//! A [`Runner`] is cheap to clone; clones share the same run state, so a
//! debugger UI can hold one clone for controls while the run itself is
//! driven elsewhere. All per-run state (node states, variables, the
//! execution trace) lives here — the [`Graph`] stays an immutable asset for
//! the whole run.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = Graph::new();
//! let start = graph.add(NodeKind::Start);
//! let end = graph.add(NodeKind::End);
//! graph.link(&start, &end)?;
//!
//! let runner = Runner::new();
//! let report = runner.run(Arc::new(graph)).await?;
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! ```

use core::time::Duration;
use std::sync::Arc;

use futures::future::{BoxFuture, try_join_all};
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Notify;

use crate::action::{Action, Host, NullHost};
use crate::error::RunnerError;
use crate::graph::Graph;
use crate::hooks::{Hooks, RunnerEvent};
use crate::node::{LoopPolicy, Node, NodeId, NodeKind, NodeState, Outcome};
use crate::port::PortId;
use crate::variable::{Value, VariableStore};

/// Pacing delay substituted for a Sequence step with no connection.
///
/// Keeps an authored-but-unwired step from collapsing the sequence's timing
/// to zero while the graph is being edited.
const SKIPPED_STEP_DELAY: Duration = Duration::from_millis(10);

// ─────────────────────────────────────────────────────────────────────────────
// Control state
// ─────────────────────────────────────────────────────────────────────────────

/// The runner's control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// No run in flight.
    #[default]
    Idle,
    /// Nodes execute freely.
    Running,
    /// Execution is held before the next node; `step()` releases one node
    /// at a time.
    Paused,
    /// `stop()` was requested; in-flight chains unwind at their next gate.
    Stopping,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run reached the end of its chains.
    Completed,
    /// The run was cancelled by `stop()`.
    Stopped,
}

/// Summary of one finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Whether the run completed or was stopped.
    pub outcome: RunOutcome,
    /// Number of node executions, across all branches and nested graphs.
    pub nodes_visited: usize,
    /// Duration of the run.
    pub duration: Duration,
}

struct Control {
    state: RunState,
    /// Nodes released by `step()` while paused but not yet consumed.
    step_permits: usize,
}

/// Join barrier for one WaitForAll node.
struct Barrier {
    /// Input slots still awaiting an arrival.
    pending: HashSet<PortId>,
}

/// Run state shared by all clones of a [`Runner`].
struct Shared {
    control: Mutex<Control>,
    /// Woken on every control or barrier change; gates re-check after it.
    notify: Notify,
    /// Woken by `stop()` to cancel the main chain mid-node.
    stop_notify: Notify,
    vars: Mutex<VariableStore>,
    states: Mutex<HashMap<NodeId, NodeState>>,
    barriers: Mutex<HashMap<NodeId, Barrier>>,
    /// Every node execution in visit order, across branches and sub-graphs.
    trace: Mutex<Vec<NodeId>>,
    /// Graph frame stack; the last entry is the graph currently executing.
    frames: Mutex<Vec<Arc<Graph>>>,
    current: Mutex<Option<NodeId>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Runner
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one graph at a time with pause, resume, single-step and stop.
///
/// Clones share all run state. Controls may be called from any task; they
/// take effect at node boundaries.
#[derive(Clone)]
pub struct Runner {
    host: Arc<dyn Host>,
    hooks: Arc<Hooks>,
    shared: Arc<Shared>,
    max_nesting: usize,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Default maximum sub-graph nesting depth.
    pub const DEFAULT_MAX_NESTING: usize = 64;

    /// Creates a runner with no host attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: Arc::new(NullHost),
            hooks: Arc::new(Hooks::new()),
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: RunState::Idle,
                    step_permits: 0,
                }),
                notify: Notify::new(),
                stop_notify: Notify::new(),
                vars: Mutex::new(VariableStore::new()),
                states: Mutex::new(HashMap::new()),
                barriers: Mutex::new(HashMap::new()),
                trace: Mutex::new(Vec::new()),
                frames: Mutex::new(Vec::new()),
                current: Mutex::new(None),
            }),
            max_nesting: Self::DEFAULT_MAX_NESTING,
        }
    }

    /// Attaches a host environment. Call before the first run.
    #[must_use]
    pub fn with_host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = host;
        self
    }

    /// Sets the maximum sub-graph nesting depth. Call before the first run.
    #[must_use]
    pub fn with_max_nesting(mut self, max: usize) -> Self {
        self.max_nesting = max;
        self
    }

    /// The observer registry for this runner.
    #[must_use]
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    // ── observation ─────────────────────────────────────────────────────

    /// The current control state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.shared.control.lock().state
    }

    /// Returns true while a run is in flight and not paused.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Returns true while a run is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state() == RunState::Paused
    }

    /// The node most recently started on the main chain, while one is in
    /// flight.
    #[must_use]
    pub fn current_node(&self) -> Option<NodeId> {
        self.shared.current.lock().clone()
    }

    /// The state of a node in the current or most recent run.
    #[must_use]
    pub fn node_state(&self, node: &NodeId) -> NodeState {
        self.shared
            .states
            .lock()
            .get(node)
            .copied()
            .unwrap_or_default()
    }

    /// Every node execution so far, in visit order.
    #[must_use]
    pub fn execution_path(&self) -> Vec<NodeId> {
        self.shared.trace.lock().clone()
    }

    /// The graph currently executing: the nested graph while inside a
    /// SubGraph node, the top-level graph otherwise. `None` once the run
    /// has settled.
    #[must_use]
    pub fn active_graph(&self) -> Option<Arc<Graph>> {
        self.shared.frames.lock().last().cloned()
    }

    /// Reads a variable from the current run.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.shared.vars.lock().get(name).cloned()
    }

    /// Writes a variable into the current run, creating it on first write.
    ///
    /// External writes let the host drive condition loops and conditionals
    /// from outside the graph.
    pub fn set_variable(&self, name: &str, value: Value) {
        self.shared.vars.lock().set(name, value);
        self.shared.notify.notify_waiters();
    }

    // ── controls ────────────────────────────────────────────────────────

    /// Pauses the run before its next node.
    ///
    /// Nodes already executing finish; the pause takes hold at the next
    /// node boundary on every chain, including detached branches.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::NotRunning`] unless the run is in the
    /// `Running` state.
    pub fn pause(&self) -> Result<(), RunnerError> {
        {
            let mut control = self.shared.control.lock();
            if control.state != RunState::Running {
                return Err(RunnerError::NotRunning);
            }
            control.state = RunState::Paused;
        }
        self.hooks.emit(&RunnerEvent::Paused {
            node: self.current_node(),
        });
        Ok(())
    }

    /// Resumes a paused run.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::NotPaused`] unless the run is paused.
    pub fn resume(&self) -> Result<(), RunnerError> {
        {
            let mut control = self.shared.control.lock();
            if control.state != RunState::Paused {
                return Err(RunnerError::NotPaused);
            }
            control.state = RunState::Running;
            control.step_permits = 0;
        }
        self.shared.notify.notify_waiters();
        self.hooks.emit(&RunnerEvent::Resumed);
        Ok(())
    }

    /// Releases exactly one node while paused, staying paused after it.
    ///
    /// Each call grants one permit; concurrent chains race for it, so with
    /// parallel branches in flight a step advances one chain by one node.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::NotPaused`] unless the run is paused.
    pub fn step(&self) -> Result<(), RunnerError> {
        {
            let mut control = self.shared.control.lock();
            if control.state != RunState::Paused {
                return Err(RunnerError::NotPaused);
            }
            control.step_permits += 1;
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    /// Stops the run.
    ///
    /// The main chain is cancelled promptly, mid-node if necessary;
    /// detached branches unwind at their next node boundary. `run` reports
    /// [`RunOutcome::Stopped`], not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::NotRunning`] when no run is in flight.
    pub fn stop(&self) -> Result<(), RunnerError> {
        {
            let mut control = self.shared.control.lock();
            if !matches!(control.state, RunState::Running | RunState::Paused) {
                return Err(RunnerError::NotRunning);
            }
            control.state = RunState::Stopping;
            control.step_permits = 0;
        }
        self.shared.notify.notify_waiters();
        self.shared.stop_notify.notify_waiters();
        Ok(())
    }

    /// Marks one input slot of a WaitForAll node as arrived.
    ///
    /// The barrier only exists while its node is waiting; arrivals before
    /// the node has been reached are dropped with a warning, so signal the
    /// join from work the barrier is known to be ahead of.
    pub fn notify_input_complete(&self, node: &NodeId, port: &PortId) {
        {
            let mut barriers = self.shared.barriers.lock();
            match barriers.get_mut(node) {
                Some(barrier) => {
                    barrier.pending.remove(port);
                }
                None => {
                    tracing::warn!(%node, %port, "no barrier waiting, arrival dropped");
                    return;
                }
            }
        }
        self.shared.notify.notify_waiters();
    }

    // ── execution ───────────────────────────────────────────────────────

    /// Runs a graph from its entry node to completion or cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::AlreadyRunning`] when a run is in flight, a
    /// [`GraphError`](crate::error::GraphError) for a missing or ambiguous
    /// entry node, and [`RunnerError::NestingLimitExceeded`] when
    /// sub-graphs nest past the configured limit. A stopped run is not an
    /// error.
    pub async fn run(&self, graph: Arc<Graph>) -> Result<RunReport, RunnerError> {
        let entry = graph.entry()?.id.clone();

        {
            let mut control = self.shared.control.lock();
            if control.state != RunState::Idle {
                return Err(RunnerError::AlreadyRunning);
            }
            control.state = RunState::Running;
            control.step_permits = 0;
        }

        self.shared.states.lock().clear();
        self.shared.trace.lock().clear();
        self.shared.barriers.lock().clear();
        *self.shared.vars.lock() = VariableStore::seeded(graph.variables());
        *self.shared.frames.lock() = vec![Arc::clone(&graph)];
        *self.shared.current.lock() = None;
        self.host.reset();

        tracing::debug!(nodes = graph.nodes().len(), "run starting");
        self.hooks.emit(&RunnerEvent::GraphStarted {
            node_count: graph.nodes().len(),
        });
        let started = tokio::time::Instant::now();

        let chain = self.run_chain(Arc::clone(&graph), entry, 0);
        tokio::pin!(chain);
        let result = tokio::select! {
            result = &mut chain => result,
            () = self.shared.stop_notify.notified() => Err(RunnerError::Stopped),
        };

        {
            let mut control = self.shared.control.lock();
            control.state = RunState::Idle;
            control.step_permits = 0;
        }
        let cancelled = self.shared.current.lock().take();
        self.shared.frames.lock().clear();
        // Wake detached chains so they observe the end and unwind.
        self.shared.notify.notify_waiters();

        let outcome = match result {
            Ok(()) => RunOutcome::Completed,
            Err(RunnerError::Stopped) => {
                // The node the cancellation landed on never settled.
                if let Some(node) = cancelled {
                    let mut states = self.shared.states.lock();
                    if states.get(&node) == Some(&NodeState::Running) {
                        states.insert(node, NodeState::Idle);
                    }
                }
                self.host.reset();
                RunOutcome::Stopped
            }
            Err(err) => return Err(err),
        };

        let report = RunReport {
            outcome,
            nodes_visited: self.shared.trace.lock().len(),
            duration: started.elapsed(),
        };
        self.hooks.emit(&RunnerEvent::GraphEnded {
            outcome,
            nodes_visited: report.nodes_visited,
            duration: report.duration,
        });
        Ok(report)
    }

    /// Waits until the node may execute.
    ///
    /// A breakpoint flips a running runner to paused before the node runs.
    /// While paused, one step permit admits one node. A stopping or idle
    /// runner unwinds the chain — an idle state is how detached branches
    /// learn the run they belonged to has ended.
    async fn gate(&self, node: &Node) -> Result<(), RunnerError> {
        if node.breakpoint {
            let paused = {
                let mut control = self.shared.control.lock();
                if control.state == RunState::Running {
                    control.state = RunState::Paused;
                    true
                } else {
                    false
                }
            };
            if paused {
                self.hooks.emit(&RunnerEvent::Paused {
                    node: Some(node.id.clone()),
                });
            }
        }

        loop {
            // Arm the wakeup before checking state so a control change
            // between the check and the await is never lost.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut control = self.shared.control.lock();
                match control.state {
                    RunState::Running => return Ok(()),
                    RunState::Paused => {
                        if control.step_permits > 0 {
                            control.step_permits -= 1;
                            return Ok(());
                        }
                    }
                    RunState::Idle | RunState::Stopping => return Err(RunnerError::Stopped),
                }
            }
            notified.await;
        }
    }

    /// Executes a chain of nodes starting at `start`, following each node's
    /// continuation port until a terminal node or an unconnected port.
    ///
    /// Returns a boxed future to support recursion through container nodes
    /// and nested graphs.
    fn run_chain(
        &self,
        graph: Arc<Graph>,
        start: NodeId,
        depth: usize,
    ) -> BoxFuture<'_, Result<(), RunnerError>> {
        Box::pin(async move {
            let mut current = start;
            loop {
                let node = graph
                    .get_node(&current)
                    .ok_or_else(|| crate::error::GraphError::UnknownNode(current.clone()))?
                    .clone();

                self.gate(&node).await?;

                // A join reached by several control chains runs once. The
                // first chain to arrive arms the barrier and owns the node;
                // later chains merge into the armed join and unwind here.
                if matches!(node.kind, NodeKind::WaitForAll(_)) && !self.arm_barrier(&graph, &node)
                {
                    tracing::debug!(node = %node.id, "join already armed, chain merges into it");
                    return Ok(());
                }

                self.shared
                    .states
                    .lock()
                    .insert(node.id.clone(), NodeState::Running);
                *self.shared.current.lock() = Some(node.id.clone());
                self.shared.trace.lock().push(node.id.clone());
                tracing::trace!(node = %node.id, kind = node.kind.name(), "node starting");
                self.hooks.emit(&RunnerEvent::NodeStarted {
                    node: node.id.clone(),
                });

                let outcome = self.execute(&graph, &node, depth).await?;

                let state = outcome.state();
                {
                    let mut states = self.shared.states.lock();
                    let previous = states.insert(node.id.clone(), state);
                    debug_assert_eq!(
                        previous,
                        Some(NodeState::Running),
                        "node {} settled twice",
                        node.id
                    );
                }
                self.hooks.emit(&RunnerEvent::NodeCompleted {
                    node: node.id.clone(),
                    state,
                });

                let Some(port) = node.continuation_port(outcome) else {
                    return Ok(());
                };
                let Some(connection) = graph.connection_from(&node.id, &port) else {
                    return Ok(());
                };
                current = connection.target_node.clone();
            }
        })
    }

    /// Executes one node and reports how it settled.
    async fn execute(
        &self,
        graph: &Arc<Graph>,
        node: &Node,
        depth: usize,
    ) -> Result<Outcome, RunnerError> {
        match &node.kind {
            NodeKind::Start | NodeKind::End => Ok(Outcome::Completed),
            NodeKind::Action { action } => self.execute_action(action).await,
            NodeKind::Sequence(seq) => {
                for i in 0..seq.steps {
                    match graph.connection_from(&node.id, &PortId::step(i)) {
                        Some(connection) => {
                            self.run_chain(
                                Arc::clone(graph),
                                connection.target_node.clone(),
                                depth,
                            )
                            .await?;
                        }
                        None => {
                            tracing::warn!(node = %node.id, step = i, "step unconnected, skipping");
                            tokio::time::sleep(SKIPPED_STEP_DELAY).await;
                        }
                    }
                }
                Ok(Outcome::Completed)
            }
            NodeKind::Parallel => {
                let branches: Vec<NodeId> = graph
                    .connections_from(&node.id, &PortId::branches())
                    .map(|c| c.target_node.clone())
                    .collect();
                try_join_all(
                    branches
                        .into_iter()
                        .map(|target| self.run_chain(Arc::clone(graph), target, depth)),
                )
                .await?;
                Ok(Outcome::Completed)
            }
            NodeKind::Loop(lp) => self.execute_loop(graph, node, &lp.policy, depth).await,
            NodeKind::Conditional(cond) => {
                let holds = {
                    let vars = self.shared.vars.lock();
                    cond.condition.evaluate(&vars, self.host.as_ref())
                };
                Ok(if holds {
                    Outcome::Completed
                } else {
                    Outcome::Failed
                })
            }
            NodeKind::RandomBranch(rb) => {
                if rb.options == 0 {
                    tracing::warn!(node = %node.id, "random branch has no options");
                    return Ok(Outcome::Completed);
                }
                let index = rand::rng().random_range(0..rb.options);
                let Some(connection) = graph.connection_from(&node.id, &PortId::option(index))
                else {
                    tracing::warn!(node = %node.id, option = index, "chosen option unconnected");
                    return Ok(Outcome::Completed);
                };
                let target = connection.target_node.clone();
                if rb.wait_for_branch {
                    self.run_chain(Arc::clone(graph), target, depth).await?;
                } else {
                    let runner = self.clone();
                    let graph = Arc::clone(graph);
                    tokio::spawn(async move {
                        match runner.run_chain(graph, target, depth).await {
                            Ok(()) | Err(RunnerError::Stopped) => {}
                            Err(err) => tracing::warn!(%err, "detached branch failed"),
                        }
                    });
                }
                Ok(Outcome::Completed)
            }
            NodeKind::WaitForAll(_) => self.execute_wait_for_all(node).await,
            NodeKind::SubGraph(sub) => {
                let depth = depth + 1;
                if depth > self.max_nesting {
                    return Err(RunnerError::NestingLimitExceeded {
                        depth,
                        max: self.max_nesting,
                    });
                }
                let nested = Arc::clone(&sub.graph);
                let entry = nested.entry()?.id.clone();
                {
                    let mut states = self.shared.states.lock();
                    for inner in nested.nodes() {
                        states.insert(inner.id.clone(), NodeState::Idle);
                    }
                }
                self.shared.frames.lock().push(Arc::clone(&nested));
                let result = self.run_chain(nested, entry, depth).await;
                // Restore the parent frame before the parent resolves its
                // continuation, so observers never see a stale frame.
                self.shared.frames.lock().pop();
                result?;
                Ok(Outcome::Completed)
            }
        }
    }

    async fn execute_action(&self, action: &Action) -> Result<Outcome, RunnerError> {
        match action {
            Action::Delay { .. } => {
                if let Some(duration) = action.delay_duration() {
                    tokio::time::sleep(duration).await;
                }
            }
            Action::SetVariable { variable, value } => {
                self.shared.vars.lock().set(variable, value.clone());
                self.shared.notify.notify_waiters();
            }
            Action::ShowMessage { text } => self.host.show_message(text),
            Action::HostEffect { effect, params } => {
                if let Err(err) = self.host.perform(effect, params).await {
                    tracing::warn!(%err, effect, "host effect failed, completing anyway");
                }
            }
        }
        Ok(Outcome::Completed)
    }

    async fn execute_loop(
        &self,
        graph: &Arc<Graph>,
        node: &Node,
        policy: &LoopPolicy,
        depth: usize,
    ) -> Result<Outcome, RunnerError> {
        let Some(connection) = graph.connection_from(&node.id, &PortId::loop_body()) else {
            tracing::warn!(node = %node.id, "loop has no body, completing");
            return Ok(Outcome::Completed);
        };
        let body = connection.target_node.clone();

        match policy {
            LoopPolicy::Count { iterations } => {
                for _ in 0..*iterations {
                    self.run_chain(Arc::clone(graph), body.clone(), depth)
                        .await?;
                }
            }
            LoopPolicy::Condition { variable, expected } => loop {
                // Re-checked before every iteration, so a body or external
                // write can end the loop.
                match self.shared.vars.lock().get_bool(variable) {
                    Some(actual) if actual == *expected => {}
                    Some(_) => break,
                    None => {
                        tracing::warn!(node = %node.id, variable, "loop variable missing, ending");
                        break;
                    }
                }
                self.run_chain(Arc::clone(graph), body.clone(), depth)
                    .await?;
            },
            LoopPolicy::Infinite => loop {
                self.run_chain(Arc::clone(graph), body.clone(), depth)
                    .await?;
            },
        }
        Ok(Outcome::Completed)
    }

    /// Arms the barrier for a WaitForAll node, unless another chain
    /// already holds it. Returns whether this chain now owns the node.
    fn arm_barrier(&self, graph: &Graph, node: &Node) -> bool {
        let NodeKind::WaitForAll(wfa) = &node.kind else {
            return true;
        };
        // Only connected slots participate in the barrier.
        let pending: HashSet<PortId> = (0..wfa.slot_count())
            .map(PortId::slot)
            .filter(|slot| {
                graph
                    .connections_into(&node.id)
                    .any(|c| &c.target_port == slot)
            })
            .collect();

        let mut barriers = self.shared.barriers.lock();
        if barriers.contains_key(&node.id) {
            return false;
        }
        barriers.insert(node.id.clone(), Barrier { pending });
        true
    }

    async fn execute_wait_for_all(&self, node: &Node) -> Result<Outcome, RunnerError> {
        // The barrier was armed before this node was marked running.
        if self
            .shared
            .barriers
            .lock()
            .get(&node.id)
            .is_some_and(|barrier| barrier.pending.is_empty())
        {
            tracing::warn!(node = %node.id, "wait-for-all has no connected slots, passing through");
        }

        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if matches!(
                self.shared.control.lock().state,
                RunState::Idle | RunState::Stopping
            ) {
                self.shared.barriers.lock().remove(&node.id);
                return Err(RunnerError::Stopped);
            }
            {
                let mut barriers = self.shared.barriers.lock();
                let done = barriers
                    .get(&node.id)
                    .is_none_or(|barrier| barrier.pending.is_empty());
                if done {
                    barriers.remove(&node.id);
                    return Ok(Outcome::Completed);
                }
            }
            notified.await;
        }
    }
}

impl core::fmt::Debug for Runner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runner")
            .field("state", &self.state())
            .field("max_nesting", &self.max_nesting)
            .finish_non_exhaustive()
    }
}
