//! Tests for the runner's debugger-style controls: pause, resume,
//! single-step, breakpoints and stop.


use core::time::Duration;
use std::sync::Arc;

use choreo::prelude::*;
use test_utils::{EventLog, TestHost, chain, delay, effect, init_tracing, wait_until};

fn breakpoint_graph(host_effects: &[&str]) -> (Graph, Vec<NodeId>) {
    // start(breakpoint) -> effect -> effect -> ... -> end
    let mut graph = Graph::new();
    let start = graph.insert(Node::new(NodeKind::Start).with_breakpoint());
    let mut nodes = vec![start];
    for name in host_effects {
        nodes.push(graph.add(effect(name)));
    }
    nodes.push(graph.add(NodeKind::End));
    chain(&mut graph, &nodes);
    (graph, nodes)
}

#[tokio::test(start_paused = true)]
async fn pause_takes_hold_at_the_next_node_boundary() {
    init_tracing();
    let host = TestHost::new();
    let block = host.block_effect("blocking");

    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let busy = graph.add(effect("blocking"));
    let next = graph.add(effect("next"));
    let end = graph.add(NodeKind::End);
    chain(&mut graph, &[start, busy.clone(), next, end]);

    let runner = Runner::new().with_host(host.clone());
    let events = EventLog::attach(&runner);
    let driver = runner.clone();
    let running = tokio::spawn(async move { driver.run(Arc::new(graph)).await });

    // Pause while the blocking effect is mid-flight.
    block.started().await;
    runner.pause().unwrap();
    assert!(runner.is_paused());

    // The in-flight node finishes, but the chain holds before "next".
    block.release();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runner.node_state(&busy), NodeState::Completed);
    assert_eq!(host.count("next"), 0);
    assert!(runner.is_paused());

    runner.resume().unwrap();
    let report = running.await.unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(host.count("next"), 1);

    let names = events.names();
    assert!(names.contains(&"paused"));
    assert!(names.contains(&"resumed"));
}

#[tokio::test(start_paused = true)]
async fn step_releases_exactly_one_node() {
    let host = TestHost::new();
    let (graph, nodes) = breakpoint_graph(&["a", "b"]);

    let runner = Runner::new().with_host(host.clone());
    let driver = runner.clone();
    let running = tokio::spawn(async move { driver.run(Arc::new(graph)).await });

    // The breakpoint on the entry node pauses before anything runs.
    wait_until(|| runner.is_paused()).await;
    assert!(runner.execution_path().is_empty());

    runner.step().unwrap();
    wait_until(|| runner.execution_path().len() == 1).await;
    assert!(runner.is_paused());
    assert_eq!(runner.execution_path(), vec![nodes[0].clone()]);
    assert_eq!(host.count("a"), 0);

    runner.step().unwrap();
    wait_until(|| runner.execution_path().len() == 2).await;
    assert!(runner.is_paused());
    assert_eq!(host.count("a"), 1);
    assert_eq!(host.count("b"), 0);

    runner.resume().unwrap();
    let report = running.await.unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(host.count("b"), 1);
}

#[tokio::test(start_paused = true)]
async fn breakpoint_pauses_before_the_node_executes() {
    let host = TestHost::new();
    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let a = graph.add(effect("a"));
    let b = graph.insert(Node::new(effect("b")).with_breakpoint());
    let end = graph.add(NodeKind::End);
    chain(&mut graph, &[start, a, b.clone(), end]);

    let runner = Runner::new().with_host(host.clone());
    let events = EventLog::attach(&runner);
    let driver = runner.clone();
    let running = tokio::spawn(async move { driver.run(Arc::new(graph)).await });

    wait_until(|| runner.is_paused()).await;
    assert_eq!(host.count("a"), 1);
    assert_eq!(host.count("b"), 0);
    assert_eq!(runner.node_state(&b), NodeState::Idle);

    // The pause event names the node held at the breakpoint.
    let held = events.events().iter().find_map(|event| match event {
        RunnerEvent::Paused { node } => node.clone(),
        _ => None,
    });
    assert_eq!(held, Some(b.clone()));

    runner.resume().unwrap();
    let report = running.await.unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(host.count("b"), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_an_infinite_loop() {
    let host = TestHost::new();
    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let lp = graph.add(NodeKind::Loop(LoopNode {
        policy: LoopPolicy::Infinite,
    }));
    let tick = graph.add(effect("tick"));
    let wait = graph.add(delay(0.05));
    graph.link(&start, &lp).unwrap();
    graph
        .connect(&lp, PortId::loop_body(), &tick, PortId::input())
        .unwrap();
    graph.link(&tick, &wait).unwrap();

    let runner = Runner::new().with_host(host.clone());
    let driver = runner.clone();
    let running = tokio::spawn(async move { driver.run(Arc::new(graph)).await });

    wait_until(|| host.count("tick") >= 3).await;
    runner.stop().unwrap();

    let report = running.await.unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::Stopped);
    assert_eq!(runner.state(), RunState::Idle);
    assert!(runner.active_graph().is_none());
    // Stop releases host-side listeners: once at run start, once on stop.
    assert_eq!(host.resets(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_a_delay_mid_node() {
    let host = TestHost::new();
    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let slow = graph.add(delay(3600.0));
    let after = graph.add(effect("after"));
    let end = graph.add(NodeKind::End);
    chain(&mut graph, &[start, slow, after, end]);

    let runner = Runner::new().with_host(host.clone());
    let driver = runner.clone();
    let running = tokio::spawn(async move { driver.run(Arc::new(graph)).await });

    wait_until(|| runner.execution_path().len() == 2).await;
    let stopped_at = tokio::time::Instant::now();
    runner.stop().unwrap();

    let report = running.await.unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::Stopped);
    // The hour-long delay was abandoned, not awaited.
    assert!(stopped_at.elapsed() < Duration::from_secs(60));
    assert_eq!(host.count("after"), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_works_while_paused() {
    let host = TestHost::new();
    let (graph, _) = breakpoint_graph(&["a"]);

    let runner = Runner::new().with_host(host.clone());
    let driver = runner.clone();
    let running = tokio::spawn(async move { driver.run(Arc::new(graph)).await });

    wait_until(|| runner.is_paused()).await;
    runner.stop().unwrap();

    let report = running.await.unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::Stopped);
    assert_eq!(host.count("a"), 0);
}

#[tokio::test(start_paused = true)]
async fn second_run_is_rejected_while_one_is_in_flight() {
    let host = TestHost::new();
    let block = host.block_effect("blocking");

    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let busy = graph.add(effect("blocking"));
    let end = graph.add(NodeKind::End);
    chain(&mut graph, &[start, busy, end]);
    let graph = Arc::new(graph);

    let runner = Runner::new().with_host(host.clone());
    let driver = runner.clone();
    let first = Arc::clone(&graph);
    let running = tokio::spawn(async move { driver.run(first).await });

    block.started().await;
    let err = runner.run(Arc::clone(&graph)).await.unwrap_err();
    assert_eq!(err, RunnerError::AlreadyRunning);

    block.release();
    let report = running.await.unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn events_cover_the_whole_run() {
    let host = TestHost::new();
    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let a = graph.add(effect("a"));
    let end = graph.add(NodeKind::End);
    chain(&mut graph, &[start, a, end]);

    let runner = Runner::new().with_host(host.clone());
    let events = EventLog::attach(&runner);
    runner.run(Arc::new(graph)).await.unwrap();

    assert_eq!(
        events.names(),
        vec![
            "graph_started",
            "node_started",
            "node_completed",
            "node_started",
            "node_completed",
            "node_started",
            "node_completed",
            "graph_ended",
        ]
    );
    let last = events.events().into_iter().next_back().unwrap();
    match last {
        RunnerEvent::GraphEnded {
            outcome,
            nodes_visited,
            ..
        } => {
            assert_eq!(outcome, RunOutcome::Completed);
            assert_eq!(nodes_visited, 3);
        }
        other => panic!("unexpected final event {other}"),
    }
}
