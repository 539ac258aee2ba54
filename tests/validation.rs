//! Structural validation tests: entry policy, dangling references, port
//! capacity.


use std::sync::Arc;

use choreo::prelude::*;
use test_utils::{chain, effect};

#[test]
fn a_well_formed_graph_validates() {
    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let seq = graph.add(NodeKind::Sequence(SequenceNode { steps: 0 }));
    graph.link(&start, &seq).unwrap();
    for name in ["intro", "outro"] {
        let node = graph.add(effect(name));
        let port = graph.add_sequence_step(&seq).unwrap();
        graph.connect(&seq, port, &node, PortId::input()).unwrap();
    }
    let cond = graph.add(NodeKind::Conditional(ConditionalNode {
        condition: Condition::BoolEquals {
            variable: "done".into(),
            expected: true,
        },
    }));
    graph.declare_variable("done", Value::Bool(false));
    let end_true = graph.add(NodeKind::End);
    let end_false = graph.add(NodeKind::End);
    graph.connect(&seq, PortId::done(), &cond, PortId::input()).unwrap();
    graph
        .connect(&cond, PortId::on_true(), &end_true, PortId::input())
        .unwrap();
    graph
        .connect(&cond, PortId::on_false(), &end_false, PortId::input())
        .unwrap();

    graph.validate().unwrap();
}

#[test]
fn entry_policy_is_enforced() {
    let graph = Graph::new();
    let errors = graph.validate().unwrap_err();
    assert!(errors.contains(&ValidationError::NoEntryNode));

    let mut graph = Graph::new();
    graph.add(NodeKind::Start);
    graph.add(NodeKind::Start);
    let errors = graph.validate().unwrap_err();
    assert!(errors.contains(&ValidationError::MultipleEntryNodes { count: 2 }));
}

#[test]
fn removed_target_leaves_no_dangling_connection() {
    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let a = graph.add(effect("a"));
    let end = graph.add(NodeKind::End);
    chain(&mut graph, &[start, a.clone(), end]);

    // remove_node drops the connections with it, so the graph stays valid.
    graph.remove_node(&a);
    graph.validate().unwrap();
    assert!(graph.connections().is_empty());
}

#[test]
fn an_empty_subgraph_is_reported() {
    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let sub = graph.add(NodeKind::SubGraph(SubGraphNode {
        graph: Arc::new(Graph::new()),
    }));
    graph.link(&start, &sub).unwrap();

    let errors = graph.validate().unwrap_err();
    assert!(errors.contains(&ValidationError::SubGraphWithoutEntry { node: sub }));
}

#[test]
fn fan_out_on_a_single_port_is_reported() {
    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let a = graph.add(effect("a"));
    let b = graph.add(effect("b"));
    graph.link(&start, &a).unwrap();
    graph.link(&start, &b).unwrap();

    let errors = graph.validate().unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        ValidationError::SingleCapacityViolation {
            direction: "output",
            count: 2,
            ..
        }
    )));
}

#[test]
fn fan_in_on_a_single_port_is_reported() {
    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let a = graph.add(effect("a"));
    let end = graph.add(NodeKind::End);
    graph.link(&start, &end).unwrap();
    graph.link(&a, &end).unwrap();

    let errors = graph.validate().unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        ValidationError::SingleCapacityViolation {
            direction: "input",
            count: 2,
            ..
        }
    )));
}

#[test]
fn parallel_fan_out_is_not_a_violation() {
    let mut graph = Graph::new();
    let start = graph.add(NodeKind::Start);
    let par = graph.add(NodeKind::Parallel);
    graph.link(&start, &par).unwrap();
    for name in ["a", "b", "c"] {
        let node = graph.add(effect(name));
        graph
            .connect(&par, PortId::branches(), &node, PortId::input())
            .unwrap();
    }
    graph.validate().unwrap();
}

#[tokio::test]
async fn run_rejects_ambiguous_entry() {
    let mut graph = Graph::new();
    graph.add(NodeKind::Start);
    graph.add(NodeKind::Start);

    let runner = Runner::new();
    let err = runner.run(Arc::new(graph)).await.unwrap_err();
    assert_eq!(
        err,
        RunnerError::Graph(GraphError::MultipleEntryNodes(2))
    );
}
