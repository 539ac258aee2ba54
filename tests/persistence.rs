//! Persistence tests: JSON round-trips, the editor's save/load path and
//! reconciliation of dynamic port counts.


use std::sync::Arc;

use choreo::prelude::*;
use proptest::prelude::*;
use test_utils::{TestHost, chain, effect, set_var};

fn full_featured_graph() -> Graph {
    let mut nested = Graph::new();
    let s = nested.add(NodeKind::Start);
    let e = nested.add(NodeKind::End);
    nested.link(&s, &e).unwrap();

    let mut graph = Graph::new();
    graph.declare_variable("score", Value::Int(0));
    graph.declare_variable("name", Value::Str("guest".into()));
    let start = graph.add(NodeKind::Start);
    let seq = graph.add(NodeKind::Sequence(SequenceNode { steps: 0 }));
    graph.link(&start, &seq).unwrap();
    for name in ["first", "second", "third"] {
        let node = graph.insert(Node::new(effect(name)).with_label(name));
        let port = graph.add_sequence_step(&seq).unwrap();
        graph.connect(&seq, port, &node, PortId::input()).unwrap();
    }
    let sub = graph.add(NodeKind::SubGraph(SubGraphNode {
        graph: Arc::new(nested),
    }));
    let rb = graph.add(NodeKind::RandomBranch(RandomBranchNode {
        options: 2,
        wait_for_branch: true,
    }));
    let lp = graph.insert(Node::new(NodeKind::Loop(LoopNode {
        policy: LoopPolicy::Condition {
            variable: "score".into(),
            expected: true,
        },
    })));
    let bump = graph.add(set_var("score", Value::Int(1)));
    let end = graph.add(NodeKind::End);
    graph.connect(&seq, PortId::done(), &sub, PortId::input()).unwrap();
    graph.link(&sub, &rb).unwrap();
    graph.connect(&rb, PortId::option(0), &lp, PortId::input()).unwrap();
    graph.connect(&rb, PortId::option(1), &end, PortId::input()).unwrap();
    graph
        .connect(&lp, PortId::loop_body(), &bump, PortId::input())
        .unwrap();
    graph
}

#[test]
fn force_reload_preserves_the_graph() {
    let graph = full_featured_graph();
    let reloaded = graph.force_reload().unwrap();
    assert_eq!(graph, reloaded);
}

#[test]
fn json_form_is_stable() {
    // Hand-written asset in the on-disk shape; the "steps" count is stale
    // and must be reconciled up from the connections on load.
    let json = r#"{
        "nodes": [
            { "id": "n-start", "kind": "start" },
            { "id": "n-seq", "kind": "sequence", "steps": 1, "label": "intro" },
            {
                "id": "n-say",
                "kind": "action",
                "action": { "type": "show_message", "text": "welcome" }
            },
            { "id": "n-end", "kind": "end" }
        ],
        "connections": [
            {
                "source_node": "n-start", "source_port": "output",
                "target_node": "n-seq", "target_port": "input"
            },
            {
                "source_node": "n-seq", "source_port": "step0",
                "target_node": "n-say", "target_port": "input"
            },
            {
                "source_node": "n-seq", "source_port": "step2",
                "target_node": "n-end", "target_port": "input"
            }
        ],
        "variables": [
            { "name": "score", "value": { "type": "int", "value": 0 } }
        ]
    }"#;

    let graph = Graph::from_json(json).unwrap();
    assert_eq!(graph.nodes().len(), 4);
    assert_eq!(graph.variables()[0].name, "score");

    let seq = graph.get_node(&NodeId::from_string("n-seq")).unwrap();
    assert_eq!(seq.label, "intro");
    match &seq.kind {
        NodeKind::Sequence(node) => assert_eq!(node.steps, 3),
        other => panic!("unexpected kind {other:?}"),
    }
    graph.validate().unwrap();
}

#[tokio::test(start_paused = true)]
async fn a_reloaded_graph_runs() {
    let graph = r#"{
        "nodes": [
            { "id": "n-start", "kind": "start" },
            {
                "id": "n-say",
                "kind": "action",
                "action": { "type": "host_effect", "effect": "greet" }
            },
            { "id": "n-end", "kind": "end" }
        ],
        "connections": [
            {
                "source_node": "n-start", "source_port": "output",
                "target_node": "n-say", "target_port": "input"
            },
            {
                "source_node": "n-say", "source_port": "output",
                "target_node": "n-end", "target_port": "input"
            }
        ]
    }"#;
    let graph = Graph::from_json(graph).unwrap();

    let host = TestHost::new();
    let runner = Runner::new().with_host(host.clone());
    let report = runner.run(Arc::new(graph)).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(host.log(), ["greet"]);
}

#[test]
fn node_ids_round_trip_verbatim() {
    let mut graph = Graph::new();
    let start = graph.insert(Node::with_id(
        NodeId::from_string("tutorial-entry"),
        NodeKind::Start,
    ));
    let end = graph.insert(Node::with_id(NodeId::from_string("tutorial-exit"), NodeKind::End));
    chain(&mut graph, &[start.clone(), end]);

    let reloaded = graph.force_reload().unwrap();
    assert!(reloaded.get_node(&start).is_some());
    assert_eq!(
        reloaded.connections()[0].source_node,
        NodeId::from_string("tutorial-entry")
    );
}

fn value_strategy() -> impl Strategy<Value = choreo::variable::Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        // Finite floats only; NaN would break the equality check.
        prop::num::f64::NORMAL.prop_map(Value::Float),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Str),
    ]
}

proptest! {
    #[test]
    fn variable_values_round_trip(value in value_strategy()) {
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, value);
    }

    #[test]
    fn labels_and_positions_survive_reload(
        label in "[a-zA-Z ]{0,24}",
        x in -4096.0f32..4096.0,
        y in -4096.0f32..4096.0,
    ) {
        let mut graph = Graph::new();
        let mut node = Node::new(NodeKind::Start).with_label(label);
        node.position = (x, y);
        graph.insert(node);

        let reloaded = graph.force_reload().unwrap();
        prop_assert_eq!(&graph, &reloaded);
    }
}
