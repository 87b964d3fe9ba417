//! Particle flow graph construction and instance I/O reachability.

mod common;

use common::parse_trace;
use mccode::{FlowEdge, GroupEdgeKind, build_particle_flow_graph};

fn sequential_pairs(instr: &mccode::Instr) -> Vec<(&str, &str)> {
    instr
        .flow_edges
        .iter()
        .filter(|r| matches!(r.edge, FlowEdge::Sequential { .. }))
        .map(|r| (r.src.as_str(), r.dst.as_str()))
        .collect()
}

fn group_pairs(instr: &mccode::Instr, kind: GroupEdgeKind) -> Vec<(&str, &str)> {
    instr
        .flow_edges
        .iter()
        .filter(|r| matches!(&r.edge, FlowEdge::Group { kind: k, .. } if *k == kind))
        .map(|r| (r.src.as_str(), r.dst.as_str()))
        .collect()
}

#[test]
fn sequential_nodes_and_edges() {
    let instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,1) RELATIVE a
         COMPONENT c = Arm() AT (0,0,1) RELATIVE b",
    );
    let graph = instr.flow_graph();
    assert_eq!(graph.node_count(), 3);
    for name in ["a", "b", "c"] {
        assert!(graph.contains(name));
    }
    assert_eq!(sequential_pairs(&instr), vec![("a", "b"), ("b", "c")]);
    // the WHEN gate of both destinations is empty
    for record in &instr.flow_edges {
        if let FlowEdge::Sequential { when } = &record.edge {
            assert!(when.is_none());
        }
    }
}

#[test]
fn empty_instrument() {
    let instr = parse_trace("");
    let graph = instr.flow_graph();
    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.edge_count(), 0);
}

#[test]
fn sequential_edge_carries_destination_when() {
    let instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() WHEN (x > 0) AT (0,0,1) RELATIVE a",
    );
    let when = instr
        .flow_edges
        .iter()
        .find_map(|r| match &r.edge {
            FlowEdge::Sequential { when } => when.as_ref(),
            _ => None,
        })
        .expect("a sequential edge with a WHEN gate");
    assert_eq!(when.ids(), vec!["x"]);
}

#[test]
fn group_try_next_edges() {
    let instr = parse_trace(
        "COMPONENT before = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT g1 = Arm() AT (0,0,1) RELATIVE before GROUP MyGroup
         COMPONENT g2 = Arm() AT (0,0,2) RELATIVE before GROUP MyGroup
         COMPONENT g3 = Arm() AT (0,0,3) RELATIVE before GROUP MyGroup
         COMPONENT after = Arm() AT (0,0,4) RELATIVE before",
    );
    let try_next = group_pairs(&instr, GroupEdgeKind::TryNext);
    assert_eq!(try_next, vec![("g1", "g2"), ("g2", "g3")]);
}

#[test]
fn group_scatter_exit_and_pass_through() {
    let instr = parse_trace(
        "COMPONENT before = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT g1 = Arm() AT (0,0,1) RELATIVE before GROUP MyGroup
         COMPONENT g2 = Arm() AT (0,0,2) RELATIVE before GROUP MyGroup
         COMPONENT g3 = Arm() AT (0,0,3) RELATIVE before GROUP MyGroup
         COMPONENT after = Arm() AT (0,0,4) RELATIVE before",
    );
    let scatter = group_pairs(&instr, GroupEdgeKind::ScatterExit);
    assert_eq!(
        scatter,
        vec![("g1", "after"), ("g2", "after"), ("g3", "after")]
    );
    let pass = group_pairs(&instr, GroupEdgeKind::PassThrough);
    assert_eq!(pass, vec![("g3", "after")]);
}

#[test]
fn group_edges_carry_the_group_name() {
    let instr = parse_trace(
        "COMPONENT before = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT g1 = Arm() AT (0,0,1) RELATIVE before GROUP Detectors
         COMPONENT g2 = Arm() AT (0,0,2) RELATIVE before GROUP Detectors
         COMPONENT after = Arm() AT (0,0,4) RELATIVE before",
    );
    for record in &instr.flow_edges {
        if let FlowEdge::Group { group_name, .. } = &record.edge {
            assert_eq!(group_name, "Detectors");
        }
    }
}

#[test]
fn trailing_group_has_no_exit_edges() {
    let instr = parse_trace(
        "COMPONENT before = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT g1 = Arm() AT (0,0,1) RELATIVE before GROUP G
         COMPONENT g2 = Arm() AT (0,0,2) RELATIVE before GROUP G",
    );
    assert!(group_pairs(&instr, GroupEdgeKind::ScatterExit).is_empty());
    assert!(group_pairs(&instr, GroupEdgeKind::PassThrough).is_empty());
}

#[test]
fn jump_when_edge() {
    let instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,1) RELATIVE a JUMP a WHEN (1)
         COMPONENT c = Arm() AT (0,0,2) RELATIVE a",
    );
    let jumps: Vec<_> = instr
        .flow_edges
        .iter()
        .filter(|r| matches!(r.edge, FlowEdge::Jump { .. }))
        .collect();
    assert_eq!(jumps.len(), 1);
    assert_eq!((jumps[0].src.as_str(), jumps[0].dst.as_str()), ("b", "a"));
    let FlowEdge::Jump {
        iterate,
        absolute_target,
        ..
    } = &jumps[0].edge
    else {
        panic!("expected a jump edge");
    };
    assert!(!iterate);
    assert_eq!(*absolute_target, 0);
}

#[test]
fn jump_iterate_edge() {
    let instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,1) RELATIVE a
         COMPONENT c = Arm() AT (0,0,2) RELATIVE a JUMP a ITERATE (jumps)",
    );
    let edge = instr
        .flow_edges
        .iter()
        .find(|r| matches!(r.edge, FlowEdge::Jump { .. }))
        .expect("a jump edge");
    let FlowEdge::Jump { iterate, .. } = &edge.edge else {
        panic!("expected a jump edge");
    };
    assert!(iterate);
}

#[test]
fn derived_graph_matches_records_after_rebuild() {
    let mut instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,1) RELATIVE a",
    );
    let before = instr.flow_edges.clone();
    instr.build_flow_graph();
    // deterministic: rebuilding from the same component list is byte-identical
    assert_eq!(before, instr.flow_edges);
    let derived = build_particle_flow_graph(&instr.components);
    assert_eq!(derived.edge_count(), instr.flow_graph().edge_count());
}

#[test]
fn sequential_inputs_outputs() {
    let instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,1) RELATIVE a
         COMPONENT c = Arm() AT (0,0,2) RELATIVE b",
    );
    let io = instr.instance_io();
    assert!(io.inputs_of("a").is_empty());
    assert_eq!(io.inputs_of("b"), ["a"]);
    assert_eq!(io.inputs_of("c"), ["b"]);
    assert_eq!(io.outputs_of("a"), ["b"]);
    assert_eq!(io.outputs_of("b"), ["c"]);
    assert!(io.outputs_of("c").is_empty());
}

#[test]
fn group_inputs_outputs() {
    let instr = parse_trace(
        "COMPONENT before = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT g1 = Arm() AT (0,0,1) RELATIVE before GROUP G
         COMPONENT g2 = Arm() AT (0,0,2) RELATIVE before GROUP G
         COMPONENT g3 = Arm() AT (0,0,3) RELATIVE before GROUP G
         COMPONENT after = Arm() AT (0,0,4) RELATIVE before",
    );
    let io = instr.instance_io();
    for member in ["g1", "g2", "g3"] {
        assert_eq!(io.inputs_of(member), ["before"], "inputs of {member}");
        assert_eq!(io.outputs_of(member), ["after"], "outputs of {member}");
    }
    let mut before_outputs = io.outputs_of("before").to_vec();
    before_outputs.sort();
    assert_eq!(before_outputs, ["g1", "g2", "g3"]);
    let mut after_inputs = io.inputs_of("after").to_vec();
    after_inputs.sort();
    assert_eq!(after_inputs, ["g1", "g2", "g3"]);
}

#[test]
fn group_members_are_not_each_others_io() {
    let instr = parse_trace(
        "COMPONENT before = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT g1 = Arm() AT (0,0,1) RELATIVE before GROUP G
         COMPONENT g2 = Arm() AT (0,0,2) RELATIVE before GROUP G
         COMPONENT after = Arm() AT (0,0,3) RELATIVE before",
    );
    let io = instr.instance_io();
    assert!(!io.inputs_of("g2").contains(&"g1".to_string()));
    assert!(!io.inputs_of("g1").contains(&"g2".to_string()));
    assert!(!io.outputs_of("g1").contains(&"g2".to_string()));
    assert!(!io.outputs_of("g2").contains(&"g1".to_string()));
}

#[test]
fn jump_contributes_to_io() {
    let instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,1) RELATIVE a
         COMPONENT c = Arm() AT (0,0,2) RELATIVE b
           JUMP b WHEN (1)
         COMPONENT d = Arm() AT (0,0,3) RELATIVE c",
    );
    let io = instr.instance_io();
    assert!(io.outputs_of("c").contains(&"b".to_string()));
    assert!(io.inputs_of("b").contains(&"c".to_string()));
}

#[test]
fn edge_records_round_trip_through_json() {
    let instr = parse_trace(
        "COMPONENT before = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT g1 = Arm() AT (0,0,1) RELATIVE before GROUP G
         COMPONENT g2 = Arm() AT (0,0,2) RELATIVE before GROUP G
         COMPONENT after = Arm() AT (0,0,4) RELATIVE before JUMP before WHEN (1)",
    );
    let text = serde_json::to_string(&instr.flow_edges).unwrap();
    let back: Vec<mccode::FlowEdgeRecord> = serde_json::from_str(&text).unwrap();
    assert_eq!(instr.flow_edges, back);
}
