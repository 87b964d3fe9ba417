//! Component insertion: edge splitting, group contiguity, jump
//! invalidation, and placement rewriting.

mod common;

use common::parse_trace;
use mccode::{Anchor, Expr, FlowEdge, GroupEdgeKind, SemanticError, Vector};

fn sequential_pairs(instr: &mccode::Instr) -> Vec<(&str, &str)> {
    instr
        .flow_edges
        .iter()
        .filter(|r| matches!(r.edge, FlowEdge::Sequential { .. }))
        .map(|r| (r.src.as_str(), r.dst.as_str()))
        .collect()
}

fn try_next_pairs(instr: &mccode::Instr) -> Vec<(&str, &str)> {
    instr
        .flow_edges
        .iter()
        .filter(|r| {
            matches!(
                &r.edge,
                FlowEdge::Group {
                    kind: GroupEdgeKind::TryNext,
                    ..
                }
            )
        })
        .map(|r| (r.src.as_str(), r.dst.as_str()))
        .collect()
}

fn seq_instr() -> mccode::Instr {
    parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,1) RELATIVE a
         COMPONENT c = Arm() AT (0,0,2) RELATIVE b",
    )
}

fn group_instr() -> mccode::Instr {
    parse_trace(
        "COMPONENT before = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT g1 = Arm() AT (0,0,1) RELATIVE before GROUP MyGroup
         COMPONENT g2 = Arm() AT (0,0,2) RELATIVE before GROUP MyGroup
         COMPONENT g3 = Arm() AT (0,0,3) RELATIVE before GROUP MyGroup
         COMPONENT after = Arm() AT (0,0,4) RELATIVE before",
    )
}

fn arm(instr: &mccode::Instr) -> std::sync::Arc<mccode::Comp> {
    std::sync::Arc::clone(&instr.components[0].type_)
}

#[test]
fn insert_before_middle_component() {
    let mut instr = seq_instr();
    let type_ = arm(&instr);
    instr
        .insert_component("x", type_, Anchor::Before("b"), None, None)
        .unwrap();
    let names: Vec<&str> = instr.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["a", "x", "b", "c"]);
    let seq = sequential_pairs(&instr);
    assert!(seq.contains(&("a", "x")));
    assert!(seq.contains(&("x", "b")));
    assert!(!seq.contains(&("a", "b")));
}

#[test]
fn insert_before_first_component() {
    let mut instr = seq_instr();
    let type_ = arm(&instr);
    instr
        .insert_component("x", type_, Anchor::Before("a"), None, None)
        .unwrap();
    assert_eq!(instr.components[0].name, "x");
    assert!(sequential_pairs(&instr).contains(&("x", "a")));
    assert!(!instr.flow_edges.iter().any(|r| r.dst == "x"));
}

#[test]
fn insert_after_middle_component() {
    let mut instr = seq_instr();
    let type_ = arm(&instr);
    instr
        .insert_component("x", type_, Anchor::After("b"), None, None)
        .unwrap();
    let names: Vec<&str> = instr.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["a", "b", "x", "c"]);
    let seq = sequential_pairs(&instr);
    assert!(seq.contains(&("b", "x")));
    assert!(seq.contains(&("x", "c")));
    assert!(!seq.contains(&("b", "c")));
}

#[test]
fn insert_after_last_component() {
    let mut instr = seq_instr();
    let type_ = arm(&instr);
    instr
        .insert_component("x", type_, Anchor::After("c"), None, None)
        .unwrap();
    assert_eq!(instr.components.last().unwrap().name, "x");
    assert!(sequential_pairs(&instr).contains(&("c", "x")));
    assert!(!instr.flow_edges.iter().any(|r| r.src == "x"));
}

#[test]
fn duplicate_name_rejected() {
    let mut instr = seq_instr();
    let type_ = arm(&instr);
    let result = instr.insert_component("b", type_, Anchor::Before("b"), None, None);
    assert!(matches!(result, Err(SemanticError::DuplicateName(_))));
}

#[test]
fn unknown_anchor_rejected() {
    let mut instr = seq_instr();
    let type_ = arm(&instr);
    let result = instr.insert_component("x", type_, Anchor::Before("z"), None, None);
    assert!(matches!(result, Err(SemanticError::UnknownReference(_))));
}

#[test]
fn sequential_edge_count_increases_by_one() {
    let mut instr = seq_instr();
    let before = sequential_pairs(&instr).len();
    let type_ = arm(&instr);
    instr
        .insert_component("x", type_, Anchor::After("a"), None, None)
        .unwrap();
    assert_eq!(sequential_pairs(&instr).len(), before + 1);
}

#[test]
fn inserted_node_appears_in_flow_graph() {
    let mut instr = seq_instr();
    let type_ = arm(&instr);
    let index = instr
        .insert_component("x", type_, Anchor::After("a"), None, None)
        .unwrap();
    assert_eq!(index, 1);
    assert!(instr.flow_graph().contains("x"));
    assert_eq!(instr.get_component("x").unwrap().name, "x");
}

#[test]
fn insert_group_member_between_two_members() {
    let mut instr = group_instr();
    let type_ = arm(&instr);
    instr
        .insert_component("gx", type_, Anchor::After("g1"), Some("MyGroup"), None)
        .unwrap();
    let names: Vec<&str> = instr.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["before", "g1", "gx", "g2", "g3", "after"]);
    let try_next = try_next_pairs(&instr);
    assert!(try_next.contains(&("g1", "gx")));
    assert!(try_next.contains(&("gx", "g2")));
    assert!(!try_next.contains(&("g1", "g2")));
}

#[test]
fn insert_non_group_between_members_rejected() {
    let mut instr = group_instr();
    let type_ = arm(&instr);
    let result = instr.insert_component("gx", type_, Anchor::After("g1"), None, None);
    assert!(matches!(
        result,
        Err(SemanticError::GroupContinuityViolation(_))
    ));
}

#[test]
fn insert_wrong_group_between_members_rejected() {
    let mut instr = group_instr();
    let type_ = arm(&instr);
    let result = instr.insert_component("gx", type_, Anchor::After("g1"), Some("OtherGroup"), None);
    assert!(matches!(
        result,
        Err(SemanticError::GroupContinuityViolation(_))
    ));
}

#[test]
fn insert_before_group_leaves_group_edges_alone() {
    let mut instr = group_instr();
    let type_ = arm(&instr);
    instr
        .insert_component("x", type_, Anchor::Before("before"), None, None)
        .unwrap();
    let try_next = try_next_pairs(&instr);
    assert!(try_next.contains(&("g1", "g2")));
    assert!(try_next.contains(&("g2", "g3")));
}

#[test]
fn scatter_exit_edges_survive_insert_within_group() {
    let mut instr = group_instr();
    let type_ = arm(&instr);
    instr
        .insert_component("gx", type_, Anchor::After("g1"), Some("MyGroup"), None)
        .unwrap();
    let scatter: Vec<(&str, &str)> = instr
        .flow_edges
        .iter()
        .filter(|r| {
            matches!(
                &r.edge,
                FlowEdge::Group {
                    kind: GroupEdgeKind::ScatterExit,
                    ..
                }
            )
        })
        .map(|r| (r.src.as_str(), r.dst.as_str()))
        .collect();
    for member in ["g1", "g2", "g3", "gx"] {
        assert!(scatter.contains(&(member, "after")), "missing exit from {member}");
    }
}

fn jump_instr() -> mccode::Instr {
    parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,1) RELATIVE a
         COMPONENT c = Arm() AT (0,0,2) RELATIVE b
           JUMP b WHEN (1)
         COMPONENT d = Arm() AT (0,0,3) RELATIVE c",
    )
}

#[test]
fn jump_targets_invalidated_after_insert() {
    let mut instr = jump_instr();
    let type_ = arm(&instr);
    instr
        .insert_component("x", type_, Anchor::After("a"), None, None)
        .unwrap();
    for instance in &instr.components {
        for jump in &instance.jump {
            assert_eq!(jump.absolute_target, -1, "{} should be unresolved", instance.name);
        }
    }
}

#[test]
fn jump_edge_destination_resolves_by_name_after_insert() {
    let mut instr = jump_instr();
    let jumps: Vec<_> = instr
        .flow_edges
        .iter()
        .filter(|r| matches!(r.edge, FlowEdge::Jump { .. }))
        .collect();
    assert_eq!(jumps.len(), 1);
    assert_eq!((jumps[0].src.as_str(), jumps[0].dst.as_str()), ("c", "b"));
    let FlowEdge::Jump { absolute_target, .. } = &jumps[0].edge else {
        panic!("expected a jump edge");
    };
    assert_eq!(*absolute_target, 1);

    let type_ = arm(&instr);
    instr
        .insert_component("x", type_, Anchor::After("a"), None, None)
        .unwrap();
    // the dst name survives and resolves to the shifted index
    let jumps: Vec<_> = instr
        .flow_edges
        .iter()
        .filter(|r| matches!(r.edge, FlowEdge::Jump { .. }))
        .collect();
    assert_eq!(jumps.len(), 1);
    assert_eq!(jumps[0].dst, "b");
    let FlowEdge::Jump { absolute_target, .. } = &jumps[0].edge else {
        panic!("expected a jump edge");
    };
    assert_eq!(*absolute_target, 2);
}

#[test]
fn auto_midpoint_placement() {
    let mut instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,2) RELATIVE a",
    );
    let type_ = arm(&instr);
    let index = instr
        .insert_component("x", type_, Anchor::Before("b"), None, None)
        .unwrap();
    let inserted = &instr.components[index];
    assert_eq!(inserted.at_relative.1.as_deref(), Some("a"));
    assert!(inserted.at_relative.0.z.is_value(1.0));
}

#[test]
fn explicit_placement_reference_is_kept_when_backward() {
    let mut instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,2) RELATIVE a",
    );
    let type_ = arm(&instr);
    let at = Vector::new(Expr::int(0), Expr::int(0), Expr::int(1));
    let index = instr
        .insert_component("x", type_, Anchor::Before("b"), None, Some((at, Some("a".to_string()))))
        .unwrap();
    assert_eq!(instr.components[index].at_relative.1.as_deref(), Some("a"));
}

#[test]
fn forward_placement_reference_is_rewritten_to_predecessor() {
    let mut instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,2) RELATIVE a",
    );
    let type_ = arm(&instr);
    let at = Vector::new(Expr::int(0), Expr::int(0), Expr::int(0));
    let index = instr
        .insert_component("x", type_, Anchor::Before("b"), None, Some((at, Some("b".to_string()))))
        .unwrap();
    // `b` sits after the insertion point, so the reference moves to `a`
    assert_eq!(instr.components[index].at_relative.1.as_deref(), Some("a"));
}
