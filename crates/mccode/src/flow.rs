//! Particle flow between component instances.
//!
//! The persisted ground truth is the ordered `Vec<FlowEdgeRecord>` stored on
//! [`crate::instr::Instr`]; the multi-edge directed graph is a derived view
//! regenerated on demand from `(components, flow_edges)`. Construction is
//! deterministic: identical component lists produce identical record
//! sequences.

use ahash::AHashMap;
use indexmap::IndexMap;
use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use serde::{Deserialize, Serialize};

use crate::{expr::Expr, instance::Instance};

/// Role of an edge within GROUP try-until-SCATTER semantics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GroupEdgeKind {
    /// Preceding component → first group member.
    Entry,
    /// Member → next member after no SCATTER (state reset before each try).
    TryNext,
    /// Member → component after the group, when the member scattered.
    ScatterExit,
    /// Last member → component after the group, when nothing scattered.
    PassThrough,
}

/// Typed payload describing how a particle moves along an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEdge {
    /// Implicit linear flow; `when` is the destination's WHEN gate, if any.
    /// A particle failing `when` skips the component but continues along the
    /// sequential path.
    Sequential {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        when: Option<Expr>,
    },
    /// Edge within or around a GROUP block.
    Group { group_name: String, kind: GroupEdgeKind },
    /// `JUMP … WHEN`/`ITERATE` control flow. `absolute_target` mirrors the
    /// resolved index on the originating [`crate::instance::Jump`].
    Jump {
        condition: Expr,
        iterate: bool,
        absolute_target: i64,
    },
    /// Reserved: weighted random outgoing-edge selection.
    WeightedRandom {
        weight: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Expr>,
    },
}

/// Serializable `(src, dst, edge)` triplet — the authoritative persisted
/// representation of one flow edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEdgeRecord {
    pub src: String,
    pub dst: String,
    pub edge: FlowEdge,
}

impl FlowEdgeRecord {
    pub fn new(src: impl Into<String>, dst: impl Into<String>, edge: FlowEdge) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            edge,
        }
    }
}

/// Compute the full record list from an ordered component list.
///
/// Single pass for sequential/within-group edges, one pass per group for the
/// exit edges, then jump resolution (by stored index, else by name).
pub fn build_flow_edge_records(components: &[Instance]) -> Vec<FlowEdgeRecord> {
    let n = components.len();
    let mut records = Vec::new();
    if n == 0 {
        return records;
    }

    // name -> ordered (index, member) lists per group
    let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();
    for (idx, instance) in components.iter().enumerate() {
        if let Some(group) = &instance.group {
            groups.entry(group.as_str()).or_default().push(idx);
        }
    }

    for idx in 0..n - 1 {
        let src = &components[idx];
        let dst = &components[idx + 1];
        let same_group = src.group.is_some() && src.group == dst.group;
        let src_exits_group = src.group.is_some() && !same_group;
        if same_group {
            records.push(FlowEdgeRecord::new(
                &src.name,
                &dst.name,
                FlowEdge::Group {
                    group_name: src.group.clone().unwrap_or_default(),
                    kind: GroupEdgeKind::TryNext,
                },
            ));
        } else if src_exits_group {
            // handled by the group-exit pass; a sequential edge here would
            // duplicate the PASS_THROUGH edge
        } else {
            records.push(FlowEdgeRecord::new(
                &src.name,
                &dst.name,
                FlowEdge::Sequential {
                    when: dst.when.clone(),
                },
            ));
        }
    }

    // scatter-exit from every member, pass-through from the last
    for (group_name, members) in &groups {
        let last_idx = *members.last().expect("group membership is non-empty");
        let mut exit_idx = last_idx + 1;
        while exit_idx < n && components[exit_idx].group.as_deref() == Some(*group_name) {
            exit_idx += 1;
        }
        if exit_idx < n {
            let exit_name = &components[exit_idx].name;
            for &member in members {
                records.push(FlowEdgeRecord::new(
                    &components[member].name,
                    exit_name,
                    FlowEdge::Group {
                        group_name: (*group_name).to_string(),
                        kind: GroupEdgeKind::ScatterExit,
                    },
                ));
            }
            records.push(FlowEdgeRecord::new(
                &components[last_idx].name,
                exit_name,
                FlowEdge::Group {
                    group_name: (*group_name).to_string(),
                    kind: GroupEdgeKind::PassThrough,
                },
            ));
        }
    }

    // jump edges, resolving unset (-1) targets by name
    let name_to_idx: AHashMap<&str, usize> = components
        .iter()
        .enumerate()
        .map(|(idx, instance)| (instance.name.as_str(), idx))
        .collect();
    for (owner_idx, instance) in components.iter().enumerate() {
        for jump in &instance.jump {
            let target_idx = if jump.absolute_target >= 0 {
                jump.absolute_target
            } else if let Some(&idx) = name_to_idx.get(jump.target.as_str()) {
                idx as i64
            } else if jump.target == "MYSELF" || jump.relative_target != 0 {
                // PREVIOUS_n / NEXT_n / MYSELF resolve from the owner's slot
                owner_idx as i64 + jump.relative_target
            } else {
                -1
            };
            if target_idx >= 0 && (target_idx as usize) < n {
                records.push(FlowEdgeRecord::new(
                    &instance.name,
                    &components[target_idx as usize].name,
                    FlowEdge::Jump {
                        condition: jump.condition.clone(),
                        iterate: jump.iterate,
                        absolute_target: target_idx,
                    },
                ));
            }
        }
    }

    records
}

/// The derived multi-edge directed view over the records. Node weights are
/// indices into the component list the graph was built from.
pub struct FlowGraph {
    pub graph: DiGraph<usize, FlowEdge>,
    indices: AHashMap<String, NodeIndex>,
}

impl FlowGraph {
    pub fn node(&self, name: &str) -> Option<NodeIndex> {
        self.indices.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// All edge payloads from `src` to `dst` (parallel edges included).
    pub fn edges_between(&self, src: &str, dst: &str) -> Vec<&FlowEdge> {
        let (Some(s), Some(d)) = (self.node(src), self.node(dst)) else {
            return Vec::new();
        };
        self.graph
            .edges_connecting(s, d)
            .map(|edge| edge.weight())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Build the graph view from components plus the authoritative edge list.
/// Records naming unknown instances are skipped.
pub fn flow_graph_from_records(components: &[Instance], records: &[FlowEdgeRecord]) -> FlowGraph {
    let mut graph = DiGraph::new();
    let mut indices = AHashMap::new();
    for (idx, instance) in components.iter().enumerate() {
        let node = graph.add_node(idx);
        indices.insert(instance.name.clone(), node);
    }
    for record in records {
        if let (Some(&src), Some(&dst)) = (indices.get(&record.src), indices.get(&record.dst)) {
            graph.add_edge(src, dst, record.edge.clone());
        }
    }
    FlowGraph { graph, indices }
}

/// Build the complete graph for a component list from scratch, without
/// persisting the records.
pub fn build_particle_flow_graph(components: &[Instance]) -> FlowGraph {
    let records = build_flow_edge_records(components);
    flow_graph_from_records(components, &records)
}

/// Particle-state reachability for each instance.
///
/// `inputs[x]` holds the instances whose *post-interaction* state can feed
/// `x`; `outputs[x]` is the mirror. TRY_NEXT edges are excluded: a group
/// co-member that fails to SCATTER passes the *reset* state onward, not its
/// own. To preserve symmetry the group predecessors are propagated as inputs
/// to every member and every member joins each predecessor's outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceIO {
    pub inputs: IndexMap<String, Vec<String>>,
    pub outputs: IndexMap<String, Vec<String>>,
}

impl InstanceIO {
    pub fn inputs_of(&self, name: &str) -> &[String] {
        self.inputs.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn outputs_of(&self, name: &str) -> &[String] {
        self.outputs.get(name).map_or(&[], Vec::as_slice)
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|x| x == value) {
        list.push(value.to_string());
    }
}

/// Compute [`InstanceIO`] for a component list and its edge records.
pub fn build_instance_io(components: &[Instance], records: &[FlowEdgeRecord]) -> InstanceIO {
    let mut io = InstanceIO::default();
    for instance in components {
        io.inputs.insert(instance.name.clone(), Vec::new());
        io.outputs.insert(instance.name.clone(), Vec::new());
    }

    for record in records {
        if matches!(
            record.edge,
            FlowEdge::Group {
                kind: GroupEdgeKind::TryNext,
                ..
            }
        ) {
            continue;
        }
        if io.outputs.contains_key(&record.src)
            && let Some(inputs) = io.inputs.get_mut(&record.dst)
        {
            push_unique(inputs, &record.src);
        }
        if io.inputs.contains_key(&record.dst)
            && let Some(outputs) = io.outputs.get_mut(&record.src)
        {
            push_unique(outputs, &record.dst);
        }
    }

    // group predecessor propagation
    let mut group_members: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for instance in components {
        if let Some(group) = &instance.group {
            group_members
                .entry(group.as_str())
                .or_default()
                .push(instance.name.as_str());
        }
    }
    for members in group_members.values() {
        let first = members[0];
        let predecessors: Vec<String> = io.inputs_of(first).to_vec();
        for &member in &members[1..] {
            if let Some(inputs) = io.inputs.get_mut(member) {
                for pred in &predecessors {
                    push_unique(inputs, pred);
                }
            }
        }
        for pred in &predecessors {
            if let Some(outputs) = io.outputs.get_mut(pred) {
                for &member in members.iter() {
                    push_unique(outputs, member);
                }
            }
        }
    }

    io
}
