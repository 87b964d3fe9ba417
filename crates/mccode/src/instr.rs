//! The instrument IR: an ordered pipeline of component instances plus the
//! instrument-level parameters, C sections, groups, and flow-edge records.

use std::{collections::BTreeSet, fmt, sync::Arc};

use ahash::AHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    comp::Comp,
    config::{Config, replace_env_getpath_cmd, replace_keywords},
    errors::SemanticError,
    expr::{Expr, ObjectType, Payload, Value},
    flow::{
        FlowEdgeRecord, FlowGraph, InstanceIO, build_flow_edge_records, build_instance_io,
        flow_graph_from_records,
    },
    instance::{DepInstance, Instance},
    orientation::{Angles, Vector},
    params::{
        ComponentParameter, InstrumentParameter, MetaData, Mode, RawC, parameter_by_name,
        parameter_name_present,
    },
    registry::Registry,
};

/// Named GROUP membership: `(index, instance name)` pairs in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    /// Declaration order of the group within the instrument.
    pub index: usize,
    pub members: Vec<(usize, String)>,
}

impl Group {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            members: Vec::new(),
        }
    }

    pub fn add(&mut self, index: usize, name: impl Into<String>) {
        self.members.push((index, name.into()));
    }
}

/// Where to place a component inserted by [`Instr::insert_component`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor<'a> {
    Before(&'a str),
    After(&'a str),
}

/// Intermediate representation of a McCode instrument.
///
/// Read from a `.instr` file (possibly pulling in more `.comp` and `.instr`
/// sources) and handed to a code generator. The component order is the
/// authoritative particle traversal order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instr {
    /// Instrument name, typically `{name}.instr`.
    pub name: String,
    /// The source *file* path.
    pub source: String,
    pub parameters: Vec<InstrumentParameter>,
    pub metadata: Vec<MetaData>,
    pub components: Vec<Instance>,
    /// Names of `%include`d instrument definitions.
    pub included: Vec<String>,
    pub user: Vec<RawC>,
    pub declare: Vec<RawC>,
    pub initialize: Vec<RawC>,
    pub save: Vec<RawC>,
    pub final_: Vec<RawC>,
    pub groups: IndexMap<String, Group>,
    /// Compile-time flag strings from `DEPENDENCY` directives.
    pub flags: Vec<String>,
    /// The registries the reader used to populate this instrument.
    pub registries: Vec<Registry>,
    /// Persisted ground truth for the particle flow graph.
    pub flow_edges: Vec<FlowEdgeRecord>,
}

impl Instr {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    // -- components ---------------------------------------------------------

    pub fn add_component(&mut self, mut instance: Instance) -> Result<&Instance, SemanticError> {
        if self.has_component_named(&instance.name) {
            return Err(SemanticError::DuplicateName(format!(
                "a component instance named {} is already present in the instrument",
                instance.name
            )));
        }
        if instance.mode != Mode::Minimal {
            self.compute_orientation(&mut instance)?;
        }
        self.components.push(instance);
        Ok(self.components.last().expect("just pushed"))
    }

    fn compute_orientation(&self, instance: &mut Instance) -> Result<(), SemanticError> {
        let at_parent = match &instance.at_relative.1 {
            Some(name) => Some(&self.get_component(name)?.orientation),
            None => None,
        };
        let rot_parent = match &instance.rotate_relative.1 {
            Some(name) => Some(&self.get_component(name)?.orientation),
            // rotation follows the AT reference when unspecified
            None => at_parent,
        };
        instance.orientation = crate::orientation::Orient::from_dependent(
            at_parent,
            &instance.at_relative.0,
            rot_parent,
            &instance.rotate_relative.0,
        );
        Ok(())
    }

    pub fn has_component_named(&self, name: &str) -> bool {
        self.components.iter().any(|c| c.name == name)
    }

    /// Look up an instance by name; `PREVIOUS` names the most recent one.
    pub fn get_component(&self, name: &str) -> Result<&Instance, SemanticError> {
        if name == "PREVIOUS" {
            return self.components.last().ok_or_else(|| {
                SemanticError::UnknownReference("PREVIOUS used before any components".to_string())
            });
        }
        self.components
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                SemanticError::UnknownReference(format!("no component instance named {name}"))
            })
    }

    pub fn get_component_mut(&mut self, name: &str) -> Result<&mut Instance, SemanticError> {
        self.components
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                SemanticError::UnknownReference(format!("no component instance named {name}"))
            })
    }

    /// The `count`-th most recent component; with `removable_ok = false`
    /// removable instances are skipped.
    pub fn last_component(&self, count: usize, removable_ok: bool) -> Result<&Instance, SemanticError> {
        if removable_ok {
            if self.components.len() < count || count == 0 {
                return Err(SemanticError::UnknownReference(format!(
                    "only {} components defined, can not go back {count}",
                    self.components.len()
                )));
            }
            return Ok(&self.components[self.components.len() - count]);
        }
        let fixed: Vec<&Instance> = self.components.iter().filter(|c| !c.removable).collect();
        if fixed.len() < count || count == 0 {
            return Err(SemanticError::UnknownReference(format!(
                "only {} fixed components defined, can not go back {count}",
                fixed.len()
            )));
        }
        Ok(fixed[fixed.len() - count])
    }

    pub fn get_component_names_by_category(&self, category: &str) -> Vec<&str> {
        self.components
            .iter()
            .filter(|c| {
                c.type_
                    .category
                    .as_deref()
                    .is_some_and(|cat| cat.contains(category))
            })
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Distinct component definitions in first-use order (the code generator
    /// relies on this order).
    pub fn component_types(&self) -> Vec<Arc<Comp>> {
        let mut seen = Vec::new();
        for instance in &self.components {
            if !seen
                .iter()
                .any(|c: &Arc<Comp>| c.name == instance.type_.name)
            {
                seen.push(Arc::clone(&instance.type_));
            }
        }
        seen
    }

    // -- parameters ---------------------------------------------------------

    pub fn add_parameter(
        &mut self,
        parameter: InstrumentParameter,
        ignore_repeated: bool,
    ) -> Result<(), SemanticError> {
        if !parameter_name_present(&self.parameters, &parameter.name) {
            self.parameters.push(parameter);
            Ok(())
        } else if ignore_repeated {
            Ok(())
        } else {
            Err(SemanticError::DuplicateName(format!(
                "an instrument parameter named {} is already present",
                parameter.name
            )))
        }
    }

    pub fn get_parameter(&self, name: &str) -> Option<&InstrumentParameter> {
        parameter_by_name(&self.parameters, name)
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        parameter_name_present(&self.parameters, name)
    }

    /// Whether an instrument parameter appears in any instance definition or
    /// C block.
    pub fn parameter_used(&self, name: &str) -> bool {
        if self.components.iter().any(|c| c.parameter_used(name)) {
            return true;
        }
        [&self.declare, &self.initialize, &self.save, &self.final_]
            .into_iter()
            .flatten()
            .any(|block| block.mentions(name))
    }

    /// Count (and optionally remove) unused instrument parameters.
    pub fn check_instrument_parameters(&mut self, remove: bool) -> usize {
        let used: Vec<bool> = self
            .parameters
            .iter()
            .map(|p| self.parameter_used(&p.name))
            .collect();
        let unused = used.iter().filter(|u| !**u).count();
        if unused > 0 {
            let names: Vec<&str> = self
                .parameters
                .iter()
                .zip(&used)
                .filter(|(_, u)| !**u)
                .map(|(p, _)| p.name.as_str())
                .collect();
            tracing::info!(
                instrument = %self.name,
                parameters = %names.join(", "),
                "instrument parameters not used in the instrument"
            );
            if remove {
                let mut keep = used.iter();
                self.parameters.retain(|_| *keep.next().expect("lengths match"));
            }
        }
        unused
    }

    /// Flag instance-parameter identifiers that name instrument parameters.
    pub fn verify_instance_parameters(&mut self) {
        let names: Vec<String> = self.parameters.iter().map(|p| p.name.clone()).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        for instance in &mut self.components {
            instance.verify_parameters(&name_refs);
        }
    }

    // -- sections and metadata ----------------------------------------------

    pub fn add_included(&mut self, name: impl Into<String>) {
        self.included.push(name.into());
    }

    pub fn add_dependency(&mut self, flag: impl Into<String>) {
        self.flags.push(flag.into());
    }

    pub fn append_user(&mut self, blocks: Vec<RawC>) {
        self.user.extend(blocks);
    }

    pub fn append_declare(&mut self, blocks: Vec<RawC>) {
        self.declare.extend(blocks);
    }

    pub fn append_initialize(&mut self, blocks: Vec<RawC>) {
        self.initialize.extend(blocks);
    }

    pub fn append_save(&mut self, blocks: Vec<RawC>) {
        self.save.extend(blocks);
    }

    pub fn append_final(&mut self, blocks: Vec<RawC>) {
        self.final_.extend(blocks);
    }

    pub fn add_metadata(&mut self, m: MetaData) {
        self.metadata.retain(|x| x.name != m.name);
        self.metadata.push(m);
    }

    /// All metadata: instance collections (instance overrides component)
    /// followed by instrument-level entries.
    pub fn collect_metadata(&self) -> Vec<MetaData> {
        let mut collected: Vec<MetaData> = self
            .components
            .iter()
            .flat_map(Instance::collect_metadata)
            .collect();
        collected.extend(self.metadata.iter().cloned());
        collected
    }

    // -- groups -------------------------------------------------------------

    /// Rebuild the group table from instance membership.
    pub fn determine_groups(&mut self) {
        self.groups.clear();
        for (idx, instance) in self.components.iter().enumerate() {
            if let Some(group_name) = &instance.group {
                let next_index = self.groups.len();
                let group = self
                    .groups
                    .entry(group_name.clone())
                    .or_insert_with(|| Group::new(group_name.clone(), next_index));
                group.add(idx, instance.name.clone());
            }
        }
    }

    // -- flow graph ---------------------------------------------------------

    /// Recompute and replace the persisted edge records (idempotent).
    pub fn build_flow_graph(&mut self) {
        self.flow_edges = build_flow_edge_records(&self.components);
    }

    pub fn add_flow_edge(&mut self, record: FlowEdgeRecord) {
        self.flow_edges.push(record);
    }

    /// The derived multi-edge graph view over `(components, flow_edges)`.
    pub fn flow_graph(&self) -> FlowGraph {
        flow_graph_from_records(&self.components, &self.flow_edges)
    }

    pub fn instance_io(&self) -> InstanceIO {
        build_instance_io(&self.components, &self.flow_edges)
    }

    // -- editing ------------------------------------------------------------

    /// Insert a new instance of `type_` next to an existing component.
    ///
    /// Rejects duplicate names, unknown anchors, and insertions that would
    /// break group contiguity. Every `Jump.absolute_target` is invalidated to
    /// `-1` so the next build resolves targets by name. When `at_relative`
    /// is omitted the instance lands at the midpoint of the local frame; a
    /// supplied reference to a component at or after the insertion point is
    /// rewritten to the predecessor.
    pub fn insert_component(
        &mut self,
        name: &str,
        type_: Arc<Comp>,
        anchor: Anchor<'_>,
        group: Option<&str>,
        at_relative: Option<(Vector, Option<String>)>,
    ) -> Result<usize, SemanticError> {
        if self.has_component_named(name) {
            return Err(SemanticError::DuplicateName(format!(
                "a component instance named {name} is already present in the instrument"
            )));
        }
        let (target, offset) = match anchor {
            Anchor::Before(target) => (target, 0),
            Anchor::After(target) => (target, 1),
        };
        let target_idx = self
            .components
            .iter()
            .position(|c| c.name == target)
            .ok_or_else(|| {
                SemanticError::UnknownReference(format!("no component instance named {target}"))
            })?;
        let insert_idx = target_idx + offset;

        // group contiguity: inserting between two co-members requires joining
        // their group
        let prev_group = insert_idx
            .checked_sub(1)
            .and_then(|i| self.components[i].group.as_deref());
        let next_group = self
            .components
            .get(insert_idx)
            .and_then(|c| c.group.as_deref());
        if let (Some(prev), Some(next)) = (prev_group, next_group)
            && prev == next
            && group != Some(prev)
        {
            return Err(SemanticError::GroupContinuityViolation(format!(
                "inserting {name} between members of group {prev} requires group {prev}"
            )));
        }

        let predecessor_name = insert_idx
            .checked_sub(1)
            .map(|i| self.components[i].name.clone());
        let at_relative = match at_relative {
            Some((vector, Some(reference))) => {
                let ref_idx = self.components.iter().position(|c| c.name == reference);
                match ref_idx {
                    None => {
                        return Err(SemanticError::UnknownReference(format!(
                            "at_relative references unknown component {reference}"
                        )));
                    }
                    Some(idx) if idx >= insert_idx => {
                        // the reference would point forward; re-express the
                        // placement relative to the predecessor
                        (vector, predecessor_name.clone())
                    }
                    Some(_) => (vector, Some(reference)),
                }
            }
            Some((vector, None)) => (vector, None),
            None => match self.components.get(insert_idx) {
                Some(successor) => {
                    let half = |e: &Expr| e.clone().mul(Expr::float(0.5));
                    let mid = Vector::new(
                        half(&successor.at_relative.0.x),
                        half(&successor.at_relative.0.y),
                        half(&successor.at_relative.0.z),
                    );
                    let reference = match &successor.at_relative.1 {
                        Some(r) => match self.components.iter().position(|c| c.name == *r) {
                            Some(idx) if idx < insert_idx => Some(r.clone()),
                            _ => predecessor_name.clone(),
                        },
                        None => None,
                    };
                    (mid, reference)
                }
                None => (Vector::zero(), predecessor_name.clone()),
            },
        };

        let rotate_relative = (Angles::zero(), at_relative.1.clone());
        let mut instance = Instance::new(name, type_, at_relative, rotate_relative, Mode::Normal);
        if let Some(group) = group {
            instance.set_group(group);
        }
        self.compute_orientation(&mut instance)?;
        self.components.insert(insert_idx, instance);

        // resolved jump indices are stale after any reordering
        for component in &mut self.components {
            for jump in &mut component.jump {
                jump.absolute_target = -1;
            }
        }
        self.determine_groups();
        self.build_flow_graph();
        Ok(insert_idx)
    }

    /// A copy restricted to components `first..last` (`None` = end).
    pub fn copy_range(&self, first: usize, last: Option<usize>) -> Self {
        let last = last.unwrap_or(self.components.len()).min(self.components.len());
        let mut copy = Self {
            name: self.name.clone(),
            source: self.source.clone(),
            parameters: self.parameters.clone(),
            metadata: self.metadata.clone(),
            components: self.components[first..last].to_vec(),
            included: self.included.clone(),
            user: self.user.clone(),
            declare: self.declare.clone(),
            initialize: self.initialize.clone(),
            save: self.save.clone(),
            final_: self.final_.clone(),
            groups: IndexMap::new(),
            flags: self.flags.clone(),
            registries: self.registries.clone(),
            flow_edges: Vec::new(),
        };
        copy.determine_groups();
        copy.build_flow_graph();
        copy
    }

    /// Split into two instruments that share the component named `at`: the
    /// first ends with it, the second starts from it. Placement references
    /// that would dangle in the second half are re-expressed absolutely via
    /// the computed orientation.
    pub fn split(
        &self,
        at: &str,
        remove_unused_parameters: bool,
    ) -> Result<(Self, Self), SemanticError> {
        let matches: Vec<usize> = self
            .components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name == at)
            .map(|(i, _)| i)
            .collect();
        let index = match matches.as_slice() {
            [index] => *index,
            [] => {
                return Err(SemanticError::UnknownReference(format!(
                    "can not split the instrument at unknown component {at}"
                )));
            }
            many => {
                return Err(SemanticError::DuplicateName(format!(
                    "can only split at a single component, {at} matches {many:?}"
                )));
            }
        };

        let mut first = self.copy_range(0, Some(index + 1));
        first.name = format!("{}_first", self.name);
        if first.check_instrument_parameters(remove_unused_parameters) > 0
            && !remove_unused_parameters
        {
            tracing::warn!(instrument = %first.name, "instrument has unused parameters");
        }

        let mut second = self.copy_range(index, None);
        second.name = format!("{}_second", self.name);
        let names: Vec<String> = second.components.iter().map(|c| c.name.clone()).collect();
        for instance in &mut second.components {
            if let Some(reference) = &instance.at_relative.1
                && !names.contains(reference)
            {
                instance.at_relative = (instance.orientation.position(), None);
            }
            if let Some(reference) = &instance.rotate_relative.1
                && !names.contains(reference)
            {
                instance.rotate_relative = (instance.orientation.angles(), None);
            }
        }
        if second.check_instrument_parameters(remove_unused_parameters) > 0
            && !remove_unused_parameters
        {
            tracing::info!(instrument = %second.name, "instrument has unused parameters");
        }
        Ok((first, second))
    }

    /// Split at `after` and bridge the halves with MCPL file I/O: the first
    /// instrument ends in `output_component` writing the file, the second
    /// starts with `input_component` reading it. Both gain a string
    /// `mcpl_filename` parameter.
    #[expect(clippy::too_many_arguments, reason = "the MCPL bridge is fully parameterised")]
    pub fn mcpl_split(
        &self,
        after: &str,
        filename: Option<String>,
        output_component: Arc<Comp>,
        output_parameters: Vec<ComponentParameter>,
        input_component: Arc<Comp>,
        input_parameters: Vec<ComponentParameter>,
        remove_unused_parameters: bool,
    ) -> Result<(Self, Self), SemanticError> {
        let mut filename = filename.unwrap_or_else(|| format!("{}.mcpl", self.name));
        if !filename.starts_with('"') || !filename.ends_with('"') {
            filename = format!("\"{filename}\"");
        }
        let filename_parameter = ComponentParameter::new(
            "filename",
            Expr::value(Value::new(
                Payload::Str("mcpl_filename".to_string()),
                crate::expr::DataType::Undefined,
                ObjectType::Parameter,
                crate::expr::ShapeType::Scalar,
            )),
        );

        let (mut first, mut second) = self.split(after, remove_unused_parameters)?;
        let mcpl_filename =
            InstrumentParameter::new("mcpl_filename", None, Expr::str(filename.clone()));
        first.add_parameter(mcpl_filename.clone(), true)?;
        second.add_parameter(mcpl_filename, true)?;

        let fc = first
            .components
            .pop()
            .ok_or_else(|| SemanticError::UnknownReference("empty first instrument".to_string()))?;
        if fc.type_.name != "Arm" {
            tracing::info!(
                component = %fc.name,
                type_ = %fc.type_.name,
                "split point is not an Arm; MCPL file output may cause problems"
            );
        }
        let mut output_parameters = output_parameters;
        if !parameter_name_present(&output_parameters, "filename") {
            output_parameters.insert(0, filename_parameter.clone());
        }
        let mut out_instance = Instance::new(
            fc.name.clone(),
            output_component,
            fc.at_relative.clone(),
            fc.rotate_relative.clone(),
            Mode::Normal,
        );
        out_instance.parameters = output_parameters;
        first.add_component(out_instance)?;
        first.build_flow_graph();

        // the shared component was re-expressed absolutely by split()
        let sc = second.components.remove(0);
        if sc.at_relative.1.is_some() || sc.rotate_relative.1.is_some() {
            tracing::error!(
                component = %sc.name,
                "the split-at point should be positioned absolutely in the second instrument"
            );
        }
        let mut input_parameters = input_parameters;
        if !parameter_name_present(&input_parameters, "filename") {
            input_parameters.insert(0, filename_parameter);
        }
        if !parameter_name_present(&input_parameters, "verbose") {
            input_parameters.insert(0, ComponentParameter::new("verbose", Expr::float(0.0)));
        }
        let mut in_instance = Instance::new(
            sc.name.clone(),
            input_component,
            sc.at_relative.clone(),
            sc.rotate_relative.clone(),
            Mode::Normal,
        );
        in_instance.parameters = input_parameters;
        second.components.insert(0, in_instance);
        second.determine_groups();
        second.build_flow_graph();

        Ok((first, second))
    }

    // -- dependency flags ---------------------------------------------------

    /// De-duplicated flag strings, plus `-DFUNNEL` when any instance is
    /// pinned to the cpu.
    pub fn unique_flags(&self) -> Vec<String> {
        let mut unique: BTreeSet<String> = self.flags.iter().cloned().collect();
        if self.components.iter().any(|c| c.cpu) {
            unique.insert("-DFUNNEL".to_string());
        }
        unique.into_iter().collect()
    }

    /// Expand `@KEY@`, `CMD(…)`, `ENV(…)`, and `GETPATH(…)` in every unique
    /// flag.
    pub fn decoded_flags(&self, config: &mut Config) -> Result<Vec<String>, String> {
        self.unique_flags()
            .iter()
            .map(|flag| {
                let replaced = replace_keywords(flag, &self.name, config);
                replace_env_getpath_cmd(&replaced, &self.registries)
            })
            .collect()
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Instrument {} ({})", self.name, self.source)?;
        for instance in &self.components {
            writeln!(f, "  {}", instance.partial_str())?;
        }
        Ok(())
    }
}

/// Serialized shape of [`Instr`]: instances refer to their component type by
/// name and the distinct definitions ride alongside, so the shared
/// `Arc<Comp>` graph reconstructs on load.
#[derive(Serialize, Deserialize)]
struct InstrRepr {
    name: String,
    source: String,
    parameters: Vec<InstrumentParameter>,
    metadata: Vec<MetaData>,
    instances: Vec<DepInstance>,
    components: IndexMap<String, Comp>,
    included: Vec<String>,
    user: Vec<RawC>,
    declare: Vec<RawC>,
    initialize: Vec<RawC>,
    save: Vec<RawC>,
    #[serde(rename = "final")]
    final_: Vec<RawC>,
    groups: IndexMap<String, Group>,
    flags: Vec<String>,
    registries: Vec<Registry>,
    flow_edges: Vec<FlowEdgeRecord>,
}

impl From<&Instr> for InstrRepr {
    fn from(instr: &Instr) -> Self {
        let mut components: IndexMap<String, Comp> = IndexMap::new();
        for instance in &instr.components {
            components
                .entry(instance.type_.name.clone())
                .or_insert_with(|| (*instance.type_).clone());
        }
        Self {
            name: instr.name.clone(),
            source: instr.source.clone(),
            parameters: instr.parameters.clone(),
            metadata: instr.metadata.clone(),
            instances: instr.components.iter().map(DepInstance::from_independent).collect(),
            components,
            included: instr.included.clone(),
            user: instr.user.clone(),
            declare: instr.declare.clone(),
            initialize: instr.initialize.clone(),
            save: instr.save.clone(),
            final_: instr.final_.clone(),
            groups: instr.groups.clone(),
            flags: instr.flags.clone(),
            registries: instr.registries.clone(),
            flow_edges: instr.flow_edges.clone(),
        }
    }
}

impl TryFrom<InstrRepr> for Instr {
    type Error = String;

    fn try_from(repr: InstrRepr) -> Result<Self, Self::Error> {
        let shared: AHashMap<String, Arc<Comp>> = repr
            .components
            .into_iter()
            .map(|(name, comp)| (name, Arc::new(comp)))
            .collect();
        let mut components = Vec::with_capacity(repr.instances.len());
        for instance in repr.instances {
            let type_name = instance.type_name.clone();
            components.push(instance.make_independent(&shared).ok_or_else(|| {
                format!("instance references unknown component type {type_name}")
            })?);
        }
        Ok(Self {
            name: repr.name,
            source: repr.source,
            parameters: repr.parameters,
            metadata: repr.metadata,
            components,
            included: repr.included,
            user: repr.user,
            declare: repr.declare,
            initialize: repr.initialize,
            save: repr.save,
            final_: repr.final_,
            groups: repr.groups,
            flags: repr.flags,
            registries: repr.registries,
            flow_edges: repr.flow_edges,
        })
    }
}

impl Serialize for Instr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        InstrRepr::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Instr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = InstrRepr::deserialize(deserializer)?;
        Self::try_from(repr).map_err(serde::de::Error::custom)
    }
}
