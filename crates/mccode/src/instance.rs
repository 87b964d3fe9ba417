//! Component instances as placed in an instrument's TRACE section.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    comp::Comp,
    errors::SemanticError,
    expr::Expr,
    orientation::{Angles, Orient, Vector, placement_str},
    params::{
        ComponentParameter, MetaData, Mode, RawC, parameter_by_name, parameter_name_present,
    },
};

/// A `JUMP target (WHEN|ITERATE) condition` directive.
///
/// `absolute_target = -1` means unresolved; resolution maps the target name
/// (or a relative offset such as `PREVIOUS_n`/`MYSELF`) to an index into the
/// owning instrument's component list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jump {
    pub target: String,
    pub relative_target: i64,
    pub iterate: bool,
    pub condition: Expr,
    pub absolute_target: i64,
}

impl Jump {
    pub fn new(target: impl Into<String>, relative_target: i64, iterate: bool, condition: Expr) -> Self {
        Self {
            target: target.into(),
            relative_target,
            iterate,
            condition,
            absolute_target: -1,
        }
    }

    pub fn uses_id(&self, name: &str) -> bool {
        self.condition.ids().contains(&name)
    }
}

impl fmt::Display for Jump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kw = if self.iterate { "ITERATE" } else { "WHEN" };
        write!(f, "JUMP {} {kw} {}", self.target, self.condition)
    }
}

/// A placement reference: the offset plus the name of the instance it is
/// relative to (`None` for ABSOLUTE). References are resolved on demand
/// through the owning instrument's by-name lookup.
pub type VectorReference = (Vector, Option<String>);
/// As [`VectorReference`], for the `ROTATED` clause.
pub type AnglesReference = (Angles, Option<String>);

/// Intermediate representation of one `COMPONENT name = Type(…)` instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: String,
    /// The shared component definition this instance invokes.
    pub type_: Arc<Comp>,
    pub at_relative: VectorReference,
    pub rotate_relative: AnglesReference,
    /// Computed absolute placement.
    pub orientation: Orient,
    pub parameters: Vec<ComponentParameter>,
    pub removable: bool,
    pub cpu: bool,
    pub split: Option<Expr>,
    pub when: Option<Expr>,
    pub group: Option<String>,
    pub extend: Vec<RawC>,
    pub jump: Vec<Jump>,
    pub metadata: Vec<MetaData>,
    pub mode: Mode,
}

impl Instance {
    pub fn new(
        name: impl Into<String>,
        type_: Arc<Comp>,
        at_relative: VectorReference,
        rotate_relative: AnglesReference,
        mode: Mode,
    ) -> Self {
        // a noacc component type forces this instance onto the cpu
        let cpu = !type_.acc;
        Self {
            name: name.into(),
            type_,
            at_relative,
            rotate_relative,
            orientation: Orient::origin(),
            parameters: Vec::new(),
            removable: false,
            cpu,
            split: None,
            when: None,
            group: None,
            extend: Vec::new(),
            jump: Vec::new(),
            metadata: Vec::new(),
            mode,
        }
    }

    /// COPY form: a new instance of the same type inheriting parameters,
    /// condition, group, extend, jumps, metadata, and mode.
    pub fn from_instance(
        name: impl Into<String>,
        reference: &Self,
        at_relative: VectorReference,
        rotate_relative: AnglesReference,
    ) -> Self {
        Self {
            name: name.into(),
            type_: Arc::clone(&reference.type_),
            at_relative,
            rotate_relative,
            orientation: Orient::origin(),
            parameters: reference.parameters.clone(),
            removable: false,
            cpu: reference.cpu,
            split: reference.split.clone(),
            when: reference.when.clone(),
            group: reference.group.clone(),
            extend: reference.extend.clone(),
            jump: reference.jump.clone(),
            metadata: reference.metadata.clone(),
            mode: reference.mode,
        }
    }

    /// Assign a parameter value, checking the declaration and copying the
    /// declared data/shape types onto untyped identifier values.
    pub fn set_parameter(
        &mut self,
        name: &str,
        mut value: Expr,
        overwrite: bool,
    ) -> Result<(), SemanticError> {
        let Some(declared) = self.type_.get_parameter(name) else {
            return Err(SemanticError::UnknownParameter(format!(
                "{name} is not a known DEFINITION or SETTING parameter for {}",
                self.type_.name
            )));
        };
        let declared = declared.clone();
        if parameter_name_present(&self.parameters, name) {
            if overwrite {
                self.parameters.retain(|p| p.name != name);
            } else {
                // keep the first-encountered value, matching McCode-3
                tracing::info!(
                    instance = %self.name,
                    parameter = name,
                    "repeated parameter definition; first value retained"
                );
                return Ok(());
            }
        }
        if !declared.compatible_value(&value) {
            return Err(SemanticError::IncompatibleParameter(format!(
                "value for parameter {name} is not compatible with {}",
                self.type_.name
            )));
        }
        if !value.is_op() && value.data_type() == crate::expr::DataType::Undefined {
            value.set_data_type(declared.value.data_type());
            value.set_shape_type(declared.value.shape_type());
        }
        self.parameters.push(ComponentParameter::new(name, value));
        Ok(())
    }

    /// The assigned value, falling back to the declaration default.
    pub fn get_parameter(&self, name: &str) -> Option<&ComponentParameter> {
        parameter_by_name(&self.parameters, name).or_else(|| self.type_.get_parameter(name))
    }

    pub fn defines_parameter(&self, name: &str) -> bool {
        parameter_name_present(&self.parameters, name)
    }

    /// Flag identifier values that name instrument parameters.
    pub fn verify_parameters(&mut self, instrument_parameter_names: &[&str]) {
        for parameter in &mut self.parameters {
            parameter.value.promote_parameters(instrument_parameter_names);
        }
    }

    pub fn set_removable(&mut self) {
        self.removable = true;
    }

    pub fn set_cpu(&mut self) {
        self.cpu = true;
    }

    pub fn set_split(&mut self, count: Expr) {
        self.split = Some(count);
    }

    pub fn set_when(&mut self, expr: Expr) -> Result<(), SemanticError> {
        if expr.is_constant() {
            return Err(SemanticError::ConstantWhen(format!(
                "WHEN condition {expr} on {} would be constant at runtime",
                self.name
            )));
        }
        self.when = Some(expr);
        Ok(())
    }

    pub fn set_group(&mut self, name: impl Into<String>) {
        self.group = Some(name.into());
    }

    /// EXTEND on a COPY instance replaces the inherited blocks.
    pub fn set_extend(&mut self, blocks: Vec<RawC>) {
        if !blocks.is_empty() {
            self.extend = blocks;
        }
    }

    /// JUMP on a COPY instance replaces the inherited jumps.
    pub fn set_jumps(&mut self, jumps: Vec<Jump>) {
        if !jumps.is_empty() {
            self.jump = jumps;
        }
    }

    pub fn add_metadata(&mut self, m: MetaData) {
        self.metadata.retain(|x| x.name != m.name);
        self.metadata.push(m);
    }

    /// Instance metadata overrides component metadata of the same name.
    pub fn collect_metadata(&self) -> Vec<MetaData> {
        let mut collected: Vec<MetaData> = Vec::new();
        for m in self.type_.collect_metadata() {
            if !self.metadata.iter().any(|x| x.name == m.name) {
                collected.push(m.clone());
            }
        }
        collected.extend(self.metadata.iter().cloned());
        collected
    }

    /// Whether the named instrument parameter appears anywhere in this
    /// instance: parameter values, placement, conditions, EXTEND, or jumps.
    pub fn parameter_used(&self, name: &str) -> bool {
        if self.parameters.iter().any(|p| p.value.ids().contains(&name)) {
            return true;
        }
        if self.at_relative.0.uses_id(name)
            || self.rotate_relative.0.uses_id(name)
            || self.orientation.uses_id(name)
        {
            return true;
        }
        if self.split.as_ref().is_some_and(|e| e.ids().contains(&name))
            || self.when.as_ref().is_some_and(|e| e.ids().contains(&name))
        {
            return true;
        }
        if self.extend.iter().any(|b| b.mentions(name)) {
            return true;
        }
        self.jump.iter().any(|j| j.uses_id(name))
    }

    /// The one-line `COMPONENT … AT … ROTATED …` summary.
    pub fn partial_str(&self) -> String {
        let mut line = String::new();
        if self.cpu {
            line.push_str("CPU ");
        }
        let parameters: Vec<String> = self.parameters.iter().map(ToString::to_string).collect();
        line.push_str(&format!(
            "COMPONENT {} = {}({})",
            self.name,
            self.type_.name,
            parameters.join(", ")
        ));
        if let Some(when) = &self.when {
            line.push_str(&format!(" WHEN {when}"));
        }
        line.push(' ');
        line.push_str(&placement_str(
            "AT",
            &self.at_relative.0,
            self.at_relative.1.as_deref(),
            crate::expr::PrintStyle::C,
        ));
        if !self.rotate_relative.0.is_null() || self.rotate_relative.1.is_some() {
            line.push(' ');
            let rotate_vector = crate::orientation::Vector::new(
                self.rotate_relative.0.x.clone(),
                self.rotate_relative.0.y.clone(),
                self.rotate_relative.0.z.clone(),
            );
            line.push_str(&placement_str(
                "ROTATED",
                &rotate_vector,
                self.rotate_relative.1.as_deref(),
                crate::expr::PrintStyle::C,
            ));
        }
        line
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({}, {})", self.name, self.type_.name)
    }
}

/// The serialized shape of an [`Instance`]: the component type collapses to
/// its name and placement references stay as names. [`crate::instr::Instr`]
/// reconstructs the shared `Arc<Comp>` links on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepInstance {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub at_relative: (Vector, Option<String>),
    pub rotate_relative: (Angles, Option<String>),
    pub orientation: Orient,
    #[serde(default)]
    pub parameters: Vec<ComponentParameter>,
    #[serde(default)]
    pub removable: bool,
    #[serde(default)]
    pub cpu: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub extend: Vec<RawC>,
    #[serde(default)]
    pub jump: Vec<Jump>,
    #[serde(default)]
    pub metadata: Vec<MetaData>,
    #[serde(default)]
    pub mode: Mode,
}

impl DepInstance {
    pub fn from_independent(instance: &Instance) -> Self {
        Self {
            name: instance.name.clone(),
            type_name: instance.type_.name.clone(),
            at_relative: instance.at_relative.clone(),
            rotate_relative: instance.rotate_relative.clone(),
            orientation: instance.orientation.clone(),
            parameters: instance.parameters.clone(),
            removable: instance.removable,
            cpu: instance.cpu,
            split: instance.split.clone(),
            when: instance.when.clone(),
            group: instance.group.clone(),
            extend: instance.extend.clone(),
            jump: instance.jump.clone(),
            metadata: instance.metadata.clone(),
            mode: instance.mode,
        }
    }

    /// Re-attach the shared component definition.
    pub fn make_independent(self, components: &ahash::AHashMap<String, Arc<Comp>>) -> Option<Instance> {
        let type_ = Arc::clone(components.get(&self.type_name)?);
        Some(Instance {
            name: self.name,
            type_,
            at_relative: self.at_relative,
            rotate_relative: self.rotate_relative,
            orientation: self.orientation,
            parameters: self.parameters,
            removable: self.removable,
            cpu: self.cpu,
            split: self.split,
            when: self.when,
            group: self.group,
            extend: self.extend,
            jump: self.jump,
            metadata: self.metadata,
            mode: self.mode,
        })
    }
}
