//! Component definitions parsed from `.comp` files.

use serde::{Deserialize, Serialize};

use crate::{
    errors::SemanticError,
    params::{ComponentParameter, MetaData, RawC, parameter_by_name, parameter_name_present},
};

/// Intermediate representation of a McCode component definition.
///
/// Read once from a `.comp` file (or its JSON sidecar) and shared immutably
/// by every instance of the type via `Arc<Comp>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comp {
    /// Component *type* name, i.e. `{name}.comp`.
    pub name: String,
    /// Nearly free-form category; from a `CATEGORY` directive or guessed
    /// from the registry path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// `#define`d parameters, in declaration order.
    #[serde(default)]
    pub define: Vec<ComponentParameter>,
    /// Formal `SETTING` parameters.
    #[serde(default)]
    pub setting: Vec<ComponentParameter>,
    /// `OUTPUT` parameters.
    #[serde(default)]
    pub output: Vec<ComponentParameter>,
    #[serde(default)]
    pub metadata: Vec<MetaData>,
    /// Compile-time `DEPENDENCY "…"` string, stored without its quotes and
    /// without macro evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<String>,
    /// False when the component cannot run under OpenACC (`NOACC`).
    pub acc: bool,
    // verbatim C sections, in the order the code generator consumes them
    #[serde(default)]
    pub share: Vec<RawC>,
    #[serde(default)]
    pub user: Vec<RawC>,
    #[serde(default)]
    pub declare: Vec<RawC>,
    #[serde(default)]
    pub initialize: Vec<RawC>,
    #[serde(default)]
    pub trace: Vec<RawC>,
    #[serde(default)]
    pub save: Vec<RawC>,
    #[serde(default, rename = "final")]
    pub final_: Vec<RawC>,
    #[serde(default)]
    pub display: Vec<RawC>,
}

impl Comp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            acc: true,
            ..Self::default()
        }
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        parameter_name_present(&self.define, name) || parameter_name_present(&self.setting, name)
    }

    /// Look up a DEFINITION or SETTING parameter by name.
    pub fn get_parameter(&self, name: &str) -> Option<&ComponentParameter> {
        parameter_by_name(&self.define, name).or_else(|| parameter_by_name(&self.setting, name))
    }

    fn parameter_name_used(&self, kind: &str, name: &str) -> Result<(), SemanticError> {
        if parameter_name_present(&self.define, name) {
            return Err(SemanticError::DuplicateName(format!(
                "{kind} parameter {name} is already a definition parameter of {}",
                self.name
            )));
        }
        if parameter_name_present(&self.setting, name) {
            return Err(SemanticError::DuplicateName(format!(
                "{kind} parameter {name} is already a setting parameter of {}",
                self.name
            )));
        }
        if parameter_name_present(&self.output, name) {
            return Err(SemanticError::DuplicateName(format!(
                "{kind} parameter {name} is already an output parameter of {}",
                self.name
            )));
        }
        Ok(())
    }

    pub fn add_define(&mut self, p: ComponentParameter) -> Result<(), SemanticError> {
        self.parameter_name_used("DEFINITION", &p.name)?;
        self.define.push(p);
        Ok(())
    }

    pub fn add_setting(&mut self, p: ComponentParameter) -> Result<(), SemanticError> {
        self.parameter_name_used("SETTING", &p.name)?;
        self.setting.push(p);
        Ok(())
    }

    pub fn add_output(&mut self, p: ComponentParameter) -> Result<(), SemanticError> {
        // McCode-3 allows OUTPUT names to shadow SETTING names, so only
        // repeated OUTPUT names are rejected.
        if parameter_name_present(&self.output, &p.name) {
            return Err(SemanticError::DuplicateName(format!(
                "OUTPUT parameter {} repeated in {}",
                p.name, self.name
            )));
        }
        self.output.push(p);
        Ok(())
    }

    pub fn no_acc(&mut self) {
        self.acc = false;
    }

    pub fn add_metadata(&mut self, m: MetaData) {
        self.metadata.retain(|x| x.name != m.name);
        self.metadata.push(m);
    }

    pub fn collect_metadata(&self) -> &[MetaData] {
        &self.metadata
    }
}
