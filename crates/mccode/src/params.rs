//! Shared parameter, metadata, and verbatim-C records used by both the
//! instrument and component IR.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::{DataType, Expr};

/// Which McCode flavor a reader serves; selects the default registries and
/// the search-path environment variable.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    #[default]
    #[strum(serialize = "McStas")]
    McStas,
    #[strum(serialize = "McXtrace")]
    McXtrace,
}

impl Flavor {
    /// Environment key holding extra space-separated registry directories.
    pub fn paths_env_key(self) -> &'static str {
        match self {
            Self::McStas => "MCCODEANTLR_MCSTAS__PATHS",
            Self::McXtrace => "MCCODEANTLR_MCXTRACE__PATHS",
        }
    }
}

/// Parse mode: `Minimal` skips orientation computation, for callers that only
/// need names and parameters.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Minimal,
}

/// A verbatim C fragment with enough location data to emit `#line` markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawC {
    pub source_file: String,
    pub line_number: usize,
    pub text: String,
}

impl RawC {
    pub fn new(source_file: impl Into<String>, line_number: usize, text: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            line_number,
            text: text.into(),
        }
    }

    /// Whether the fragment mentions `name` as a whole word.
    pub fn mentions(&self, name: &str) -> bool {
        let bytes = self.text.as_bytes();
        let mut start = 0;
        while let Some(pos) = self.text[start..].find(name) {
            let at = start + pos;
            let before_ok = at == 0 || !is_ident_byte(bytes[at - 1]);
            let end = at + name.len();
            let after_ok = end >= bytes.len() || !is_ident_byte(bytes[end]);
            if before_ok && after_ok {
                return true;
            }
            start = at + 1;
        }
        false
    }
}

fn is_ident_byte(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

impl fmt::Display for RawC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A `METADATA mimetype "name" %{…%}` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    /// Name of the defining instrument, component, or instance.
    pub source: String,
    pub mimetype: String,
    pub name: String,
    pub value: String,
}

impl MetaData {
    pub fn new(
        source: impl Into<String>,
        mimetype: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            mimetype: mimetype.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A runtime-settable instrument parameter. The value's `data_type` records
/// the declared type (scalar double, int, or string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentParameter {
    pub name: String,
    pub unit: Option<String>,
    pub value: Expr,
}

impl InstrumentParameter {
    pub fn new(name: impl Into<String>, unit: Option<String>, value: Expr) -> Self {
        Self {
            name: name.into(),
            unit,
            value,
        }
    }

    /// Parse a single declaration such as `int n/"1"=10` or
    /// `string filename="out.dat"`.
    pub fn parse(text: &str) -> Result<Self, crate::parse::ParseError> {
        crate::parse_instr::parse_instrument_parameter(text)
    }
}

impl fmt::Display for InstrumentParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.value.is_str() {
            "string "
        } else if self.value.is_vector() && self.value.data_type() == DataType::Float {
            "vector "
        } else if self.value.data_type() == DataType::Int {
            "int "
        } else {
            ""
        };
        write!(f, "{prefix}{}", self.name)?;
        if let Some(unit) = &self.unit {
            write!(f, "/{unit}")?;
        }
        if self.value.has_value() {
            write!(f, "={}", self.value)?;
        }
        Ok(())
    }
}

/// A component parameter: the declaration default in a `Comp`, or a concrete
/// assignment on an `Instance`. Unit and description arrive from the McDoc
/// header when one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentParameter {
    pub name: String,
    pub value: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ComponentParameter {
    pub fn new(name: impl Into<String>, value: Expr) -> Self {
        Self {
            name: name.into(),
            value,
            unit: None,
            description: None,
        }
    }

    pub fn compatible_value(&self, value: &Expr) -> bool {
        self.value.compatible(value, true)
    }
}

impl fmt::Display for ComponentParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Whether any parameter in `parameters` is named `name`.
pub fn parameter_name_present<P: Named>(parameters: &[P], name: &str) -> bool {
    parameters.iter().any(|p| p.name() == name)
}

/// Lookup by name over a parameter slice.
pub fn parameter_by_name<'a, P: Named>(parameters: &'a [P], name: &str) -> Option<&'a P> {
    parameters.iter().find(|p| p.name() == name)
}

/// Anything with a parameter-style name.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for InstrumentParameter {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for ComponentParameter {
    fn name(&self) -> &str {
        &self.name
    }
}
