//! Stage-separated error types.
//!
//! Each pipeline stage keeps its own enum so callers can route recovery
//! without string matching; everything converts into [`McCodeError`] at the
//! library boundary.

use std::fmt;

use crate::{expr::ExprError, parse::ParseError};

/// Errors raised by the visitor or by IR-editing methods. Not recoverable in
/// place; reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    /// A component instance, parameter, or group name is already taken.
    DuplicateName(String),
    /// A by-name lookup (RELATIVE, JUMP, PREVIOUS_n, insertion anchor) found
    /// nothing.
    UnknownReference(String),
    /// An insertion would place a foreign component between two members of
    /// the same GROUP.
    GroupContinuityViolation(String),
    /// An instance-parameter value is incompatible with its declaration.
    IncompatibleParameter(String),
    /// A WHEN condition folded to a constant.
    ConstantWhen(String),
    /// An instance parameter is not declared by the component type.
    UnknownParameter(String),
    /// Assignment statements inside expressions are unsupported.
    AssignmentUnsupported(String),
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName(m) => write!(f, "duplicate name: {m}"),
            Self::UnknownReference(m) => write!(f, "unknown reference: {m}"),
            Self::GroupContinuityViolation(m) => write!(f, "group continuity violation: {m}"),
            Self::IncompatibleParameter(m) => write!(f, "incompatible parameter: {m}"),
            Self::ConstantWhen(m) => write!(f, "constant WHEN condition: {m}"),
            Self::UnknownParameter(m) => write!(f, "unknown parameter: {m}"),
            Self::AssignmentUnsupported(m) => write!(f, "{m}"),
        }
    }
}

impl std::error::Error for SemanticError {}

/// Errors from the registry search and file resolution layer.
#[derive(Debug)]
pub enum ResolveError {
    /// No registry in the search list knows the requested name.
    NotFound { name: String, registries: Vec<String> },
    /// Disk read failed. Sidecar *write* failures are swallowed instead.
    Io(std::io::Error),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name, registries } => {
                if registries.len() == 1 {
                    write!(f, "{name} not found in registry {}", registries[0])
                } else {
                    write!(f, "{name} not found in registries: {}", registries.join(","))
                }
            }
            Self::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<std::io::Error> for ResolveError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Top-level error for library entry points.
#[derive(Debug)]
pub enum McCodeError {
    Expr(ExprError),
    Parse(ParseError),
    Semantic(SemanticError),
    Resolve(ResolveError),
    Io(std::io::Error),
}

impl fmt::Display for McCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(e) => write!(f, "{e}"),
            Self::Parse(e) => write!(f, "{e}"),
            Self::Semantic(e) => write!(f, "{e}"),
            Self::Resolve(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for McCodeError {}

impl From<ExprError> for McCodeError {
    fn from(e: ExprError) -> Self {
        Self::Expr(e)
    }
}

impl From<ParseError> for McCodeError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<SemanticError> for McCodeError {
    fn from(e: SemanticError) -> Self {
        Self::Semantic(e)
    }
}

impl From<ResolveError> for McCodeError {
    fn from(e: ResolveError) -> Self {
        Self::Resolve(e)
    }
}

impl From<std::io::Error> for McCodeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
